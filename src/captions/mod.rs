use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A single timed caption entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Caption text (may span multiple lines)
    pub text: String,
}

/// An ordered sequence of cues for one source video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub cues: Vec<Cue>,
}

impl CaptionTrack {
    pub fn new(cues: Vec<Cue>) -> Self {
        Self { cues }
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Render the track in SRT form: numbered cues with a
    /// `HH:MM:SS,mmm --> HH:MM:SS,mmm` line, blank-line separated.
    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, cue) in self.cues.iter().enumerate() {
            out.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                format_timestamp(cue.start),
                format_timestamp(cue.end),
                cue.text.trim()
            ));
        }
        out
    }
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let total_millis = (seconds * 1000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Parse an SRT timestamp. Accepts both `,` and `.` as the millisecond
/// separator since converted tracks are not always strict about it.
fn parse_timestamp(input: &str) -> Option<f64> {
    let normalized = input.trim().replace(',', ".");
    let mut parts = normalized.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse SRT content into a caption track.
///
/// Parsing is lenient: blocks without a recognizable timing line are
/// skipped rather than failing, since platform-converted subtitles often
/// carry stray headers or empty blocks.
pub fn parse_srt(content: &str) -> Result<CaptionTrack> {
    let mut cues = Vec::new();

    for block in content.replace('\r', "").split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            continue;
        }

        // Timing line may be first (index omitted) or second.
        let timing_index = lines.iter().position(|l| l.contains("-->"));
        let Some(timing_index) = timing_index else {
            continue;
        };

        let (start_str, end_str) = match lines[timing_index].split_once("-->") {
            Some(pair) => pair,
            None => continue,
        };

        let (Some(start), Some(end)) = (parse_timestamp(start_str), parse_timestamp(end_str))
        else {
            tracing::debug!("skipping cue with unparseable timing: {}", lines[timing_index]);
            continue;
        };

        let text = lines[timing_index + 1..].join("\n");
        if text.trim().is_empty() {
            continue;
        }

        cues.push(Cue {
            start,
            end,
            text: text.trim().to_string(),
        });
    }

    Ok(CaptionTrack::new(cues))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(1.5), "00:00:01,500");
        assert_eq!(format_timestamp(61.042), "00:01:01,042");
        assert_eq!(format_timestamp(3661.0), "01:01:01,000");
    }

    #[test]
    fn test_to_srt_numbering_and_layout() {
        let track = CaptionTrack::new(vec![
            Cue {
                start: 0.0,
                end: 2.5,
                text: "hello there".to_string(),
            },
            Cue {
                start: 2.5,
                end: 4.0,
                text: "second line".to_string(),
            },
        ]);

        let srt = track.to_srt();
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:02,500\nhello there\n\n\
             2\n00:00:02,500 --> 00:00:04,000\nsecond line\n\n"
        );
    }

    #[test]
    fn test_parse_srt_round_trip() {
        let input = "1\n00:00:00,000 --> 00:00:02,500\nhello there\n\n\
                     2\n00:00:02,500 --> 00:00:04,000\nsecond line\nwrapped\n";
        let track = parse_srt(input).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.cues[0].text, "hello there");
        assert_eq!(track.cues[1].text, "second line\nwrapped");
        assert!((track.cues[1].start - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_srt_accepts_dot_separator() {
        let input = "1\n00:00:01.250 --> 00:00:02.000\ndotted\n";
        let track = parse_srt(input).unwrap();
        assert_eq!(track.len(), 1);
        assert!((track.cues[0].start - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_srt_skips_malformed_blocks() {
        let input = "WEBVTT header junk\n\n\
                     1\nnot a timing line\ntext\n\n\
                     2\n00:00:00,000 --> 00:00:01,000\nkept\n";
        let track = parse_srt(input).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.cues[0].text, "kept");
    }

    #[test]
    fn test_parse_srt_empty_input() {
        let track = parse_srt("").unwrap();
        assert!(track.is_empty());
    }
}
