use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;

use super::{classify_remote_failure, run_yt_dlp, summarize_stderr, StageError, SynthesisStage};
use crate::captions::{CaptionTrack, Cue};
use crate::config::{ModelTier, RetryConfig};
use crate::utils::shortcode_from_url;

/// Whisper JSON output shape (`--output_format json`). Fields we do
/// not read, such as the full-text transcript, are ignored.
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Synthesis fallback backed by an audio-only yt-dlp download and a
/// local Whisper CLI pass.
///
/// All scratch files live in a per-invocation [`TempDir`] that is
/// removed on every exit path, bounding disk usage.
pub struct WhisperSynthesisStage {
    yt_dlp_path: String,
    whisper_path: String,
    model: ModelTier,
    language: String,
    retry: RetryConfig,
}

impl WhisperSynthesisStage {
    pub fn new(model: ModelTier, language: String, retry: RetryConfig) -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            whisper_path: "whisper".to_string(),
            model,
            language,
            retry,
        }
    }

    #[cfg(test)]
    pub fn with_binaries(mut self, yt_dlp: impl Into<String>, whisper: impl Into<String>) -> Self {
        self.yt_dlp_path = yt_dlp.into();
        self.whisper_path = whisper.into();
        self
    }

    /// Audio-only download (~1-3 MB/min of source media).
    async fn download_audio(&self, url: &str, audio_path: &Path) -> Result<(), StageError> {
        let audio_arg = audio_path.to_string_lossy().to_string();
        let output = run_yt_dlp(
            &self.yt_dlp_path,
            &[
                "-f",
                "ba",
                "--no-playlist",
                "--output",
                audio_arg.as_str(),
                url,
            ],
        )
        .await?;

        if !output.status.success() {
            return Err(classify_remote_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        if !audio_path.exists() {
            return Err(StageError::Permanent(
                "yt-dlp reported success but produced no audio file".to_string(),
            ));
        }

        Ok(())
    }

    /// Run the Whisper CLI over the downloaded audio and convert its
    /// timestamped segments into cues.
    async fn transcribe(&self, audio_path: &Path, scratch: &Path) -> Result<CaptionTrack, StageError> {
        let audio_arg = audio_path.to_string_lossy().to_string();
        let scratch_arg = scratch.to_string_lossy().to_string();

        let output = Command::new(&self.whisper_path)
            .args([
                audio_arg.as_str(),
                "--model",
                self.model.as_str(),
                "--language",
                self.language.as_str(),
                "--output_format",
                "json",
                "--output_dir",
                scratch_arg.as_str(),
                "--fp16",
                "False",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StageError::Engine(format!("{} is not installed", self.whisper_path))
                } else {
                    StageError::Engine(format!("failed to launch {}: {}", self.whisper_path, e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::Engine(summarize_stderr(&stderr)));
        }

        // Whisper writes <audio-stem>.json next to --output_dir.
        let json_path = scratch.join(
            audio_path
                .file_stem()
                .map(|s| format!("{}.json", s.to_string_lossy()))
                .unwrap_or_else(|| "audio.json".to_string()),
        );

        let content = fs_err::read_to_string(&json_path)
            .map_err(|e| StageError::Engine(format!("engine produced no readable output: {}", e)))?;

        let parsed: WhisperOutput = serde_json::from_str(&content)
            .map_err(|e| StageError::Engine(format!("failed to parse engine output: {}", e)))?;

        let cues: Vec<Cue> = parsed
            .segments
            .into_iter()
            .map(|s| Cue {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
            })
            .filter(|c| !c.text.is_empty())
            .collect();

        Ok(CaptionTrack::new(cues))
    }
}

#[async_trait]
impl SynthesisStage for WhisperSynthesisStage {
    async fn synthesize(&self, url: &str) -> Result<CaptionTrack, StageError> {
        let shortcode = shortcode_from_url(url);
        let scratch = TempDir::new()
            .map_err(|e| StageError::Engine(format!("failed to create scratch dir: {}", e)))?;
        let audio_path = scratch.path().join(format!("{}.m4a", shortcode));

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.download_audio(url, &audio_path).await {
                Ok(()) => break,
                Err(err) if err.is_transient() && self.retry.can_retry(attempts) => {
                    let delay = self.retry.delay_for_attempt(attempts);
                    tracing::warn!(
                        "{}: audio download attempt {} failed ({}), retrying in {:?}",
                        shortcode,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(
            "{}: transcribing with whisper ({} model)",
            shortcode,
            self.model.as_str()
        );
        let track = self.transcribe(&audio_path, scratch.path()).await?;

        if track.is_empty() {
            return Err(StageError::Engine(
                "engine produced no speech segments".to_string(),
            ));
        }

        tracing::info!("{}: synthesized {} caption cues", shortcode, track.len());
        Ok(track)
    }
}
