use anyhow::Result;
use url::Url;

/// Validate a URL and return normalized version
pub fn validate_and_normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed.to_string())
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Extract the source identifier (shortcode) from a video URL: the last
/// path segment, e.g. `https://www.instagram.com/reel/Cxyz123/` -> `Cxyz123`.
pub fn shortcode_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let trimmed = without_query.trim_end_matches('/');
    let last = trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed);
    sanitize_filename(last)
}

/// Split pasted URL input into individual entries: whitespace-separated,
/// blanks and `#` comment lines dropped, submission order preserved.
pub fn normalize_batch(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace())
        .map(str::to_string)
        .collect()
}

/// Check if the current environment has required tools
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    // Check for yt-dlp
    if !check_command_available("yt-dlp").await {
        missing.push("yt-dlp - required for caption and audio extraction".to_string());
    }

    // Check for ffmpeg (yt-dlp needs it for subtitle conversion)
    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for audio and subtitle processing".to_string());
    }

    // Check for whisper (fallback transcription engine)
    if !check_command_available("whisper").await {
        missing.push("whisper - required for the transcription fallback".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("test/file?name"), "test_file_name");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
    }

    #[test]
    fn test_shortcode_from_url() {
        assert_eq!(
            shortcode_from_url("https://www.instagram.com/reel/Cxyz123/"),
            "Cxyz123"
        );
        assert_eq!(
            shortcode_from_url("https://www.instagram.com/reel/Cxyz123"),
            "Cxyz123"
        );
        assert_eq!(
            shortcode_from_url("https://www.instagram.com/reel/Cxyz123/?igsh=abc"),
            "Cxyz123"
        );
    }

    #[test]
    fn test_normalize_batch_splits_and_filters() {
        let raw = vec![
            "https://a/1/ https://a/2/".to_string(),
            "".to_string(),
            "# a comment".to_string(),
            "  https://a/3/  ".to_string(),
        ];
        assert_eq!(
            normalize_batch(&raw),
            vec!["https://a/1/", "https://a/2/", "https://a/3/"]
        );
    }

    #[test]
    fn test_validate_and_normalize_url() {
        assert!(validate_and_normalize_url("https://example.com").is_ok());
        assert!(validate_and_normalize_url("http://example.com").is_ok());
        assert!(validate_and_normalize_url("ftp://example.com").is_err());
        assert!(validate_and_normalize_url("not-a-url").is_err());
    }
}
