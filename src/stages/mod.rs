use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::captions::CaptionTrack;

pub mod reuse;
pub mod synthesize;

pub use reuse::ReuseCaptionStage;
pub use synthesize::WhisperSynthesisStage;

/// Failure taxonomy for a single stage invocation.
///
/// Only `Systemic` aborts the whole batch; everything else resolves to a
/// per-item failure after the retry budget is spent.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StageError {
    /// Network or rate-limit failure, worth retrying.
    #[error("remote request failed: {0}")]
    Transient(String),

    /// Content removed, private, or geo-restricted. Never retried.
    #[error("source unavailable: {0}")]
    Permanent(String),

    /// The transcription engine could not process the retrieved audio.
    #[error("transcription engine failed: {0}")]
    Engine(String),

    /// No remote service is reachable at all; the whole job fails.
    #[error("{0}")]
    Systemic(String),
}

impl StageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StageError::Transient(_))
    }

    pub fn is_systemic(&self) -> bool {
        matches!(self, StageError::Systemic(_))
    }
}

/// Outcome of the cheap path: either reusable captions or an explicit
/// signal to fall back to synthesis.
#[derive(Debug, Clone)]
pub enum ReuseOutcome {
    /// Platform auto-captions converted into the uniform cue format.
    Reused(CaptionTrack),
    /// Upstream has no captions for this source; expected, not an error.
    NotAvailable,
}

/// Attempts to obtain pre-existing auto-captions without downloading
/// the full media payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReuseStage: Send + Sync {
    async fn try_reuse(&self, url: &str) -> Result<ReuseOutcome, StageError>;
}

/// Retrieves audio-only media and runs the transcription engine over it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SynthesisStage: Send + Sync {
    async fn synthesize(&self, url: &str) -> Result<CaptionTrack, StageError>;
}

/// Run yt-dlp with the given arguments, mapping a missing binary to a
/// systemic failure.
pub(crate) async fn run_yt_dlp<S: AsRef<std::ffi::OsStr>>(
    binary: &str,
    args: &[S],
) -> Result<std::process::Output, StageError> {
    let output = Command::new(binary)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StageError::Systemic(format!(
                    "{} is not installed; install it from https://github.com/yt-dlp/yt-dlp",
                    binary
                ))
            } else {
                StageError::Transient(format!("failed to launch {}: {}", binary, e))
            }
        })?;

    Ok(output)
}

/// Classify a yt-dlp failure from its stderr output.
pub(crate) fn classify_remote_failure(stderr: &str) -> StageError {
    let lower = stderr.to_lowercase();
    let summary = summarize_stderr(stderr);

    // Host resolution failures mean no remote access at all.
    if lower.contains("failed to resolve")
        || lower.contains("name or service not known")
        || lower.contains("temporary failure in name resolution")
    {
        return StageError::Systemic(format!("cannot reach remote service: {}", summary));
    }

    if lower.contains("private")
        || lower.contains("unavailable")
        || lower.contains("removed")
        || lower.contains("not available in your country")
        || lower.contains("404")
    {
        return StageError::Permanent(summary);
    }

    // Everything else (timeouts, resets, 429s, unknown noise) gets the
    // bounded retry treatment before being downgraded to an item failure.
    StageError::Transient(summary)
}

/// Reduce multi-line tool output to its last ERROR line, or the last
/// non-empty line when no ERROR marker exists.
pub(crate) fn summarize_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

/// Write an executable shell script standing in for an external tool.
#[cfg(all(test, unix))]
pub(crate) fn write_stub(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs_err::write(&path, body).unwrap();
    let mut perms = fs_err::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs_err::set_permissions(&path, perms).unwrap();
    path
}
