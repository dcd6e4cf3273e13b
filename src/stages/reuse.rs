use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;

use super::{classify_remote_failure, run_yt_dlp, ReuseOutcome, ReuseStage, StageError};
use crate::captions::{parse_srt, CaptionTrack};
use crate::config::RetryConfig;
use crate::ledger::Ledger;
use crate::utils::shortcode_from_url;

/// Caption reuse stage backed by yt-dlp's auto-caption download.
///
/// Asks the platform for its auto-generated subtitles with
/// `--skip-download`, so no media payload is ever fetched on this path.
pub struct ReuseCaptionStage {
    yt_dlp_path: String,
    language: String,
    ledger: Arc<Ledger>,
    retry: RetryConfig,
}

impl ReuseCaptionStage {
    pub fn new(language: String, ledger: Arc<Ledger>, retry: RetryConfig) -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            language,
            ledger,
            retry,
        }
    }

    #[cfg(test)]
    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.yt_dlp_path = path.into();
        self
    }

    /// One yt-dlp attempt. `Ok(None)` means the platform has no
    /// captions for this source, which is an expected branch.
    async fn fetch_captions(&self, url: &str) -> Result<Option<CaptionTrack>, StageError> {
        let scratch = TempDir::new()
            .map_err(|e| StageError::Engine(format!("failed to create scratch dir: {}", e)))?;

        let scratch_path = scratch.path().to_string_lossy().to_string();
        let output = run_yt_dlp(
            &self.yt_dlp_path,
            &[
                "--skip-download",
                "--write-auto-subs",
                "--sub-langs",
                self.language.as_str(),
                "--convert-subs",
                "srt",
                "--no-playlist",
                "--paths",
                scratch_path.as_str(),
                "--output",
                "capture.%(ext)s",
                url,
            ],
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lower = stderr.to_lowercase();
            if lower.contains("no automatic captions") || lower.contains("no subtitles") {
                return Ok(None);
            }
            return Err(classify_remote_failure(&stderr));
        }

        // yt-dlp names the file capture.<lang>.srt; take whatever srt
        // landed in the scratch dir.
        let entries = fs_err::read_dir(scratch.path())
            .map_err(|e| StageError::Engine(format!("failed to scan scratch dir: {}", e)))?;

        for entry in entries {
            let entry = entry
                .map_err(|e| StageError::Engine(format!("failed to scan scratch dir: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("srt") {
                continue;
            }

            let content = fs_err::read_to_string(&path)
                .map_err(|e| StageError::Engine(format!("failed to read subtitle file: {}", e)))?;
            let track = parse_srt(&content)
                .map_err(|e| StageError::Engine(format!("failed to parse subtitle file: {}", e)))?;

            if track.is_empty() {
                return Ok(None);
            }
            return Ok(Some(track));
        }

        // Exit 0 with no subtitle file written: nothing to reuse.
        Ok(None)
    }
}

#[async_trait]
impl ReuseStage for ReuseCaptionStage {
    async fn try_reuse(&self, url: &str) -> Result<ReuseOutcome, StageError> {
        let shortcode = shortcode_from_url(url);

        if self.ledger.contains(&shortcode) {
            tracing::debug!("{}: already in ledger, skipping caption fetch", shortcode);
            return Ok(ReuseOutcome::NotAvailable);
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.fetch_captions(url).await {
                Ok(Some(track)) => {
                    if let Err(e) = self.ledger.record(&shortcode) {
                        // Losing a dedup entry is not worth failing the item.
                        tracing::warn!("{}: failed to record in ledger: {}", shortcode, e);
                    }
                    tracing::info!("{}: reused {} platform caption cues", shortcode, track.len());
                    return Ok(ReuseOutcome::Reused(track));
                }
                Ok(None) => {
                    tracing::debug!("{}: no platform captions available", shortcode);
                    return Ok(ReuseOutcome::NotAvailable);
                }
                Err(err) if err.is_transient() && self.retry.can_retry(attempts) => {
                    let delay = self.retry.delay_for_attempt(attempts);
                    tracing::warn!(
                        "{}: caption fetch attempt {} failed ({}), retrying in {:?}",
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_ledger_hit_short_circuits_without_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("processed.txt")).unwrap());
        ledger.record("abc123").unwrap();

        // A nonexistent binary would surface as a systemic error if the
        // stage attempted a fetch; the ledger hit must win first.
        let stage = ReuseCaptionStage::new("en".to_string(), ledger, test_retry())
            .with_binary("reelscribe-test-missing-binary");

        let outcome = stage
            .try_reuse("https://www.instagram.com/reel/abc123/")
            .await
            .unwrap();

        assert!(matches!(outcome, ReuseOutcome::NotAvailable));
    }

    #[tokio::test]
    async fn test_missing_binary_is_systemic() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("processed.txt")).unwrap());

        let stage = ReuseCaptionStage::new("en".to_string(), ledger, test_retry())
            .with_binary("reelscribe-test-missing-binary");

        let err = stage
            .try_reuse("https://www.instagram.com/reel/zzz999/")
            .await
            .unwrap_err();

        assert!(err.is_systemic());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        use super::super::write_stub;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("first-attempt");

        // Fails with a rate-limit error once, then writes a subtitle
        // file into the --paths directory like the real tool.
        let stub = write_stub(
            dir.path(),
            "yt-dlp-stub",
            &format!(
                "#!/bin/sh\n\
                 if [ ! -f '{marker}' ]; then\n\
                   touch '{marker}'\n\
                   echo 'ERROR: HTTP Error 429: Too Many Requests' >&2\n\
                   exit 1\n\
                 fi\n\
                 paths=''\n\
                 prev=''\n\
                 for a in \"$@\"; do\n\
                   if [ \"$prev\" = '--paths' ]; then paths=\"$a\"; fi\n\
                   prev=\"$a\"\n\
                 done\n\
                 printf '1\\n00:00:00,000 --> 00:00:01,000\\nhello\\n\\n' > \"$paths/capture.en.srt\"\n",
                marker = marker.display()
            ),
        );

        let ledger = Arc::new(Ledger::open(dir.path().join("processed.txt")).unwrap());
        let retry = RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 1,
        };
        let stage = ReuseCaptionStage::new("en".to_string(), Arc::clone(&ledger), retry)
            .with_binary(stub.to_string_lossy());

        let outcome = stage
            .try_reuse("https://www.instagram.com/reel/abc123/")
            .await
            .unwrap();

        match outcome {
            ReuseOutcome::Reused(track) => assert_eq!(track.len(), 1),
            other => panic!("expected reused captions, got {:?}", other),
        }
        assert!(marker.exists());
        assert!(ledger.contains("abc123"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        use super::super::write_stub;

        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");

        let stub = write_stub(
            dir.path(),
            "yt-dlp-stub",
            &format!(
                "#!/bin/sh\n\
                 echo x >> '{calls}'\n\
                 echo 'ERROR: This video is private' >&2\n\
                 exit 1\n",
                calls = calls.display()
            ),
        );

        let ledger = Arc::new(Ledger::open(dir.path().join("processed.txt")).unwrap());
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 1,
        };
        let stage = ReuseCaptionStage::new("en".to_string(), ledger, retry)
            .with_binary(stub.to_string_lossy());

        let err = stage
            .try_reuse("https://www.instagram.com/reel/zzz999/")
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Permanent(_)));
        // The retry budget was never touched.
        assert_eq!(fs_err::read_to_string(&calls).unwrap().lines().count(), 1);
    }
}
