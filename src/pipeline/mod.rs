use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::captions::CaptionTrack;
use crate::config::Config;
use crate::jobs::{ItemOutcome, Job, JobState, JobStore};
use crate::ledger::Ledger;
use crate::stages::{ReuseCaptionStage, ReuseOutcome, ReuseStage, StageError, SynthesisStage, WhisperSynthesisStage};
use crate::utils::{normalize_batch, shortcode_from_url};
use crate::ScribeError;

/// Coordinator knobs, lifted from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Minimum delay between consecutive remote calls within a job
    pub request_delay: Duration,

    /// Optional wall-clock bound for a whole job
    pub job_timeout: Option<Duration>,

    /// Maximum URLs accepted per submission
    pub max_batch_size: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_delay: config.request_delay(),
            job_timeout: config.job_timeout(),
            max_batch_size: config.pipeline.max_batch_size,
        }
    }
}

/// Sequences the two caption-resolution stages across a batch.
///
/// All job mutation goes through the [`JobStore`]; the coordinator never
/// holds a writable reference to a record, so deleting a job mid-run
/// simply turns its remaining writes into no-ops.
pub struct Coordinator {
    store: JobStore,
    reuse: Arc<dyn ReuseStage>,
    synthesis: Arc<dyn SynthesisStage>,
    settings: PipelineSettings,
    data_dir: PathBuf,
}

impl Coordinator {
    pub fn new(
        store: JobStore,
        reuse: Arc<dyn ReuseStage>,
        synthesis: Arc<dyn SynthesisStage>,
        settings: PipelineSettings,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            reuse,
            synthesis,
            settings,
            data_dir,
        }
    }

    /// Wire the real yt-dlp/Whisper stages from configuration.
    pub fn from_config(config: &Config, store: JobStore, ledger: Arc<Ledger>) -> Self {
        let reuse = Arc::new(ReuseCaptionStage::new(
            config.pipeline.language.clone(),
            ledger,
            config.pipeline.retry,
        ));
        let synthesis = Arc::new(WhisperSynthesisStage::new(
            config.pipeline.whisper_model,
            config.pipeline.language.clone(),
            config.pipeline.retry,
        ));

        Self::new(
            store,
            reuse,
            synthesis,
            PipelineSettings::from_config(config),
            config.data_dir(),
        )
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Directory holding one subtitle file per successful source.
    pub fn workspace_for(&self, id: Uuid) -> PathBuf {
        self.data_dir.join("jobs").join(id.to_string()).join("subs")
    }

    /// Root of a job's on-disk footprint, removed when the job is deleted.
    pub fn job_root(&self, id: Uuid) -> PathBuf {
        self.data_dir.join("jobs").join(id.to_string())
    }

    /// Drive one job from pending to a terminal state.
    pub async fn run_job(&self, id: Uuid) {
        let Some(job) = self.store.get(id).await else {
            tracing::warn!("job {} deleted before it started", id);
            return;
        };

        let workspace = self.workspace_for(id);
        if let Err(e) = fs_err::create_dir_all(&workspace) {
            self.store
                .update(id, |j| {
                    j.state = JobState::Failed;
                    j.progress = 1.0;
                    j.message = format!("Error: failed to create workspace: {}", e);
                    j.completed_at = Some(Utc::now());
                })
                .await;
            return;
        }

        let workspace_record = workspace.clone();
        self.store
            .update(id, move |j| {
                j.state = JobState::Running;
                j.message = "Setting up workspace...".to_string();
                j.workspace = Some(workspace_record);
            })
            .await;

        tracing::info!("job {}: processing {} sources", id, job.urls.len());

        let result = match self.settings.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.process(id, &job.urls, &workspace)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!(
                    "job exceeded wall-clock limit of {}s",
                    limit.as_secs()
                )),
            },
            None => self.process(id, &job.urls, &workspace).await,
        };

        match result {
            Ok(produced) => {
                self.store
                    .update(id, move |j| {
                        j.state = JobState::Completed;
                        j.progress = 1.0;
                        j.message = format!("Successfully processed {} transcripts", produced);
                        j.completed_at = Some(Utc::now());
                    })
                    .await;
                tracing::info!("job {}: completed with {} transcripts", id, produced);
            }
            Err(e) => {
                tracing::error!("job {}: failed: {:#}", id, e);
                self.store
                    .update(id, move |j| {
                        j.state = JobState::Failed;
                        j.progress = 1.0;
                        j.message = format!("Error: {}", e);
                        j.completed_at = Some(Utc::now());
                    })
                    .await;
            }
        }
    }

    /// Per-URL loop. Returns the number of transcripts produced, or the
    /// systemic error that aborted the batch.
    async fn process(&self, id: Uuid, urls: &[String], workspace: &Path) -> Result<usize> {
        let total = urls.len();
        let mut produced = 0usize;

        for (index, url) in urls.iter().enumerate() {
            // Deletion is advisory: detected here, at the top of each
            // iteration, never mid-call.
            if !self.store.exists(id).await {
                tracing::info!(
                    "job {}: deleted after {} of {} sources, stopping",
                    id,
                    index,
                    total
                );
                return Ok(produced);
            }

            if index > 0 && !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }

            let shortcode = shortcode_from_url(url);
            let status = format!("Processing {} ({}/{})", shortcode, index + 1, total);
            self.store.update(id, move |j| j.message = status).await;

            let outcome = self.resolve_source(url, workspace).await?;
            if outcome.is_success() {
                produced += 1;
            }

            let url_owned = url.clone();
            let progress = (index + 1) as f64 / total as f64;
            self.store
                .update(id, move |j| {
                    j.outcomes.insert(url_owned, outcome);
                    j.progress = j.progress.max(progress);
                })
                .await;
        }

        Ok(produced)
    }

    /// Cheap path first, expensive path second. Per-item failures come
    /// back as an outcome; only systemic errors propagate.
    async fn resolve_source(&self, url: &str, workspace: &Path) -> Result<ItemOutcome, StageError> {
        if let Err(e) = crate::utils::validate_and_normalize_url(url) {
            return Ok(ItemOutcome::Failed {
                reason: e.to_string(),
            });
        }

        let shortcode = shortcode_from_url(url);

        match self.reuse.try_reuse(url).await {
            Ok(ReuseOutcome::Reused(track)) => {
                return Ok(match self.write_track(&shortcode, &track, workspace) {
                    Ok(()) => ItemOutcome::Reused { cues: track.len() },
                    Err(err) => ItemOutcome::Failed {
                        reason: err.to_string(),
                    },
                });
            }
            Ok(ReuseOutcome::NotAvailable) => {}
            Err(err) if err.is_systemic() => return Err(err),
            Err(err) => {
                return Ok(ItemOutcome::Failed {
                    reason: err.to_string(),
                })
            }
        }

        if !self.settings.request_delay.is_zero() {
            tokio::time::sleep(self.settings.request_delay).await;
        }

        match self.synthesis.synthesize(url).await {
            Ok(track) => Ok(match self.write_track(&shortcode, &track, workspace) {
                Ok(()) => ItemOutcome::Synthesized { cues: track.len() },
                Err(err) => ItemOutcome::Failed {
                    reason: err.to_string(),
                },
            }),
            Err(err) if err.is_systemic() => Err(err),
            Err(err) => Ok(ItemOutcome::Failed {
                reason: err.to_string(),
            }),
        }
    }

    fn write_track(&self, shortcode: &str, track: &CaptionTrack, workspace: &Path) -> Result<(), StageError> {
        let path = workspace.join(format!("{}.srt", shortcode));
        fs_err::write(&path, track.to_srt())
            .map_err(|e| StageError::Engine(format!("failed to write caption file: {}", e)))
    }
}

/// Cloneable submission handle over the coordinator and its worker queue.
#[derive(Clone)]
pub struct PipelineHandle {
    coordinator: Arc<Coordinator>,
    queue: mpsc::Sender<Uuid>,
}

/// Spawn the single background worker and return the submission handle.
///
/// Jobs are processed one at a time; remote calls are the scarce
/// resource here, not CPU.
pub fn start(coordinator: Arc<Coordinator>) -> PipelineHandle {
    let (tx, mut rx) = mpsc::channel::<Uuid>(64);

    let worker = Arc::clone(&coordinator);
    tokio::spawn(async move {
        while let Some(id) = rx.recv().await {
            worker.run_job(id).await;
        }
    });

    PipelineHandle {
        coordinator,
        queue: tx,
    }
}

impl PipelineHandle {
    /// Create a pending job for the batch and enqueue it for the worker.
    pub async fn submit(&self, raw_urls: &[String]) -> Result<Job, ScribeError> {
        let urls = normalize_batch(raw_urls);

        if urls.is_empty() {
            return Err(ScribeError::EmptyBatch);
        }

        let limit = self.coordinator.settings.max_batch_size;
        if urls.len() > limit {
            return Err(ScribeError::BatchTooLarge { limit });
        }

        let job = self.coordinator.store.create(urls).await;

        if self.queue.send(job.id).await.is_err() {
            self.coordinator
                .store
                .update(job.id, |j| {
                    j.state = JobState::Failed;
                    j.progress = 1.0;
                    j.message = "Error: background worker is not running".to_string();
                    j.completed_at = Some(Utc::now());
                })
                .await;
            return Err(ScribeError::WorkerUnavailable);
        }

        tracing::info!("job {}: submitted with {} sources", job.id, job.urls.len());
        Ok(job)
    }

    pub fn store(&self) -> &JobStore {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }
}
