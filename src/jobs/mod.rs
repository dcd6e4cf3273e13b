use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle state of a batch submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-URL result, produced by exactly one of the two stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Platform auto-captions were reused directly.
    Reused { cues: usize },
    /// Captions were synthesized by the transcription engine.
    Synthesized { cues: usize },
    /// Neither stage produced captions for this source.
    Failed { reason: String },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ItemOutcome::Failed { .. })
    }
}

/// A batch submission tracked through its lifecycle.
///
/// Mutated only through [`JobStore`] while running; immutable once it
/// reaches a terminal state except for deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub state: JobState,

    /// Fraction of submitted URLs with a recorded outcome while
    /// running; pinned to 1.0 once the job is terminal.
    pub progress: f64,

    /// Latest human-readable status or failure reason.
    pub message: String,

    /// Submitted URLs, in submission order.
    pub urls: Vec<String>,

    /// Per-URL outcomes, keyed by the submitted URL.
    pub outcomes: HashMap<String, ItemOutcome>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Directory holding this job's caption files, set once running.
    pub workspace: Option<PathBuf>,
}

impl Job {
    fn new(urls: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Pending,
            progress: 0.0,
            message: "Job created".to_string(),
            urls,
            outcomes: HashMap::new(),
            created_at: Utc::now(),
            completed_at: None,
            workspace: None,
        }
    }

    /// Number of URLs that produced a caption file.
    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }
}

/// Shared, task-safe store of job records.
///
/// The store is the single shared mutable resource: the coordinator
/// mutates records through `update`, the API layer reads snapshots.
/// Updates against a deleted record are silently dropped so deleting a
/// running job never crashes the in-flight worker.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    inner: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending job for the given URLs and return a snapshot.
    pub async fn create(&self, urls: Vec<String>) -> Job {
        let job = Job::new(urls);
        self.inner.write().await.insert(job.id, job.clone());
        job
    }

    /// Snapshot of a single job.
    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn exists(&self, id: Uuid) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    /// Snapshots of all jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.inner.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Remove a job record. Returns the removed snapshot, or `None` if
    /// the id was unknown.
    pub async fn delete(&self, id: Uuid) -> Option<Job> {
        self.inner.write().await.remove(&id)
    }

    /// Apply `mutate` to the record if it still exists. Returns whether
    /// the record was present.
    pub async fn update(&self, id: Uuid, mutate: impl FnOnce(&mut Job)) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&id) {
            Some(job) => {
                mutate(job);
                true
            }
            None => false,
        }
    }
}
