//! Reelscribe - caption extraction for short social-media videos
//!
//! This library resolves spoken-word captions for batches of video URLs
//! in two stages: platform auto-captions are reused where they exist
//! (via yt-dlp), and a local Whisper pass over audio-only downloads
//! fills the gaps. A job-queue layer exposes the pipeline to an HTTP
//! client for batch submission, progress polling, and archive download.

pub mod archive;
pub mod captions;
pub mod cli;
pub mod config;
pub mod jobs;
pub mod ledger;
pub mod pipeline;
pub mod server;
pub mod stages;
pub mod utils;

pub use captions::{CaptionTrack, Cue};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use jobs::{ItemOutcome, Job, JobState, JobStore};
pub use ledger::Ledger;
pub use pipeline::{Coordinator, PipelineHandle};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the caption service
#[derive(thiserror::Error, Debug)]
pub enum ScribeError {
    #[error("No URLs provided")]
    EmptyBatch,

    #[error("Too many URLs in one submission (limit: {limit})")]
    BatchTooLarge { limit: usize },

    #[error("Background worker is not running")]
    WorkerUnavailable,
}
