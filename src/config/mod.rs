use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Caption pipeline settings
    pub pipeline: PipelineConfig,

    /// Storage locations
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the API listens on
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Subtitle language requested from the platform and the engine
    pub language: String,

    /// Whisper model tier (quality/speed tradeoff, fixed per deployment)
    pub whisper_model: ModelTier,

    /// Minimum delay between consecutive remote calls within a job
    pub request_delay_ms: u64,

    /// Retry policy for transient remote failures
    pub retry: RetryConfig,

    /// Maximum URLs accepted per submission
    pub max_batch_size: usize,

    /// Optional wall-clock bound for a whole job, in seconds
    pub job_timeout_secs: Option<u64>,
}

/// Bounded exponential backoff for transient remote failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts including the first
    pub max_attempts: u32,

    /// Base delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Cap on any single backoff delay, in milliseconds
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `attempts_made`.
    pub fn can_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for job workspaces and the ledger
    pub data_dir: Option<PathBuf>,

    /// Ledger file name under the data directory
    pub ledger_file: String,
}

/// Whisper model size tier. A static configuration choice, never
/// computed per input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Tiny => "tiny",
            ModelTier::Base => "base",
            ModelTier::Small => "small",
            ModelTier::Medium => "medium",
            ModelTier::Large => "large",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:8000".to_string(),
            },
            pipeline: PipelineConfig {
                language: "en".to_string(),
                whisper_model: ModelTier::Medium,
                request_delay_ms: 1000,
                retry: RetryConfig {
                    max_attempts: 3,
                    base_delay_ms: 500,
                    max_delay_ms: 10_000,
                },
                max_batch_size: 400,
                job_timeout_secs: None,
            },
            storage: StorageConfig {
                data_dir: None,
                ledger_file: "processed.txt".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("reelscribe").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_batch_size == 0 {
            anyhow::bail!("pipeline.max_batch_size must be at least 1");
        }

        if self.pipeline.retry.max_attempts == 0 {
            anyhow::bail!("pipeline.retry.max_attempts must be at least 1");
        }

        if self.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("server.bind_addr is not a valid socket address");
        }

        Ok(())
    }

    /// Root directory for job workspaces and the ledger.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Ledger file path under the data directory.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.ledger_file)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.pipeline.request_delay_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.pipeline.job_timeout_secs.map(Duration::from_secs)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Bind Address: {}", self.server.bind_addr);
        println!("  Language: {}", self.pipeline.language);
        println!("  Whisper Model: {}", self.pipeline.whisper_model.as_str());
        println!("  Request Delay: {}ms", self.pipeline.request_delay_ms);
        println!("  Max Batch Size: {}", self.pipeline.max_batch_size);
        println!("  Data Directory: {}", self.data_dir().display());
    }
}
