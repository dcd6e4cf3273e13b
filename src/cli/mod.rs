use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "reelscribe",
    about = "Reelscribe - Extract captions from short social-media videos, reusing platform auto-captions with a Whisper fallback",
    version,
    long_about = "Resolves spoken-word captions for batches of video URLs in two stages: \
platform auto-captions are reused where they exist (via yt-dlp), and a local Whisper pass \
over audio-only downloads fills the gaps. Run the HTTP service with `serve`, or process a \
URL file directly with `run`."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP job service
    Serve {
        /// Bind address (overrides the configured one)
        #[arg(short, long, value_name = "ADDR")]
        addr: Option<String>,
    },

    /// Process a URL file directly, without the server
    Run {
        /// File with one video URL per line (# lines are comments)
        #[arg(value_name = "URL_FILE")]
        file: PathBuf,

        /// Directory to copy the resulting caption files into
        #[arg(short, long, value_name = "DIR", default_value = "subs")]
        output: PathBuf,

        /// Clear the processed-identifier ledger before running
        #[arg(long)]
        reset_ledger: bool,
    },

    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
