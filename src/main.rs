use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelscribe::cli::{Cli, Commands};
use reelscribe::config::Config;
use reelscribe::jobs::{ItemOutcome, JobState, JobStore};
use reelscribe::ledger::Ledger;
use reelscribe::pipeline::{self, Coordinator, PipelineHandle};
use reelscribe::server::{self, AppState};
use reelscribe::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "reelscribe=debug"
    } else {
        "reelscribe=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Check for required external tools (non-fatal in Docker)
    let missing_deps = utils::check_dependencies().await;
    if !missing_deps.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }

    let config = Config::load().await?;

    match cli.command {
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.bind_addr.clone());
            let handle = build_pipeline(&config, false)?;

            tracing::info!("starting caption service on {}", addr);
            server::serve(&addr, AppState::new(handle)).await?;
        }
        Commands::Run {
            file,
            output,
            reset_ledger,
        } => {
            run_batch(&config, &file, &output, reset_ledger, cli.quiet).await?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                config.save().await?;
                println!("Configuration written; edit config.yaml to adjust it.");
            }
        }
    }

    Ok(())
}

/// Wire the store, ledger, and coordinator, and spawn the worker.
fn build_pipeline(config: &Config, reset_ledger: bool) -> Result<PipelineHandle> {
    fs_err::create_dir_all(config.data_dir())?;
    let ledger = Arc::new(Ledger::open(config.ledger_path())?);
    if reset_ledger {
        ledger.reset()?;
        tracing::info!("processed-identifier ledger cleared");
    }
    let store = JobStore::new();
    let coordinator = Arc::new(Coordinator::from_config(config, store, ledger));
    Ok(pipeline::start(coordinator))
}

/// Process a URL file directly, polling the same pipeline the server
/// uses and copying results out of the job workspace.
async fn run_batch(
    config: &Config,
    file: &Path,
    output: &Path,
    reset_ledger: bool,
    quiet: bool,
) -> Result<()> {
    let content = fs_err::read_to_string(file)?;
    let lines: Vec<String> = content.lines().map(str::to_string).collect();

    let handle = build_pipeline(config, reset_ledger)?;
    let job = handle.submit(&lines).await?;
    println!("Processing {} URLs...", job.urls.len());

    let bar = if quiet {
        None
    } else {
        let bar = ProgressBar::new(job.urls.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap(),
        );
        Some(bar)
    };

    let total = job.urls.len() as f64;
    let finished = loop {
        let Some(snapshot) = handle.store().get(job.id).await else {
            anyhow::bail!("job record disappeared while running");
        };

        if let Some(bar) = &bar {
            bar.set_position((snapshot.progress * total).round() as u64);
            bar.set_message(snapshot.message.clone());
        }

        if snapshot.state.is_terminal() {
            break snapshot;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    if let Some(bar) = bar {
        bar.finish_with_message(finished.message.clone());
    }

    if finished.state == JobState::Failed {
        anyhow::bail!("{}", finished.message);
    }

    // Copy caption files out of the job workspace
    let mut copied = 0usize;
    if let Some(workspace) = &finished.workspace {
        fs_err::create_dir_all(output)?;
        for entry in fs_err::read_dir(workspace)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("srt") {
                fs_err::copy(&path, output.join(entry.file_name()))?;
                copied += 1;
            }
        }
    }

    println!("\nSummary:");
    println!("  Total transcripts generated: {}", copied);
    println!("  Transcripts saved in: {}", output.display());
    for url in &finished.urls {
        match finished.outcomes.get(url) {
            Some(ItemOutcome::Reused { cues }) => {
                println!("  ✅ {} (reused, {} cues)", url, cues)
            }
            Some(ItemOutcome::Synthesized { cues }) => {
                println!("  ✅ {} (synthesized, {} cues)", url, cues)
            }
            Some(ItemOutcome::Failed { reason }) => println!("  ❌ {} ({})", url, reason),
            None => println!("  ❓ {} (no outcome recorded)", url),
        }
    }

    Ok(())
}
