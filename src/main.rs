//! mediaops - Deduplicated, progress-tracked media operations
//!
//! Command line entry point: probes media files and runs split jobs,
//! following their progress until they finish.

use anyhow::{anyhow, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use mediaops::cli::{split_request, Args, Commands};
use mediaops::config::Config;
use mediaops::media::FfmpegProcessor;
use mediaops::operations::{OperationProgress, OperationStartResult, OperationStatus};
use mediaops::service::{MediaService, SplitRequest};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("mediaops.toml").exists() {
                info!("Found mediaops.toml in current directory, loading...");
                Config::from_file("mediaops.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::InitConfig { output } => {
            config.save_to_file(&output)?;
            println!("Wrote configuration to {}", output.display());
        }
        Commands::Info { input } => {
            check_media_tools(&config).await;
            let service = MediaService::from_config(&config);

            let response = service.get_media_info(&input.to_string_lossy()).await;
            print_json(&response)?;
            if let Some(error) = response.error {
                return Err(anyhow!(error.message));
            }
        }
        Commands::Split { input, chapters, segment_seconds, output_dir, prefix } => {
            check_media_tools(&config).await;
            let service = MediaService::from_config(&config);

            let (split, options) = split_request(chapters, segment_seconds, output_dir, prefix);
            info!("Splitting {} ({:?})", input.display(), split);

            let response = service
                .split_file(SplitRequest {
                    file_path: input.to_string_lossy().to_string(),
                    split,
                    options,
                })
                .await;

            let started = match (response.data, response.error) {
                (Some(started), _) => started,
                (None, Some(error)) => return Err(anyhow!("{:?}: {}", error.kind, error.message)),
                (None, None) => return Err(anyhow!("Split request returned no result")),
            };
            info!("{}", started.message);

            let poll_interval = Duration::from_millis(config.operations.poll_interval_ms.max(50));
            let finished = follow_operation(&service, &started, poll_interval).await?;
            print_json(&finished)?;

            if finished.status == OperationStatus::Failed {
                return Err(anyhow!(
                    "Operation failed: {}",
                    finished.error_message.unwrap_or_default()
                ));
            }
        }
    }

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".mediaops").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard must outlive the program
    let file_appender = rolling::daily(&log_dir, "mediaops.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console output goes to stderr so stdout stays valid JSON
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("mediaops.log").display());

    Ok(())
}

async fn check_media_tools(config: &Config) {
    let processor = FfmpegProcessor::new(config.media.clone());
    if let Err(e) = processor.check_availability().await {
        warn!("Media tools are not fully available: {}", e);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Poll an operation until it finishes; Ctrl-C requests cancellation
async fn follow_operation(
    service: &MediaService,
    started: &OperationStartResult,
    poll_interval: Duration,
) -> Result<OperationProgress> {
    let pb = ProgressBar::new(started.total_steps as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("#>-"));

    let mut cancel_requested = false;
    loop {
        let response = service.get_operation_progress(&started.operation_id);
        let progress = match (response.data, response.error) {
            (Some(progress), _) => progress,
            (None, error) => {
                pb.abandon();
                return Err(anyhow!(
                    "Lost track of operation {}: {}",
                    started.operation_id,
                    error.map(|e| e.message).unwrap_or_default()
                ));
            }
        };

        pb.set_length(progress.total_steps as u64);
        pb.set_position(progress.current_step as u64);
        pb.set_message(progress.current_operation.clone());

        if progress.status.is_terminal() {
            match progress.status {
                OperationStatus::Completed => pb.finish_with_message(format!(
                    "Done: {} file(s)",
                    progress.output_files.len()
                )),
                _ => pb.abandon_with_message("Failed"),
            }
            return Ok(progress);
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                warn!("Interrupted, cancelling operation {}", started.operation_id);
                service.cancel_operation(&started.operation_id);
                cancel_requested = true;
            }
        }
    }
}
