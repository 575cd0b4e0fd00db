mod cli;
mod commands;
mod config;
mod error;

use std::{path::Path, process};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    config::{FileConfig, StreamFlags},
    error::{AppError, Result},
};

const DEFAULT_LOG_FILTER: &str = "hydroclip=info,hydroclip_engine=info";

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let _log_guard = init_logging(args.verbose, args.quiet, args.log_file.as_deref())?;

    let file = FileConfig::load(args.config.as_deref())?;
    let http = file.http_config(args.timeout);
    let ffmpeg = file.ffmpeg_config(args.ffmpeg.as_deref());

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            signal_token.cancel();
        }
    });

    match args.command {
        Commands::Range {
            stream_base,
            start,
            end,
            interval,
            output_dir,
            overwrite,
            real_time,
            batch,
        } => {
            let config = file.stream_config(&StreamFlags {
                interval,
                output_dir,
                overwrite,
                real_time,
                start,
                end,
            })?;
            if batch {
                commands::run_batch(&stream_base, config, &http, ffmpeg).await
            } else {
                commands::run_range(&stream_base, config, &http, ffmpeg, token).await
            }
        }
        Commands::Live {
            stream_base,
            interval,
            output_dir,
            max_clips,
        } => {
            let config = file.stream_config(&StreamFlags {
                interval,
                output_dir,
                ..Default::default()
            })?;
            commands::run_live(&stream_base, config, &http, ffmpeg, max_clips, token).await
        }
        Commands::Verify {
            stream_base,
            folders,
        } => commands::run_verify(&stream_base, &folders, &http).await,
    }
}

/// Console logging, plus a non-blocking file writer when `log_file` is set.
/// The returned guard must outlive the program's logging.
fn init_logging(verbose: bool, quiet: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("warn,{DEFAULT_LOG_FILTER}")))
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| AppError::Logging(format!("{} is not a file", path.display())))?;
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;

    Ok(guard)
}
