//! Download command implementation

use crate::config::{
    DownloadConfig, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_RETRY_COUNT, MIN_CHUNK_SIZE,
};
use crate::events::DownloadEvent;
use crate::session::DownloadSession;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, warn};

use super::CliError;

/// Maximum allowed concurrency to keep the worker pool sane
const MAX_CONCURRENCY: usize = 32;

/// Parse and validate a chunk size argument.
fn parse_chunk_size(s: &str) -> Result<u64, String> {
    let value: u64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value < MIN_CHUNK_SIZE {
        return Err(format!("chunk size must be at least {MIN_CHUNK_SIZE} bytes"));
    }
    Ok(value)
}

/// Parse and validate a concurrency argument.
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Resilient parallel file downloader
#[derive(Debug, Parser)]
#[command(name = "turbodownload", version, about)]
pub struct Cli {
    /// Source URL
    pub url: String,

    /// Destination file path
    pub dest: PathBuf,

    /// Bytes per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_chunk_size)]
    pub chunk_size: u64,

    /// Maximum parallel chunk transfers
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Maximum retries per chunk
    #[arg(long, default_value_t = DEFAULT_RETRY_COUNT)]
    pub retries: u32,

    /// Disable the resume manifest
    #[arg(long)]
    pub no_resume: bool,

    /// Byte used to preallocate the destination file
    #[arg(long, default_value_t = 0)]
    pub fill_byte: u8,
}

/// Execute the download command.
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = DownloadConfig::new(cli.url.clone(), cli.dest.clone())
        .with_chunk_size(cli.chunk_size)
        .with_concurrency(cli.concurrency)
        .with_retry_count(cli.retries)
        .with_resume(!cli.no_resume)
        .with_fill_byte(cli.fill_byte);

    let mut session = DownloadSession::new(config)?;

    let bar = ProgressBar::new_spinner();
    bar.set_message("probing resource");
    {
        let bar = bar.clone();
        session.subscribe(move |event| {
            if let DownloadEvent::PlanReady { plan } = event {
                if plan.total_size >= 0 {
                    bar.set_length(plan.total_size as u64);
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template(
                                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                                 {bytes}/{total_bytes} ({percent}%) {msg}",
                            )
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                    bar.set_position(plan.total_downloaded());
                    bar.set_message("");
                }
            }
        });
    }
    {
        let bar = bar.clone();
        session.on_progress(move |downloaded, total, _plan| {
            if total >= 0 {
                bar.set_position(downloaded);
            } else {
                bar.set_message(format!("{downloaded} bytes"));
                bar.tick();
            }
        });
    }

    let abort = session.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received - aborting and saving progress");
            abort.abort(true);
        }
    });

    info!(url = %cli.url, dest = %cli.dest.display(), "starting download");
    let result = session.download().await;
    bar.finish_and_clear();

    if result.is_ok() {
        info!(dest = %cli.dest.display(), "download complete");
    }
    result.map_err(CliError::from)
}
