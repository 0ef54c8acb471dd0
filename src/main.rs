//! blitcp - copy a file over a shell-only transport
//!
//! The payload is base64 text split into commands short enough for the
//! remote side, uploaded in parallel, then stitched back together remotely.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::sync::Arc;

use blitcp::cli::Args;
use blitcp::copy::RemoteCopier;
use blitcp::executor::ShellExecutor;
use blitcp::logger::{CopyLogger, FanoutLogger, NoopLogger, StderrLogger, TextLogger};
use blitcp::progress::ChunkProgress;

#[tokio::main]
async fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let args = Args::parse();
    let config = args.resolve_config().context("Invalid configuration")?;

    let mut sinks = FanoutLogger::new();
    if let Some(ref p) = args.log_file {
        let text = TextLogger::new(p)
            .with_context(|| format!("Failed to open log file {}", p.display()))?;
        sinks.push(Arc::new(text));
    }
    if args.verbose {
        sinks.push(Arc::new(StderrLogger));
    } else if args.progress {
        sinks.push(Arc::new(ChunkProgress::new()));
    }
    let logger: Arc<dyn CopyLogger> = if sinks.is_empty() {
        Arc::new(NoopLogger)
    } else {
        Arc::new(sinks)
    };

    let executor = ShellExecutor::from_launcher(&args.via)
        .context("Invalid --via launcher")?
        .with_deadline(config.command_timeout());
    let copier = RemoteCopier::new(Arc::new(executor), config, logger)?;

    let report = if args.reads_stdin() {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .context("Failed to read stdin")?;
        copier
            .copy(std::io::Cursor::new(data), &args.destination)
            .await
    } else {
        copier.copy_file(&args.source, &args.destination).await
    }
    .with_context(|| format!("Copy to {} failed", args.destination))?;

    if args.verbose {
        eprintln!(
            "Copied {} bytes as {} chunk(s) ({} encoded bytes) in {:.2}s",
            report.bytes_read,
            report.chunks,
            report.encoded_len,
            report.elapsed.as_secs_f64()
        );
    }
    Ok(())
}
