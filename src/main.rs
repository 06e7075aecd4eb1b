use clap::Parser;
use colored::*;
use eyre::{Context as _, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, BufReader};

mod cli;
mod config;

use cli::Cli;
use config::Config;
use streamprint::context::Context;
use streamprint::printer::{PrinterStats, StreamPrinter};
use streamprint::sink::EncodingSink;
use streamprint::storage::MemoryStorage;
use streamprint::stream::{FeedSummary, LineFeeder, QueueStream, QueueWriter};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamprint")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("streamprint.log");

    // stdout carries records, so logs go to a file
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn open_input(cli: &Cli) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match cli.input_path() {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .context(format!("Failed to open input {}", path.display()))?;
            info!("Reading records from {}", path.display());
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            info!("Reading records from stdin");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    let (root, handle) = Context::new();
    let ctx = match cli.timeout() {
        Some(timeout) => root.with_timeout(timeout),
        None => root,
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            handle.cancel();
        }
    });

    let storage = Arc::new(MemoryStorage::with_config(config.storage.to_memory_config()));
    let queue = config.feed.queue.clone();

    let reader = open_input(cli).await?;
    let feeder = LineFeeder::new(Arc::clone(&storage), QueueWriter::new(queue.clone()))
        .with_interval(Duration::from_millis(config.feed.interval_ms));
    let feed_ctx = ctx.clone();
    let feed = tokio::spawn(async move { feeder.run(&feed_ctx, reader).await });

    let mut printer = StreamPrinter::with_config(
        storage,
        QueueStream::new(queue),
        EncodingSink::stdout(config.output.format),
        config.printer.to_printer_config(),
    );
    printer.run(&ctx).await.context("Stream printing failed")?;

    let summary = feed
        .await
        .context("Feed task panicked")?
        .context("Failed to feed input")?;

    if cli.is_verbose() {
        print_summary(&printer.stats(), printer.sink().failures(), &summary, ctx.is_cancelled());
    }

    info!(
        "Finished: {} records emitted, {} fed",
        printer.stats().records_emitted,
        summary.pushed
    );
    Ok(())
}

fn print_summary(stats: &PrinterStats, sink_failures: u64, feed: &FeedSummary, cancelled: bool) {
    let status = if cancelled {
        "cancelled".yellow()
    } else {
        "complete".green()
    };
    eprintln!("{} {}", "Run".bold(), status);
    eprintln!("  {:<22}{}", "records fed:", feed.pushed.to_string().cyan());
    eprintln!("  {:<22}{}", "lines skipped:", feed.skipped);
    eprintln!("  {:<22}{}", "records emitted:", stats.records_emitted.to_string().cyan());
    eprintln!("  {:<22}{}", "waits:", stats.waits);
    eprintln!("  {:<22}{}", "expired transactions:", stats.transactions_expired);
    if stats.commit_failures > 0 {
        eprintln!("  {:<22}{}", "commit failures:", stats.commit_failures.to_string().red());
    }
    if sink_failures > 0 {
        eprintln!("  {:<22}{}", "write failures:", sink_failures.to_string().red());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
