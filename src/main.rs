#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use anyhow::{Result, ensure};
use clap::Parser;
use collector::Collector;
use config::Config;
use fetcher::Fetcher;
use grouper::group_channels;
use tracing::{info, warn};
use util::warn_ulimit;

pub mod channel;
pub mod collector;
pub mod config;
pub mod fetcher;
pub mod grouper;
pub mod limiter;
pub mod liveness;
pub mod output;
pub mod parser;
pub mod sources;
pub mod util;

#[cfg(test)]
mod test_server;

/// Collects IPTV playlists, keeps the channels that respond and writes them
/// out grouped by category and country
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file. Missing files fall back to the defaults
    #[arg(short, long, env = "COLLECTOR_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Overrides the amount of parallel fetches / link checks
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Keep every parsed channel without checking whether it responds
    #[arg(long)]
    no_check_links: bool,

    /// Additional playlist URL to collect (can be repeated)
    #[arg(short, long = "playlist")]
    playlists: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = Config::load(&args.config).await;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if args.no_check_links {
        config.check_links = false;
    }
    config.playlists.extend(args.playlists);
    let config = config.normalized();

    warn_ulimit(config.concurrency);

    run(&config).await
}

/// Resolves, collects, groups and writes out one collection
///
/// # Errors
/// Errors if no playlist URL resolves or the output directory can't be managed
async fn run(config: &Config) -> Result<()> {
    let fetcher = Fetcher::new()?;

    let playlist_urls = sources::resolve_playlist_urls(&fetcher, config).await;
    ensure!(
        !playlist_urls.is_empty(),
        "No playlist URLs found. Configure `sources` or `playlists`"
    );
    info!(
        "Collecting {} playlists with {} parallelism",
        playlist_urls.len(),
        config.concurrency
    );

    let output_dir = config.output_dir();
    output::prepare_output_dir(&output_dir).await?;

    let collector = Collector::new(fetcher, config);
    let active = collector.run(&playlist_urls).await;

    if active.is_empty() {
        warn!("No live channels found. Removing {output_dir:?}");
        output::remove_output_dir(&output_dir).await?;
        return Ok(());
    }

    let grouped = group_channels(&active);
    info!(
        "Sorted {} channels into {} groups",
        active.len(),
        grouped.len()
    );

    let report = output::write_grouped(&output_dir, &grouped, config.channels_per_file).await;
    let summary = output::write_summary(&output_dir, &config.collection_name, &grouped).await;
    if let Err(e) = summary {
        warn!("Unable to write run summary: {e:#}");
    }

    if report.failed > 0 {
        warn!("{} chunks could not be written", report.failed);
    }
    info!("All done! Output is in {output_dir:?}");

    Ok(())
}
