use std::{
    collections::HashSet,
    fmt::Write as _,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use futures_util::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::{channel::Channel, grouper::GroupedChannels, limiter::Limiter};

/// Simultaneous chunk writes. Kept low to go easy on the filesystem.
pub const WRITE_CONCURRENCY: usize = 5;

/// One slice of a `(group, country)` partition, written as an m3u / json / txt triplet
#[derive(Debug)]
pub struct Chunk<'a> {
    pub group: &'a str,
    /// Directory name of the group, unique within the run
    pub group_dir: String,
    pub country: &'a str,
    /// 1-based position within the partition
    pub number: usize,
    pub channels: &'a [Channel],
}

impl Chunk<'_> {
    /// Path of the chunk without extension: `<dir>/<group>/<COUNTRY>_<n>`
    #[must_use]
    pub fn stem(&self, dir: &Path) -> PathBuf {
        dir.join(&self.group_dir)
            .join(format!("{}_{}", file_slug(self.country), self.number))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChannelRecord<'a> {
    name: &'a str,
    url: &'a str,
    group: &'a str,
    country: &'a str,
    tvg_id: &'a str,
    tvg_logo: &'a str,
    tvg_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a> {
    collection_title: String,
    last_updated_utc: String,
    total_channels: usize,
    groups: IndexMap<&'a str, IndexMap<&'a str, usize>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    pub failed: usize,
}

fn file_slug(name: &str) -> String {
    name.replace(' ', "_")
}

/// Slug of `name` that no earlier group of the run took, ignoring case.
/// `Kids TV` and `Kids_TV` would otherwise share a directory.
fn unique_slug(name: &str, taken: &mut HashSet<String>) -> String {
    let base = file_slug(name);
    let mut slug = base.clone();
    let mut n = 1;
    while !taken.insert(slug.to_lowercase()) {
        n += 1;
        slug = format!("{base}_{n}");
    }
    slug
}

/// Deletes any previous output and creates `dir` fresh
///
/// # Errors
/// Errors if the directory can't be removed or created
pub async fn prepare_output_dir(dir: &Path) -> Result<()> {
    remove_output_dir(dir).await?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Creating output directory {dir:?}"))
}

/// Removes `dir` and everything in it. A missing directory is fine.
///
/// # Errors
/// Errors if the directory exists but can't be removed
pub async fn remove_output_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!("Removed {dir:?}");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => bail!("Removing output directory {dir:?}: {e}"),
    }
}

/// Splits every partition into chunks of at most `per_file` channels
#[must_use]
pub fn plan_chunks(grouped: &GroupedChannels, per_file: usize) -> Vec<Chunk<'_>> {
    let per_file = per_file.max(1);
    let mut taken = HashSet::new();
    let mut chunks = Vec::new();

    for (group, countries) in grouped {
        let group_dir = unique_slug(group, &mut taken);
        for (country, channels) in countries {
            chunks.extend(
                channels
                    .chunks(per_file)
                    .enumerate()
                    .map(|(i, channels)| Chunk {
                        group,
                        group_dir: group_dir.clone(),
                        country,
                        number: i + 1,
                        channels,
                    }),
            );
        }
    }
    chunks
}

#[must_use]
pub fn render_m3u(chunk: &Chunk<'_>) -> String {
    let mut out = String::from("#EXTM3U\n");
    for channel in chunk.channels {
        let _ = writeln!(
            out,
            "#EXTINF:-1 tvg-id=\"{}\" tvg-name=\"{}\" tvg-logo=\"{}\" group-title=\"{}\",{}\n{}",
            channel.tvg_id,
            channel.tvg_name,
            channel.tvg_logo,
            chunk.group,
            channel.name,
            channel.url
        );
    }
    out
}

/// # Errors
/// Errors if serialization fails
pub fn render_json(chunk: &Chunk<'_>) -> Result<String> {
    let records: Vec<_> = chunk
        .channels
        .iter()
        .map(|c| ChannelRecord {
            name: &c.name,
            url: &c.url,
            group: chunk.group,
            country: chunk.country,
            tvg_id: &c.tvg_id,
            tvg_logo: &c.tvg_logo,
            tvg_name: &c.tvg_name,
        })
        .collect();
    serde_json::to_string_pretty(&records).context("Serializing channel chunk")
}

#[must_use]
pub fn render_txt(chunk: &Chunk<'_>) -> String {
    chunk
        .channels
        .iter()
        .fold(String::new(), |mut out, channel| {
            let _ = writeln!(out, "{}", channel.url);
            out
        })
}

async fn write_chunk(dir: &Path, chunk: &Chunk<'_>) -> Result<()> {
    let stem = chunk.stem(dir);
    if let Some(parent) = stem.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Creating {parent:?}"))?;
    }

    let json = render_json(chunk)?;
    for (extension, contents) in [
        ("m3u", render_m3u(chunk)),
        ("json", json),
        ("txt", render_txt(chunk)),
    ] {
        let path = stem.with_extension(extension);
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Writing {path:?}"))?;
    }

    debug!("Wrote {} channels to {stem:?}.*", chunk.channels.len());
    Ok(())
}

/// Writes every chunk of `grouped` below `dir`, a few at a time
///
/// A failed chunk is logged and counted. It doesn't stop the other writes.
#[instrument(skip(grouped))]
pub async fn write_grouped(dir: &Path, grouped: &GroupedChannels, per_file: usize) -> WriteReport {
    let limiter = Limiter::new(WRITE_CONCURRENCY);
    let chunks = plan_chunks(grouped, per_file);

    let results = join_all(
        chunks
            .iter()
            .map(|chunk| limiter.run(async move { (chunk, write_chunk(dir, chunk).await) })),
    )
    .await;

    let mut report = WriteReport::default();
    for (chunk, result) in results {
        match result {
            Ok(()) => report.written += 1,
            Err(e) => {
                error!(
                    "Failed writing chunk {} of {}/{}: {e:#}",
                    chunk.number, chunk.group, chunk.country
                );
                report.failed += 1;
            }
        }
    }

    info!(
        "Wrote {} chunks ({} failed) to {dir:?}",
        report.written, report.failed
    );
    report
}

/// Writes `summary.json` with per-partition counts
///
/// # Errors
/// Errors if the file can't be written
pub async fn write_summary(
    dir: &Path,
    collection_name: &str,
    grouped: &GroupedChannels,
) -> Result<()> {
    let groups: IndexMap<&str, IndexMap<&str, usize>> = grouped
        .iter()
        .map(|(group, countries)| {
            (
                group.as_str(),
                countries
                    .iter()
                    .map(|(country, channels)| (country.as_str(), channels.len()))
                    .collect(),
            )
        })
        .collect();

    let summary = Summary {
        collection_title: format!("{collection_name} Channels"),
        last_updated_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        total_channels: groups.values().flat_map(IndexMap::values).sum(),
        groups,
    };

    let path = dir.join("summary.json");
    let json = serde_json::to_string_pretty(&summary).context("Serializing summary")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Writing {path:?}"))
}
