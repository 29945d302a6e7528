use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// Run tunables, read from a JSON file with camelCase keys.
///
/// Every key is optional and falls back to [`Config::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Maximum simultaneous playlist fetches / liveness probes
    pub concurrency: usize,
    /// Playlist and source list fetch timeout, in milliseconds
    pub fetch_timeout: u64,
    /// Liveness probe timeout, in milliseconds
    pub link_check_timeout: u64,
    pub batch_size: usize,
    pub output_dir_prefix: String,
    pub channels_per_file: usize,
    /// Name of the collection. Used for the output subdirectory and summary title
    pub collection_name: String,
    /// Probe channels before writing them out. Disabling keeps every parsed channel.
    pub check_links: bool,
    /// Plain-text lists referencing playlists
    pub sources: Vec<String>,
    /// Playlists collected directly, without going through a source list
    pub playlists: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 10,
            fetch_timeout: 30_000,
            link_check_timeout: 15_000,
            batch_size: 200,
            output_dir_prefix: "LiveTV".to_string(),
            channels_per_file: 5000,
            collection_name: "Worldwide".to_string(),
            check_links: true,
            sources: Vec::new(),
            playlists: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the config at `path`, falling back to defaults if it is missing or unreadable
    pub async fn load(path: &Path) -> Self {
        match Self::read(path).await {
            Ok(config) => {
                info!("Loaded configuration from {path:?}");
                config
            }
            Err(e) => {
                warn!("{e:#}. Using default configuration");
                Self::default()
            }
        }
    }

    async fn read(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Reading configuration {path:?}"))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Parsing configuration {path:?}"))?;
        Ok(config.normalized())
    }

    /// Clamps counts that must be at least one
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        self.batch_size = self.batch_size.max(1);
        self.channels_per_file = self.channels_per_file.max(1);
        self
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        Path::new(&self.output_dir_prefix).join(self.collection_name.replace(' ', "_"))
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout)
    }

    #[must_use]
    pub const fn link_check_timeout(&self) -> Duration {
        Duration::from_millis(self.link_check_timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn missing_file_uses_defaults() {
        let config = Config::load(Path::new("/definitely/not/here.json")).await;
        assert_eq!(config, Config::default());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.link_check_timeout(), Duration::from_secs(15));
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.channels_per_file, 5000);
    }

    #[tokio::test]
    async fn malformed_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        assert_eq!(Config::load(file.path()).await, Config::default());
    }

    #[tokio::test]
    async fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"concurrency": 4, "batchSize": 0, "collectionName": "South Asia", "sources": ["http://a/list.txt"]}"#,
        )
        .unwrap();

        let config = Config::load(file.path()).await;
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.sources, vec!["http://a/list.txt"]);
        assert_eq!(config.fetch_timeout, 30_000);
        assert!(config.check_links);
        assert_eq!(config.output_dir(), Path::new("LiveTV/South_Asia"));
    }
}
