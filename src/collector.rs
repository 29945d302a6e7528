use std::time::Duration;

use indexmap::IndexMap;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::{
    channel::Channel,
    config::Config,
    fetcher::{Fetcher, Redirects},
    limiter::Limiter,
    liveness::LivenessChecker,
    parser::parse_playlist,
};

/// Drives one collection run: fetch, parse, deduplicate, then probe
#[derive(Debug, Clone)]
pub struct Collector {
    fetcher: Fetcher,
    limiter: Limiter,
    fetch_timeout: Duration,
    checker: Option<LivenessChecker>,
}

impl Collector {
    /// Builds a collector whose fetches and probes share one limiter sized by
    /// `config.concurrency`
    #[must_use]
    pub fn new(fetcher: Fetcher, config: &Config) -> Self {
        let limiter = Limiter::new(config.concurrency);
        let checker = config.check_links.then(|| {
            LivenessChecker::new(
                fetcher.clone(),
                limiter.clone(),
                config.link_check_timeout(),
                config.batch_size,
            )
        });

        Self {
            fetcher,
            limiter,
            fetch_timeout: config.fetch_timeout(),
            checker,
        }
    }

    /// Returns the live, deduplicated channels of every playlist
    ///
    /// A playlist that can't be fetched contributes no channels. When several
    /// playlists list the same URL, the entry from the earliest playlist wins.
    #[instrument(skip_all, fields(playlists = playlist_urls.len()))]
    pub async fn run(&self, playlist_urls: &[String]) -> Vec<Channel> {
        let parsed = self.fetch_all(playlist_urls).await;

        let unique = dedup(parsed);
        if unique.is_empty() {
            warn!("No channels parsed from any playlist");
            return Vec::new();
        }
        info!("Collected {} unique channels", unique.len());

        let Some(checker) = &self.checker else {
            info!("Link checking disabled. Keeping every channel");
            return unique;
        };

        let active = checker.filter_active(&unique).await;
        info!("{}/{} channels are live", active.len(), unique.len());
        active
    }

    /// Fetches and parses every playlist concurrently. Results are returned in
    /// the order of `playlist_urls`, regardless of completion order.
    async fn fetch_all(&self, playlist_urls: &[String]) -> Vec<Vec<Channel>> {
        let mut fetches = JoinSet::new();
        for (index, url) in playlist_urls.iter().enumerate() {
            let collector = self.clone();
            let url = url.clone();
            fetches.spawn(async move {
                let channels = collector
                    .limiter
                    .run(collector.fetch_playlist(&url))
                    .await;
                (index, channels)
            });
        }

        let mut results = vec![Vec::new(); playlist_urls.len()];
        while let Some(fetch) = fetches.join_next().await {
            match fetch {
                Ok((index, channels)) => results[index] = channels,
                Err(e) => error!("Playlist task failed: {e}"),
            }
        }

        results
    }

    async fn fetch_playlist(&self, url: &str) -> Vec<Channel> {
        match self
            .fetcher
            .get_text(url, self.fetch_timeout, Redirects::Long)
            .await
        {
            Ok(body) => {
                let channels = parse_playlist(&body);
                info!("Parsed {} channels from {url}", channels.len());
                channels
            }
            Err(e) if e.is_denied() => {
                warn!("Playlist {url} denied access: {e}");
                Vec::new()
            }
            Err(e) => {
                warn!("Unable to fetch playlist {url}: {e}");
                Vec::new()
            }
        }
    }
}

/// Merges per-source channel lists, keeping the first record seen for each URL
#[must_use]
pub fn dedup(sources: impl IntoIterator<Item = Vec<Channel>>) -> Vec<Channel> {
    let mut by_url: IndexMap<String, Channel> = IndexMap::new();
    for channel in sources.into_iter().flatten() {
        by_url.entry(channel.url.clone()).or_insert(channel);
    }
    by_url.into_values().collect()
}

#[cfg(test)]
mod tests {
    use indoc::formatdoc;

    use super::*;
    use crate::test_server::{Route, TestServer};

    fn channel(name: &str, url: &str) -> Channel {
        Channel {
            name: name.into(),
            url: url.into(),
            group: "News".into(),
            tvg_id: String::new(),
            tvg_logo: String::new(),
            tvg_name: name.into(),
        }
    }

    fn config() -> Config {
        Config {
            concurrency: 4,
            fetch_timeout: 500,
            link_check_timeout: 500,
            batch_size: 2,
            ..Config::default()
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let merged = dedup([
            vec![channel("A", "http://x/1"), channel("B", "http://x/2")],
            vec![channel("A2", "http://x/1"), channel("C", "http://x/3")],
            vec![channel("B2", "http://x/2")],
        ]);

        let names: Vec<_> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn dedup_within_one_source() {
        let merged = dedup([vec![channel("A", "http://x/1"), channel("A", "http://x/1")]]);
        assert_eq!(merged.len(), 1);
    }

    #[tokio::test]
    async fn one_source_times_out_other_succeeds() {
        let server = TestServer::start([
            ("/live/1", Route::ok("")),
            ("/live/2", Route::ok("")),
            ("/slow.m3u", Route::ok("#EXTM3U").delayed(Duration::from_secs(3))),
        ])
        .await;
        let playlist = formatdoc! {r#"
            #EXTM3U
            #EXTINF:-1 group-title="News",One
            {one}
            #EXTINF:-1 group-title="News",Two
            {two}
        "#, one = server.url("/live/1"), two = server.url("/live/2")};
        let server_with_playlist = TestServer::start([("/good.m3u", Route::ok(playlist))]).await;

        let collector = Collector::new(Fetcher::new().unwrap(), &config());
        let active = collector
            .run(&[
                server_with_playlist.url("/good.m3u"),
                server.url("/slow.m3u"),
            ])
            .await;

        let names: Vec<_> = active.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["One", "Two"]);
    }

    #[tokio::test]
    async fn dead_channels_are_dropped() {
        let server = TestServer::start([("/live/up", Route::ok(""))]).await;
        let playlist = format!(
            "#EXTINF:-1,Up\n{}\n#EXTINF:-1,Down\n{}\n#EXTINF:-1,Dup\n{}\n",
            server.url("/live/up"),
            server.url("/live/down"),
            server.url("/live/up"),
        );
        let host = TestServer::start([("/p.m3u", Route::ok(playlist))]).await;

        let collector = Collector::new(Fetcher::new().unwrap(), &config());
        let active = collector.run(&[host.url("/p.m3u")]).await;

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Up");
    }

    #[tokio::test]
    async fn empty_sources_yield_nothing() {
        let server = TestServer::start([("/empty.m3u", Route::ok("#EXTM3U\n"))]).await;

        let collector = Collector::new(Fetcher::new().unwrap(), &config());
        assert!(collector.run(&[server.url("/empty.m3u")]).await.is_empty());
        assert!(collector.run(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn unchecked_run_keeps_everything() {
        let host = TestServer::start([(
            "/p.m3u",
            Route::ok("#EXTINF:-1,Gone\nhttp://127.0.0.1:1/gone\n"),
        )])
        .await;

        let config = Config {
            check_links: false,
            ..config()
        };
        let collector = Collector::new(Fetcher::new().unwrap(), &config);
        let active = collector.run(&[host.url("/p.m3u")]).await;
        assert_eq!(active.len(), 1);
    }
}
