use std::sync::LazyLock;

use futures_util::future::join_all;
use indexmap::IndexSet;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    config::Config,
    fetcher::{Fetcher, Redirects},
    limiter::Limiter,
};

static URL_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s"'<>]+"#).unwrap());
/// Lines flagged like this carry a mirror / decorative link, not the playlist itself
static REAL_URL_MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\breal[\s_-]?url\b").unwrap());
static PLAYLIST_QUERY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]type=m3u(?:_plus|8)?(?:&|$)").unwrap());

/// Pulls candidate playlist URLs out of a plain-text source list
///
/// At most one URL is taken per line. Only URLs that look like playlists are
/// kept, deduplicated in first-seen order.
#[must_use]
pub fn parse_source_list(text: &str) -> Vec<String> {
    let mut urls = IndexSet::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(token) = URL_TOKEN_REGEX.find(line) else {
            continue;
        };
        // Only the text around the links can flag the line
        if REAL_URL_MARKER_REGEX.is_match(&URL_TOKEN_REGEX.replace_all(line, " ")) {
            continue;
        }
        let url = token
            .as_str()
            .trim_end_matches(|c: char| matches!(c, ',' | ';' | ')' | '`'));

        if is_playlist_url(url) {
            urls.insert(url.to_string());
        }
    }

    urls.into_iter().collect()
}

/// Whether a URL points at a playlist, by query marker or file extension
#[must_use]
pub fn is_playlist_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if PLAYLIST_QUERY_REGEX.is_match(&lower) {
        return true;
    }

    let path = lower.split(['?', '#']).next().unwrap_or_default();
    path.ends_with(".m3u") || path.ends_with(".m3u8")
}

/// Fetches every configured source list and merges the playlist URLs they
/// reference with the directly configured playlists
///
/// A list that can't be fetched contributes nothing.
#[instrument(skip_all)]
pub async fn resolve_playlist_urls(fetcher: &Fetcher, config: &Config) -> Vec<String> {
    let limiter = Limiter::new(config.concurrency);
    let timeout = config.fetch_timeout();

    let lists = join_all(config.sources.iter().map(|source| {
        limiter.run(async move {
            match fetcher.get_text(source, timeout, Redirects::Short).await {
                Ok(text) => {
                    let urls = parse_source_list(&text);
                    info!("Found {} playlists in {source}", urls.len());
                    urls
                }
                Err(e) if e.is_denied() => {
                    warn!("Source list {source} denied access: {e}");
                    Vec::new()
                }
                Err(e) => {
                    warn!("Unable to fetch source list {source}: {e}");
                    Vec::new()
                }
            }
        })
    }))
    .await;

    let mut urls: IndexSet<String> = lists.into_iter().flatten().collect();
    urls.extend(config.playlists.iter().cloned());

    urls.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::test_server::{Route, TestServer};

    #[test]
    fn extracts_first_playlist_url_per_line() {
        let text = indoc! {"
            # Community lists
            https://a.example/world.m3u https://a.example/other.m3u

            Sports: https://b.example/sports.m3u8, updated daily
            Real URL: https://mirror.example/world.m3u
            https://c.example/get.php?username=u&password=p&type=m3u_plus
            https://d.example/readme.html
            https://a.example/world.m3u
        "};

        assert_eq!(
            parse_source_list(text),
            vec![
                "https://a.example/world.m3u",
                "https://b.example/sports.m3u8",
                "https://c.example/get.php?username=u&password=p&type=m3u_plus",
            ]
        );
    }

    #[test]
    fn marker_inside_url_is_not_a_flag() {
        let text = indoc! {"
            https://x.example/surreal-urls.m3u
            https://x.example/realurl/list.m3u
            https://x.example/real-url.m3u8
            mirror real_url https://x.example/skipped.m3u
        "};

        assert_eq!(
            parse_source_list(text),
            vec![
                "https://x.example/surreal-urls.m3u",
                "https://x.example/realurl/list.m3u",
                "https://x.example/real-url.m3u8",
            ]
        );
    }

    #[test]
    fn playlist_url_filter() {
        assert!(is_playlist_url("http://x/list.M3U"));
        assert!(is_playlist_url("http://x/live.m3u8?token=1"));
        assert!(is_playlist_url("http://x/get.php?type=m3u"));
        assert!(!is_playlist_url("http://x/get.php?type=json"));
        assert!(!is_playlist_url("http://x/list.m3u.html"));
        assert!(!is_playlist_url("http://x/"));
    }

    #[tokio::test]
    async fn resolves_lists_and_direct_playlists() {
        let server = TestServer::start([
            (
                "/list.txt",
                Route::ok("http://x/one.m3u\nhttp://x/two.m3u8\n"),
            ),
            ("/broken.txt", Route::status(500)),
        ])
        .await;

        let config = Config {
            sources: vec![server.url("/list.txt"), server.url("/broken.txt")],
            playlists: vec!["http://x/two.m3u8".into(), "http://x/three.m3u".into()],
            ..Config::default()
        };
        let fetcher = Fetcher::new().unwrap();

        let urls = resolve_playlist_urls(&fetcher, &config).await;
        assert_eq!(
            urls,
            vec!["http://x/one.m3u", "http://x/two.m3u8", "http://x/three.m3u"]
        );
    }
}
