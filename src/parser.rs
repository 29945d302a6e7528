use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::{channel::Channel, util::truncate_string};

const EXTINF_MARKER: &str = "#EXTINF";
const UNKNOWN: &str = "Unknown";

static GROUP_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"group-title="(?<value>[^"]*)""#).unwrap());
static TVG_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"tvg-id="(?<value>[^"]*)""#).unwrap());
static TVG_LOGO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"tvg-logo="(?<value>[^"]*)""#).unwrap());
static TVG_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"tvg-name="(?<value>[^"]*)""#).unwrap());

/// Metadata of an `#EXTINF` line still waiting for its URL line
#[derive(Debug)]
struct PendingChannel {
    name: String,
    group: String,
    tvg_id: String,
    tvg_logo: String,
    tvg_name: String,
}

impl PendingChannel {
    fn from_extinf(line: &str) -> Self {
        let name = line
            .rsplit_once(',')
            .map(|(_, name)| name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        let group = attribute(&GROUP_TITLE_REGEX, line)
            .filter(|g| !g.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();
        let tvg_name = attribute(&TVG_NAME_REGEX, line)
            .filter(|n| !n.is_empty())
            .map_or_else(|| name.clone(), str::to_string);

        Self {
            group,
            tvg_id: attribute(&TVG_ID_REGEX, line).unwrap_or_default().to_string(),
            tvg_logo: attribute(&TVG_LOGO_REGEX, line)
                .unwrap_or_default()
                .to_string(),
            tvg_name,
            name,
        }
    }

    fn complete(self, url: &str) -> Channel {
        Channel {
            name: self.name,
            url: url.to_string(),
            group: self.group,
            tvg_id: self.tvg_id,
            tvg_logo: self.tvg_logo,
            tvg_name: self.tvg_name,
        }
    }
}

fn attribute<'a>(regex: &Regex, line: &'a str) -> Option<&'a str> {
    regex
        .captures(line)
        .and_then(|c| c.name("value"))
        .map(|m| m.as_str())
}

/// Parses extended M3U text into channels, in document order
///
/// Each `#EXTINF` line is paired with the next line that is neither blank nor a
/// `#` directive. Entries whose URL isn't HTTP(S) are dropped.
#[must_use]
pub fn parse_playlist(text: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut pending: Option<PendingChannel> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF_MARKER) {
            pending = Some(PendingChannel::from_extinf(line));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let Some(channel) = pending.take() else {
            continue;
        };
        if Channel::has_http_scheme(line) {
            channels.push(channel.complete(line));
        } else {
            warn!(
                "Discarding \"{}\": unsupported URL {}",
                channel.name,
                truncate_string(line, 120)
            );
        }
    }

    channels
}
