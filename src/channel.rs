use serde::{Deserialize, Serialize};

/// A single stream entry parsed out of a playlist
///
/// `url` identifies the channel; everything else is display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    pub url: String,
    pub group: String,
    pub tvg_id: String,
    pub tvg_logo: String,
    pub tvg_name: String,
}

impl Channel {
    /// Whether `url` carries an HTTP(S) scheme
    #[must_use]
    pub fn has_http_scheme(url: &str) -> bool {
        let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}
