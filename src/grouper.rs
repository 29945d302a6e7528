use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Regex, RegexSet};

use crate::channel::Channel;

/// `group → country → channels`, iterated in first-insertion order
pub type GroupedChannels = IndexMap<String, IndexMap<String, Vec<Channel>>>;

pub const GENERAL_GROUP: &str = "General";
pub const UNKNOWN_REGION: &str = "Unknown";

/// Country names first, then codes. Detection takes the first hit in this order.
///
/// Codes that double as common English words are left out since group titles
/// are full of them. See [`SEPARATED_CODES`].
const COUNTRIES: &[&str] = &[
    "Afghanistan", "Albania", "Algeria", "Argentina", "Armenia", "Australia", "Austria",
    "Azerbaijan", "Bangladesh", "Belarus", "Belgium", "Bolivia", "Bosnia", "Brazil",
    "Bulgaria", "Cambodia", "Canada", "Chile", "China", "Colombia", "Costa Rica", "Croatia",
    "Cuba", "Cyprus", "Czech Republic", "Denmark", "Dominican Republic", "Ecuador", "Egypt",
    "El Salvador", "Estonia", "Ethiopia", "Finland", "France", "Georgia", "Germany", "Ghana",
    "Greece", "Guatemala", "Honduras", "Hong Kong", "Hungary", "Iceland", "India",
    "Indonesia", "Iran", "Iraq", "Ireland", "Israel", "Italy", "Jamaica", "Japan", "Jordan",
    "Kazakhstan", "Kenya", "Kosovo", "Kuwait", "Latvia", "Lebanon", "Libya", "Lithuania",
    "Luxembourg", "Malaysia", "Malta", "Mexico", "Moldova", "Mongolia", "Montenegro",
    "Morocco", "Myanmar", "Nepal", "Netherlands", "New Zealand", "Nicaragua", "Nigeria",
    "North Macedonia", "Norway", "Oman", "Pakistan", "Panama", "Paraguay", "Peru",
    "Philippines", "Poland", "Portugal", "Qatar", "Romania", "Russia", "Saudi Arabia",
    "Serbia", "Singapore", "Slovakia", "Slovenia", "Somalia", "South Africa", "South Korea",
    "Spain", "Sri Lanka", "Sudan", "Sweden", "Switzerland", "Syria", "Taiwan", "Tanzania",
    "Thailand", "Tunisia", "Turkey", "Uganda", "Ukraine", "United Arab Emirates",
    "United Kingdom", "United States", "Uruguay", "Uzbekistan", "Venezuela", "Vietnam",
    "Yemen", "Zimbabwe", "USA", "UAE", "UK", "US", "AR", "AU", "BD", "BG", "BR", "CA", "CH",
    "CL", "CN", "CO", "CZ", "DE", "DK", "EG", "ES", "FI", "FR", "GR", "HK", "HR", "HU", "ID",
    "IE", "IL", "IR", "JP", "KR", "KW", "LB", "MA", "MX", "NG", "NL", "NZ", "PE", "PH", "PK",
    "PL", "PT", "QA", "RO", "RS", "RU", "SA", "SE", "SG", "SK", "TH", "TR", "TW", "UA", "VN",
    "ZA",
];

/// Codes that are also everyday words. They only count in upper case and set
/// apart from the title, as in `IT | Rai` or `[IN] Movies`.
const SEPARATED_CODES: &[&str] = &["AL", "AT", "BE", "IN", "IS", "IT", "ME", "NO"];

fn country_pattern(country: &str) -> String {
    format!(r"(?i)\b{}\b", regex::escape(country))
}

fn separated_code_pattern(code: &str) -> String {
    format!(r"^\s*{code}\s*[|:\-–—]|[\[(]\s*{code}\s*[\])]")
}

/// Every `(country, pattern)` pair, in detection order
fn country_patterns() -> impl Iterator<Item = (&'static str, String)> {
    COUNTRIES
        .iter()
        .map(|&c| (c, country_pattern(c)))
        .chain(SEPARATED_CODES.iter().map(|&c| (c, separated_code_pattern(c))))
}

/// Matches all countries in one pass; the lowest matching index is the first in list order
static COUNTRY_SET: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(country_patterns().map(|(_, p)| p)).unwrap());
static COUNTRY_REGEXES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    country_patterns()
        .map(|(c, p)| (c, Regex::new(&p).unwrap()))
        .collect()
});

static DECORATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[|\[\](){}:;,.•*~/\\#!?"'<>=+]"#).unwrap());
/// Dashes standing on their own, e.g. the separators left in `IPTV - - Sports`
static LONE_DASH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)[-–—]+(?:\s|$)").unwrap());
static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Finds the first country of the list mentioned by the group, name or tvg-name
fn detect_country(group: &str, channel: &Channel) -> Option<(&'static str, &'static Regex)> {
    [group, channel.name.as_str(), channel.tvg_name.as_str()]
        .iter()
        .filter_map(|field| COUNTRY_SET.matches(field).iter().next())
        .min()
        .map(|index| {
            let (country, regex) = &COUNTRY_REGEXES[index];
            (*country, regex)
        })
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text, " ").trim().to_string()
}

/// Removes decorative punctuation and lone dashes
fn strip_decoration(text: &str) -> String {
    let text = DECORATION_REGEX.replace_all(text, " ");
    // Adjacent lone dashes share whitespace, so run twice to catch `a - - b`
    let text = LONE_DASH_REGEX.replace_all(&text, " ");
    let text = LONE_DASH_REGEX.replace_all(&text, " ");
    collapse_whitespace(&text)
}

/// Keeps alphanumerics, spaces, `_`, `&` and `-`. Empty or "unknown" becomes [`GENERAL_GROUP`].
#[must_use]
pub fn sanitize_group(group: &str) -> String {
    let kept: String = group
        .chars()
        .filter(|&c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '&' | '-'))
        .collect();
    let kept = collapse_whitespace(&kept);
    let kept = kept.trim_matches(|c: char| matches!(c, '-' | '_' | ' '));

    if kept.is_empty() || kept.eq_ignore_ascii_case("unknown") {
        GENERAL_GROUP.to_string()
    } else {
        kept.to_string()
    }
}

/// Derives the `(group, region)` partition of a channel
#[must_use]
pub fn classify(channel: &Channel) -> (String, String) {
    let group = if channel.group.trim().is_empty() {
        "Unknown"
    } else {
        channel.group.as_str()
    };

    match detect_country(group, channel) {
        Some((country, regex)) => {
            let remainder = strip_decoration(&regex.replace_all(group, " "));
            let remainder = if remainder.is_empty() {
                GENERAL_GROUP
            } else {
                remainder.as_str()
            };
            (sanitize_group(remainder), country.to_uppercase())
        }
        None => (sanitize_group(group), UNKNOWN_REGION.to_string()),
    }
}

/// Partitions channels by group, then region, keeping the input order inside each leaf
#[must_use]
pub fn group_channels(channels: &[Channel]) -> GroupedChannels {
    let mut grouped = GroupedChannels::new();
    for channel in channels {
        let (group, region) = classify(channel);
        grouped
            .entry(group)
            .or_default()
            .entry(region)
            .or_default()
            .push(channel.clone());
    }
    grouped
}
