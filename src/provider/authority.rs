//! Source authority and confidence heuristics.
//!
//! Used when the upstream API does not report scores of its own.

use crate::types::Source;
use url::Url;

/// Host suffixes and their authority, checked in order. A leading dot
/// matches a top-level domain; otherwise the host must be the domain or
/// one of its subdomains.
const AUTHORITY_MAP: &[(&str, f32)] = &[
    ("ieee.org", 0.95),
    ("nature.com", 0.95),
    ("science.org", 0.9),
    ("pubmed.ncbi.nlm.nih.gov", 0.9),
    (".gov", 0.95),
    (".edu", 0.9),
    (".org", 0.7),
];

const DEFAULT_AUTHORITY: f32 = 0.5;

fn host_matches(host: &str, suffix: &str) -> bool {
    if suffix.starts_with('.') {
        host.ends_with(suffix)
    } else {
        host == suffix || host.ends_with(&format!(".{suffix}"))
    }
}

/// Authority score for a URL.
pub fn authority_for_url(url: &str) -> f32 {
    let host = source_host(url);
    AUTHORITY_MAP
        .iter()
        .find(|(suffix, _)| host_matches(&host, suffix))
        .map(|(_, score)| *score)
        .unwrap_or(DEFAULT_AUTHORITY)
}

/// Lowercased host of a URL, without `www.`. Bare `host/path` strings are
/// read as https; anything unparseable is returned trimmed and lowercased.
///
/// Two sources with the same host are not independent for corroboration.
pub fn source_host(url: &str) -> String {
    let url = url.trim();
    let parsed = Url::parse(url).or_else(|_| Url::parse(&format!("https://{url}")));
    let host = match parsed.as_ref().ok().and_then(|u| u.host_str()) {
        Some(host) => host.to_ascii_lowercase(),
        None => url.to_ascii_lowercase(),
    };
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Confidence for a search answer: a base of 0.4 plus bonuses for source
/// authority, source count and answer length, clamped to `[0.1, 1.0]`.
pub fn research_confidence(sources: &[Source], content: &str) -> f32 {
    let mean_authority = if sources.is_empty() {
        0.0
    } else {
        sources.iter().map(|s| s.authority).sum::<f32>() / sources.len() as f32
    };
    let source_bonus = (sources.len() as f32 / 8.0).min(1.0) * 0.15;
    let words = content.split_whitespace().count() as f32;
    let depth_bonus = (words / 1000.0).min(1.0) * 0.1;

    (0.4 + mean_authority * 0.25 + source_bonus + depth_bonus).clamp(0.1, 1.0)
}
