//! Figma node identifier normalization
//!
//! Users paste either a full Figma link or a bare node id. The proxy wants
//! the `row:col` form, e.g. `22041:218191`.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// First Figma web URL anywhere in the text, optionally `@`-prefixed
static FIGMA_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@?(https?://(?:www\.)?figma\.com/\S+)").expect("static pattern")
});

static HYPHEN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+-\d+$").expect("static pattern"));

static COLON_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+:\d+$").expect("static pattern"));

/// Query parameter carrying the node id in Figma links
const NODE_ID_PARAM: &str = "node-id";

/// Normalize a pasted Figma URL or node id to `row:col`.
///
/// Returns `None` when the input cannot be used; callers should ask the
/// user to re-enter it rather than calling the proxy. A Figma URL without a
/// `node-id` parameter is `None` even if other text would parse.
pub fn parse_node_id(raw: &str) -> Option<String> {
    if let Some(captures) = FIGMA_URL.captures(raw) {
        return node_id_from_url(&captures[1]);
    }

    let trimmed = raw.trim();

    if HYPHEN_ID.is_match(trimmed) {
        return Some(trimmed.replacen('-', ":", 1));
    }

    if COLON_ID.is_match(trimmed) {
        return Some(trimmed.to_string());
    }

    None
}

fn node_id_from_url(candidate: &str) -> Option<String> {
    let url = Url::parse(candidate).ok()?;
    let value = url
        .query_pairs()
        .find(|(key, _)| key == NODE_ID_PARAM)
        .map(|(_, value)| value.into_owned())?;

    if value.is_empty() {
        return None;
    }

    Some(value.replacen('-', ":", 1))
}
