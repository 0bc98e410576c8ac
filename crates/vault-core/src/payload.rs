//! Helpers for the design payload sent to the generative API and the HTML
//! that comes back.

use regex::Regex;
use std::sync::LazyLock;

/// Figma-internal attributes that only cost prompt tokens
static NOISE_ATTRIBUTES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r#"\s+data-node-id="[^"]*""#).expect("static pattern"),
        Regex::new(r#"\s+data-name="[^"]*""#).expect("static pattern"),
        Regex::new(r#"\s+data-figma-[^=]*="[^"]*""#).expect("static pattern"),
    ]
});

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static pattern"));

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:html)?\s*\n?([\s\S]*?)```").expect("static pattern"));

/// Strip Figma data-* noise from design markup and compact whitespace
pub fn preprocess_mcp_data(raw: &str) -> String {
    let mut result = raw.to_string();
    for pattern in NOISE_ATTRIBUTES.iter() {
        result = pattern.replace_all(&result, "").into_owned();
    }

    let result = result
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_RUNS.replace_all(&result, "\n\n").trim().to_string()
}

/// Pull the HTML document out of a model reply.
///
/// Models sometimes wrap the document in a fenced code block despite being
/// told not to; the first fence wins. Anything else is returned trimmed.
pub fn extract_html(raw: &str) -> String {
    if let Some(captures) = FENCED_BLOCK.captures(raw) {
        return captures[1].trim().to_string();
    }
    raw.trim().to_string()
}

/// Human-readable size; empty for zero
pub fn format_bytes(n: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if n == 0 {
        String::new()
    } else if n >= MB {
        format!("{:.1} MB", n as f64 / MB as f64)
    } else if n >= KB {
        format!("{:.1} KB", n as f64 / KB as f64)
    } else {
        format!("{} bytes", n)
    }
}
