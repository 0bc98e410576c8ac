//! Redaction of credentials from text that leaves the vault
//!
//! Error messages end up in the persisted error log, and some of them come
//! from HTTP clients that echo request URLs (Gemini takes `?key=...`).
//! Everything is scrubbed against:
//! - Exact matches of known secret values (the unlocked API key)
//! - Regex patterns for common credential formats

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Redaction placeholder
pub const REDACTED: &str = "[REDACTED]";

/// Credential pattern with metadata
#[derive(Debug, Clone)]
pub struct CredentialPattern {
    /// Pattern name for logging
    pub name: &'static str,
    /// Regex pattern
    pub pattern: &'static str,
}

/// Known credential patterns
pub static CREDENTIAL_PATTERNS: &[CredentialPattern] = &[
    CredentialPattern {
        name: "google_api_key",
        pattern: r"AIza[0-9A-Za-z\-_]{35}",
    },
    CredentialPattern {
        name: "url_key_param",
        pattern: r"([?&]key=)[^&\s]+",
    },
    CredentialPattern {
        name: "bearer_token",
        pattern: r"(?i)bearer\s+[a-zA-Z0-9\-_.=]+",
    },
    CredentialPattern {
        name: "generic_api_key",
        pattern: r#"(?i)api[_\-]?key[\s]*[=:][\s]*['"]?([a-zA-Z0-9\-_]{32,})['"]?"#,
    },
];

/// Compiled regex patterns (lazy initialized)
static COMPILED_PATTERNS: LazyLock<Vec<(CredentialPattern, Regex)>> = LazyLock::new(|| {
    CREDENTIAL_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p.pattern).ok().map(|r| (p.clone(), r)))
        .collect()
});

/// Result of scanning text for credentials
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Whether any credentials were detected
    pub has_credentials: bool,
    /// Names of what matched (`known_secret` or a pattern name)
    pub detected_types: Vec<String>,
    /// Text with every match replaced
    pub redacted_output: String,
}

/// Credential detector and redactor
#[derive(Debug, Default)]
pub struct OutputFilter {
    known_secrets: HashSet<String>,
}

impl OutputFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret value to redact by exact match. Empty values are ignored.
    pub fn add_secret(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.known_secrets.insert(value);
        }
    }

    pub fn clear_secrets(&mut self) {
        self.known_secrets.clear();
    }

    /// Scan text and redact everything that looks like a credential
    pub fn scan_and_redact(&self, output: &str) -> ScanResult {
        let mut redacted = output.to_string();
        let mut detected_types = Vec::new();

        // Known values first, before patterns can split them
        for secret in &self.known_secrets {
            if redacted.contains(secret.as_str()) {
                redacted = redacted.replace(secret.as_str(), REDACTED);
                detected_types.push("known_secret".to_string());
            }
        }

        for (pattern_info, regex) in COMPILED_PATTERNS.iter() {
            if regex.is_match(&redacted) {
                redacted = if pattern_info.name == "url_key_param" {
                    regex
                        .replace_all(&redacted, format!("${{1}}{}", REDACTED))
                        .into_owned()
                } else {
                    regex.replace_all(&redacted, REDACTED).into_owned()
                };
                detected_types.push(pattern_info.name.to_string());
            }
        }

        ScanResult {
            has_credentials: !detected_types.is_empty(),
            detected_types,
            redacted_output: redacted,
        }
    }
}

/// Redact using patterns only
pub fn redact(output: &str) -> String {
    OutputFilter::new().scan_and_redact(output).redacted_output
}
