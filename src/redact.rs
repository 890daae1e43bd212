//! Masking of sensitive header and query values before they reach any log
//! line or span attribute.

use crate::config::GlobalOptions;
use std::collections::HashSet;

pub const REDACTED: &str = "***REDACTED***";

/// Immutable redaction rule set derived from [`GlobalOptions`].
#[derive(Debug, Clone, Default)]
pub struct RedactionPolicy {
    header_keys: HashSet<String>,
    query_keys: HashSet<String>,
}

impl RedactionPolicy {
    pub fn from_options(options: &GlobalOptions) -> Self {
        Self {
            header_keys: options
                .redacted_header_keys
                .iter()
                .map(|key| key.to_ascii_lowercase())
                .collect(),
            query_keys: options
                .redacted_query_keys
                .iter()
                .map(|key| key.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_redacted_header(&self, name: &str) -> bool {
        self.header_keys.contains(&name.to_ascii_lowercase())
    }

    pub fn is_redacted_query_key(&self, key: &str) -> bool {
        self.query_keys.contains(&key.to_ascii_lowercase())
    }

    /// Returns the value to log for a header, masked when the name is on the
    /// redaction list.
    pub fn header_value<'a>(&self, name: &str, value: &'a str) -> &'a str {
        if self.is_redacted_header(name) {
            REDACTED
        } else {
            value
        }
    }

    /// Rewrites a raw query string, masking values of redacted keys. Key
    /// names and pair order are preserved.
    pub fn redact_query(&self, query: &str) -> String {
        if query.is_empty() {
            return String::new();
        }

        query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if self.is_redacted_query_key(key) => {
                    format!("{key}={REDACTED}")
                }
                _ => pair.to_string(),
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Flattens headers into a single `name=value` line for debug events,
    /// masking redacted values.
    pub fn header_line<'a>(
        &self,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> String {
        headers
            .into_iter()
            .map(|(name, value)| format!("{name}={}", self.header_value(name, value)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
