//! Global pipeline options, bound once at startup from the
//! `ReqRepTransformation` configuration section and immutable afterwards.

use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Policy applied when a transform's apply step fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureMode {
    /// Abort the pipeline; the host answers with a gateway error.
    StopPipeline,
    /// Proceed with the next transform.
    Continue,
    /// Proceed with the next transform; identical to `Continue` on the wire,
    /// kept distinct to signal operator intent.
    LogAndSkip,
}

impl FailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::StopPipeline => "StopPipeline",
            FailureMode::Continue => "Continue",
            FailureMode::LogAndSkip => "LogAndSkip",
        }
    }
}

impl Default for FailureMode {
    fn default() -> Self {
        FailureMode::LogAndSkip
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_REDACTED_HEADER_KEYS: [&str; 7] = [
    "Authorization",
    "Cookie",
    "Set-Cookie",
    "X-Api-Key",
    "X-Client-Secret",
    "X-Api-Secret",
    "X-Internal-Token",
];

pub const DEFAULT_REDACTED_QUERY_KEYS: [&str; 4] =
    ["access_token", "api_key", "token", "secret"];

/// Process-wide defaults for the pipeline executor and redaction policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalOptions {
    pub default_timeout: Duration,
    pub default_failure_mode: FailureMode,
    pub redacted_header_keys: Vec<String>,
    pub redacted_query_keys: Vec<String>,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            default_failure_mode: FailureMode::default(),
            redacted_header_keys: DEFAULT_REDACTED_HEADER_KEYS
                .iter()
                .map(|key| key.to_string())
                .collect(),
            redacted_query_keys: DEFAULT_REDACTED_QUERY_KEYS
                .iter()
                .map(|key| key.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSection {
    #[serde(rename = "DefaultTimeout")]
    default_timeout: Option<String>,
    #[serde(rename = "DefaultFailureMode")]
    default_failure_mode: Option<FailureMode>,
    #[serde(rename = "RedactedHeaderKeys")]
    redacted_header_keys: Option<Vec<String>>,
    #[serde(rename = "RedactedQueryKeys")]
    redacted_query_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(rename = "ReqRepTransformation")]
    section: RawSection,
}

impl GlobalOptions {
    /// Loads options from `config/reqrep.{toml,yaml,...}` plus `REQREP__`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let raw: RawConfig = Config::builder()
            .add_source(File::with_name("config/reqrep").required(false))
            .add_source(Environment::with_prefix("REQREP").separator("__"))
            .build()?
            .try_deserialize()?;

        Self::from_section(raw.section)
    }

    fn from_section(raw: RawSection) -> Result<Self> {
        let defaults = GlobalOptions::default();

        let default_timeout = match raw.default_timeout {
            Some(text) => humantime::parse_duration(text.trim())?,
            None => defaults.default_timeout,
        };

        Ok(Self {
            default_timeout,
            default_failure_mode: raw
                .default_failure_mode
                .unwrap_or(defaults.default_failure_mode),
            redacted_header_keys: raw
                .redacted_header_keys
                .unwrap_or(defaults.redacted_header_keys),
            redacted_query_keys: raw
                .redacted_query_keys
                .unwrap_or(defaults.redacted_query_keys),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let options = GlobalOptions::default();
        assert_eq!(options.default_timeout, Duration::from_secs(5));
        assert_eq!(options.default_failure_mode, FailureMode::LogAndSkip);
        assert!(options
            .redacted_header_keys
            .iter()
            .any(|key| key == "Authorization"));
        assert!(options
            .redacted_query_keys
            .iter()
            .any(|key| key == "access_token"));
    }

    #[test]
    fn section_overrides_apply() {
        let raw = RawSection {
            default_timeout: Some("250ms".to_string()),
            default_failure_mode: Some(FailureMode::StopPipeline),
            redacted_header_keys: Some(vec!["X-Secret".to_string()]),
            redacted_query_keys: None,
        };

        let options = GlobalOptions::from_section(raw).expect("options should bind");
        assert_eq!(options.default_timeout, Duration::from_millis(250));
        assert_eq!(options.default_failure_mode, FailureMode::StopPipeline);
        assert_eq!(options.redacted_header_keys, vec!["X-Secret".to_string()]);
        assert_eq!(options.redacted_query_keys.len(), 4);
    }

    #[test]
    fn failure_mode_parses_from_config_strings() {
        let mode: FailureMode =
            serde_json::from_str("\"StopPipeline\"").expect("enum string should parse");
        assert_eq!(mode, FailureMode::StopPipeline);
    }
}
