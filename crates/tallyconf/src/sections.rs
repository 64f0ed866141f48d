//! Config sections. Every field has a compiled default.

use serde::{Deserialize, Serialize};

/// Ledger backend (the canister's HTTP gateway).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    /// Base URL of the backend.
    /// Default: http://127.0.0.1:4943
    #[serde(default = "LedgerConfig::default_base_url")]
    pub base_url: String,

    /// Canister id. When set, requests carry `Host: <canister_id>.localhost`
    /// so a local replica can route them. An empty string means unset.
    #[serde(
        default = "LedgerConfig::default_canister_id",
        with = "blank_is_none"
    )]
    pub canister_id: Option<String>,

    /// Per-request timeout in milliseconds.
    /// Default: 10000
    #[serde(default = "LedgerConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts for read-only operations. Transfers are never retried.
    /// Default: 2
    #[serde(default = "LedgerConfig::default_read_retries")]
    pub read_retries: u32,

    /// Backoff step between read retries, multiplied by the attempt number.
    /// Default: 250
    #[serde(default = "LedgerConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl LedgerConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:4943".to_string()
    }

    fn default_canister_id() -> Option<String> {
        Some("bkyz2-fmaaa-aaaaa-qaaaq-cai".to_string())
    }

    fn default_timeout_ms() -> u64 {
        10_000
    }

    fn default_read_retries() -> u32 {
        2
    }

    fn default_retry_backoff_ms() -> u64 {
        250
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            canister_id: Self::default_canister_id(),
            timeout_ms: Self::default_timeout_ms(),
            read_retries: Self::default_read_retries(),
            retry_backoff_ms: Self::default_retry_backoff_ms(),
        }
    }
}

/// `Option<String>` stored as a plain string, with `""` for `None`.
mod blank_is_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = String::deserialize(d)?;
        Ok(if value.is_empty() { None } else { Some(value) })
    }
}

/// OpenAI-compatible chat completions service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Base URL for the OpenAI-compatible API.
    /// Default: https://api.openai.com/v1
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,

    /// API key. Usually supplied via `OPENAI_API_KEY` rather than a file.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for function calling.
    /// Default: gpt-4o
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,

    /// Timeout for one completion request in milliseconds.
    /// Default: 30000
    #[serde(default = "LlmConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_model() -> String {
        "gpt-4o".to_string()
    }

    fn default_timeout_ms() -> u64 {
        30_000
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            model: Self::default_model(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
