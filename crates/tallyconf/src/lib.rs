//! Configuration loading for the tally agent.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/tally/config.toml` (system)
//! 2. `~/.config/tally/config.toml` (user)
//! 3. `./tally.toml` (local override), or a path given on the command line
//! 4. Environment variables (`TALLY_*`, `OPENAI_API_KEY`)
//!
//! Files are merged key by key, so a local file only needs the keys it changes.
//!
//! # Example Config
//!
//! ```toml
//! [ledger]
//! base_url = "http://127.0.0.1:4943"
//! canister_id = "bkyz2-fmaaa-aaaaa-qaaaq-cai"
//! timeout_ms = 10000
//! read_retries = 2
//!
//! [llm]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{apply_env_overrides, discover_config_files_with_override, ConfigSources};
pub use sections::{LedgerConfig, LlmConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TallyConfig {
    /// Ledger backend the operations are executed against.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Language-model service used to resolve intents.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl TallyConfig {
    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let mut config = loader::load_files(&files)?;

        let mut sources = ConfigSources {
            files,
            ..Default::default()
        };
        loader::apply_env_overrides(&mut config, &mut sources, |key| std::env::var(key).ok());

        Ok((config, sources))
    }

    /// Serialize the effective config to TOML, with the API key redacted.
    ///
    /// The output parses back to the same config, apart from the key.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# tally configuration\n\n");

        output.push_str("[ledger]\n");
        output.push_str(&format!("base_url = {}\n", quoted(&self.ledger.base_url)));
        output.push_str(&format!(
            "canister_id = {}\n",
            quoted(self.ledger.canister_id.as_deref().unwrap_or(""))
        ));
        output.push_str(&format!("timeout_ms = {}\n", self.ledger.timeout_ms));
        output.push_str(&format!("read_retries = {}\n", self.ledger.read_retries));
        output.push_str(&format!(
            "retry_backoff_ms = {}\n",
            self.ledger.retry_backoff_ms
        ));

        output.push_str("\n[llm]\n");
        output.push_str(&format!("base_url = {}\n", quoted(&self.llm.base_url)));
        if self.llm.api_key.is_some() {
            output.push_str("api_key = \"<redacted>\"\n");
        }
        output.push_str(&format!("model = {}\n", quoted(&self.llm.model)));
        output.push_str(&format!("timeout_ms = {}\n", self.llm.timeout_ms));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = {}\n",
            quoted(&self.telemetry.log_level)
        ));

        output
    }
}

/// TOML basic string literal, escaped
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TallyConfig::default();
        assert_eq!(config.ledger.base_url, "http://127.0.0.1:4943");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_to_toml_redacts_key() {
        let mut config = TallyConfig::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let toml = config.to_toml();
        assert!(toml.contains("[ledger]"));
        assert!(toml.contains("[llm]"));
        assert!(toml.contains("<redacted>"));
        assert!(!toml.contains("sk-secret"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let config = TallyConfig::default();
        let parsed: TallyConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_to_toml_escapes_and_keeps_unset_canister() {
        let mut config = TallyConfig::default();
        config.ledger.base_url = "http://host/\"quoted\"\\path".to_string();
        config.ledger.canister_id = None;

        let parsed: TallyConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed.ledger.base_url, config.ledger.base_url);
        assert_eq!(parsed.ledger.canister_id, None);
        assert_eq!(parsed, config);
    }
}
