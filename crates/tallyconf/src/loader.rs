//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, TallyConfig};
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli). Only existing
/// files are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/tally/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("tally/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("tally.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load and merge files in order, later files winning key by key.
pub fn load_files(paths: &[PathBuf]) -> Result<TallyConfig, ConfigError> {
    let mut merged = toml::Table::new();
    for path in paths {
        let table = read_table(path)?;
        merge_tables(&mut merged, table);
    }

    // Report against the last file; it is the one most likely to be wrong.
    let blame = paths.last().cloned().unwrap_or_default();
    toml::Value::Table(merged)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: blame,
            message: e.to_string(),
        })
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_section)), toml::Value::Table(overlay_section)) => {
                merge_tables(base_section, overlay_section);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment overrides through `lookup`.
///
/// Numeric variables that do not parse are ignored. An empty
/// `TALLY_CANISTER_ID` clears the Host header override.
pub fn apply_env_overrides<F>(config: &mut TallyConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut record = |name: &str| sources.env_overrides.push(name.to_string());

    if let Some(v) = lookup("TALLY_LEDGER_URL") {
        config.ledger.base_url = v;
        record("TALLY_LEDGER_URL");
    }
    if let Some(v) = lookup("TALLY_CANISTER_ID") {
        config.ledger.canister_id = if v.is_empty() { None } else { Some(v) };
        record("TALLY_CANISTER_ID");
    }
    if let Some(v) = lookup("TALLY_LEDGER_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.ledger.timeout_ms = v;
        record("TALLY_LEDGER_TIMEOUT_MS");
    }
    if let Some(v) = lookup("TALLY_LLM_URL") {
        config.llm.base_url = v;
        record("TALLY_LLM_URL");
    }
    if let Some(v) = lookup("TALLY_LLM_MODEL") {
        config.llm.model = v;
        record("TALLY_LLM_MODEL");
    }
    if let Some(v) = lookup("TALLY_LLM_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.llm.timeout_ms = v;
        record("TALLY_LLM_TIMEOUT_MS");
    }
    if let Some(v) = lookup("OPENAI_API_KEY") {
        config.llm.api_key = Some(v);
        record("OPENAI_API_KEY");
    }
    if let Some(v) = lookup("TALLY_LOG_LEVEL") {
        config.telemetry.log_level = v;
        record("TALLY_LOG_LEVEL");
    }
}
