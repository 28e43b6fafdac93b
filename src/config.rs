use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::state::DEFAULT_STATE_FILE;
use crate::wait::{BackoffSchedule, Deadline, WaitConfig};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_index_name")]
    pub index_name: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            index_name: default_index_name(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_index_name() -> String {
    "agentic_search_docs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Seconds to wait for indexing; `0` waits indefinitely.
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_initial_poll_interval_ms")]
    pub initial_poll_interval_ms: u64,
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_index_timeout_secs(),
            initial_poll_interval_ms: default_initial_poll_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            max_poll_errors: default_max_poll_errors(),
        }
    }
}

fn default_index_timeout_secs() -> u64 {
    600
}
fn default_initial_poll_interval_ms() -> u64 {
    1000
}
fn default_max_poll_interval_ms() -> u64 {
    10_000
}
fn default_max_poll_errors() -> u32 {
    3
}

impl IndexingConfig {
    /// Wait settings, with `timeout_override` (seconds) taking precedence.
    pub fn wait_config(&self, timeout_override: Option<u64>) -> WaitConfig {
        WaitConfig {
            schedule: BackoffSchedule::new(
                Duration::from_millis(self.initial_poll_interval_ms),
                Duration::from_millis(self.max_poll_interval_ms),
            ),
            deadline: Deadline::from_secs(timeout_override.unwrap_or(self.timeout_secs)),
            max_poll_errors: self.max_poll_errors,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

impl StateConfig {
    /// File name of the state file, excluded from every scan.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string())
    }
}

/// Load and validate the configuration file.
///
/// When `required` is false a missing file yields the built-in defaults.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read config file: {}", path.display()))
        }
    };

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.remote.timeout_secs == 0 {
        anyhow::bail!("remote.timeout_secs must be > 0");
    }

    if config.remote.index_name.trim().is_empty() {
        anyhow::bail!("remote.index_name must not be empty");
    }

    if config.indexing.initial_poll_interval_ms == 0 {
        anyhow::bail!("indexing.initial_poll_interval_ms must be > 0");
    }

    if config.indexing.max_poll_interval_ms < config.indexing.initial_poll_interval_ms {
        anyhow::bail!("indexing.max_poll_interval_ms must be >= indexing.initial_poll_interval_ms");
    }

    if config.state.path.file_name().is_none() {
        anyhow::bail!("state.path must name a file");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agentic-search.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_missing_optional_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml"), false).unwrap();
        assert_eq!(config.remote.base_url, "https://api.openai.com/v1");
        assert_eq!(config.indexing.timeout_secs, 600);
        assert_eq!(config.state.path, PathBuf::from(DEFAULT_STATE_FILE));
    }

    #[test]
    fn test_missing_required_config_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(load_config(&tmp.path().join("absent.toml"), true).is_err());
    }

    #[test]
    fn test_partial_sections() {
        let (_tmp, path) = write_config(
            r#"
[indexing]
timeout_secs = 0
max_poll_interval_ms = 5000

[state]
path = "state/index.json"
"#,
        );
        let config = load_config(&path, true).unwrap();
        assert_eq!(config.indexing.initial_poll_interval_ms, 1000);
        assert_eq!(config.state.file_name(), "index.json");

        let wait = config.indexing.wait_config(None);
        assert_eq!(wait.deadline, Deadline::Unlimited);
        assert_eq!(wait.schedule.max, Duration::from_secs(5));

        let overridden = config.indexing.wait_config(Some(30));
        assert_eq!(overridden.deadline, Deadline::After(Duration::from_secs(30)));
    }

    #[test]
    fn test_rejects_inverted_poll_intervals() {
        let (_tmp, path) = write_config(
            r#"
[indexing]
initial_poll_interval_ms = 5000
max_poll_interval_ms = 1000
"#,
        );
        assert!(load_config(&path, true).is_err());
    }

    #[test]
    fn test_rejects_zero_remote_timeout() {
        let (_tmp, path) = write_config("[remote]\ntimeout_secs = 0\n");
        assert!(load_config(&path, true).is_err());
    }
}
