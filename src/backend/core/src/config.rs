//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::telemetry::LoggingConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Event store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Trace engine limits
    #[serde(default)]
    pub trace: TraceConfig,

    /// Command handling configuration
    #[serde(default)]
    pub commands: CommandConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which event store implementation backs the repository.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Volatile, per-process store
    #[default]
    Memory,
    /// JSON-lines files, one per stream
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory for the file backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceConfig {
    /// Maximum objects one trace may visit
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Wall-clock budget per trace
    #[serde(default = "default_trace_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout: default_trace_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Reload-and-retry attempts after a concurrency conflict
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

// Default value functions
fn default_store_path() -> PathBuf { PathBuf::from("netgraph-store") }
fn default_max_steps() -> usize { 10_000 }
fn default_trace_timeout() -> Duration { Duration::from_secs(2) }
fn default_max_conflict_retries() -> u32 { 3 }

impl Config {
    /// Load configuration from the environment (`NETGRAPH__SECTION__KEY`).
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("NETGRAPH").prefix_separator("__").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path; environment variables take precedence.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("NETGRAPH").prefix_separator("__").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.trace.max_steps, 10_000);
        assert_eq!(config.trace.timeout, Duration::from_secs(2));
        assert_eq!(config.commands.max_conflict_retries, 3);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[store]
backend = "file"
path = "/var/lib/netgraph"

[trace]
max_steps = 500
timeout = "250ms"

[commands]
max_conflict_retries = 5
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.store.path, PathBuf::from("/var/lib/netgraph"));
        assert_eq!(config.trace.max_steps, 500);
        assert_eq!(config.trace.timeout, Duration::from_millis(250));
        assert_eq!(config.commands.max_conflict_retries, 5);
    }
}
