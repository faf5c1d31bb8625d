//! Persistent CLI settings.
//!
//! Stored in `~/.netgraph/settings.toml`. Known keys are `store` (event store
//! directory) and `user` (name recorded on emitted events).

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::output::{self, OutputFormat};

pub const STORE_KEY: &str = "store";
pub const USER_KEY: &str = "user";
const KNOWN_KEYS: [&str; 2] = [STORE_KEY, USER_KEY];

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Set a value
    Set {
        /// Setting key (store, user)
        key: String,
        value: String,
    },

    /// Print a value
    Get { key: String },

    /// Show every value
    Show,

    /// Remove a value
    Unset { key: String },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl Settings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Directory holding CLI state (`~/.netgraph`).
pub fn home_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".netgraph"))
}

fn settings_path() -> Result<PathBuf> {
    Ok(home_dir()?.join("settings.toml"))
}

/// Load settings, returning defaults when the file does not exist.
pub fn load() -> Result<Settings> {
    load_from(&settings_path()?)
}

fn load_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn check_key(key: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        bail!("Unknown setting '{}' (expected one of: {})", key, KNOWN_KEYS.join(", "));
    }
    Ok(())
}

pub fn execute(cmd: SettingsCommands, format: OutputFormat) -> Result<()> {
    let path = settings_path()?;
    let mut settings = load_from(&path)?;

    match cmd {
        SettingsCommands::Set { key, value } => {
            check_key(&key)?;
            settings.values.insert(key.clone(), value.clone());
            save_to(&path, &settings)?;
            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, value)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        SettingsCommands::Get { key } => {
            check_key(&key)?;
            let Some(value) = settings.get(&key) else {
                bail!("'{}' is not set", key);
            };
            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        SettingsCommands::Show => match format {
            OutputFormat::Table => {
                output::print_header("Settings");
                output::print_detail("file", &path.display().to_string());
                for (k, v) in &settings.values {
                    output::print_detail(k, v);
                }
            }
            _ => output::print_item(&settings.values, format)?,
        },

        SettingsCommands::Unset { key } => {
            check_key(&key)?;
            if settings.values.remove(&key).is_none() {
                output::print_warning(&format!("'{}' was not set", key));
                return Ok(());
            }
            save_to(&path, &settings)?;
            output::print_success(&format!("Removed {}", key));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        assert!(load_from(&path).unwrap().values.is_empty());

        let mut settings = Settings::default();
        settings.values.insert(USER_KEY.to_string(), "alice".to_string());
        save_to(&path, &settings).unwrap();

        assert_eq!(load_from(&path).unwrap().get(USER_KEY), Some("alice"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(check_key("api-url").is_err());
        assert!(check_key(STORE_KEY).is_ok());
    }
}
