//! Opens the on-disk network the CLI operates on.

use anyhow::{Context, Result};
use std::path::PathBuf;

use netgraph_core::commands::UserContext;
use netgraph_core::config::{Config, StoreBackend};
use netgraph_core::context::NetworkContext;
use netgraph_core::telemetry::init_telemetry;

use crate::commands::settings::{self, STORE_KEY, USER_KEY};

/// A replayed network plus the user acting on it.
pub struct Session {
    pub context: NetworkContext,
    pub user: UserContext,
    pub store: PathBuf,
}

impl Session {
    /// Resolve the store and user, then replay the store.
    ///
    /// Store precedence: `--store`/`NETGRAPH_STORE`, the `store` setting, then
    /// `~/.netgraph/store`. User precedence: `--user`/`NETGRAPH_USER`, the `user`
    /// setting, then `$USER`.
    pub async fn open(
        config_file: Option<&str>,
        store: Option<PathBuf>,
        user: Option<String>,
        log_level: Option<&str>,
    ) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path))?,
            None => Config::load().context("Failed to load configuration from the environment")?,
        };
        if let Some(level) = log_level {
            config.logging.level = level.to_string();
        }
        init_telemetry(&config.logging)?;
        let saved = settings::load()?;

        let store = match store {
            Some(path) => path,
            None => match saved.get(STORE_KEY) {
                Some(path) => PathBuf::from(path),
                None => settings::home_dir()?.join("store"),
            },
        };
        config.store.backend = StoreBackend::File;
        config.store.path = store.clone();

        let user_name = user
            .or_else(|| saved.get(USER_KEY).map(str::to_string))
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_default();

        let context = NetworkContext::initialize(&config)
            .await
            .with_context(|| format!("Failed to open event store at {}", store.display()))?;

        Ok(Self {
            context,
            user: UserContext::new(user_name),
            store,
        })
    }
}
