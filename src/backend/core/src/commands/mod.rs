//! Command dispatch.
//!
//! Every command type has exactly one handler, registered while the dispatcher is
//! built. Handlers own the load → validate → emit → save cycle and their own
//! conflict retries; the dispatcher only routes.

mod network;

pub use network::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{NetError, Result};
use crate::events::EventMetadata;
use crate::telemetry::CommandTimer;

// =============================================================================
// Envelope
// =============================================================================

/// The user on whose behalf a command or query runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_name: String,
}

impl UserContext {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
        }
    }

    pub(crate) fn ensure_authenticated(&self) -> Result<()> {
        if self.user_name.trim().is_empty() {
            return Err(NetError::unauthorized("A user name is required"));
        }
        Ok(())
    }
}

/// Marker for command types.
pub trait Command: Send + Sync + 'static {
    /// Command name used in logs and metrics.
    const NAME: &'static str;
}

/// A command plus the identity of the request that issued it.
#[derive(Debug, Clone)]
pub struct CommandEnvelope<C> {
    pub command: C,
    pub command_id: Uuid,
    pub correlation_id: Uuid,
    pub user: UserContext,
    pub issued_at: DateTime<Utc>,
}

impl<C> CommandEnvelope<C> {
    /// Wrap a command, starting a new correlation.
    pub fn new(command: C, user: UserContext) -> Self {
        let command_id = Uuid::new_v4();
        Self {
            command,
            command_id,
            correlation_id: command_id,
            user,
            issued_at: Utc::now(),
        }
    }

    /// Continue an existing correlation.
    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Metadata stamped on every event this command produces.
    pub fn metadata(&self) -> EventMetadata {
        EventMetadata::new(self.correlation_id, self.command_id).with_actor(self.user.user_name.clone())
    }
}

/// What a successful command did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub aggregate_id: Uuid,
    /// Stream version after the save
    pub version: u64,
    pub event_count: usize,
    /// Elements the command created
    pub created: Vec<Uuid>,
}

/// Handles one command type.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(&self, envelope: &CommandEnvelope<C>) -> Result<CommandOutcome>;
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Routes commands to their handlers by type.
pub struct CommandDispatcher {
    /// `TypeId::of::<C>()` → `Arc<dyn CommandHandler<C>>`
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl CommandDispatcher {
    pub fn builder() -> CommandDispatcherBuilder {
        CommandDispatcherBuilder::default()
    }

    /// Whether a handler is registered for `C`.
    pub fn handles<C: Command>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<C>())
    }

    /// Route a command to its handler.
    #[instrument(
        skip(self, envelope),
        fields(command = C::NAME, command_id = %envelope.command_id, correlation_id = %envelope.correlation_id)
    )]
    pub async fn dispatch<C: Command>(&self, envelope: CommandEnvelope<C>) -> Result<CommandOutcome> {
        let timer = CommandTimer::start(C::NAME);

        let result = async {
            envelope.user.ensure_authenticated()?;
            let handler = self
                .handlers
                .get(&TypeId::of::<C>())
                .and_then(|h| h.downcast_ref::<Arc<dyn CommandHandler<C>>>())
                .ok_or_else(|| NetError::no_handler_registered("command", C::NAME))?;
            handler.handle(&envelope).await
        }
        .await;

        match &result {
            Ok(outcome) => {
                debug!(
                    aggregate_id = %outcome.aggregate_id,
                    version = outcome.version,
                    events = outcome.event_count,
                    "Command handled"
                );
                timer.finish("ok");
            }
            Err(err) => {
                err.log();
                timer.finish(&err.code().to_string());
            }
        }
        result
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Collects handlers; the dispatcher it builds cannot be changed.
#[derive(Default)]
pub struct CommandDispatcherBuilder {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl CommandDispatcherBuilder {
    /// Register the handler for `C`. A second registration for the same type fails.
    pub fn register<C: Command>(mut self, handler: Arc<dyn CommandHandler<C>>) -> Result<Self> {
        let key = TypeId::of::<C>();
        if self.handlers.contains_key(&key) {
            return Err(NetError::configuration(format!(
                "A command handler for {} is already registered",
                C::NAME
            )));
        }
        self.handlers.insert(key, Box::new(handler));
        Ok(self)
    }

    pub fn build(self) -> CommandDispatcher {
        CommandDispatcher {
            handlers: self.handlers,
        }
    }
}
