#![allow(clippy::result_large_err)]
//! # Netgraph Core
//!
//! Event-sourced network topology with a versioned object graph.
//!
//! ## Architecture
//!
//! - **Events**: Append-only event streams with optimistic concurrency, in memory or on disk
//! - **Repository**: Aggregate rehydration and the published graph projection
//! - **Commands**: Typed command dispatch with per-command validation and conflict retries
//! - **Queries**: Typed read-only queries over a graph snapshot
//! - **Graph**: Versioned object graph of route, equipment and signal layers
//! - **Trace**: Bounded upstream/downstream connectivity traces
//! - **Telemetry**: Structured logging and metrics

pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod graph;
pub mod queries;
pub mod repository;
pub mod telemetry;
pub mod trace;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, NetError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::{
        CommandDispatcher, CommandEnvelope, CommandHandler, CommandOutcome, NetworkCommand, UserContext,
    };
    pub use crate::config::Config;
    pub use crate::context::NetworkContext;
    pub use crate::error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, NetError, Result};
    pub use crate::events::{
        AggregateId, DomainEvent, EventMetadata, EventStore, FileEventStore, InMemoryEventStore, StoredEvent,
    };
    pub use crate::graph::{ElementKind, GraphObject, LinkKind, NetworkGraph};
    pub use crate::queries::{QueryDispatcher, QueryEnvelope};
    pub use crate::repository::AggregateRepository;
    pub use crate::trace::{TraceEngine, TraceRequest, UtilityGraphTraceResult};
}
