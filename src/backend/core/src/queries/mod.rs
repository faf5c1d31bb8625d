//! Query dispatch.
//!
//! Queries read one published graph snapshot and never touch the event store, so
//! handlers are plain synchronous functions of the snapshot.

mod network;

pub use network::*;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::commands::UserContext;
use crate::error::{NetError, Result};
use crate::graph::NetworkGraph;

/// A typed request with a typed answer.
pub trait Query: Send + Sync + 'static {
    const NAME: &'static str;
    type Output: Send + 'static;
}

/// A query plus the identity of the request that issued it.
#[derive(Debug, Clone)]
pub struct QueryEnvelope<Q> {
    pub query: Q,
    pub request_id: Uuid,
    pub correlation_id: Uuid,
    pub user: UserContext,
}

impl<Q> QueryEnvelope<Q> {
    pub fn new(query: Q, user: UserContext) -> Self {
        let request_id = Uuid::new_v4();
        Self {
            query,
            request_id,
            correlation_id: request_id,
            user,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Answers one query type from a graph snapshot.
pub trait QueryHandler<Q: Query>: Send + Sync {
    fn handle(&self, query: &Q, graph: &NetworkGraph) -> Result<Q::Output>;
}

/// Routes queries to their handlers by type.
pub struct QueryDispatcher {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl QueryDispatcher {
    pub fn builder() -> QueryDispatcherBuilder {
        QueryDispatcherBuilder::default()
    }

    pub fn handles<Q: Query>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<Q>())
    }

    /// Answer a query against `graph`.
    #[instrument(
        skip(self, envelope, graph),
        fields(query = Q::NAME, request_id = %envelope.request_id, graph_version = graph.version())
    )]
    pub fn dispatch<Q: Query>(&self, envelope: &QueryEnvelope<Q>, graph: &NetworkGraph) -> Result<Q::Output> {
        envelope.user.ensure_authenticated()?;
        let handler = self
            .handlers
            .get(&TypeId::of::<Q>())
            .and_then(|h| h.downcast_ref::<Arc<dyn QueryHandler<Q>>>())
            .ok_or_else(|| NetError::no_handler_registered("query", Q::NAME))?;
        handler.handle(&envelope.query, graph)
    }
}

impl std::fmt::Debug for QueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[derive(Default)]
pub struct QueryDispatcherBuilder {
    handlers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl QueryDispatcherBuilder {
    /// Register the handler for `Q`. A second registration for the same type fails.
    pub fn register<Q: Query>(mut self, handler: Arc<dyn QueryHandler<Q>>) -> Result<Self> {
        let key = TypeId::of::<Q>();
        if self.handlers.contains_key(&key) {
            return Err(NetError::configuration(format!(
                "A query handler for {} is already registered",
                Q::NAME
            )));
        }
        self.handlers.insert(key, Box::new(handler));
        Ok(self)
    }

    pub fn build(self) -> QueryDispatcher {
        QueryDispatcher {
            handlers: self.handlers,
        }
    }
}
