//! Wiring for a running network: store, repository, dispatchers and trace engine.

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::commands::{CommandDispatcher, CommandOutcome, NetworkCommand, NetworkCommandHandler, UserContext};
use crate::config::{Config, StoreBackend};
use crate::error::Result;
use crate::events::{EventStore, FileEventStore, InMemoryEventStore};
use crate::graph::NetworkGraph;
use crate::queries::{NetworkQueryHandler, Query, QueryDispatcher, QueryEnvelope};
use crate::repository::AggregateRepository;
use crate::telemetry::describe_metrics;
use crate::trace::{TraceEngine, TraceRequest, UtilityGraphTraceResult};

/// Everything needed to run commands, queries and traces against one store.
#[derive(Debug)]
pub struct NetworkContext {
    repository: Arc<AggregateRepository>,
    commands: CommandDispatcher,
    queries: QueryDispatcher,
    tracer: TraceEngine,
}

impl NetworkContext {
    /// Open the configured store and rebuild the graph from it.
    pub async fn initialize(config: &Config) -> Result<Self> {
        describe_metrics();

        let store: Arc<dyn EventStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(InMemoryEventStore::new()),
            StoreBackend::File => Arc::new(FileEventStore::open(&config.store.path).await?),
        };
        Self::with_store(store, config).await
    }

    /// Build a context over an existing store and replay it.
    pub async fn with_store(store: Arc<dyn EventStore>, config: &Config) -> Result<Self> {
        let repository = Arc::new(AggregateRepository::new(store));
        let replayed = repository.replay().await?;

        let commands = Arc::new(NetworkCommandHandler::new(
            repository.clone(),
            config.commands.max_conflict_retries,
        ))
        .register_all(CommandDispatcher::builder())?
        .build();
        let queries = Arc::new(NetworkQueryHandler)
            .register_all(QueryDispatcher::builder())?
            .build();

        info!(
            backend = ?config.store.backend,
            replayed,
            graph_version = repository.snapshot().version(),
            "Network context ready"
        );

        Ok(Self {
            repository,
            commands,
            queries,
            tracer: TraceEngine::from_config(&config.trace),
        })
    }

    pub fn repository(&self) -> &Arc<AggregateRepository> {
        &self.repository
    }

    pub fn commands(&self) -> &CommandDispatcher {
        &self.commands
    }

    pub fn queries(&self) -> &QueryDispatcher {
        &self.queries
    }

    /// The latest published graph.
    pub fn snapshot(&self) -> Arc<NetworkGraph> {
        self.repository.snapshot()
    }

    /// Run a command under a fresh correlation id.
    pub async fn execute(&self, command: NetworkCommand, user: UserContext) -> Result<CommandOutcome> {
        command.dispatch(&self.commands, user, Uuid::new_v4()).await
    }

    /// Answer a query against the latest snapshot.
    pub fn query<Q: Query>(&self, query: Q, user: UserContext) -> Result<Q::Output> {
        let snapshot = self.snapshot();
        self.queries.dispatch(&QueryEnvelope::new(query, user), &snapshot)
    }

    /// Trace against the latest snapshot on the blocking pool.
    #[instrument(skip(self, request), fields(start_id = %request.start_id))]
    pub async fn trace(&self, request: TraceRequest) -> Result<UtilityGraphTraceResult> {
        let snapshot = self.snapshot();
        let tracer = self.tracer.clone();
        tokio::task::spawn_blocking(move || tracer.trace(&snapshot, &request)).await?
    }
}
