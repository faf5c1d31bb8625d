//! Aggregate repository and graph projection.
//!
//! The repository is the only writer of the event store and of the published
//! graph. Saving a batch happens in one critical section:
//!
//! 1. stage the batch on a copy of the current graph (every invariant checked)
//! 2. append the batch to the aggregate's stream
//! 3. publish the staged copy as the new snapshot
//!
//! A failure at any step drops the staged copy, so readers never see a partial
//! batch and the store never keeps events the projection rejected.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{ErrorCode, NetError, Result};
use crate::events::{
    Aggregate, AggregateId, DomainEvent, Event, EventMetadata, EventStore, NewEvent, StoredEvent,
};
use crate::graph::NetworkGraph;
use crate::telemetry::NetworkMetrics;

/// Loads aggregates from their streams and keeps the shared graph in step with the log.
pub struct AggregateRepository {
    store: Arc<dyn EventStore>,

    /// Latest published graph
    snapshot: RwLock<Arc<NetworkGraph>>,

    /// Serialises stage-append-publish
    writer: Mutex<()>,
}

impl AggregateRepository {
    /// Create a repository over `store` with an empty graph. Call [`replay`](Self::replay)
    /// to project existing history.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(NetworkGraph::new())),
            writer: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The latest published graph. Never waits for a writer.
    pub fn snapshot(&self) -> Arc<NetworkGraph> {
        self.snapshot.read().clone()
    }

    /// Rebuild the graph from every stream in commit order and publish it.
    ///
    /// Returns the number of events applied.
    #[instrument(skip(self))]
    pub async fn replay(&self) -> Result<usize> {
        let _guard = self.writer.lock().await;
        let started = Instant::now();

        let records = self.store.read_all().await?;
        let mut graph = NetworkGraph::new();
        for record in &records {
            let event = record.decode()?;
            graph.apply(&event).map_err(|err| {
                NetError::invalid_event_sequence(format!(
                    "Event {} at position {} (stream {}, sequence {}) was rejected: {}",
                    record.event_type,
                    record.global_position,
                    record.stream_id,
                    record.sequence_number,
                    err.user_message()
                ))
                .with_source(err)
            })?;
        }

        let count = records.len();
        NetworkMetrics::record_replayed(count);
        NetworkMetrics::set_graph_version(graph.version());
        info!(
            events = count,
            version = graph.version(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Graph replayed"
        );

        *self.snapshot.write() = Arc::new(graph);
        Ok(count)
    }

    /// Fold an aggregate's stream into its state.
    ///
    /// An unknown stream yields the default state at version 0.
    #[instrument(skip(self), fields(kind = A::KIND))]
    pub async fn load<A: Aggregate>(&self, id: AggregateId) -> Result<A> {
        let mut aggregate = A::default();
        for record in self.store.read(id).await? {
            aggregate.apply(&record.decode()?);
        }
        debug!(aggregate_id = %id, version = aggregate.version(), "Aggregate loaded");
        Ok(aggregate)
    }

    /// Persist and project a batch of events for one aggregate.
    ///
    /// Returns the new stream version.
    #[instrument(skip(self, events, metadata), fields(count = events.len()))]
    pub async fn save(
        &self,
        id: AggregateId,
        expected_version: u64,
        events: &[DomainEvent],
        metadata: &EventMetadata,
    ) -> Result<u64> {
        if let Some(foreign) = events.iter().find(|e| e.aggregate_id() != id) {
            return Err(NetError::internal(format!(
                "{} for {} cannot be saved to stream {}",
                foreign.event_type(),
                foreign.aggregate_id(),
                id
            )));
        }

        let encoded = events
            .iter()
            .map(|e| NewEvent::encode(e, metadata))
            .collect::<Result<Vec<_>>>()?;

        let _guard = self.writer.lock().await;

        let mut staged = NetworkGraph::clone(&self.snapshot());
        staged.apply_all(events)?;

        let version = match self.store.append(id, expected_version, encoded).await {
            Ok(version) => version,
            Err(err) => {
                if err.code() == ErrorCode::ConcurrencyConflict {
                    debug!(aggregate_id = %id, code = %err.code(), "Append rejected");
                } else {
                    warn!(aggregate_id = %id, error = %err, "Append failed, graph left unchanged");
                }
                return Err(err);
            }
        };

        if !events.is_empty() {
            NetworkMetrics::record_appended(events.len());
            NetworkMetrics::set_graph_version(staged.version());
            *self.snapshot.write() = Arc::new(staged);
        }

        debug!(aggregate_id = %id, version, "Events saved");
        Ok(version)
    }

    /// Raw history of one stream.
    pub async fn read_stream(&self, id: AggregateId) -> Result<Vec<StoredEvent>> {
        self.store.read(id).await
    }
}

impl std::fmt::Debug for AggregateRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("graph_version", &self.snapshot.read().version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::*;
    use uuid::Uuid;

    fn repository() -> AggregateRepository {
        AggregateRepository::new(Arc::new(InMemoryEventStore::new()))
    }

    fn node_added(node_id: Uuid) -> DomainEvent {
        DomainEvent::RouteNodeAdded(RouteNodeAdded {
            node_id,
            name: "N".to_string(),
            kind: RouteNodeKind::Building,
        })
    }

    #[tokio::test]
    async fn test_save_publishes_snapshot() {
        let repo = repository();
        let node = Uuid::new_v4();
        let before = repo.snapshot();

        let version = repo
            .save(AggregateId(node), 0, &[node_added(node)], &EventMetadata::system())
            .await
            .unwrap();

        assert_eq!(version, 1);
        assert!(before.get(node).is_none());
        assert!(repo.snapshot().get_live(node).is_some());

        let loaded: RouteNodeAggregate = repo.load(AggregateId(node)).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.kind, RouteNodeKind::Building);
    }

    #[tokio::test]
    async fn test_rejected_batch_writes_nothing() {
        let repo = repository();
        let node = Uuid::new_v4();
        let batch = vec![
            node_added(node),
            DomainEvent::RouteNodeRemoved(RouteNodeRemoved { node_id: node }),
            DomainEvent::RouteNodeRenamed(RouteNodeRenamed {
                node_id: node,
                name: "ghost".to_string(),
            }),
        ];

        let err = repo
            .save(AggregateId(node), 0, &batch, &EventMetadata::system())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert_eq!(repo.snapshot().version(), 0);
        assert!(repo.read_stream(AggregateId(node)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_event_is_refused() {
        let repo = repository();
        let err = repo
            .save(
                AggregateId::new(),
                0,
                &[node_added(Uuid::new_v4())],
                &EventMetadata::system(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[tokio::test]
    async fn test_replay_rebuilds_same_graph() {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let repo = AggregateRepository::new(store.clone());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.save(AggregateId(a), 0, &[node_added(a)], &EventMetadata::system())
            .await
            .unwrap();
        repo.save(AggregateId(b), 0, &[node_added(b)], &EventMetadata::system())
            .await
            .unwrap();

        let fresh = AggregateRepository::new(store);
        assert_eq!(fresh.replay().await.unwrap(), 2);
        assert_eq!(fresh.snapshot().stats(), repo.snapshot().stats());
        assert_eq!(fresh.snapshot().get(a), repo.snapshot().get(a));
    }
}
