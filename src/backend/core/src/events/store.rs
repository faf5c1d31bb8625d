//! Append-only event store with optimistic concurrency.
//!
//! Every aggregate owns one stream. Appends carry the version the writer last
//! saw; a mismatch fails with `ConcurrencyConflict` and writes nothing.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{NetError, Result};

use super::event::{AggregateId, NewEvent, StoredEvent};

// =============================================================================
// Event Store Trait
// =============================================================================

/// Append-only, per-stream event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch to a stream.
    ///
    /// The batch is written atomically with contiguous sequence numbers starting at
    /// `expected_version + 1`. Returns the new stream version. An empty batch writes
    /// nothing but still checks `expected_version`.
    async fn append(
        &self,
        stream_id: AggregateId,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64>;

    /// Read a whole stream in sequence order; unknown streams are empty.
    async fn read(&self, stream_id: AggregateId) -> Result<Vec<StoredEvent>>;

    /// Read every stream in global commit order.
    async fn read_all(&self) -> Result<Vec<StoredEvent>>;

    /// Current version (number of events) of a stream.
    async fn stream_version(&self, stream_id: AggregateId) -> Result<u64>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Volatile event store for tests and single-process use.
///
/// Appends to the same stream serialise on that stream's lock; the global log
/// lock is only held while positions are assigned.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: DashMap<AggregateId, Arc<Mutex<Vec<StoredEvent>>>>,
    log: RwLock<Vec<StoredEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, stream_id: AggregateId) -> Arc<Mutex<Vec<StoredEvent>>> {
        self.streams.entry(stream_id).or_default().clone()
    }

    /// Total number of stored events across all streams.
    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn append(
        &self,
        stream_id: AggregateId,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64> {
        let stream = self.stream(stream_id);
        let mut stream = stream.lock();

        let current = stream.len() as u64;
        if current != expected_version {
            return Err(NetError::concurrency_conflict(stream_id.0, expected_version, current));
        }
        if events.is_empty() {
            return Ok(current);
        }

        let mut log = self.log.write();
        let mut position = log.len() as u64;
        let mut sequence = current;
        for event in events {
            position += 1;
            sequence += 1;
            let stored = event.into_stored(stream_id, sequence, position);
            log.push(stored.clone());
            stream.push(stored);
        }

        debug!(stream_id = %stream_id, version = sequence, "Events appended");
        Ok(sequence)
    }

    async fn read(&self, stream_id: AggregateId) -> Result<Vec<StoredEvent>> {
        Ok(self
            .streams
            .get(&stream_id)
            .map(|s| s.lock().clone())
            .unwrap_or_default())
    }

    async fn read_all(&self) -> Result<Vec<StoredEvent>> {
        Ok(self.log.read().clone())
    }

    async fn stream_version(&self, stream_id: AggregateId) -> Result<u64> {
        Ok(self
            .streams
            .get(&stream_id)
            .map(|s| s.lock().len() as u64)
            .unwrap_or(0))
    }
}
