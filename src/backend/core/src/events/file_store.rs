//! Durable event store backed by JSON-lines files.
//!
//! Layout: one `<stream-id>.jsonl` file per stream inside the store directory,
//! one `StoredEvent` per line. A batch is written with a single write and synced;
//! if anything fails the file is truncated back to its previous length.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, ErrorContext, NetError, Result};

use super::event::{AggregateId, NewEvent, StoredEvent};
use super::store::EventStore;

const STREAM_EXTENSION: &str = "jsonl";

#[derive(Debug, Default)]
struct FileStoreState {
    /// Last assigned global position
    position: u64,
    /// Version of every known stream
    versions: HashMap<AggregateId, u64>,
}

/// Event store persisting each stream as a JSON-lines file.
///
/// Appends are serialised by one writer lock; reads go straight to disk.
#[derive(Debug)]
pub struct FileEventStore {
    root: PathBuf,
    state: Mutex<FileStoreState>,
}

impl FileEventStore {
    /// Open (creating if needed) a store directory and index its streams.
    ///
    /// A trailing line left by an interrupted write is truncated away.
    #[instrument(skip_all, fields(path = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .await
            .with_error_code(ErrorCode::StorageUnavailable)?;

        let mut state = FileStoreState::default();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(stream_id) = stream_id_from_path(&path) else {
                continue;
            };

            let events = read_stream_file(&path, true).await?;
            if let Some(last) = events.last() {
                state.position = state.position.max(last.global_position);
            }
            state.versions.insert(stream_id, events.len() as u64);
        }

        info!(
            streams = state.versions.len(),
            position = state.position,
            "File event store opened"
        );

        Ok(Self {
            root,
            state: Mutex::new(state),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stream_path(&self, stream_id: AggregateId) -> PathBuf {
        self.root.join(format!("{}.{}", stream_id, STREAM_EXTENSION))
    }

    async fn write_batch(&self, path: &Path, buffer: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let previous_len = file.metadata().await?.len();

        let written = async {
            file.write_all(buffer).await?;
            file.sync_data().await
        }
        .await;

        if let Err(err) = written {
            warn!(path = %path.display(), error = %err, "Batch write failed, truncating");
            if let Err(truncate_err) = file.set_len(previous_len).await {
                return Err(NetError::storage_unavailable(format!(
                    "Write to {} failed and truncation failed: {}",
                    path.display(),
                    truncate_err
                ))
                .with_source(err));
            }
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn append(
        &self,
        stream_id: AggregateId,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;

        let current = state.versions.get(&stream_id).copied().unwrap_or(0);
        if current != expected_version {
            return Err(NetError::concurrency_conflict(stream_id.0, expected_version, current));
        }
        if events.is_empty() {
            return Ok(current);
        }

        let mut buffer = Vec::new();
        let mut position = state.position;
        let mut sequence = current;
        for event in events {
            position += 1;
            sequence += 1;
            let stored = event.into_stored(stream_id, sequence, position);
            serde_json::to_writer(&mut buffer, &stored)?;
            buffer.push(b'\n');
        }

        self.write_batch(&self.stream_path(stream_id), &buffer).await?;

        state.position = position;
        state.versions.insert(stream_id, sequence);
        debug!(stream_id = %stream_id, version = sequence, "Events persisted");
        Ok(sequence)
    }

    /// Returns the committed events only; a batch still being written is not visible.
    async fn read(&self, stream_id: AggregateId) -> Result<Vec<StoredEvent>> {
        let committed = {
            let state = self.state.lock().await;
            state.versions.get(&stream_id).copied().unwrap_or(0)
        };
        if committed == 0 {
            return Ok(Vec::new());
        }

        let path = self.stream_path(stream_id);
        let mut events = read_stream_file(&path, false).await?;
        if (events.len() as u64) < committed {
            return Err(NetError::invalid_event_sequence(format!(
                "Stream file {} holds {} events but {} were committed",
                path.display(),
                events.len(),
                committed
            )));
        }
        events.truncate(committed as usize);
        Ok(events)
    }

    async fn read_all(&self) -> Result<Vec<StoredEvent>> {
        let streams: Vec<AggregateId> = {
            let state = self.state.lock().await;
            state.versions.keys().copied().collect()
        };

        let mut all = Vec::new();
        for stream_id in streams {
            all.extend(self.read(stream_id).await?);
        }
        all.sort_by_key(|e| e.global_position);
        Ok(all)
    }

    async fn stream_version(&self, stream_id: AggregateId) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state.versions.get(&stream_id).copied().unwrap_or(0))
    }
}

fn stream_id_from_path(path: &Path) -> Option<AggregateId> {
    if path.extension()?.to_str()? != STREAM_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    Uuid::parse_str(stem).ok().map(AggregateId)
}

/// Parse a stream file, checking sequence numbers.
///
/// An unterminated final line belongs to a write in progress or one that was
/// interrupted. It is skipped, and with `repair` it is also cut off the file.
async fn read_stream_file(path: &Path, repair: bool) -> Result<Vec<StoredEvent>> {
    let bytes = fs::read(path).await?;

    let complete_len = match bytes.iter().rposition(|b| *b == b'\n') {
        Some(idx) => idx + 1,
        None => 0,
    };
    if complete_len < bytes.len() {
        if repair {
            warn!(path = %path.display(), "Truncating incomplete trailing record");
            let file = OpenOptions::new().write(true).open(path).await?;
            file.set_len(complete_len as u64).await?;
            file.sync_data().await?;
        } else {
            debug!(path = %path.display(), "Skipping incomplete trailing record");
        }
    }

    let content = std::str::from_utf8(&bytes[..complete_len]).map_err(|err| {
        NetError::invalid_event_sequence(format!("Stream file {} is not UTF-8: {}", path.display(), err))
    })?;

    let mut events = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let event: StoredEvent = serde_json::from_str(line)?;
        let expected = events.len() as u64 + 1;
        if event.sequence_number != expected {
            return Err(NetError::invalid_event_sequence(format!(
                "Stream file {} has sequence {} where {} was expected",
                path.display(),
                event.sequence_number,
                expected
            )));
        }
        events.push(event);
    }
    Ok(events)
}
