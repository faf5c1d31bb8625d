//! Integration tests for the event stores and replay.

use std::sync::Arc;

use futures::future::join_all;
use tokio_test::assert_ok;
use netgraph_core::error::ErrorCode;
use netgraph_core::events::{
    AggregateId, DomainEvent, EventMetadata, EventStore, FileEventStore, InMemoryEventStore, NewEvent,
    RouteNodeAdded, RouteNodeKind, RouteNodeRenamed,
};
use netgraph_core::repository::AggregateRepository;
use uuid::Uuid;

fn node_added(node_id: Uuid, name: &str) -> DomainEvent {
    DomainEvent::RouteNodeAdded(RouteNodeAdded {
        node_id,
        name: name.to_string(),
        kind: RouteNodeKind::Junction,
    })
}

fn renamed(node_id: Uuid, name: &str) -> DomainEvent {
    DomainEvent::RouteNodeRenamed(RouteNodeRenamed {
        node_id,
        name: name.to_string(),
    })
}

fn encode(events: &[DomainEvent]) -> Vec<NewEvent> {
    events
        .iter()
        .map(|e| NewEvent::encode(e, &EventMetadata::system()).unwrap())
        .collect()
}

async fn stream_of_three(store: &dyn EventStore) -> AggregateId {
    let node_id = Uuid::new_v4();
    let stream = AggregateId(node_id);
    let version = store
        .append(
            stream,
            0,
            encode(&[node_added(node_id, "A"), renamed(node_id, "B"), renamed(node_id, "C")]),
        )
        .await
        .unwrap();
    assert_eq!(version, 3);
    stream
}

#[tokio::test]
async fn test_append_at_stale_version_conflicts() {
    let store = InMemoryEventStore::new();
    let stream = stream_of_three(&store).await;

    let err = store
        .append(stream, 2, encode(&[renamed(stream.0, "D")]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConcurrencyConflict);
    assert_eq!(store.stream_version(stream).await.unwrap(), 3);
}

#[tokio::test]
async fn test_concurrent_appends_at_same_version_commit_once() {
    let store = Arc::new(InMemoryEventStore::new());
    let stream = stream_of_three(store.as_ref()).await;

    let handles = (0..16).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .append(stream, 3, encode(&[renamed(stream.0, &format!("writer-{i}"))]))
                .await
        })
    });

    let mut committed = 0;
    for joined in join_all(handles).await {
        match joined.unwrap() {
            Ok(version) => {
                assert_eq!(version, 4);
                committed += 1;
            }
            Err(err) => assert_eq!(err.code(), ErrorCode::ConcurrencyConflict),
        }
    }
    assert_eq!(committed, 1);

    let events = store.read(stream).await.unwrap();
    let sequence: Vec<u64> = events.iter().map(|e| e.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_read_all_is_in_commit_order() {
    let store = InMemoryEventStore::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    store.append(AggregateId(a), 0, encode(&[node_added(a, "A")])).await.unwrap();
    store.append(AggregateId(b), 0, encode(&[node_added(b, "B")])).await.unwrap();
    store.append(AggregateId(a), 1, encode(&[renamed(a, "A2")])).await.unwrap();

    let all = store.read_all().await.unwrap();
    let order: Vec<(Uuid, u64)> = all.iter().map(|e| (e.stream_id.0, e.global_position)).collect();
    assert_eq!(order, vec![(a, 1), (b, 2), (a, 3)]);
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let node_id = Uuid::new_v4();

    {
        let store = FileEventStore::open(dir.path()).await.unwrap();
        assert_ok!(
            store
                .append(
                    AggregateId(node_id),
                    0,
                    encode(&[node_added(node_id, "Exchange"), renamed(node_id, "Exchange 2")]),
                )
                .await
        );
    }

    let store: Arc<dyn EventStore> = Arc::new(FileEventStore::open(dir.path()).await.unwrap());
    assert_eq!(store.stream_version(AggregateId(node_id)).await.unwrap(), 2);

    let repository = AggregateRepository::new(store.clone());
    assert_eq!(repository.replay().await.unwrap(), 2);

    let graph = repository.snapshot();
    assert_eq!(graph.version(), 2);
    assert_eq!(graph.get(node_id).and_then(|o| o.name()), Some("Exchange 2"));

    let err = store
        .append(AggregateId(node_id), 1, encode(&[renamed(node_id, "late")]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConcurrencyConflict);
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    for i in 0..5 {
        let id = Uuid::new_v4();
        store
            .append(AggregateId(id), 0, encode(&[node_added(id, &format!("node-{i}"))]))
            .await
            .unwrap();
    }

    let first = AggregateRepository::new(store.clone());
    let second = AggregateRepository::new(store);
    first.replay().await.unwrap();
    second.replay().await.unwrap();

    let a = first.snapshot();
    let b = second.snapshot();
    assert_eq!(a.version(), b.version());
    assert_eq!(a.stats(), b.stats());
    let mut left: Vec<_> = a.objects().cloned().collect();
    let mut right: Vec<_> = b.objects().cloned().collect();
    left.sort_by_key(|o| o.id);
    right.sort_by_key(|o| o.id);
    assert_eq!(left, right);
}
