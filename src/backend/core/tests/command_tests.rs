//! Integration tests for command dispatch, validation and concurrency.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use netgraph_core::commands::*;
use netgraph_core::config::Config;
use netgraph_core::context::NetworkContext;
use netgraph_core::error::{ErrorCode, NetError, Result};
use netgraph_core::events::{
    AggregateId, DomainEvent, EventMetadata, EventStore, InMemoryEventStore, NewEvent, RouteNodeKind,
    RouteNodeRenamed, SegmentEnd, SpanSegmentConnected, StoredEvent,
};
use netgraph_core::queries::GetElement;
use netgraph_core::repository::AggregateRepository;
use netgraph_core::trace::TraceRequest;
use uuid::Uuid;

/// Store whose appends can be switched to fail or to always lose the race.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryEventStore,
    failing: AtomicBool,
    conflicting: AtomicBool,
    appends: AtomicUsize,
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn append(&self, stream_id: AggregateId, expected_version: u64, events: Vec<NewEvent>) -> Result<u64> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(NetError::storage_unavailable("disk on fire"));
        }
        if self.conflicting.load(Ordering::SeqCst) {
            return Err(NetError::concurrency_conflict(stream_id.0, expected_version, expected_version + 1));
        }
        self.inner.append(stream_id, expected_version, events).await
    }

    async fn read(&self, stream_id: AggregateId) -> Result<Vec<StoredEvent>> {
        self.inner.read(stream_id).await
    }

    async fn read_all(&self) -> Result<Vec<StoredEvent>> {
        self.inner.read_all().await
    }

    async fn stream_version(&self, stream_id: AggregateId) -> Result<u64> {
        self.inner.stream_version(stream_id).await
    }
}

fn user() -> UserContext {
    UserContext::new("planner")
}

async fn context() -> NetworkContext {
    NetworkContext::initialize(&Config::default()).await.unwrap()
}

async fn add_node(context: &NetworkContext, name: &str) -> Uuid {
    let node_id = Uuid::new_v4();
    context
        .execute(
            NetworkCommand::AddRouteNode(AddRouteNode {
                node_id,
                name: name.to_string(),
                kind: RouteNodeKind::Cabinet,
            }),
            user(),
        )
        .await
        .unwrap();
    node_id
}

async fn add_segment(context: &NetworkContext, from_node_id: Uuid, to_node_id: Uuid) -> Uuid {
    let segment_id = Uuid::new_v4();
    context
        .execute(
            NetworkCommand::AddRouteSegment(AddRouteSegment {
                segment_id,
                from_node_id,
                to_node_id,
            }),
            user(),
        )
        .await
        .unwrap();
    segment_id
}

async fn place_terminal(context: &NetworkContext, name: &str, network_root: bool, terminating: bool) -> Uuid {
    let terminal_id = Uuid::new_v4();
    context
        .execute(
            NetworkCommand::PlaceTerminal(PlaceTerminal {
                terminal_id,
                name: name.to_string(),
                route_node_id: None,
                network_root,
                terminating,
            }),
            user(),
        )
        .await
        .unwrap();
    terminal_id
}

/// Place span equipment with `segments` span segments; returns (equipment, span segments).
async fn place_equipment(context: &NetworkContext, route_segment_id: Uuid, segments: usize) -> (Uuid, Vec<Uuid>) {
    let span_equipment_id = Uuid::new_v4();
    let span_segment_ids: Vec<Uuid> = (0..segments).map(|_| Uuid::new_v4()).collect();
    context
        .execute(
            NetworkCommand::PlaceSpanEquipment(PlaceSpanEquipment {
                span_equipment_id,
                name: "Cable".to_string(),
                route_segment_ids: vec![route_segment_id],
                span_segment_ids: span_segment_ids.clone(),
            }),
            user(),
        )
        .await
        .unwrap();
    (span_equipment_id, span_segment_ids)
}

fn connect(span_equipment_id: Uuid, span_segment_id: Uuid, end: SegmentEnd, target_id: Uuid) -> NetworkCommand {
    NetworkCommand::ConnectSpanSegment(ConnectSpanSegment {
        span_equipment_id,
        span_segment_id,
        end,
        target_id,
    })
}

#[tokio::test]
async fn test_duplicate_node_is_rejected() {
    let context = context().await;
    let node_id = add_node(&context, "CO").await;

    let err = context
        .execute(
            NetworkCommand::AddRouteNode(AddRouteNode {
                node_id,
                name: "CO again".to_string(),
                kind: RouteNodeKind::CentralOffice,
            }),
            user(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateElement);
    assert_eq!(context.snapshot().version(), 1);
}

#[tokio::test]
async fn test_segment_to_missing_node_is_rejected() {
    let context = context().await;
    let n1 = add_node(&context, "A").await;

    let err = context
        .execute(
            NetworkCommand::AddRouteSegment(AddRouteSegment {
                segment_id: Uuid::new_v4(),
                from_node_id: n1,
                to_node_id: Uuid::new_v4(),
            }),
            user(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ElementNotFound);
}

#[tokio::test]
async fn test_empty_name_is_rejected() {
    let context = context().await;
    let err = context
        .execute(
            NetworkCommand::AddRouteNode(AddRouteNode {
                node_id: Uuid::new_v4(),
                name: "   ".to_string(),
                kind: RouteNodeKind::Junction,
            }),
            user(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);
}

#[tokio::test]
async fn test_events_carry_command_metadata() {
    let context = context().await;
    let node_id = add_node(&context, "CO").await;

    let history = context.repository().read_stream(AggregateId(node_id)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_type, "RouteNodeAdded");
    assert_eq!(history[0].metadata.actor.as_deref(), Some("planner"));
}

#[tokio::test]
async fn test_concurrent_saves_at_same_version_commit_once() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let repository = Arc::new(AggregateRepository::new(store));
    let node_id = Uuid::new_v4();
    let stream = AggregateId(node_id);

    repository
        .save(
            stream,
            0,
            &[DomainEvent::RouteNodeAdded(netgraph_core::events::RouteNodeAdded {
                node_id,
                name: "v1".to_string(),
                kind: RouteNodeKind::Junction,
            })],
            &EventMetadata::system(),
        )
        .await
        .unwrap();
    for name in ["v2", "v3"] {
        let version = repository.store().stream_version(stream).await.unwrap();
        repository
            .save(
                stream,
                version,
                &[DomainEvent::RouteNodeRenamed(RouteNodeRenamed {
                    node_id,
                    name: name.to_string(),
                })],
                &EventMetadata::system(),
            )
            .await
            .unwrap();
    }

    let rename = |name: &'static str| {
        let repository = repository.clone();
        tokio::spawn(async move {
            repository
                .save(
                    stream,
                    3,
                    &[DomainEvent::RouteNodeRenamed(RouteNodeRenamed {
                        node_id,
                        name: name.to_string(),
                    })],
                    &EventMetadata::system(),
                )
                .await
        })
    };
    let (left, right) = tokio::join!(rename("left"), rename("right"));
    let results = [left.unwrap(), right.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let conflict = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(conflict.code(), ErrorCode::ConcurrencyConflict);
    assert_eq!(repository.snapshot().version(), 4);
    assert_eq!(repository.store().stream_version(stream).await.unwrap(), 4);
}

#[tokio::test]
async fn test_conflicting_commands_are_retried() {
    let context = Arc::new(context().await);
    let node_id = add_node(&context, "CO").await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let context = context.clone();
        handles.push(tokio::spawn(async move {
            context
                .execute(
                    NetworkCommand::RenameRouteNode(RenameRouteNode {
                        node_id,
                        name: format!("CO-{i}"),
                    }),
                    user(),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = context.repository().read_stream(AggregateId(node_id)).await.unwrap();
    assert_eq!(history.len(), 5);
}

#[tokio::test]
async fn test_exhausted_conflict_retries_reach_the_caller() {
    let store = Arc::new(FlakyStore::default());
    let context = NetworkContext::with_store(store.clone(), &Config::default())
        .await
        .unwrap();
    let node_id = add_node(&context, "CO").await;
    let before = context.snapshot();

    store.conflicting.store(true, Ordering::SeqCst);
    store.appends.store(0, Ordering::SeqCst);
    let err = context
        .execute(
            NetworkCommand::RenameRouteNode(RenameRouteNode {
                node_id,
                name: "Renamed".to_string(),
            }),
            user(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConcurrencyConflict);
    // One attempt plus the three default retries.
    assert_eq!(store.appends.load(Ordering::SeqCst), 4);

    let after = context.snapshot();
    assert_eq!(after.version(), before.version());
    assert_eq!(after.get(node_id).and_then(|o| o.name()), Some("CO"));
    assert_eq!(store.stream_version(AggregateId(node_id)).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_append_leaves_graph_unchanged() {
    let store = Arc::new(FlakyStore::default());
    let context = NetworkContext::with_store(store.clone(), &Config::default())
        .await
        .unwrap();
    let node_id = add_node(&context, "CO").await;
    let before = context.snapshot();

    store.failing.store(true, Ordering::SeqCst);
    let err = context
        .execute(
            NetworkCommand::RenameRouteNode(RenameRouteNode {
                node_id,
                name: "Renamed".to_string(),
            }),
            user(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StorageUnavailable);

    let after = context.snapshot();
    assert_eq!(after.version(), before.version());
    let element = context
        .query(
            GetElement {
                element_id: node_id,
                include_removed: false,
            },
            user(),
        )
        .unwrap();
    assert_eq!(element.name(), Some("CO"));
}

#[tokio::test]
async fn test_signal_chain_and_trace() {
    let context = context().await;
    let n1 = add_node(&context, "CO").await;
    let n2 = add_node(&context, "Street").await;
    let s1 = add_segment(&context, n1, n2).await;
    let root = place_terminal(&context, "OLT", true, false).await;
    let leaf = place_terminal(&context, "ONT", false, true).await;
    let (cable, segs) = place_equipment(&context, s1, 2).await;

    context.execute(connect(cable, segs[0], SegmentEnd::From, root), user()).await.unwrap();
    context.execute(connect(cable, segs[0], SegmentEnd::To, segs[1]), user()).await.unwrap();
    context.execute(connect(cable, segs[1], SegmentEnd::To, leaf), user()).await.unwrap();

    let result = context.trace(TraceRequest::new(segs[1])).await.unwrap();
    assert_eq!(result.upstream_ids(), vec![segs[0], root]);
    assert_eq!(result.downstream_ids(), vec![segs[1], leaf]);
    assert_eq!(result.linearized_ids(), vec![root, segs[0], segs[1], leaf]);
}

#[tokio::test]
async fn test_second_upstream_is_rejected() {
    let context = context().await;
    let n1 = add_node(&context, "A").await;
    let n2 = add_node(&context, "B").await;
    let s1 = add_segment(&context, n1, n2).await;
    let t1 = place_terminal(&context, "T1", false, false).await;
    let t2 = place_terminal(&context, "T2", false, false).await;
    let (cable, segs) = place_equipment(&context, s1, 1).await;

    context.execute(connect(cable, segs[0], SegmentEnd::To, t1), user()).await.unwrap();

    let (other, other_segs) = place_equipment(&context, s1, 1).await;
    let err = context
        .execute(connect(other, other_segs[0], SegmentEnd::To, t1), user())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);

    let err = context
        .execute(connect(cable, segs[0], SegmentEnd::To, t2), user())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);
}

#[tokio::test]
async fn test_connection_closing_a_loop_is_rejected() {
    let context = context().await;
    let n1 = add_node(&context, "A").await;
    let n2 = add_node(&context, "B").await;
    let s1 = add_segment(&context, n1, n2).await;
    let (cable, segs) = place_equipment(&context, s1, 2).await;

    context.execute(connect(cable, segs[0], SegmentEnd::To, segs[1]), user()).await.unwrap();
    let err = context
        .execute(connect(cable, segs[1], SegmentEnd::To, segs[0]), user())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CycleDetected);
}

#[tokio::test]
async fn test_loop_from_separate_equipment_streams_is_rejected_on_save() {
    let context = context().await;
    let n1 = add_node(&context, "A").await;
    let n2 = add_node(&context, "B").await;
    let s1 = add_segment(&context, n1, n2).await;
    let (first, first_segs) = place_equipment(&context, s1, 1).await;
    let (second, second_segs) = place_equipment(&context, s1, 1).await;
    let (a, b) = (first_segs[0], second_segs[0]);

    // Both connections were decided against a graph without the other one.
    let connected = |span_equipment_id: Uuid, span_segment_id: Uuid, target_id: Uuid| {
        DomainEvent::SpanSegmentConnected(SpanSegmentConnected {
            span_equipment_id,
            span_segment_id,
            end: SegmentEnd::To,
            target_id,
        })
    };
    let repository = context.repository();
    let first_version = repository.store().stream_version(AggregateId(first)).await.unwrap();
    let second_version = repository.store().stream_version(AggregateId(second)).await.unwrap();

    repository
        .save(AggregateId(first), first_version, &[connected(first, a, b)], &EventMetadata::system())
        .await
        .unwrap();
    let graph_version = repository.snapshot().version();

    let err = repository
        .save(AggregateId(second), second_version, &[connected(second, b, a)], &EventMetadata::system())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CycleDetected);
    assert_eq!(repository.snapshot().version(), graph_version);
    assert_eq!(
        repository.store().stream_version(AggregateId(second)).await.unwrap(),
        second_version
    );

    let result = context.trace(TraceRequest::new(a)).await.unwrap();
    assert_eq!(result.downstream_ids(), vec![a, b]);
}

#[tokio::test]
async fn test_removed_equipment_tombstones_its_segments() {
    let context = context().await;
    let n1 = add_node(&context, "A").await;
    let n2 = add_node(&context, "B").await;
    let s1 = add_segment(&context, n1, n2).await;
    let t1 = place_terminal(&context, "T1", false, false).await;
    let (cable, segs) = place_equipment(&context, s1, 1).await;
    context.execute(connect(cable, segs[0], SegmentEnd::From, t1), user()).await.unwrap();

    context
        .execute(
            NetworkCommand::RemoveSpanEquipment(RemoveSpanEquipment {
                span_equipment_id: cable,
            }),
            user(),
        )
        .await
        .unwrap();

    let graph = context.snapshot();
    assert!(graph.get(segs[0]).map(|o| o.removed).unwrap_or(false));
    assert!(graph.get_live(cable).is_none());

    let result = context.trace(TraceRequest::new(segs[0])).await.unwrap();
    assert!(result.downstream.is_empty());
    assert!(result.upstream.is_empty());
    assert_eq!(result.source.map(|o| o.id), Some(segs[0]));

    let err = context
        .execute(
            NetworkCommand::RenameSpanEquipment(RenameSpanEquipment {
                span_equipment_id: cable,
                name: "Gone".to_string(),
            }),
            user(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);
}
