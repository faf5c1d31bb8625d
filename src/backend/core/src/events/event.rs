//! Event definitions and domain events for event sourcing.
//!
//! This module provides:
//! - Identifiers for events and aggregate streams
//! - `EventMetadata` describing who caused an event and why
//! - Domain events for the route network and the utility network
//! - `StoredEvent`, the versioned record kept by an event store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{NetError, Result};

/// Payload schema written by this build.
pub const EVENT_SCHEMA_VERSION: u32 = 2;

// =============================================================================
// Event IDs
// =============================================================================

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an aggregate, and of the stream holding its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateId(pub Uuid);

impl AggregateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AggregateId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Event Metadata
// =============================================================================

/// Metadata attached to every event of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Correlation ID shared by everything one client request caused
    pub correlation_id: Uuid,

    /// The command that produced the event
    pub command_id: Uuid,

    /// User that issued the command
    pub actor: Option<String>,
}

impl EventMetadata {
    pub fn new(correlation_id: Uuid, command_id: Uuid) -> Self {
        Self {
            correlation_id,
            command_id,
            actor: None,
        }
    }

    /// Metadata for events written outside a client command (tests, tooling).
    pub fn system() -> Self {
        Self::new(Uuid::new_v4(), Uuid::new_v4()).with_actor("system")
    }

    /// Set the actor.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

// =============================================================================
// Event Trait
// =============================================================================

/// Trait for domain events.
///
/// Events are immutable facts that have occurred in the network.
/// They are named in past tense (e.g. RouteNodeAdded, SpanSegmentConnected).
pub trait Event: Send + Sync + std::fmt::Debug {
    /// Get the event type name.
    fn event_type(&self) -> &'static str;

    /// Get the aggregate whose stream this event belongs to.
    fn aggregate_id(&self) -> AggregateId;
}

macro_rules! impl_event {
    ($ty:ident, $field:ident) => {
        impl Event for $ty {
            fn event_type(&self) -> &'static str {
                stringify!($ty)
            }

            fn aggregate_id(&self) -> AggregateId {
                AggregateId(self.$field)
            }
        }
    };
}

// =============================================================================
// Value Types
// =============================================================================

/// Classification of a route node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteNodeKind {
    CentralOffice,
    Cabinet,
    HandHole,
    Building,
    #[default]
    Junction,
}

/// One of the two ends of a span segment.
///
/// A connection at the `From` end makes the target the segment's upstream neighbour;
/// a connection at the `To` end makes the target a downstream neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentEnd {
    From,
    To,
}

impl std::fmt::Display for SegmentEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentEnd::From => write!(f, "from"),
            SegmentEnd::To => write!(f, "to"),
        }
    }
}

// =============================================================================
// Domain Events - Route Network
// =============================================================================

/// Event: A route node was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteNodeAdded {
    pub node_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub kind: RouteNodeKind,
}
impl_event!(RouteNodeAdded, node_id);

/// Event: A route node was renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteNodeRenamed {
    pub node_id: Uuid,
    pub name: String,
}
impl_event!(RouteNodeRenamed, node_id);

/// Event: A route node was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteNodeRemoved {
    pub node_id: Uuid,
}
impl_event!(RouteNodeRemoved, node_id);

/// Event: A route segment joining two nodes was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegmentAdded {
    pub segment_id: Uuid,
    pub from_node_id: Uuid,
    pub to_node_id: Uuid,
}
impl_event!(RouteSegmentAdded, segment_id);

/// Event: A route segment was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegmentRemoved {
    pub segment_id: Uuid,
}
impl_event!(RouteSegmentRemoved, segment_id);

// =============================================================================
// Domain Events - Utility Network
// =============================================================================

/// Event: A terminal was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalPlaced {
    pub terminal_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub route_node_id: Option<Uuid>,
    /// Terminal feeds the network (e.g. a central office port)
    #[serde(default)]
    pub network_root: bool,
    /// Terminal ends the signal path (e.g. a customer outlet)
    #[serde(default)]
    pub terminating: bool,
}
impl_event!(TerminalPlaced, terminal_id);

/// Event: A terminal was renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalRenamed {
    pub terminal_id: Uuid,
    pub name: String,
}
impl_event!(TerminalRenamed, terminal_id);

/// Event: A terminal was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalRemoved {
    pub terminal_id: Uuid,
}
impl_event!(TerminalRemoved, terminal_id);

/// Event: Span equipment was placed along a route, with its span segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEquipmentPlaced {
    pub span_equipment_id: Uuid,
    pub name: String,
    pub route_segment_ids: Vec<Uuid>,
    pub span_segment_ids: Vec<Uuid>,
}
impl_event!(SpanEquipmentPlaced, span_equipment_id);

/// Event: Span equipment was renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEquipmentRenamed {
    pub span_equipment_id: Uuid,
    pub name: String,
}
impl_event!(SpanEquipmentRenamed, span_equipment_id);

/// Event: One end of a span segment was connected to a terminal or another span segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanSegmentConnected {
    pub span_equipment_id: Uuid,
    pub span_segment_id: Uuid,
    pub end: SegmentEnd,
    pub target_id: Uuid,
}
impl_event!(SpanSegmentConnected, span_equipment_id);

/// Event: One end of a span segment was disconnected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanSegmentDisconnected {
    pub span_equipment_id: Uuid,
    pub span_segment_id: Uuid,
    pub end: SegmentEnd,
    pub target_id: Uuid,
}
impl_event!(SpanSegmentDisconnected, span_equipment_id);

/// Event: Span equipment was removed together with its span segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEquipmentRemoved {
    pub span_equipment_id: Uuid,
}
impl_event!(SpanEquipmentRemoved, span_equipment_id);

// =============================================================================
// Event Enumeration
// =============================================================================

/// All domain events in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // Route network
    RouteNodeAdded(RouteNodeAdded),
    RouteNodeRenamed(RouteNodeRenamed),
    RouteNodeRemoved(RouteNodeRemoved),
    RouteSegmentAdded(RouteSegmentAdded),
    RouteSegmentRemoved(RouteSegmentRemoved),

    // Utility network
    TerminalPlaced(TerminalPlaced),
    TerminalRenamed(TerminalRenamed),
    TerminalRemoved(TerminalRemoved),
    SpanEquipmentPlaced(SpanEquipmentPlaced),
    SpanEquipmentRenamed(SpanEquipmentRenamed),
    SpanSegmentConnected(SpanSegmentConnected),
    SpanSegmentDisconnected(SpanSegmentDisconnected),
    SpanEquipmentRemoved(SpanEquipmentRemoved),
}

impl DomainEvent {
    fn inner(&self) -> &dyn Event {
        match self {
            DomainEvent::RouteNodeAdded(e) => e,
            DomainEvent::RouteNodeRenamed(e) => e,
            DomainEvent::RouteNodeRemoved(e) => e,
            DomainEvent::RouteSegmentAdded(e) => e,
            DomainEvent::RouteSegmentRemoved(e) => e,
            DomainEvent::TerminalPlaced(e) => e,
            DomainEvent::TerminalRenamed(e) => e,
            DomainEvent::TerminalRemoved(e) => e,
            DomainEvent::SpanEquipmentPlaced(e) => e,
            DomainEvent::SpanEquipmentRenamed(e) => e,
            DomainEvent::SpanSegmentConnected(e) => e,
            DomainEvent::SpanSegmentDisconnected(e) => e,
            DomainEvent::SpanEquipmentRemoved(e) => e,
        }
    }
}

impl Event for DomainEvent {
    fn event_type(&self) -> &'static str {
        self.inner().event_type()
    }

    fn aggregate_id(&self) -> AggregateId {
        self.inner().aggregate_id()
    }
}

// =============================================================================
// Stored Records
// =============================================================================

/// An event as kept by an event store.
///
/// `sequence_number` starts at 1 per stream with no gaps; `global_position` orders
/// records across every stream in commit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub stream_id: AggregateId,
    pub sequence_number: u64,
    pub global_position: u64,
    pub event_type: String,
    pub schema_version: u32,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metadata: EventMetadata,
}

/// An encoded event that has not been assigned a position yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: String,
    pub schema_version: u32,
    pub payload: Value,
    pub metadata: EventMetadata,
}

impl NewEvent {
    /// Encode a domain event with the current payload schema.
    pub fn encode(event: &DomainEvent, metadata: &EventMetadata) -> Result<Self> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            schema_version: EVENT_SCHEMA_VERSION,
            payload: serde_json::to_value(event)?,
            metadata: metadata.clone(),
        })
    }

    /// Give the event its place in a stream.
    pub fn into_stored(
        self,
        stream_id: AggregateId,
        sequence_number: u64,
        global_position: u64,
    ) -> StoredEvent {
        StoredEvent {
            event_id: EventId::new(),
            stream_id,
            sequence_number,
            global_position,
            event_type: self.event_type,
            schema_version: self.schema_version,
            payload: self.payload,
            recorded_at: Utc::now(),
            metadata: self.metadata,
        }
    }
}

impl StoredEvent {
    /// Decode the payload, upcasting older schemas first.
    pub fn decode(&self) -> Result<DomainEvent> {
        let payload = upcast(&self.event_type, self.schema_version, self.payload.clone())?;
        let event: DomainEvent = serde_json::from_value(payload)?;

        if event.event_type() != self.event_type {
            return Err(NetError::invalid_event_sequence(format!(
                "Record {} declares {} but carries {}",
                self.event_id,
                self.event_type,
                event.event_type()
            )));
        }
        Ok(event)
    }
}

/// Event types whose payload carries a display `name`.
const NAMED_EVENT_TYPES: [&str; 6] = [
    "RouteNodeAdded",
    "RouteNodeRenamed",
    "TerminalPlaced",
    "TerminalRenamed",
    "SpanEquipmentPlaced",
    "SpanEquipmentRenamed",
];

/// Bring a payload written by an older schema up to `EVENT_SCHEMA_VERSION`.
///
/// Version 1 named the display field `label`.
fn upcast(event_type: &str, schema_version: u32, mut payload: Value) -> Result<Value> {
    match schema_version {
        EVENT_SCHEMA_VERSION => Ok(payload),
        1 => {
            if NAMED_EVENT_TYPES.contains(&event_type) {
                if let Some(fields) = payload.as_object_mut() {
                    if let Some(label) = fields.remove("label") {
                        fields.insert("name".to_string(), label);
                    }
                }
            }
            Ok(payload)
        }
        other => Err(NetError::new(
            crate::error::ErrorCode::DeserializationError,
            format!("Unsupported schema version {} for {}", other, event_type),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn node_added() -> DomainEvent {
        DomainEvent::RouteNodeAdded(RouteNodeAdded {
            node_id: Uuid::new_v4(),
            name: "CO-1".to_string(),
            kind: RouteNodeKind::CentralOffice,
        })
    }

    #[test]
    fn test_event_type_and_aggregate() {
        let event = node_added();
        assert_eq!(event.event_type(), "RouteNodeAdded");
        match &event {
            DomainEvent::RouteNodeAdded(e) => assert_eq!(event.aggregate_id(), AggregateId(e.node_id)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_connected_event_belongs_to_span_equipment_stream() {
        let equipment = Uuid::new_v4();
        let event = DomainEvent::SpanSegmentConnected(SpanSegmentConnected {
            span_equipment_id: equipment,
            span_segment_id: Uuid::new_v4(),
            end: SegmentEnd::From,
            target_id: Uuid::new_v4(),
        });
        assert_eq!(event.aggregate_id(), AggregateId(equipment));
    }

    #[test]
    fn test_payload_carries_discriminator() {
        let event = node_added();
        let encoded = NewEvent::encode(&event, &EventMetadata::system()).unwrap();
        assert_eq!(encoded.payload["type"], "RouteNodeAdded");
        assert_eq!(encoded.schema_version, EVENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_stored_event_decodes() {
        let event = node_added();
        let stored = NewEvent::encode(&event, &EventMetadata::system())
            .unwrap()
            .into_stored(event.aggregate_id(), 1, 1);
        assert_eq!(stored.decode().unwrap(), event);
    }

    fn v1_record(event_type: &str, id_field: &str, id: Uuid, mut extra: Value) -> StoredEvent {
        let mut payload = serde_json::json!({
            "type": event_type,
            "label": "Cabinet 7",
        });
        payload[id_field] = serde_json::json!(id);
        if let (Some(fields), Some(more)) = (payload.as_object_mut(), extra.as_object_mut()) {
            fields.append(more);
        }
        StoredEvent {
            event_id: EventId::new(),
            stream_id: AggregateId(id),
            sequence_number: 1,
            global_position: 1,
            event_type: event_type.to_string(),
            schema_version: 1,
            payload,
            recorded_at: Utc::now(),
            metadata: EventMetadata::system(),
        }
    }

    #[test]
    fn test_schema_v1_label_is_upcast() {
        let node_id = Uuid::new_v4();
        let stored = v1_record("RouteNodeAdded", "node_id", node_id, serde_json::json!({}));

        match stored.decode().unwrap() {
            DomainEvent::RouteNodeAdded(e) => {
                assert_eq!(e.name, "Cabinet 7");
                assert_eq!(e.kind, RouteNodeKind::Junction);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_schema_v1_route_node_rename_is_upcast() {
        let node_id = Uuid::new_v4();
        let stored = v1_record("RouteNodeRenamed", "node_id", node_id, serde_json::json!({}));
        assert_eq!(
            stored.decode().unwrap(),
            DomainEvent::RouteNodeRenamed(RouteNodeRenamed {
                node_id,
                name: "Cabinet 7".to_string(),
            })
        );
    }

    #[test]
    fn test_schema_v1_terminal_placement_is_upcast() {
        let terminal_id = Uuid::new_v4();
        let stored = v1_record(
            "TerminalPlaced",
            "terminal_id",
            terminal_id,
            serde_json::json!({ "network_root": true }),
        );
        match stored.decode().unwrap() {
            DomainEvent::TerminalPlaced(e) => {
                assert_eq!(e.name, "Cabinet 7");
                assert!(e.network_root);
                assert_eq!(e.route_node_id, None);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_schema_v1_terminal_rename_is_upcast() {
        let terminal_id = Uuid::new_v4();
        let stored = v1_record("TerminalRenamed", "terminal_id", terminal_id, serde_json::json!({}));
        assert_eq!(
            stored.decode().unwrap(),
            DomainEvent::TerminalRenamed(TerminalRenamed {
                terminal_id,
                name: "Cabinet 7".to_string(),
            })
        );
    }

    #[test]
    fn test_schema_v1_span_equipment_placement_is_upcast() {
        let span_equipment_id = Uuid::new_v4();
        let route_segment_id = Uuid::new_v4();
        let span_segment_id = Uuid::new_v4();
        let stored = v1_record(
            "SpanEquipmentPlaced",
            "span_equipment_id",
            span_equipment_id,
            serde_json::json!({
                "route_segment_ids": [route_segment_id],
                "span_segment_ids": [span_segment_id],
            }),
        );
        assert_eq!(
            stored.decode().unwrap(),
            DomainEvent::SpanEquipmentPlaced(SpanEquipmentPlaced {
                span_equipment_id,
                name: "Cabinet 7".to_string(),
                route_segment_ids: vec![route_segment_id],
                span_segment_ids: vec![span_segment_id],
            })
        );
    }

    #[test]
    fn test_schema_v1_span_equipment_rename_is_upcast() {
        let span_equipment_id = Uuid::new_v4();
        let stored = v1_record(
            "SpanEquipmentRenamed",
            "span_equipment_id",
            span_equipment_id,
            serde_json::json!({}),
        );
        assert_eq!(
            stored.decode().unwrap(),
            DomainEvent::SpanEquipmentRenamed(SpanEquipmentRenamed {
                span_equipment_id,
                name: "Cabinet 7".to_string(),
            })
        );
    }

    #[test]
    fn test_schema_v1_event_without_label_is_unchanged() {
        let node_id = Uuid::new_v4();
        let mut stored = v1_record("RouteNodeRemoved", "node_id", node_id, serde_json::json!({}));
        if let Some(fields) = stored.payload.as_object_mut() {
            fields.remove("label");
        }
        assert_eq!(
            stored.decode().unwrap(),
            DomainEvent::RouteNodeRemoved(RouteNodeRemoved { node_id })
        );
    }

    #[test]
    fn test_unknown_schema_version_is_rejected() {
        let event = node_added();
        let mut stored = NewEvent::encode(&event, &EventMetadata::system())
            .unwrap()
            .into_stored(event.aggregate_id(), 1, 1);
        stored.schema_version = 99;
        assert_eq!(stored.decode().unwrap_err().code(), ErrorCode::DeserializationError);
    }

    #[test]
    fn test_mismatched_event_type_is_rejected() {
        let event = node_added();
        let mut stored = NewEvent::encode(&event, &EventMetadata::system())
            .unwrap()
            .into_stored(event.aggregate_id(), 1, 1);
        stored.event_type = "TerminalPlaced".to_string();
        assert_eq!(stored.decode().unwrap_err().code(), ErrorCode::InvalidEventSequence);
    }
}
