//! Aggregate trait and implementations for event-sourced state reconstruction.
//!
//! Aggregates are domain objects that can be rebuilt from a stream of events.
//! Each aggregate implements `Default` (empty state) and `apply` (fold an event).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{DomainEvent, RouteNodeKind, SegmentEnd};

// =============================================================================
// Aggregate Trait
// =============================================================================

/// Trait for aggregates that can be reconstructed from a sequence of domain events.
///
/// An aggregate starts at its `Default` state and folds each event via `apply`.
/// Given the same event stream, the resulting state is deterministic.
pub trait Aggregate: Default + Send + Sync + 'static {
    /// Name used in logs and errors.
    const KIND: &'static str;

    /// Apply a single domain event to mutate state.
    ///
    /// Implementations must be pure functions of `(self, event) -> self'`.
    /// They must not perform I/O or fail; every persisted event is valid by definition.
    fn apply(&mut self, event: &DomainEvent);

    /// Number of events applied, i.e. the stream version.
    fn version(&self) -> u64;

    /// Whether the stream has a creation event.
    fn exists(&self) -> bool;

    /// Whether the aggregate has been tombstoned.
    fn is_removed(&self) -> bool;

    /// Exists and is not tombstoned.
    fn is_live(&self) -> bool {
        self.exists() && !self.is_removed()
    }
}

// =============================================================================
// Route Node Aggregate
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteNodeAggregate {
    pub node_id: Option<Uuid>,
    pub name: String,
    pub kind: RouteNodeKind,
    pub removed: bool,
    pub version: u64,
}

impl Aggregate for RouteNodeAggregate {
    const KIND: &'static str = "RouteNode";

    fn apply(&mut self, event: &DomainEvent) {
        self.version += 1;

        match event {
            DomainEvent::RouteNodeAdded(e) => {
                self.node_id = Some(e.node_id);
                self.name = e.name.clone();
                self.kind = e.kind;
            }
            DomainEvent::RouteNodeRenamed(e) => {
                self.name = e.name.clone();
            }
            DomainEvent::RouteNodeRemoved(_) => {
                self.removed = true;
            }
            _ => {}
        }
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn exists(&self) -> bool {
        self.node_id.is_some()
    }

    fn is_removed(&self) -> bool {
        self.removed
    }
}

// =============================================================================
// Route Segment Aggregate
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteSegmentAggregate {
    pub segment_id: Option<Uuid>,
    pub from_node_id: Option<Uuid>,
    pub to_node_id: Option<Uuid>,
    pub removed: bool,
    pub version: u64,
}

impl Aggregate for RouteSegmentAggregate {
    const KIND: &'static str = "RouteSegment";

    fn apply(&mut self, event: &DomainEvent) {
        self.version += 1;

        match event {
            DomainEvent::RouteSegmentAdded(e) => {
                self.segment_id = Some(e.segment_id);
                self.from_node_id = Some(e.from_node_id);
                self.to_node_id = Some(e.to_node_id);
            }
            DomainEvent::RouteSegmentRemoved(_) => {
                self.removed = true;
            }
            _ => {}
        }
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn exists(&self) -> bool {
        self.segment_id.is_some()
    }

    fn is_removed(&self) -> bool {
        self.removed
    }
}

// =============================================================================
// Terminal Aggregate
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalAggregate {
    pub terminal_id: Option<Uuid>,
    pub name: String,
    pub route_node_id: Option<Uuid>,
    pub network_root: bool,
    pub terminating: bool,
    pub removed: bool,
    pub version: u64,
}

impl Aggregate for TerminalAggregate {
    const KIND: &'static str = "Terminal";

    fn apply(&mut self, event: &DomainEvent) {
        self.version += 1;

        match event {
            DomainEvent::TerminalPlaced(e) => {
                self.terminal_id = Some(e.terminal_id);
                self.name = e.name.clone();
                self.route_node_id = e.route_node_id;
                self.network_root = e.network_root;
                self.terminating = e.terminating;
            }
            DomainEvent::TerminalRenamed(e) => {
                self.name = e.name.clone();
            }
            DomainEvent::TerminalRemoved(_) => {
                self.removed = true;
            }
            _ => {}
        }
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn exists(&self) -> bool {
        self.terminal_id.is_some()
    }

    fn is_removed(&self) -> bool {
        self.removed
    }
}

// =============================================================================
// Span Equipment Aggregate
// =============================================================================

/// A connection held by one end of a span segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanConnection {
    pub span_segment_id: Uuid,
    pub end: SegmentEnd,
    pub target_id: Uuid,
}

/// Span equipment together with the span segments it owns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEquipmentAggregate {
    pub span_equipment_id: Option<Uuid>,
    pub name: String,
    pub route_segment_ids: Vec<Uuid>,
    pub span_segment_ids: Vec<Uuid>,
    /// Live connections in the order they were made
    pub connections: Vec<SpanConnection>,
    pub removed: bool,
    pub version: u64,
}

impl SpanEquipmentAggregate {
    pub fn owns_segment(&self, span_segment_id: Uuid) -> bool {
        self.span_segment_ids.contains(&span_segment_id)
    }

    /// Connection currently held at `end` of a span segment, if any.
    pub fn connection_at(&self, span_segment_id: Uuid, end: SegmentEnd) -> Option<&SpanConnection> {
        self.connections
            .iter()
            .find(|c| c.span_segment_id == span_segment_id && c.end == end)
    }
}

impl Aggregate for SpanEquipmentAggregate {
    const KIND: &'static str = "SpanEquipment";

    fn apply(&mut self, event: &DomainEvent) {
        self.version += 1;

        match event {
            DomainEvent::SpanEquipmentPlaced(e) => {
                self.span_equipment_id = Some(e.span_equipment_id);
                self.name = e.name.clone();
                self.route_segment_ids = e.route_segment_ids.clone();
                self.span_segment_ids = e.span_segment_ids.clone();
            }
            DomainEvent::SpanEquipmentRenamed(e) => {
                self.name = e.name.clone();
            }
            DomainEvent::SpanSegmentConnected(e) => {
                self.connections.push(SpanConnection {
                    span_segment_id: e.span_segment_id,
                    end: e.end,
                    target_id: e.target_id,
                });
            }
            DomainEvent::SpanSegmentDisconnected(e) => {
                self.connections.retain(|c| {
                    !(c.span_segment_id == e.span_segment_id
                        && c.end == e.end
                        && c.target_id == e.target_id)
                });
            }
            DomainEvent::SpanEquipmentRemoved(_) => {
                self.removed = true;
                self.connections.clear();
            }
            _ => {}
        }
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn exists(&self) -> bool {
        self.span_equipment_id.is_some()
    }

    fn is_removed(&self) -> bool {
        self.removed
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::*;

    #[test]
    fn test_route_node_lifecycle() {
        let node_id = Uuid::new_v4();
        let events = vec![
            DomainEvent::RouteNodeAdded(RouteNodeAdded {
                node_id,
                name: "N1".to_string(),
                kind: RouteNodeKind::Cabinet,
            }),
            DomainEvent::RouteNodeRenamed(RouteNodeRenamed {
                node_id,
                name: "N1-east".to_string(),
            }),
            DomainEvent::RouteNodeRenamed(RouteNodeRenamed {
                node_id,
                name: "N1-west".to_string(),
            }),
        ];

        let mut agg = RouteNodeAggregate::default();
        for e in &events {
            agg.apply(e);
        }

        assert_eq!(agg.node_id, Some(node_id));
        assert_eq!(agg.name, "N1-west");
        assert_eq!(agg.kind, RouteNodeKind::Cabinet);
        assert_eq!(agg.version, 3);
        assert!(agg.is_live());

        agg.apply(&DomainEvent::RouteNodeRemoved(RouteNodeRemoved { node_id }));
        assert!(agg.exists());
        assert!(!agg.is_live());
        assert_eq!(agg.version(), 4);
    }

    #[test]
    fn test_empty_stream_is_absent() {
        let agg = TerminalAggregate::default();
        assert!(!agg.exists());
        assert!(!agg.is_live());
        assert_eq!(agg.version(), 0);
    }

    #[test]
    fn test_span_equipment_connections() {
        let equipment = Uuid::new_v4();
        let segment = Uuid::new_v4();
        let terminal = Uuid::new_v4();

        let events = vec![
            DomainEvent::SpanEquipmentPlaced(SpanEquipmentPlaced {
                span_equipment_id: equipment,
                name: "Cable 1".to_string(),
                route_segment_ids: vec![Uuid::new_v4()],
                span_segment_ids: vec![segment],
            }),
            DomainEvent::SpanSegmentConnected(SpanSegmentConnected {
                span_equipment_id: equipment,
                span_segment_id: segment,
                end: SegmentEnd::From,
                target_id: terminal,
            }),
        ];

        let mut agg = SpanEquipmentAggregate::default();
        for e in &events {
            agg.apply(e);
        }

        assert!(agg.owns_segment(segment));
        assert_eq!(
            agg.connection_at(segment, SegmentEnd::From).map(|c| c.target_id),
            Some(terminal)
        );
        assert!(agg.connection_at(segment, SegmentEnd::To).is_none());

        agg.apply(&DomainEvent::SpanSegmentDisconnected(SpanSegmentDisconnected {
            span_equipment_id: equipment,
            span_segment_id: segment,
            end: SegmentEnd::From,
            target_id: terminal,
        }));
        assert!(agg.connections.is_empty());
        assert_eq!(agg.version, 3);
    }
}
