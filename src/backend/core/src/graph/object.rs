//! Objects and links stored in the network graph.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{AggregateId, RouteNodeKind};

/// Discriminant of a graph object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    RouteNode,
    RouteSegment,
    SpanEquipment,
    SpanSegment,
    Terminal,
}

impl ElementKind {
    pub const ALL: [ElementKind; 5] = [
        ElementKind::RouteNode,
        ElementKind::RouteSegment,
        ElementKind::SpanEquipment,
        ElementKind::SpanSegment,
        ElementKind::Terminal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::RouteNode => "RouteNode",
            ElementKind::RouteSegment => "RouteSegment",
            ElementKind::SpanEquipment => "SpanEquipment",
            ElementKind::SpanSegment => "SpanSegment",
            ElementKind::Terminal => "Terminal",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Variant-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ElementData {
    RouteNode {
        name: String,
        node_kind: RouteNodeKind,
    },
    RouteSegment {
        from_node_id: Uuid,
        to_node_id: Uuid,
    },
    SpanEquipment {
        name: String,
        route_segment_ids: Vec<Uuid>,
        span_segment_ids: Vec<Uuid>,
    },
    SpanSegment {
        span_equipment_id: Uuid,
        index: usize,
    },
    Terminal {
        name: String,
        route_node_id: Option<Uuid>,
        network_root: bool,
        terminating: bool,
    },
}

/// One element of the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphObject {
    pub id: Uuid,
    /// Stream whose events create and mutate this object
    pub aggregate_id: AggregateId,
    /// Bumped on every mutation, including link changes
    pub version: u64,
    /// Tombstone flag; removed objects stay addressable
    pub removed: bool,
    #[serde(flatten)]
    pub data: ElementData,
}

impl GraphObject {
    pub fn new(id: Uuid, aggregate_id: AggregateId, data: ElementData) -> Self {
        Self {
            id,
            aggregate_id,
            version: 1,
            removed: false,
            data,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self.data {
            ElementData::RouteNode { .. } => ElementKind::RouteNode,
            ElementData::RouteSegment { .. } => ElementKind::RouteSegment,
            ElementData::SpanEquipment { .. } => ElementKind::SpanEquipment,
            ElementData::SpanSegment { .. } => ElementKind::SpanSegment,
            ElementData::Terminal { .. } => ElementKind::Terminal,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.removed
    }

    /// Display name, if the variant has one.
    pub fn name(&self) -> Option<&str> {
        match &self.data {
            ElementData::RouteNode { name, .. }
            | ElementData::SpanEquipment { name, .. }
            | ElementData::Terminal { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Terminal flagged as a network root.
    pub fn is_network_root(&self) -> bool {
        matches!(self.data, ElementData::Terminal { network_root: true, .. })
    }

    /// Terminal flagged as ending the signal path.
    pub fn is_terminating(&self) -> bool {
        matches!(self.data, ElementData::Terminal { terminating: true, .. })
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }
}

/// Layer a link belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Route node to route segment to route node
    Route,
    /// Route element to the equipment placed in it
    Placement,
    /// Utility connectivity between span segments and terminals
    Signal,
}

/// Edge weight: source is upstream, target is downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub kind: LinkKind,
    /// Aggregate whose events created the link; only it may drop the link
    pub owner: AggregateId,
    /// Creation order, used to order siblings deterministically
    pub seq: u64,
}
