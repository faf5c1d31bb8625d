//! The versioned network graph and its event projection.

use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{EdgeIndex, EdgeReference, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeFiltered, EdgeRef};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{ErrorCode, NetError, Result};
use crate::events::{AggregateId, DomainEvent, SegmentEnd};

use super::object::{ElementData, ElementKind, GraphObject, Link, LinkKind};

/// Arena of network elements indexed by id.
///
/// Edges only ever join live objects. The version advances once per applied event.
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    /// The underlying graph structure
    graph: StableDiGraph<GraphObject, Link>,

    /// Map from element id to node index for O(1) lookup
    index: HashMap<Uuid, NodeIndex>,

    version: u64,

    next_link_seq: u64,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of objects, tombstones included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look up an object, tombstoned or not.
    pub fn get(&self, id: Uuid) -> Option<&GraphObject> {
        self.index.get(&id).map(|idx| &self.graph[*idx])
    }

    /// Look up a live object.
    pub fn get_live(&self, id: Uuid) -> Option<&GraphObject> {
        self.get(id).filter(|o| o.is_live())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &GraphObject> {
        self.graph.node_weights()
    }

    // =========================================================================
    // Traversal helpers
    // =========================================================================

    /// Neighbours over links of `kind` in `direction`, in link creation order.
    pub fn neighbours(&self, id: Uuid, kind: LinkKind, direction: Direction) -> Vec<Uuid> {
        let Some(&idx) = self.index.get(&id) else {
            return Vec::new();
        };

        let mut links: Vec<(u64, NodeIndex)> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| e.weight().kind == kind)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (e.weight().seq, other)
            })
            .collect();
        links.sort_by_key(|(seq, _)| *seq);
        links.into_iter().map(|(_, n)| self.graph[n].id).collect()
    }

    /// The single upstream neighbour over `kind` links, if any.
    pub fn upstream(&self, id: Uuid, kind: LinkKind) -> Option<Uuid> {
        self.neighbours(id, kind, Direction::Incoming).into_iter().next()
    }

    pub fn downstream(&self, id: Uuid, kind: LinkKind) -> Vec<Uuid> {
        self.neighbours(id, kind, Direction::Outgoing)
    }

    /// Whether `to` is reachable from `from` over links of `kind`.
    pub fn has_path(&self, from: Uuid, to: Uuid, kind: LinkKind) -> bool {
        let (Some(&a), Some(&b)) = (self.index.get(&from), self.index.get(&to)) else {
            return false;
        };
        let filtered =
            EdgeFiltered::from_fn(&self.graph, |e: EdgeReference<'_, Link>| e.weight().kind == kind);
        has_path_connecting(&filtered, a, b, None)
    }

    /// Counts by kind plus tombstones and edges.
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            version: self.version,
            edges: self.graph.edge_count(),
            ..Default::default()
        };

        for object in self.graph.node_weights() {
            if object.removed {
                stats.tombstones += 1;
                continue;
            }
            match object.kind() {
                ElementKind::RouteNode => stats.route_nodes += 1,
                ElementKind::RouteSegment => stats.route_segments += 1,
                ElementKind::SpanEquipment => stats.span_equipment += 1,
                ElementKind::SpanSegment => stats.span_segments += 1,
                ElementKind::Terminal => stats.terminals += 1,
            }
        }
        stats
    }

    // =========================================================================
    // Event projection
    // =========================================================================

    /// Apply a batch in order. Stops at the first rejected event; callers that need
    /// all-or-nothing apply to a clone.
    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a DomainEvent>) -> Result<()> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Apply one event, enforcing every graph invariant.
    pub fn apply(&mut self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::RouteNodeAdded(e) => {
                self.insert(GraphObject::new(
                    e.node_id,
                    AggregateId(e.node_id),
                    ElementData::RouteNode {
                        name: e.name.clone(),
                        node_kind: e.kind,
                    },
                ))?;
            }
            DomainEvent::RouteNodeRenamed(e) => {
                self.rename(e.node_id, ElementKind::RouteNode, &e.name)?;
            }
            DomainEvent::RouteNodeRemoved(e) => {
                self.remove(e.node_id, ElementKind::RouteNode)?;
            }
            DomainEvent::RouteSegmentAdded(e) => {
                if e.from_node_id == e.to_node_id {
                    return Err(NetError::validation("A route segment must join two distinct nodes")
                        .with_context("node_id", e.from_node_id));
                }
                self.live_index_of(e.from_node_id, ElementKind::RouteNode)?;
                self.live_index_of(e.to_node_id, ElementKind::RouteNode)?;
                self.ensure_absent(e.segment_id)?;

                let owner = AggregateId(e.segment_id);
                self.insert(GraphObject::new(
                    e.segment_id,
                    owner,
                    ElementData::RouteSegment {
                        from_node_id: e.from_node_id,
                        to_node_id: e.to_node_id,
                    },
                ))?;
                self.link(e.from_node_id, e.segment_id, LinkKind::Route, owner)?;
                self.link(e.segment_id, e.to_node_id, LinkKind::Route, owner)?;
            }
            DomainEvent::RouteSegmentRemoved(e) => {
                self.remove(e.segment_id, ElementKind::RouteSegment)?;
            }
            DomainEvent::TerminalPlaced(e) => {
                if let Some(node_id) = e.route_node_id {
                    self.live_index_of(node_id, ElementKind::RouteNode)?;
                }
                let owner = AggregateId(e.terminal_id);
                self.insert(GraphObject::new(
                    e.terminal_id,
                    owner,
                    ElementData::Terminal {
                        name: e.name.clone(),
                        route_node_id: e.route_node_id,
                        network_root: e.network_root,
                        terminating: e.terminating,
                    },
                ))?;
                if let Some(node_id) = e.route_node_id {
                    self.link(node_id, e.terminal_id, LinkKind::Placement, owner)?;
                }
            }
            DomainEvent::TerminalRenamed(e) => {
                self.rename(e.terminal_id, ElementKind::Terminal, &e.name)?;
            }
            DomainEvent::TerminalRemoved(e) => {
                self.remove(e.terminal_id, ElementKind::Terminal)?;
            }
            DomainEvent::SpanEquipmentPlaced(e) => {
                for segment_id in &e.route_segment_ids {
                    self.live_index_of(*segment_id, ElementKind::RouteSegment)?;
                }
                let mut fresh = HashSet::new();
                for id in std::iter::once(&e.span_equipment_id).chain(&e.span_segment_ids) {
                    self.ensure_absent(*id)?;
                    if !fresh.insert(*id) {
                        return Err(NetError::duplicate_element(*id));
                    }
                }

                let owner = AggregateId(e.span_equipment_id);
                self.insert(GraphObject::new(
                    e.span_equipment_id,
                    owner,
                    ElementData::SpanEquipment {
                        name: e.name.clone(),
                        route_segment_ids: e.route_segment_ids.clone(),
                        span_segment_ids: e.span_segment_ids.clone(),
                    },
                ))?;
                for (index, span_segment_id) in e.span_segment_ids.iter().enumerate() {
                    self.insert(GraphObject::new(
                        *span_segment_id,
                        owner,
                        ElementData::SpanSegment {
                            span_equipment_id: e.span_equipment_id,
                            index,
                        },
                    ))?;
                }
                for segment_id in &e.route_segment_ids {
                    self.link(*segment_id, e.span_equipment_id, LinkKind::Placement, owner)?;
                }
            }
            DomainEvent::SpanEquipmentRenamed(e) => {
                self.rename(e.span_equipment_id, ElementKind::SpanEquipment, &e.name)?;
            }
            DomainEvent::SpanSegmentConnected(e) => {
                let (from, to) =
                    self.signal_pair(e.span_equipment_id, e.span_segment_id, e.end, e.target_id)?;
                self.link(from, to, LinkKind::Signal, AggregateId(e.span_equipment_id))?;
            }
            DomainEvent::SpanSegmentDisconnected(e) => {
                let (from, to) =
                    self.signal_pair(e.span_equipment_id, e.span_segment_id, e.end, e.target_id)?;
                self.unlink(from, to, LinkKind::Signal, AggregateId(e.span_equipment_id))?;
            }
            DomainEvent::SpanEquipmentRemoved(e) => {
                self.remove(e.span_equipment_id, ElementKind::SpanEquipment)?;
            }
        }

        self.version += 1;
        Ok(())
    }

    // =========================================================================
    // Mutation primitives
    // =========================================================================

    fn index_of(&self, id: Uuid) -> Result<NodeIndex> {
        self.index
            .get(&id)
            .copied()
            .ok_or_else(|| NetError::element_not_found(id))
    }

    fn live_index_of(&self, id: Uuid, kind: ElementKind) -> Result<NodeIndex> {
        let idx = self.index_of(id)?;
        let object = &self.graph[idx];
        if object.kind() != kind {
            return Err(NetError::validation(format!(
                "Element {} is a {}, expected a {}",
                id,
                object.kind(),
                kind
            ))
            .with_context("element_id", id));
        }
        if object.removed {
            return Err(NetError::validation(format!("{} {} has been removed", kind, id))
                .with_context("element_id", id));
        }
        Ok(idx)
    }

    fn ensure_absent(&self, id: Uuid) -> Result<()> {
        if self.index.contains_key(&id) {
            return Err(NetError::duplicate_element(id));
        }
        Ok(())
    }

    fn insert(&mut self, object: GraphObject) -> Result<NodeIndex> {
        self.ensure_absent(object.id)?;
        let id = object.id;
        let idx = self.graph.add_node(object);
        self.index.insert(id, idx);
        Ok(idx)
    }

    fn rename(&mut self, id: Uuid, kind: ElementKind, new_name: &str) -> Result<()> {
        let idx = self.live_index_of(id, kind)?;
        let object = &mut self.graph[idx];
        match &mut object.data {
            ElementData::RouteNode { name, .. }
            | ElementData::SpanEquipment { name, .. }
            | ElementData::Terminal { name, .. } => *name = new_name.to_string(),
            _ => {}
        }
        object.touch();
        Ok(())
    }

    /// Resolve a span segment connection into (upstream, downstream) ids.
    fn signal_pair(
        &self,
        span_equipment_id: Uuid,
        span_segment_id: Uuid,
        end: SegmentEnd,
        target_id: Uuid,
    ) -> Result<(Uuid, Uuid)> {
        let idx = self.live_index_of(span_segment_id, ElementKind::SpanSegment)?;
        match self.graph[idx].data {
            ElementData::SpanSegment {
                span_equipment_id: parent,
                ..
            } if parent == span_equipment_id => {}
            _ => {
                return Err(NetError::validation(format!(
                    "Span segment {} does not belong to span equipment {}",
                    span_segment_id, span_equipment_id
                )))
            }
        }

        if target_id == span_segment_id {
            return Err(NetError::validation("A span segment cannot connect to itself"));
        }
        let target = self.index_of(target_id)?;
        match self.graph[target].kind() {
            ElementKind::Terminal | ElementKind::SpanSegment => {}
            other => {
                return Err(NetError::validation(format!(
                    "Span segments connect to terminals or span segments, not a {}",
                    other
                ))
                .with_context("target_id", target_id))
            }
        }

        Ok(match end {
            SegmentEnd::From => (target_id, span_segment_id),
            SegmentEnd::To => (span_segment_id, target_id),
        })
    }

    /// Add a link from `from` (upstream) to `to` (downstream).
    ///
    /// Both ends must be live. A `Signal` target may have only one upstream neighbour,
    /// and a `Signal` link may not close a loop.
    pub fn link(&mut self, from: Uuid, to: Uuid, kind: LinkKind, owner: AggregateId) -> Result<()> {
        if from == to {
            return Err(NetError::validation("An element cannot link to itself")
                .with_context("element_id", from));
        }
        let a = self.index_of(from)?;
        let b = self.index_of(to)?;
        for (id, idx) in [(from, a), (to, b)] {
            if self.graph[idx].removed {
                return Err(NetError::validation(format!("Cannot link removed element {}", id))
                    .with_context("element_id", id));
            }
        }

        let duplicate = self
            .graph
            .edges_connecting(a, b)
            .any(|e| e.weight().kind == kind);
        if duplicate {
            return Err(NetError::validation(format!("{} and {} are already linked", from, to)));
        }
        if kind == LinkKind::Signal {
            if let Some(existing) = self.upstream(to, LinkKind::Signal) {
                return Err(NetError::validation(format!(
                    "{} already has upstream neighbour {}",
                    to, existing
                ))
                .with_context("element_id", to)
                .with_context("upstream_id", existing));
            }
            if self.has_path(to, from, LinkKind::Signal) {
                return Err(NetError::new(
                    ErrorCode::CycleDetected,
                    format!("Linking {} to {} would close a signal loop", from, to),
                )
                .with_context("upstream_id", from)
                .with_context("downstream_id", to));
            }
        }

        self.insert_link(a, b, kind, owner);
        Ok(())
    }

    fn insert_link(&mut self, a: NodeIndex, b: NodeIndex, kind: LinkKind, owner: AggregateId) {
        self.next_link_seq += 1;
        self.graph.add_edge(
            a,
            b,
            Link {
                kind,
                owner,
                seq: self.next_link_seq,
            },
        );
        self.graph[a].touch();
        self.graph[b].touch();
    }

    /// Add a link without the loop and single-upstream checks.
    #[cfg(test)]
    pub(crate) fn link_unchecked(&mut self, from: Uuid, to: Uuid, kind: LinkKind, owner: AggregateId) -> Result<()> {
        let a = self.index_of(from)?;
        let b = self.index_of(to)?;
        self.insert_link(a, b, kind, owner);
        Ok(())
    }

    fn unlink(&mut self, from: Uuid, to: Uuid, kind: LinkKind, owner: AggregateId) -> Result<()> {
        let a = self.index_of(from)?;
        let b = self.index_of(to)?;
        let edge = self
            .graph
            .edges_connecting(a, b)
            .find(|e| e.weight().kind == kind && e.weight().owner == owner)
            .map(|e| e.id())
            .ok_or_else(|| NetError::validation(format!("{} and {} are not linked", from, to)))?;

        self.graph.remove_edge(edge);
        self.graph[a].touch();
        self.graph[b].touch();
        Ok(())
    }

    /// Tombstone an element together with the span segments it owns.
    ///
    /// Links owned by the element's aggregate are dropped; any other live link
    /// touching it makes the removal fail.
    fn remove(&mut self, id: Uuid, kind: ElementKind) -> Result<()> {
        let idx = self.live_index_of(id, kind)?;
        let owner = self.graph[idx].aggregate_id;

        let mut members = vec![idx];
        if let ElementData::SpanEquipment {
            span_segment_ids, ..
        } = &self.graph[idx].data
        {
            members.extend(span_segment_ids.iter().filter_map(|s| self.index.get(s).copied()));
        }

        let mut dropped: Vec<EdgeIndex> = Vec::new();
        for &member in &members {
            for direction in [Direction::Outgoing, Direction::Incoming] {
                for edge in self.graph.edges_directed(member, direction) {
                    if edge.weight().owner != owner {
                        let other = match direction {
                            Direction::Outgoing => edge.target(),
                            Direction::Incoming => edge.source(),
                        };
                        return Err(NetError::validation(format!(
                            "{} {} is still referenced by {} {}",
                            kind,
                            id,
                            self.graph[other].kind(),
                            self.graph[other].id
                        ))
                        .with_context("element_id", id)
                        .with_context("referenced_by", self.graph[other].id));
                    }
                    dropped.push(edge.id());
                }
            }
        }
        dropped.sort();
        dropped.dedup();

        for edge in dropped {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                self.graph.remove_edge(edge);
                self.graph[a].touch();
                self.graph[b].touch();
            }
        }
        for member in members {
            let object = &mut self.graph[member];
            if !object.removed {
                object.removed = true;
                object.touch();
            }
        }
        Ok(())
    }
}

/// Summary of the graph contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub version: u64,
    pub route_nodes: usize,
    pub route_segments: usize,
    pub span_equipment: usize,
    pub span_segments: usize,
    pub terminals: usize,
    pub tombstones: usize,
    pub edges: usize,
}
