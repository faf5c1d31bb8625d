//! Read-only network queries.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{NetError, Result};
use crate::graph::{Direction, ElementData, ElementKind, GraphObject, GraphStats, LinkKind, NetworkGraph};

use super::{Query, QueryDispatcherBuilder, QueryHandler};

// =============================================================================
// Queries
// =============================================================================

/// Fetch one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetElement {
    pub element_id: Uuid,
    /// Return tombstoned elements instead of failing with `ElementNotFound`
    #[serde(default)]
    pub include_removed: bool,
}

/// Fetch the two nodes a route segment joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRouteSegmentEnds {
    pub segment_id: Uuid,
}

/// List live span equipment placed in a route segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSpanEquipmentInRouteSegment {
    pub segment_id: Uuid,
}

/// Immediate neighbours of an element in its own layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConnectivity {
    pub element_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetGraphStats;

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegmentEnds {
    pub segment_id: Uuid,
    pub from_node: GraphObject,
    pub to_node: GraphObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    pub element_id: Uuid,
    pub layer: LinkKind,
    pub upstream: Vec<Uuid>,
    pub downstream: Vec<Uuid>,
}

impl Query for GetElement {
    const NAME: &'static str = "GetElement";
    type Output = GraphObject;
}

impl Query for GetRouteSegmentEnds {
    const NAME: &'static str = "GetRouteSegmentEnds";
    type Output = RouteSegmentEnds;
}

impl Query for GetSpanEquipmentInRouteSegment {
    const NAME: &'static str = "GetSpanEquipmentInRouteSegment";
    type Output = Vec<GraphObject>;
}

impl Query for GetConnectivity {
    const NAME: &'static str = "GetConnectivity";
    type Output = Connectivity;
}

impl Query for GetGraphStats {
    const NAME: &'static str = "GetGraphStats";
    type Output = GraphStats;
}

// =============================================================================
// Handler
// =============================================================================

/// Answers every network query.
#[derive(Debug, Default)]
pub struct NetworkQueryHandler;

impl NetworkQueryHandler {
    pub fn register_all(self: Arc<Self>, builder: QueryDispatcherBuilder) -> Result<QueryDispatcherBuilder> {
        builder
            .register::<GetElement>(self.clone())?
            .register::<GetRouteSegmentEnds>(self.clone())?
            .register::<GetSpanEquipmentInRouteSegment>(self.clone())?
            .register::<GetConnectivity>(self.clone())?
            .register::<GetGraphStats>(self)
    }
}

fn live_of_kind<'g>(graph: &'g NetworkGraph, id: Uuid, kind: ElementKind) -> Result<&'g GraphObject> {
    let object = graph
        .get_live(id)
        .ok_or_else(|| NetError::element_not_found(id))?;
    if object.kind() != kind {
        return Err(NetError::validation(format!(
            "Element {} is a {}, expected a {}",
            id,
            object.kind(),
            kind
        )));
    }
    Ok(object)
}

impl QueryHandler<GetElement> for NetworkQueryHandler {
    fn handle(&self, query: &GetElement, graph: &NetworkGraph) -> Result<GraphObject> {
        graph
            .get(query.element_id)
            .filter(|o| query.include_removed || o.is_live())
            .cloned()
            .ok_or_else(|| NetError::element_not_found(query.element_id))
    }
}

impl QueryHandler<GetRouteSegmentEnds> for NetworkQueryHandler {
    fn handle(&self, query: &GetRouteSegmentEnds, graph: &NetworkGraph) -> Result<RouteSegmentEnds> {
        let segment = live_of_kind(graph, query.segment_id, ElementKind::RouteSegment)?;
        let ElementData::RouteSegment {
            from_node_id,
            to_node_id,
        } = segment.data
        else {
            return Err(NetError::internal("Route segment without route segment data"));
        };

        let node = |id: Uuid| {
            graph
                .get(id)
                .cloned()
                .ok_or_else(|| NetError::element_not_found(id))
        };
        Ok(RouteSegmentEnds {
            segment_id: query.segment_id,
            from_node: node(from_node_id)?,
            to_node: node(to_node_id)?,
        })
    }
}

impl QueryHandler<GetSpanEquipmentInRouteSegment> for NetworkQueryHandler {
    fn handle(&self, query: &GetSpanEquipmentInRouteSegment, graph: &NetworkGraph) -> Result<Vec<GraphObject>> {
        live_of_kind(graph, query.segment_id, ElementKind::RouteSegment)?;
        Ok(graph
            .neighbours(query.segment_id, LinkKind::Placement, Direction::Outgoing)
            .into_iter()
            .filter_map(|id| graph.get_live(id))
            .filter(|o| o.kind() == ElementKind::SpanEquipment)
            .cloned()
            .collect())
    }
}

impl QueryHandler<GetConnectivity> for NetworkQueryHandler {
    fn handle(&self, query: &GetConnectivity, graph: &NetworkGraph) -> Result<Connectivity> {
        let object = graph
            .get_live(query.element_id)
            .ok_or_else(|| NetError::element_not_found(query.element_id))?;
        let layer = match object.kind() {
            ElementKind::RouteNode | ElementKind::RouteSegment => LinkKind::Route,
            ElementKind::SpanEquipment => LinkKind::Placement,
            ElementKind::SpanSegment | ElementKind::Terminal => LinkKind::Signal,
        };

        Ok(Connectivity {
            element_id: query.element_id,
            layer,
            upstream: graph.neighbours(query.element_id, layer, Direction::Incoming),
            downstream: graph.neighbours(query.element_id, layer, Direction::Outgoing),
        })
    }
}

impl QueryHandler<GetGraphStats> for NetworkQueryHandler {
    fn handle(&self, _query: &GetGraphStats, graph: &NetworkGraph) -> Result<GraphStats> {
        Ok(graph.stats())
    }
}
