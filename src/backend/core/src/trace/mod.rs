//! Upstream/downstream connectivity traces.
//!
//! Utility traces follow `Signal` links from a terminal or span segment. Route
//! traces start at a route segment and follow `Route` links; route nodes act as
//! junctions, so the upstream walk ends at the first node and the downstream walk
//! never enters one.
//!
//! Every element has at most one upstream neighbour and signal links never close a
//! loop. Reaching an element twice still fails the trace with `CycleDetected`
//! rather than walking forever.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::TraceConfig;
use crate::error::{NetError, Result};
use crate::graph::{ElementKind, GraphObject, LinkKind, NetworkGraph};
use crate::telemetry::NetworkMetrics;

/// How often (in visited elements) the deadline is checked.
const DEADLINE_CHECK_INTERVAL: usize = 32;

/// Input to a trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRequest {
    pub start_id: Uuid,
    /// Elements at which the upstream walk stops, in addition to network-root terminals
    #[serde(default)]
    pub declared_roots: HashSet<Uuid>,
}

impl TraceRequest {
    pub fn new(start_id: Uuid) -> Self {
        Self {
            start_id,
            declared_roots: HashSet::new(),
        }
    }

    pub fn with_root(mut self, root_id: Uuid) -> Self {
        self.declared_roots.insert(root_id);
        self
    }
}

/// Result of a trace.
///
/// `upstream` is ordered closest-to-start first and never contains the start.
/// `downstream` starts with the start element and continues depth-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityGraphTraceResult {
    pub start_id: Uuid,
    pub source: Option<GraphObject>,
    pub upstream: Vec<GraphObject>,
    pub downstream: Vec<GraphObject>,
}

impl UtilityGraphTraceResult {
    /// Path from the root through the start out to the leaves.
    ///
    /// The start appears once. An empty `downstream` (tombstoned start) yields just
    /// the reversed upstream.
    pub fn linearized(&self) -> Vec<&GraphObject> {
        self.upstream
            .iter()
            .rev()
            .chain(self.downstream.iter())
            .collect()
    }

    pub fn upstream_ids(&self) -> Vec<Uuid> {
        self.upstream.iter().map(|o| o.id).collect()
    }

    pub fn downstream_ids(&self) -> Vec<Uuid> {
        self.downstream.iter().map(|o| o.id).collect()
    }

    pub fn linearized_ids(&self) -> Vec<Uuid> {
        self.linearized().into_iter().map(|o| o.id).collect()
    }
}

/// Walks a graph snapshot within a step budget and an optional time budget.
#[derive(Debug, Clone)]
pub struct TraceEngine {
    max_steps: usize,
    timeout: Option<Duration>,
}

impl Default for TraceEngine {
    fn default() -> Self {
        Self::from_config(&TraceConfig::default())
    }
}

impl TraceEngine {
    pub fn new(max_steps: usize, timeout: Option<Duration>) -> Self {
        Self { max_steps, timeout }
    }

    pub fn from_config(config: &TraceConfig) -> Self {
        Self::new(config.max_steps, Some(config.timeout))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Trace with no stop predicate.
    pub fn trace(&self, graph: &NetworkGraph, request: &TraceRequest) -> Result<UtilityGraphTraceResult> {
        self.trace_until(graph, request, |_| false)
    }

    /// Trace, ending each downstream branch at elements where `stop` holds.
    ///
    /// Elements matching `stop` are still recorded.
    #[instrument(skip(self, graph, request, stop), fields(start_id = %request.start_id, graph_version = graph.version()))]
    pub fn trace_until<P>(
        &self,
        graph: &NetworkGraph,
        request: &TraceRequest,
        stop: P,
    ) -> Result<UtilityGraphTraceResult>
    where
        P: Fn(&GraphObject) -> bool,
    {
        let started = Instant::now();
        let result = self.run(graph, request, &stop);
        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(err) => err.code().to_string(),
        };
        NetworkMetrics::record_trace(&outcome, started.elapsed().as_secs_f64());
        result
    }

    fn run<P>(&self, graph: &NetworkGraph, request: &TraceRequest, stop: &P) -> Result<UtilityGraphTraceResult>
    where
        P: Fn(&GraphObject) -> bool,
    {
        let start = graph
            .get(request.start_id)
            .ok_or_else(|| NetError::element_not_found(request.start_id))?;
        let layer = match start.kind() {
            ElementKind::Terminal | ElementKind::SpanSegment => LinkKind::Signal,
            ElementKind::RouteSegment => LinkKind::Route,
            _ => return Err(NetError::element_not_found(request.start_id)),
        };

        if start.removed {
            return Ok(UtilityGraphTraceResult {
                start_id: request.start_id,
                source: Some(start.clone()),
                upstream: Vec::new(),
                downstream: Vec::new(),
            });
        }

        let mut walk = Walk {
            graph,
            layer,
            start_id: request.start_id,
            max_steps: self.max_steps,
            deadline: self.timeout.and_then(|t| Instant::now().checked_add(t)),
            visited: HashSet::new(),
            steps: 0,
        };
        walk.visit(start.id)?;

        let upstream = walk.upstream(&request.declared_roots)?;
        let downstream = walk.downstream(start, stop)?;

        debug!(
            upstream = upstream.len(),
            downstream = downstream.len(),
            steps = walk.steps,
            "Trace complete"
        );

        Ok(UtilityGraphTraceResult {
            start_id: request.start_id,
            source: Some(start.clone()),
            upstream,
            downstream,
        })
    }
}

/// State shared by the upstream and downstream walks of one trace.
struct Walk<'g> {
    graph: &'g NetworkGraph,
    layer: LinkKind,
    start_id: Uuid,
    max_steps: usize,
    deadline: Option<Instant>,
    visited: HashSet<Uuid>,
    steps: usize,
}

impl<'g> Walk<'g> {
    /// Record a visit, enforcing the budget and rejecting revisits.
    fn visit(&mut self, id: Uuid) -> Result<()> {
        if !self.visited.insert(id) {
            return Err(NetError::cycle_detected(id).with_context("start_id", self.start_id));
        }
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(NetError::trace_depth_exceeded(self.start_id, self.max_steps));
        }
        if self.steps % DEADLINE_CHECK_INTERVAL == 1 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(NetError::trace_timeout(self.start_id, self.steps));
                }
            }
        }
        Ok(())
    }

    fn object(&self, id: Uuid) -> Result<&'g GraphObject> {
        self.graph
            .get(id)
            .ok_or_else(|| NetError::internal(format!("Linked element {} is missing", id)))
    }

    fn is_root(&self, object: &GraphObject, declared_roots: &HashSet<Uuid>) -> bool {
        declared_roots.contains(&object.id) || object.is_network_root()
    }

    fn upstream(&mut self, declared_roots: &HashSet<Uuid>) -> Result<Vec<GraphObject>> {
        let mut path = Vec::new();
        let mut current = self.object(self.start_id)?;

        while !self.is_root(current, declared_roots) {
            let Some(next) = self.graph.upstream(current.id, self.layer) else {
                break;
            };
            self.visit(next)?;
            let object = self.object(next)?;
            path.push(object.clone());

            if self.layer == LinkKind::Route && object.kind() == ElementKind::RouteNode {
                break;
            }
            current = object;
        }
        Ok(path)
    }

    fn downstream<P>(&mut self, start: &'g GraphObject, stop: &P) -> Result<Vec<GraphObject>>
    where
        P: Fn(&GraphObject) -> bool,
    {
        let mut order = Vec::new();
        let mut stack = vec![start];

        while let Some(object) = stack.pop() {
            order.push(object.clone());

            if object.removed || object.is_terminating() || stop(object) {
                continue;
            }

            let mut children = Vec::new();
            for child_id in self.graph.downstream(object.id, self.layer) {
                let child = self.object(child_id)?;
                if self.layer == LinkKind::Route && child.kind() == ElementKind::RouteNode {
                    continue;
                }
                self.visit(child_id)?;
                children.push(child);
            }
            // Reverse so the first-created link is walked first.
            stack.extend(children.into_iter().rev());
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::events::*;

    fn terminal(graph: &mut NetworkGraph, network_root: bool, terminating: bool) -> Uuid {
        let terminal_id = Uuid::new_v4();
        graph
            .apply(&DomainEvent::TerminalPlaced(TerminalPlaced {
                terminal_id,
                name: "T".to_string(),
                route_node_id: None,
                network_root,
                terminating,
            }))
            .unwrap();
        terminal_id
    }

    fn chain(graph: &mut NetworkGraph, ids: &[Uuid]) {
        let owner = AggregateId::new();
        for pair in ids.windows(2) {
            graph.link(pair[0], pair[1], LinkKind::Signal, owner).unwrap();
        }
    }

    #[test]
    fn test_isolated_element_has_empty_upstream() {
        let mut graph = NetworkGraph::new();
        let t = terminal(&mut graph, false, false);

        let result = TraceEngine::default().trace(&graph, &TraceRequest::new(t)).unwrap();
        assert!(result.upstream.is_empty());
        assert_eq!(result.downstream_ids(), vec![t]);
        assert_eq!(result.source.as_ref().map(|o| o.id), Some(t));
    }

    #[test]
    fn test_network_root_terminal_stops_upstream() {
        let mut graph = NetworkGraph::new();
        let far = terminal(&mut graph, false, false);
        let root = terminal(&mut graph, true, false);
        let start = terminal(&mut graph, false, false);
        chain(&mut graph, &[far, root, start]);

        let result = TraceEngine::default().trace(&graph, &TraceRequest::new(start)).unwrap();
        assert_eq!(result.upstream_ids(), vec![root]);
    }

    #[test]
    fn test_revisited_element_fails_with_cycle() {
        let mut graph = NetworkGraph::new();
        let owner = AggregateId::new();
        let a = terminal(&mut graph, false, false);
        let b = terminal(&mut graph, false, false);
        let c = terminal(&mut graph, false, false);
        chain(&mut graph, &[a, b, c]);
        graph.link_unchecked(c, a, LinkKind::Signal, owner).unwrap();

        for start in [a, b, c] {
            let err = TraceEngine::default()
                .trace(&graph, &TraceRequest::new(start))
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::CycleDetected);
        }
    }

    #[test]
    fn test_terminating_element_ends_branch() {
        let mut graph = NetworkGraph::new();
        let start = terminal(&mut graph, false, false);
        let outlet = terminal(&mut graph, false, true);
        let beyond = terminal(&mut graph, false, false);
        chain(&mut graph, &[start, outlet, beyond]);

        let result = TraceEngine::default().trace(&graph, &TraceRequest::new(start)).unwrap();
        assert_eq!(result.downstream_ids(), vec![start, outlet]);
    }

    #[test]
    fn test_stop_predicate_ends_branch() {
        let mut graph = NetworkGraph::new();
        let ids: Vec<Uuid> = (0..4).map(|_| terminal(&mut graph, false, false)).collect();
        chain(&mut graph, &ids);

        let result = TraceEngine::default()
            .trace_until(&graph, &TraceRequest::new(ids[0]), |o| o.id == ids[2])
            .unwrap();
        assert_eq!(result.downstream_ids(), ids[..3].to_vec());
    }

    #[test]
    fn test_step_budget() {
        let mut graph = NetworkGraph::new();
        let ids: Vec<Uuid> = (0..10).map(|_| terminal(&mut graph, false, false)).collect();
        chain(&mut graph, &ids);

        let err = TraceEngine::new(5, None)
            .trace(&graph, &TraceRequest::new(ids[0]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TraceDepthExceeded);
    }

    #[test]
    fn test_elapsed_deadline_times_out() {
        let mut graph = NetworkGraph::new();
        let t = terminal(&mut graph, false, false);

        let err = TraceEngine::new(100, Some(Duration::ZERO))
            .trace(&graph, &TraceRequest::new(t))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TraceTimeout);
    }

    #[test]
    fn test_route_node_is_not_a_trace_start() {
        let mut graph = NetworkGraph::new();
        let node_id = Uuid::new_v4();
        graph
            .apply(&DomainEvent::RouteNodeAdded(RouteNodeAdded {
                node_id,
                name: "N".to_string(),
                kind: RouteNodeKind::Junction,
            }))
            .unwrap();

        let err = TraceEngine::default()
            .trace(&graph, &TraceRequest::new(node_id))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ElementNotFound);
    }

    #[test]
    fn test_linearized_with_empty_downstream() {
        let result = UtilityGraphTraceResult {
            start_id: Uuid::new_v4(),
            source: None,
            upstream: vec![],
            downstream: vec![],
        };
        assert!(result.linearized().is_empty());
    }
}
