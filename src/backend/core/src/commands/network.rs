//! Route and utility network commands and their handler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, NetError, Result};
use crate::events::*;
use crate::graph::{ElementKind, LinkKind, NetworkGraph};
use crate::repository::AggregateRepository;
use crate::telemetry::NetworkMetrics;

use super::{Command, CommandDispatcher, CommandEnvelope, CommandHandler, CommandOutcome, UserContext};

// =============================================================================
// Commands - Route Network
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddRouteNode {
    pub node_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub kind: RouteNodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameRouteNode {
    pub node_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveRouteNode {
    pub node_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddRouteSegment {
    pub segment_id: Uuid,
    pub from_node_id: Uuid,
    pub to_node_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveRouteSegment {
    pub segment_id: Uuid,
}

// =============================================================================
// Commands - Utility Network
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceTerminal {
    pub terminal_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub route_node_id: Option<Uuid>,
    #[serde(default)]
    pub network_root: bool,
    #[serde(default)]
    pub terminating: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameTerminal {
    pub terminal_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveTerminal {
    pub terminal_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSpanEquipment {
    pub span_equipment_id: Uuid,
    pub name: String,
    pub route_segment_ids: Vec<Uuid>,
    pub span_segment_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameSpanEquipment {
    pub span_equipment_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectSpanSegment {
    pub span_equipment_id: Uuid,
    pub span_segment_id: Uuid,
    pub end: SegmentEnd,
    pub target_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectSpanSegment {
    pub span_equipment_id: Uuid,
    pub span_segment_id: Uuid,
    pub end: SegmentEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveSpanEquipment {
    pub span_equipment_id: Uuid,
}

macro_rules! impl_command {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Command for $ty {
                const NAME: &'static str = stringify!($ty);
            }
        )*
    };
}

impl_command!(
    AddRouteNode,
    RenameRouteNode,
    RemoveRouteNode,
    AddRouteSegment,
    RemoveRouteSegment,
    PlaceTerminal,
    RenameTerminal,
    RemoveTerminal,
    PlaceSpanEquipment,
    RenameSpanEquipment,
    ConnectSpanSegment,
    DisconnectSpanSegment,
    RemoveSpanEquipment,
);

// =============================================================================
// Serialisable command set
// =============================================================================

/// Any network command, as written in batch files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum NetworkCommand {
    AddRouteNode(AddRouteNode),
    RenameRouteNode(RenameRouteNode),
    RemoveRouteNode(RemoveRouteNode),
    AddRouteSegment(AddRouteSegment),
    RemoveRouteSegment(RemoveRouteSegment),
    PlaceTerminal(PlaceTerminal),
    RenameTerminal(RenameTerminal),
    RemoveTerminal(RemoveTerminal),
    PlaceSpanEquipment(PlaceSpanEquipment),
    RenameSpanEquipment(RenameSpanEquipment),
    ConnectSpanSegment(ConnectSpanSegment),
    DisconnectSpanSegment(DisconnectSpanSegment),
    RemoveSpanEquipment(RemoveSpanEquipment),
}

impl NetworkCommand {
    pub fn name(&self) -> &'static str {
        match self {
            NetworkCommand::AddRouteNode(_) => AddRouteNode::NAME,
            NetworkCommand::RenameRouteNode(_) => RenameRouteNode::NAME,
            NetworkCommand::RemoveRouteNode(_) => RemoveRouteNode::NAME,
            NetworkCommand::AddRouteSegment(_) => AddRouteSegment::NAME,
            NetworkCommand::RemoveRouteSegment(_) => RemoveRouteSegment::NAME,
            NetworkCommand::PlaceTerminal(_) => PlaceTerminal::NAME,
            NetworkCommand::RenameTerminal(_) => RenameTerminal::NAME,
            NetworkCommand::RemoveTerminal(_) => RemoveTerminal::NAME,
            NetworkCommand::PlaceSpanEquipment(_) => PlaceSpanEquipment::NAME,
            NetworkCommand::RenameSpanEquipment(_) => RenameSpanEquipment::NAME,
            NetworkCommand::ConnectSpanSegment(_) => ConnectSpanSegment::NAME,
            NetworkCommand::DisconnectSpanSegment(_) => DisconnectSpanSegment::NAME,
            NetworkCommand::RemoveSpanEquipment(_) => RemoveSpanEquipment::NAME,
        }
    }

    /// Wrap the inner command in an envelope and dispatch it.
    pub async fn dispatch(
        self,
        dispatcher: &CommandDispatcher,
        user: UserContext,
        correlation_id: Uuid,
    ) -> Result<CommandOutcome> {
        macro_rules! send {
            ($cmd:expr) => {
                dispatcher
                    .dispatch(CommandEnvelope::new($cmd, user).with_correlation(correlation_id))
                    .await
            };
        }

        match self {
            NetworkCommand::AddRouteNode(c) => send!(c),
            NetworkCommand::RenameRouteNode(c) => send!(c),
            NetworkCommand::RemoveRouteNode(c) => send!(c),
            NetworkCommand::AddRouteSegment(c) => send!(c),
            NetworkCommand::RemoveRouteSegment(c) => send!(c),
            NetworkCommand::PlaceTerminal(c) => send!(c),
            NetworkCommand::RenameTerminal(c) => send!(c),
            NetworkCommand::RemoveTerminal(c) => send!(c),
            NetworkCommand::PlaceSpanEquipment(c) => send!(c),
            NetworkCommand::RenameSpanEquipment(c) => send!(c),
            NetworkCommand::ConnectSpanSegment(c) => send!(c),
            NetworkCommand::DisconnectSpanSegment(c) => send!(c),
            NetworkCommand::RemoveSpanEquipment(c) => send!(c),
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Events a command decided to emit.
struct Decision {
    events: Vec<DomainEvent>,
    created: Vec<Uuid>,
}

impl Decision {
    fn emit(event: DomainEvent) -> Self {
        Self {
            events: vec![event],
            created: Vec::new(),
        }
    }

    fn creating(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.created.extend(ids);
        self
    }
}

/// Handles every network command against the aggregate repository.
pub struct NetworkCommandHandler {
    repository: Arc<AggregateRepository>,
    max_conflict_retries: u32,
}

impl NetworkCommandHandler {
    pub fn new(repository: Arc<AggregateRepository>, max_conflict_retries: u32) -> Self {
        Self {
            repository,
            max_conflict_retries,
        }
    }

    /// Register this handler for every network command.
    pub fn register_all(
        self: Arc<Self>,
        builder: super::CommandDispatcherBuilder,
    ) -> Result<super::CommandDispatcherBuilder> {
        builder
            .register::<AddRouteNode>(self.clone())?
            .register::<RenameRouteNode>(self.clone())?
            .register::<RemoveRouteNode>(self.clone())?
            .register::<AddRouteSegment>(self.clone())?
            .register::<RemoveRouteSegment>(self.clone())?
            .register::<PlaceTerminal>(self.clone())?
            .register::<RenameTerminal>(self.clone())?
            .register::<RemoveTerminal>(self.clone())?
            .register::<PlaceSpanEquipment>(self.clone())?
            .register::<RenameSpanEquipment>(self.clone())?
            .register::<ConnectSpanSegment>(self.clone())?
            .register::<DisconnectSpanSegment>(self.clone())?
            .register::<RemoveSpanEquipment>(self)
    }

    /// Load, decide and save, reloading after a concurrency conflict up to the retry cap.
    async fn execute<A, F>(
        &self,
        command: &'static str,
        id: Uuid,
        metadata: &EventMetadata,
        decide: F,
    ) -> Result<CommandOutcome>
    where
        A: Aggregate,
        F: Fn(&A, &NetworkGraph) -> Result<Decision> + Send + Sync,
    {
        let stream = AggregateId(id);
        let mut attempt = 0;

        loop {
            let aggregate: A = self.repository.load(stream).await?;
            let snapshot = self.repository.snapshot();
            let decision = decide(&aggregate, &snapshot)?;

            match self
                .repository
                .save(stream, aggregate.version(), &decision.events, metadata)
                .await
            {
                Ok(version) => {
                    return Ok(CommandOutcome {
                        aggregate_id: id,
                        version,
                        event_count: decision.events.len(),
                        created: decision.created,
                    })
                }
                Err(err) if err.code() == ErrorCode::ConcurrencyConflict => {
                    NetworkMetrics::record_conflict(command);
                    if attempt >= self.max_conflict_retries {
                        warn!(command, aggregate_id = %id, attempts = attempt + 1, "Giving up after conflicts");
                        return Err(err);
                    }
                    attempt += 1;
                    debug!(command, aggregate_id = %id, attempt, "Conflict, reloading");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(NetError::validation("Name must not be empty"));
    }
    Ok(())
}

/// Creation commands need an id unused by any stream and any graph object.
fn require_fresh<A: Aggregate>(aggregate: &A, graph: &NetworkGraph, id: Uuid) -> Result<()> {
    if aggregate.exists() || graph.contains(id) {
        return Err(NetError::duplicate_element(id));
    }
    Ok(())
}

fn require_live<A: Aggregate>(aggregate: &A, id: Uuid) -> Result<()> {
    if !aggregate.exists() {
        return Err(NetError::element_not_found(id));
    }
    if aggregate.is_removed() {
        return Err(NetError::validation(format!("{} {} has been removed", A::KIND, id))
            .with_context("element_id", id));
    }
    Ok(())
}

/// A referenced element must be live and of the expected kind.
fn require_element(graph: &NetworkGraph, id: Uuid, kinds: &[ElementKind]) -> Result<()> {
    let object = graph
        .get(id)
        .ok_or_else(|| NetError::element_not_found(id))?;
    if !kinds.contains(&object.kind()) {
        return Err(NetError::validation(format!(
            "Element {} is a {}, which cannot be used here",
            id,
            object.kind()
        ))
        .with_context("element_id", id));
    }
    if object.removed {
        return Err(NetError::validation(format!("{} {} has been removed", object.kind(), id))
            .with_context("element_id", id));
    }
    Ok(())
}

// =============================================================================
// Handler implementations - Route Network
// =============================================================================

#[async_trait]
impl CommandHandler<AddRouteNode> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<AddRouteNode>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<RouteNodeAggregate, _>(AddRouteNode::NAME, cmd.node_id, &envelope.metadata(), |agg, graph| {
            require_fresh(agg, graph, cmd.node_id)?;
            require_name(&cmd.name)?;
            Ok(Decision::emit(DomainEvent::RouteNodeAdded(RouteNodeAdded {
                node_id: cmd.node_id,
                name: cmd.name.trim().to_string(),
                kind: cmd.kind,
            }))
            .creating([cmd.node_id]))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<RenameRouteNode> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<RenameRouteNode>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<RouteNodeAggregate, _>(RenameRouteNode::NAME, cmd.node_id, &envelope.metadata(), |agg, _| {
            require_live(agg, cmd.node_id)?;
            require_name(&cmd.name)?;
            Ok(Decision::emit(DomainEvent::RouteNodeRenamed(RouteNodeRenamed {
                node_id: cmd.node_id,
                name: cmd.name.trim().to_string(),
            })))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<RemoveRouteNode> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<RemoveRouteNode>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<RouteNodeAggregate, _>(RemoveRouteNode::NAME, cmd.node_id, &envelope.metadata(), |agg, _| {
            require_live(agg, cmd.node_id)?;
            Ok(Decision::emit(DomainEvent::RouteNodeRemoved(RouteNodeRemoved {
                node_id: cmd.node_id,
            })))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<AddRouteSegment> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<AddRouteSegment>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<RouteSegmentAggregate, _>(AddRouteSegment::NAME, cmd.segment_id, &envelope.metadata(), |agg, graph| {
            require_fresh(agg, graph, cmd.segment_id)?;
            if cmd.from_node_id == cmd.to_node_id {
                return Err(NetError::validation("A route segment must join two distinct nodes")
                    .with_context("node_id", cmd.from_node_id));
            }
            require_element(graph, cmd.from_node_id, &[ElementKind::RouteNode])?;
            require_element(graph, cmd.to_node_id, &[ElementKind::RouteNode])?;
            Ok(Decision::emit(DomainEvent::RouteSegmentAdded(RouteSegmentAdded {
                segment_id: cmd.segment_id,
                from_node_id: cmd.from_node_id,
                to_node_id: cmd.to_node_id,
            }))
            .creating([cmd.segment_id]))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<RemoveRouteSegment> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<RemoveRouteSegment>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<RouteSegmentAggregate, _>(RemoveRouteSegment::NAME, cmd.segment_id, &envelope.metadata(), |agg, _| {
            require_live(agg, cmd.segment_id)?;
            Ok(Decision::emit(DomainEvent::RouteSegmentRemoved(RouteSegmentRemoved {
                segment_id: cmd.segment_id,
            })))
        })
        .await
    }
}

// =============================================================================
// Handler implementations - Utility Network
// =============================================================================

#[async_trait]
impl CommandHandler<PlaceTerminal> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<PlaceTerminal>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<TerminalAggregate, _>(PlaceTerminal::NAME, cmd.terminal_id, &envelope.metadata(), |agg, graph| {
            require_fresh(agg, graph, cmd.terminal_id)?;
            require_name(&cmd.name)?;
            if let Some(node_id) = cmd.route_node_id {
                require_element(graph, node_id, &[ElementKind::RouteNode])?;
            }
            if cmd.network_root && cmd.terminating {
                return Err(NetError::validation(
                    "A terminal cannot be both a network root and terminating",
                ));
            }
            Ok(Decision::emit(DomainEvent::TerminalPlaced(TerminalPlaced {
                terminal_id: cmd.terminal_id,
                name: cmd.name.trim().to_string(),
                route_node_id: cmd.route_node_id,
                network_root: cmd.network_root,
                terminating: cmd.terminating,
            }))
            .creating([cmd.terminal_id]))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<RenameTerminal> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<RenameTerminal>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<TerminalAggregate, _>(RenameTerminal::NAME, cmd.terminal_id, &envelope.metadata(), |agg, _| {
            require_live(agg, cmd.terminal_id)?;
            require_name(&cmd.name)?;
            Ok(Decision::emit(DomainEvent::TerminalRenamed(TerminalRenamed {
                terminal_id: cmd.terminal_id,
                name: cmd.name.trim().to_string(),
            })))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<RemoveTerminal> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<RemoveTerminal>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<TerminalAggregate, _>(RemoveTerminal::NAME, cmd.terminal_id, &envelope.metadata(), |agg, _| {
            require_live(agg, cmd.terminal_id)?;
            Ok(Decision::emit(DomainEvent::TerminalRemoved(TerminalRemoved {
                terminal_id: cmd.terminal_id,
            })))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<PlaceSpanEquipment> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<PlaceSpanEquipment>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<SpanEquipmentAggregate, _>(PlaceSpanEquipment::NAME, cmd.span_equipment_id, &envelope.metadata(), |agg, graph| {
            require_fresh(agg, graph, cmd.span_equipment_id)?;
            require_name(&cmd.name)?;
            if cmd.route_segment_ids.is_empty() {
                return Err(NetError::validation("Span equipment needs at least one route segment"));
            }
            if cmd.span_segment_ids.is_empty() {
                return Err(NetError::validation("Span equipment needs at least one span segment"));
            }
            for segment_id in &cmd.route_segment_ids {
                require_element(graph, *segment_id, &[ElementKind::RouteSegment])?;
            }
            for span_segment_id in &cmd.span_segment_ids {
                if graph.contains(*span_segment_id) || *span_segment_id == cmd.span_equipment_id {
                    return Err(NetError::duplicate_element(*span_segment_id));
                }
            }

            let created = std::iter::once(cmd.span_equipment_id)
                .chain(cmd.span_segment_ids.iter().copied());
            Ok(Decision::emit(DomainEvent::SpanEquipmentPlaced(SpanEquipmentPlaced {
                span_equipment_id: cmd.span_equipment_id,
                name: cmd.name.trim().to_string(),
                route_segment_ids: cmd.route_segment_ids.clone(),
                span_segment_ids: cmd.span_segment_ids.clone(),
            }))
            .creating(created))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<RenameSpanEquipment> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<RenameSpanEquipment>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<SpanEquipmentAggregate, _>(RenameSpanEquipment::NAME, cmd.span_equipment_id, &envelope.metadata(), |agg, _| {
            require_live(agg, cmd.span_equipment_id)?;
            require_name(&cmd.name)?;
            Ok(Decision::emit(DomainEvent::SpanEquipmentRenamed(SpanEquipmentRenamed {
                span_equipment_id: cmd.span_equipment_id,
                name: cmd.name.trim().to_string(),
            })))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<ConnectSpanSegment> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<ConnectSpanSegment>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<SpanEquipmentAggregate, _>(ConnectSpanSegment::NAME, cmd.span_equipment_id, &envelope.metadata(), |agg, graph| {
            require_live(agg, cmd.span_equipment_id)?;
            if !agg.owns_segment(cmd.span_segment_id) {
                return Err(NetError::validation(format!(
                    "Span segment {} does not belong to span equipment {}",
                    cmd.span_segment_id, cmd.span_equipment_id
                )));
            }
            if let Some(existing) = agg.connection_at(cmd.span_segment_id, cmd.end) {
                return Err(NetError::validation(format!(
                    "The {} end of span segment {} is already connected to {}",
                    cmd.end, cmd.span_segment_id, existing.target_id
                )));
            }
            if cmd.target_id == cmd.span_segment_id {
                return Err(NetError::validation("A span segment cannot connect to itself"));
            }
            require_element(graph, cmd.target_id, &[ElementKind::Terminal, ElementKind::SpanSegment])?;

            let (upstream, downstream) = match cmd.end {
                SegmentEnd::From => (cmd.target_id, cmd.span_segment_id),
                SegmentEnd::To => (cmd.span_segment_id, cmd.target_id),
            };
            if let Some(existing) = graph.upstream(downstream, LinkKind::Signal) {
                return Err(NetError::validation(format!(
                    "{} already has upstream neighbour {}",
                    downstream, existing
                )));
            }
            if graph.has_path(downstream, upstream, LinkKind::Signal) {
                return Err(NetError::cycle_detected(upstream)
                    .with_context("upstream_id", upstream)
                    .with_context("downstream_id", downstream));
            }

            Ok(Decision::emit(DomainEvent::SpanSegmentConnected(SpanSegmentConnected {
                span_equipment_id: cmd.span_equipment_id,
                span_segment_id: cmd.span_segment_id,
                end: cmd.end,
                target_id: cmd.target_id,
            })))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<DisconnectSpanSegment> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<DisconnectSpanSegment>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<SpanEquipmentAggregate, _>(DisconnectSpanSegment::NAME, cmd.span_equipment_id, &envelope.metadata(), |agg, _| {
            require_live(agg, cmd.span_equipment_id)?;
            let connection = agg
                .connection_at(cmd.span_segment_id, cmd.end)
                .ok_or_else(|| {
                    NetError::validation(format!(
                        "The {} end of span segment {} is not connected",
                        cmd.end, cmd.span_segment_id
                    ))
                })?;
            Ok(Decision::emit(DomainEvent::SpanSegmentDisconnected(SpanSegmentDisconnected {
                span_equipment_id: cmd.span_equipment_id,
                span_segment_id: cmd.span_segment_id,
                end: cmd.end,
                target_id: connection.target_id,
            })))
        })
        .await
    }
}

#[async_trait]
impl CommandHandler<RemoveSpanEquipment> for NetworkCommandHandler {
    async fn handle(&self, envelope: &CommandEnvelope<RemoveSpanEquipment>) -> Result<CommandOutcome> {
        let cmd = &envelope.command;
        self.execute::<SpanEquipmentAggregate, _>(RemoveSpanEquipment::NAME, cmd.span_equipment_id, &envelope.metadata(), |agg, _| {
            require_live(agg, cmd.span_equipment_id)?;
            Ok(Decision::emit(DomainEvent::SpanEquipmentRemoved(SpanEquipmentRemoved {
                span_equipment_id: cmd.span_equipment_id,
            })))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_command_from_yaml_shape() {
        let json = serde_json::json!({
            "command": "AddRouteNode",
            "node_id": "5f0c6c32-1ec6-4c1f-9a55-1b8c1c7d2f10",
            "name": "CO-1",
            "kind": "central_office",
        });
        let command: NetworkCommand = serde_json::from_value(json).unwrap();
        assert_eq!(command.name(), "AddRouteNode");
        match command {
            NetworkCommand::AddRouteNode(c) => assert_eq!(c.kind, RouteNodeKind::CentralOffice),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_optional_terminal_flags_default() {
        let json = serde_json::json!({
            "command": "PlaceTerminal",
            "terminal_id": "0b7d2c4e-4df1-4b57-9c8e-3a1f4a6b9d21",
            "name": "ONT",
        });
        let command: NetworkCommand = serde_json::from_value(json).unwrap();
        match command {
            NetworkCommand::PlaceTerminal(c) => {
                assert!(!c.network_root);
                assert!(!c.terminating);
                assert!(c.route_node_id.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
