//! Show one element and its immediate neighbours.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use netgraph_core::graph::{ElementKind, GraphObject};
use netgraph_core::queries::{Connectivity, GetConnectivity, GetElement, GetSpanEquipmentInRouteSegment};

use crate::output::{self, ObjectRow, OutputFormat};
use crate::session::Session;

#[derive(Args)]
pub struct ShowArgs {
    pub element_id: Uuid,

    /// Show removed elements too
    #[arg(long)]
    pub include_removed: bool,
}

#[derive(Serialize)]
struct ElementView {
    element: GraphObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    connectivity: Option<Connectivity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    span_equipment: Vec<GraphObject>,
}

pub fn execute(args: ShowArgs, session: &Session, format: OutputFormat) -> Result<()> {
    let ctx = &session.context;
    let element = ctx.query(
        GetElement {
            element_id: args.element_id,
            include_removed: args.include_removed,
        },
        session.user.clone(),
    )?;

    let (connectivity, span_equipment) = if element.is_live() {
        let connectivity = ctx.query(GetConnectivity { element_id: element.id }, session.user.clone())?;
        let span_equipment = if element.kind() == ElementKind::RouteSegment {
            ctx.query(GetSpanEquipmentInRouteSegment { segment_id: element.id }, session.user.clone())?
        } else {
            Vec::new()
        };
        (Some(connectivity), span_equipment)
    } else {
        (None, Vec::new())
    };

    let view = ElementView {
        element,
        connectivity,
        span_equipment,
    };
    if format != OutputFormat::Table {
        return output::print_item(&view, format);
    }

    let element = &view.element;
    output::print_header(&format!("{} {}", element.kind(), element.id));
    output::print_list(&[ObjectRow::from_object(element, true)], format)?;
    if let Some(connectivity) = &view.connectivity {
        let ids = |ids: &[Uuid]| {
            if ids.is_empty() {
                "-".to_string()
            } else {
                ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
            }
        };
        output::print_detail("layer", &format!("{:?}", connectivity.layer));
        output::print_detail("upstream", &ids(&connectivity.upstream));
        output::print_detail("downstream", &ids(&connectivity.downstream));
    }
    if !view.span_equipment.is_empty() {
        output::print_header("Span equipment");
        let rows: Vec<ObjectRow> = view
            .span_equipment
            .iter()
            .map(|o| ObjectRow::from_object(o, false))
            .collect();
        output::print_list(&rows, format)?;
    }
    Ok(())
}
