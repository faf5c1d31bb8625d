//! Trace connectivity from an element.

use anyhow::Result;
use clap::Args;
use tabled::Tabled;
use serde::Serialize;
use uuid::Uuid;

use netgraph_core::graph::GraphObject;
use netgraph_core::trace::TraceRequest;

use crate::output::{self, short_id, OutputFormat};
use crate::session::Session;

#[derive(Args)]
pub struct TraceArgs {
    /// Terminal, span segment or route segment to start from
    pub start_id: Uuid,

    /// Stop the upstream walk at this element (repeatable)
    #[arg(long = "root")]
    pub roots: Vec<Uuid>,

    /// Print one root-to-leaf sequence instead of the two directions
    #[arg(long)]
    pub linear: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct StepRow {
    #[tabled(rename = "Dir")]
    direction: &'static str,
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
}

fn step(direction: &'static str, position: usize, object: &GraphObject) -> StepRow {
    StepRow {
        direction,
        position,
        id: short_id(object.id),
        kind: object.kind().to_string(),
        name: object.name().unwrap_or("-").to_string(),
    }
}

pub async fn execute(args: TraceArgs, session: &Session, format: OutputFormat) -> Result<()> {
    let mut request = TraceRequest::new(args.start_id);
    for root in args.roots {
        request = request.with_root(root);
    }
    let result = session.context.trace(request).await?;

    if args.linear {
        let path = result.linearized();
        if format != OutputFormat::Table {
            return output::print_item(&path, format);
        }
        let rows: Vec<StepRow> = path
            .iter()
            .enumerate()
            .map(|(i, o)| step(if o.id == result.start_id { "*" } else { "" }, i + 1, o))
            .collect();
        return output::print_list(&rows, format);
    }

    if format != OutputFormat::Table {
        return output::print_item(&result, format);
    }
    let rows: Vec<StepRow> = result
        .upstream
        .iter()
        .enumerate()
        .map(|(i, o)| step("up", i + 1, o))
        .chain(result.downstream.iter().enumerate().map(|(i, o)| step("down", i, o)))
        .collect();
    if rows.is_empty() {
        output::print_warning(&format!("{} has been removed; nothing to trace", args.start_id));
        return Ok(());
    }
    output::print_list(&rows, format)
}
