//! Graph summary.

use anyhow::Result;

use netgraph_core::queries::GetGraphStats;

use crate::output::{self, OutputFormat};
use crate::session::Session;

pub fn execute(session: &Session, format: OutputFormat) -> Result<()> {
    let stats = session.context.query(GetGraphStats, session.user.clone())?;
    if format != OutputFormat::Table {
        return output::print_item(&stats, format);
    }

    output::print_header(&format!("Network at {}", session.store.display()));
    output::print_detail("Graph version", &stats.version.to_string());
    output::print_detail("Route nodes", &stats.route_nodes.to_string());
    output::print_detail("Route segments", &stats.route_segments.to_string());
    output::print_detail("Span equipment", &stats.span_equipment.to_string());
    output::print_detail("Span segments", &stats.span_segments.to_string());
    output::print_detail("Terminals", &stats.terminals.to_string());
    output::print_detail("Removed", &stats.tombstones.to_string());
    output::print_detail("Links", &stats.edges.to_string());
    Ok(())
}
