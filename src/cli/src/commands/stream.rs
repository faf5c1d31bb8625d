//! Print the event history of one aggregate.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use netgraph_core::events::AggregateId;

use crate::output::{self, OutputFormat};
use crate::session::Session;

#[derive(Args)]
pub struct StreamArgs {
    /// Aggregate (stream) id
    pub aggregate_id: Uuid,
}

#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    #[tabled(rename = "Seq")]
    sequence: u64,
    #[tabled(rename = "Pos")]
    position: u64,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Actor")]
    actor: String,
    #[tabled(rename = "Recorded")]
    recorded_at: String,
}

pub async fn execute(args: StreamArgs, session: &Session, format: OutputFormat) -> Result<()> {
    let events = session
        .context
        .repository()
        .read_stream(AggregateId(args.aggregate_id))
        .await?;

    if format != OutputFormat::Table {
        return output::print_item(&events, format);
    }
    let rows: Vec<EventRow> = events
        .iter()
        .map(|e| EventRow {
            sequence: e.sequence_number,
            position: e.global_position,
            event_type: e.event_type.clone(),
            actor: e.metadata.actor.clone().unwrap_or_else(|| "system".to_string()),
            recorded_at: e.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    output::print_list(&rows, format)
}
