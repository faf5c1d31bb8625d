//! Metrics for commands, the event store, the projection and traces.
//!
//! Recording goes through the `metrics` facade; without an installed recorder
//! every call is a no-op, so library users choose the exporter.
//!
//! # Example
//!
//! ```rust,no_run
//! use netgraph_core::telemetry::metrics::NetworkMetrics;
//!
//! NetworkMetrics::record_command("AddRouteNode", "ok", 0.002);
//! NetworkMetrics::set_graph_version(42);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::Once;
use std::time::Instant;

static DESCRIBE: Once = Once::new();

/// Register descriptions for every metric the crate emits.
///
/// Safe to call more than once.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!("netgraph_commands_total", "Commands dispatched by type and outcome");
        describe_histogram!(
            "netgraph_command_duration_seconds",
            "Command handling duration in seconds"
        );
        describe_counter!(
            "netgraph_concurrency_conflicts_total",
            "Optimistic concurrency conflicts seen by command handlers"
        );
        describe_counter!("netgraph_events_appended_total", "Events appended to the store");
        describe_counter!("netgraph_events_replayed_total", "Events applied during replay");
        describe_gauge!("netgraph_graph_version", "Version of the published graph snapshot");
        describe_histogram!("netgraph_trace_duration_seconds", "Trace duration in seconds");
        describe_counter!("netgraph_traces_total", "Traces run by outcome");
        describe_counter!("netgraph_errors_total", "Errors by code and category");
    });
}

/// Recording helpers used across the crate.
pub struct NetworkMetrics;

impl NetworkMetrics {
    /// Record one dispatched command.
    pub fn record_command(command: &str, outcome: &str, duration_seconds: f64) {
        counter!(
            "netgraph_commands_total",
            "command" => command.to_string(),
            "outcome" => outcome.to_string(),
        )
        .increment(1);

        histogram!(
            "netgraph_command_duration_seconds",
            "command" => command.to_string(),
        )
        .record(duration_seconds);
    }

    /// Record a conflict that a handler is about to retry or give up on.
    pub fn record_conflict(command: &str) {
        counter!(
            "netgraph_concurrency_conflicts_total",
            "command" => command.to_string(),
        )
        .increment(1);
    }

    pub fn record_appended(count: usize) {
        counter!("netgraph_events_appended_total").increment(count as u64);
    }

    pub fn record_replayed(count: usize) {
        counter!("netgraph_events_replayed_total").increment(count as u64);
    }

    pub fn set_graph_version(version: u64) {
        gauge!("netgraph_graph_version").set(version as f64);
    }

    /// Record a finished trace.
    pub fn record_trace(outcome: &str, duration_seconds: f64) {
        histogram!("netgraph_trace_duration_seconds").record(duration_seconds);
        counter!("netgraph_traces_total", "outcome" => outcome.to_string()).increment(1);
    }
}

/// Timer for a command, recorded when finished.
pub struct CommandTimer {
    start: Instant,
    command: &'static str,
}

impl CommandTimer {
    pub fn start(command: &'static str) -> Self {
        Self {
            start: Instant::now(),
            command,
        }
    }

    /// Finish timing and record the command under `outcome`.
    pub fn finish(self, outcome: &str) {
        NetworkMetrics::record_command(self.command, outcome, self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        describe_metrics();
        NetworkMetrics::record_command("AddRouteNode", "ok", 0.01);
        NetworkMetrics::record_conflict("RenameRouteNode");
        NetworkMetrics::record_appended(3);
        NetworkMetrics::set_graph_version(7);
        NetworkMetrics::record_trace("ok", 0.001);
    }

    #[test]
    fn test_command_timer() {
        let timer = CommandTimer::start("PlaceTerminal");
        timer.finish("validation_failed");
    }
}
