//! netgraph CLI - record and trace an event-sourced network topology.
//!
//! Every invocation replays the on-disk event store, runs one operation and exits.

mod commands;
mod output;
mod session;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{apply, settings, show, stats, stream, trace};
use output::OutputFormat;
use session::Session;

/// netgraph - event-sourced network topology
#[derive(Parser)]
#[command(
    name = "netgraph",
    version,
    about = "Record and trace an event-sourced network topology",
    long_about = "Applies network commands to an append-only event store and answers queries and traces against the replayed graph.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Event store directory
    #[arg(long, global = true, env = "NETGRAPH_STORE")]
    store: Option<PathBuf>,

    /// Name recorded on emitted events
    #[arg(long, global = true, env = "NETGRAPH_USER")]
    user: Option<String>,

    /// Core configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level or filter directive
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run commands from a YAML or JSON file
    Apply(apply::ApplyArgs),

    /// Show one element and its neighbours
    Show(show::ShowArgs),

    /// Trace upstream and downstream from an element
    Trace(trace::TraceArgs),

    /// Print the event stream of an aggregate
    Stream(stream::StreamArgs),

    /// Summarize the graph
    Stats,

    /// Manage CLI settings
    #[command(subcommand)]
    Settings(settings::SettingsCommands),
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.output;
    let command = match cli.command {
        Commands::Settings(cmd) => return settings::execute(cmd, format),
        command => command,
    };

    let session = Session::open(cli.config.as_deref(), cli.store, cli.user, cli.log_level.as_deref()).await?;
    match command {
        Commands::Apply(args) => apply::execute(args, &session, format).await,
        Commands::Show(args) => show::execute(args, &session, format),
        Commands::Trace(args) => trace::execute(args, &session, format).await,
        Commands::Stream(args) => stream::execute(args, &session, format).await,
        Commands::Stats => stats::execute(&session, format),
        Commands::Settings(_) => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
