//! Run a batch of network commands from a YAML or JSON file.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tabled::Tabled;

use netgraph_core::commands::NetworkCommand;

use crate::output::{self, OutputFormat};
use crate::session::Session;

#[derive(Args)]
pub struct ApplyArgs {
    /// YAML or JSON file holding a list of commands
    pub file: PathBuf,

    /// Keep going after a command fails
    #[arg(long)]
    pub keep_going: bool,
}

/// Either a bare list of commands or `{ commands: [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandFile {
    List(Vec<NetworkCommand>),
    Document { commands: Vec<NetworkCommand> },
}

impl CommandFile {
    fn into_commands(self) -> Vec<NetworkCommand> {
        match self {
            CommandFile::List(commands) | CommandFile::Document { commands } => commands,
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct OutcomeRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Aggregate")]
    aggregate: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn parse(content: &str) -> Result<Vec<NetworkCommand>> {
    let file: CommandFile = serde_yaml::from_str(content).context("Failed to parse command file")?;
    Ok(file.into_commands())
}

pub async fn execute(args: ApplyArgs, session: &Session, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let commands = parse(&content)?;

    let mut rows = Vec::with_capacity(commands.len());
    let mut failures = 0;

    for (index, command) in commands.into_iter().enumerate() {
        let name = command.name().to_string();
        match session.context.execute(command, session.user.clone()).await {
            Ok(outcome) => rows.push(OutcomeRow {
                index: index + 1,
                command: name,
                aggregate: outcome.aggregate_id.to_string(),
                version: outcome.version.to_string(),
                result: "ok".to_string(),
            }),
            Err(err) => {
                failures += 1;
                rows.push(OutcomeRow {
                    index: index + 1,
                    command: name,
                    aggregate: "-".to_string(),
                    version: "-".to_string(),
                    result: format!("{}: {}", err.code(), err.user_message()),
                });
                if !args.keep_going {
                    break;
                }
            }
        }
    }

    output::print_list(&rows, format)?;
    if failures > 0 {
        bail!("{} of {} commands failed", failures, rows.len());
    }
    if format == OutputFormat::Table {
        output::print_success(&format!("Applied {} commands to {}", rows.len(), session.store.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bare_list() {
        let commands = parse(
            r#"
- command: AddRouteNode
  node_id: 5f0c6c32-1ec6-4c1f-9a55-1b8c1c7d2f10
  name: CO-1
  kind: central_office
- command: RenameRouteNode
  node_id: 5f0c6c32-1ec6-4c1f-9a55-1b8c1c7d2f10
  name: CO-2
"#,
        )
        .unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1].name(), "RenameRouteNode");
    }

    #[test]
    fn test_parses_document_form() {
        let commands = parse(
            r#"{"commands": [{"command": "RemoveTerminal", "terminal_id": "0b7d2c4e-4df1-4b57-9c8e-3a1f4a6b9d21"}]}"#,
        )
        .unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name(), "RemoveTerminal");
    }

    #[test]
    fn test_rejects_unknown_command() {
        assert!(parse("- command: LaunchRocket\n").is_err());
    }
}
