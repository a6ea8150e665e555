mod catalog;
mod cli;
mod dispatch;
mod executor;
mod workflow;

use anyhow::{bail, Context, Result};
use clap::Parser;

use vulnpilot_agent::llm::LlmClient;
use vulnpilot_core::config::{ExecutionConfig, PathsConfig};
use vulnpilot_core::observability;
use vulnpilot_core::tool::FieldOverrides;
use vulnpilot_store::{Decision, Store};

use cli::{Cli, Commands, RequestsCommands, ToolsCommands};
use dispatch::Dispatcher;
use executor::ToolGate;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let paths = PathsConfig::from_env();
    let store = Store::open(&paths.db_path())
        .with_context(|| format!("failed to open store at {}", paths.db_path().display()))?;

    match cli.command {
        Commands::Chat { message, timeout } => {
            let message = message.join(" ");
            let config = ExecutionConfig::from_env().with_cli_overrides(timeout);
            let gate = ToolGate::new(config.max_concurrent_per_tool);
            let dispatcher = Dispatcher {
                store: &store,
                gate: &gate,
                config,
                llm: LlmClient::from_env(),
            };
            let reply = dispatcher.handle_message(&message).await;
            println!("{}", reply.text);
            if let Some(record) = reply.execution {
                if !record.stdout.trim().is_empty() {
                    println!("\n--- output ---\n{}", record.stdout.trim_end());
                }
                if !record.stderr.trim().is_empty() {
                    println!("\n--- stderr ---\n{}", record.stderr.trim_end());
                }
            }
        }

        Commands::Tools { command } => match command {
            ToolsCommands::List => {
                let registry = store.registry_snapshot()?;
                if registry.is_empty() {
                    println!("No tools registered. Seed the catalog with `vulnpilot tools seed`.");
                } else {
                    let mut current_category = None::<String>;
                    let mut tools: Vec<_> = registry.values().collect();
                    tools.sort_by(|a, b| (&a.category, &a.id).cmp(&(&b.category, &b.id)));
                    for descriptor in tools {
                        if current_category.as_deref() != Some(descriptor.category.as_str()) {
                            println!("\n[{}]", descriptor.category);
                            current_category = Some(descriptor.category.clone());
                        }
                        println!("  {:<12} {}", descriptor.id, descriptor.description);
                    }
                }
            }
            ToolsCommands::Seed => {
                let inserted = catalog::seed(&store)?;
                println!("Seeded {inserted} tool(s).");
            }
            ToolsCommands::Remove { id } => {
                if store.remove_tool(&id)? {
                    println!("Removed '{}'.", id.to_lowercase());
                } else {
                    bail!("no tool '{}' in the registry", id);
                }
            }
        },

        Commands::Requests { command } => match command {
            RequestsCommands::List => {
                let requests = store.list_requests()?;
                if requests.is_empty() {
                    println!("No tool requests.");
                }
                for request in requests {
                    println!(
                        "{}  [{}]  {}: {}",
                        request.id,
                        request.status.as_str(),
                        request.proposed.id,
                        request.proposed.description
                    );
                }
            }
            RequestsCommands::Approve { id, set } => {
                let overrides = parse_overrides(&set)?;
                let request = workflow::decide(&store, &id, Decision::Approve(overrides))?;
                println!(
                    "Approved '{}'; it is now registered as '{}'.",
                    request.id, request.proposed.id
                );
            }
            RequestsCommands::Reject { id } => {
                let request = workflow::decide(&store, &id, Decision::Reject)?;
                println!("Rejected '{}'.", request.id);
            }
        },

        Commands::History { limit } => {
            let records = store.recent_executions(limit)?;
            if records.is_empty() {
                println!("No executions recorded.");
            }
            for record in records {
                println!(
                    "{}  {:<12} {:<9} exit={:<5} {:>6} ms  {}",
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.tool_id,
                    record.status.as_str(),
                    record
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    record.duration_ms,
                    record.argv.join(" ")
                );
            }
        }
    }

    Ok(())
}

/// Parse repeated `--set field=value` pairs into overrides.
fn parse_overrides(pairs: &[String]) -> Result<FieldOverrides> {
    let mut overrides = FieldOverrides::default();
    for pair in pairs {
        let Some((field, value)) = pair.split_once('=') else {
            bail!("override '{pair}' is not FIELD=VALUE");
        };
        let value = value.trim().to_string();
        match field.trim() {
            "name" => overrides.name = Some(value),
            "description" => overrides.description = Some(value),
            "command" => overrides.command = Some(value),
            "category" => overrides.category = Some(value),
            "usage_example" => overrides.usage_example = Some(value),
            "trigger_phrases" => {
                overrides.trigger_phrases =
                    Some(value.split(',').map(|s| s.trim().to_string()).collect())
            }
            other => bail!("unknown override field '{other}'"),
        }
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let overrides = parse_overrides(&[
            "category=recon".to_string(),
            "trigger_phrases=find hosts, sweep network".to_string(),
        ])
        .unwrap();
        assert_eq!(overrides.category.as_deref(), Some("recon"));
        assert_eq!(
            overrides.trigger_phrases,
            Some(vec!["find hosts".to_string(), "sweep network".to_string()])
        );
        assert!(overrides.command.is_none());
    }

    #[test]
    fn test_parse_overrides_rejects_bad_input() {
        assert!(parse_overrides(&["notapair".to_string()]).is_err());
        assert!(parse_overrides(&["nonsense=x".to_string()]).is_err());
    }
}
