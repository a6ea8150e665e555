use clap::{Parser, Subcommand};

/// vulnpilot: chat-driven dispatcher for security tooling
#[derive(Parser, Debug)]
#[command(name = "vulnpilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one chat message through the dispatch pipeline
    Chat {
        /// The message text
        #[arg(value_name = "MESSAGE", required = true, num_args = 1..)]
        message: Vec<String>,

        /// Execution timeout in seconds (default: from env or 120)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Manage the tool registry
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },

    /// Review pending tool requests
    Requests {
        #[command(subcommand)]
        command: RequestsCommands,
    },

    /// Show recent execution records
    History {
        /// Maximum number of records to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum ToolsCommands {
    /// List registered tools, grouped by category
    List,

    /// Seed the preconfigured tool catalog (never overwrites)
    Seed,

    /// Remove a tool from the registry
    Remove {
        /// Tool id (case-insensitive)
        #[arg(value_name = "TOOL_ID")]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RequestsCommands {
    /// List all tool requests, newest first
    List,

    /// Approve a pending request, optionally overriding fields
    Approve {
        /// Request id
        #[arg(value_name = "REQUEST_ID")]
        id: String,

        /// Field override, repeatable: name|description|command|category|usage_example=value
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        set: Vec<String>,
    },

    /// Reject a pending request
    Reject {
        /// Request id
        #[arg(value_name = "REQUEST_ID")]
        id: String,
    },
}
