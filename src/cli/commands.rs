//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Linode resource provider: instance and LKE reconciliation.
#[derive(Parser, Debug)]
#[command(name = "linode-provider")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the provider configuration file.
    #[arg(short, long, global = true, env = "LINODE_PROVIDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format on stderr (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve JSON-lines requests on stdin/stdout.
    Serve,

    /// Run the requests in a JSON file and print the responses.
    Invoke {
        /// File holding one request object or a list of them.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show resource and data source schemas.
    Schema {
        /// Only this type.
        #[arg(short, long)]
        resource: Option<String>,
    },

    /// Validate resource attributes offline.
    Validate {
        /// Resource type, e.g. `linode_instance`.
        #[arg(short, long)]
        resource: String,

        /// YAML or JSON attribute file.
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the planned change between a stored state and a configuration.
    Diff {
        /// Resource type.
        #[arg(short, long)]
        resource: String,

        /// Stored state file; omit to plan a create.
        #[arg(long)]
        prior: Option<PathBuf>,

        /// Configuration file; omit to plan a delete.
        #[arg(long)]
        proposed: Option<PathBuf>,
    },

    /// Print the API filter for a set of clauses.
    Filter {
        /// Clause in the form `name=value[,value...]`; repeatable.
        #[arg(short = 'c', long = "clause", required = true)]
        clauses: Vec<String>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}
