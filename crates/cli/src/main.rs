//! Disruption window CLI
//!
//! A command-line tool for checking disruption window expressions and
//! previewing which pods on a node would lose their do-not-disrupt
//! annotation.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{node, window};

/// Disruption window CLI
#[derive(Parser)]
#[command(name = "dwctl")]
#[command(author, version, about = "CLI for the disruption window controller", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a disruption window schedule offline
    Window {
        /// Five-field cron expression or descriptor, interpreted in UTC
        #[arg(long)]
        schedule: String,

        /// Window length (e.g. 4h, 1h30m); defaults to 3h
        #[arg(long)]
        duration: Option<String>,

        /// Evaluation time in RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Preview the decision for every pod on a node (read-only)
    Node {
        /// Node name
        name: String,

        /// Path to kubeconfig file (uses default if not specified)
        #[arg(long)]
        kubeconfig: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Window {
            schedule,
            duration,
            at,
        } => {
            window::show_window(&schedule, duration.as_deref(), at.as_deref(), cli.format)?;
        }
        Commands::Node { name, kubeconfig } => {
            node::show_node(&name, kubeconfig.as_deref(), cli.format).await?;
        }
    }

    Ok(())
}
