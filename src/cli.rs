use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "omni-glass", about = "Omni-Glass action engine, headless surface")]
pub struct Args {
    /// Override the configuration root (plugins, approvals, settings).
    #[arg(long)]
    pub config_root: Option<PathBuf>,

    /// Provider override for this invocation ("anthropic" | "local").
    #[arg(long)]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a typed command through the classify → execute pipeline.
    Ask {
        /// The command text, as if it had been snipped from the screen.
        text: String,
    },
    /// Plugin management.
    Plugins {
        #[command(subcommand)]
        command: PluginCommands,
    },
    /// Check that the active provider answers.
    TestProvider,
}

#[derive(Subcommand, Debug)]
pub enum PluginCommands {
    /// List registered tools and pending approvals.
    List,
    /// Approve a pending plugin by id.
    Approve { plugin_id: String },
    /// Deny a pending plugin by id.
    Deny { plugin_id: String },
}
