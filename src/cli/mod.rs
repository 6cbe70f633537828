//! CLI entry point for HAL.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// HAL tool-augmented conversation orchestrator
#[derive(Parser, Debug)]
#[command(name = "hal", version, about = "HAL: LLM conversations with MCP tool providers")]
pub struct Cli {
    /// Config file (defaults to $HAL_CONFIG, then ~/.hal/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP controller
    Serve(ServeArgs),
    /// Answer one query in-process and exit
    Ask(AskArgs),
    /// List the tools offered by the configured providers
    Tools,
}

/// Arguments for `hal serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.bind)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Arguments for `hal ask`.
#[derive(Parser, Debug)]
pub struct AskArgs {
    /// The query to answer
    pub query: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
