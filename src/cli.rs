//! Command-line interface for the referee.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::AgentIdentity;

/// Referee for chess games between LLM agents
#[derive(Parser, Debug)]
#[command(name = "chess_referee")]
#[command(about = "Referee for chess games between LLM agents", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file (defaults are used if it is missing)
    #[arg(short, long, default_value = "chess_referee.toml")]
    pub config: PathBuf,

    /// Subcommand to run; defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the web server with the WebSocket relay and REST API
    Serve {
        /// Address to bind to, overriding the config file
        #[arg(long)]
        bind: Option<String>,
    },

    /// Play one game in the terminal and print the result
    Play {
        /// Provider of the white agent (e.g. openai, anthropic, qwen, mock)
        #[arg(long)]
        white_provider: Option<String>,

        /// Model of the white agent
        #[arg(long)]
        white_model: Option<String>,

        /// Provider of the black agent
        #[arg(long)]
        black_provider: Option<String>,

        /// Model of the black agent
        #[arg(long)]
        black_model: Option<String>,

        /// Abort after this many plies (0 disables the limit)
        #[arg(long)]
        max_plies: Option<u32>,

        /// Corrective re-prompts allowed per ply
        #[arg(long)]
        retry_budget: Option<u32>,

        /// Initial clock of each seat, in seconds
        #[arg(long)]
        clock_secs: Option<u64>,
    },
}

/// Seat identity from optional provider/model flags.
///
/// A missing half is taken from `fallback`.
pub fn seat_identity(
    provider: Option<&str>,
    model: Option<&str>,
    fallback: &AgentIdentity,
) -> AgentIdentity {
    AgentIdentity::new(
        provider.unwrap_or(fallback.provider.as_str()),
        model.unwrap_or(fallback.model.as_str()),
    )
}
