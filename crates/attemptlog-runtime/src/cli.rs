//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "attemptlog", about = "Replay and inspect merged attempt log feeds")]
pub struct Cli {
    /// Feed configuration (TOML). Defaults apply when omitted.
    #[arg(long, short = 'c', global = true, env = "ATTEMPTLOG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a JSONL patch log and print the merged feed
    Replay(ReplayOpts),
    /// Replay a JSONL patch log and print the pinned todo list (JSON)
    Todos(TodosOpts),
}

#[derive(clap::Args)]
pub struct ReplayOpts {
    /// Patch log, one batch per line
    pub file: PathBuf,

    /// Attempt session to follow (default: session of the first batch)
    #[arg(long)]
    pub session: Option<String>,

    /// Print entries as a JSON array
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct TodosOpts {
    /// Patch log, one batch per line
    pub file: PathBuf,

    /// Attempt session to follow (default: session of the first batch)
    #[arg(long)]
    pub session: Option<String>,
}
