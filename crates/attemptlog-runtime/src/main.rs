//! attemptlog: replay recorded execution-process patch logs through the
//! merged attempt feed and print what a viewer would see.

use clap::Parser;

mod cli;
mod cmd_replay;
mod display;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("ATTEMPTLOG_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = cmd_replay::load_config(args.config.as_deref())?;

    match args.command {
        cli::Command::Replay(opts) => {
            cmd_replay::cmd_replay(&opts.file, opts.session.as_deref(), opts.json, &config).await?;
        }
        cli::Command::Todos(opts) => {
            cmd_replay::cmd_todos(&opts.file, opts.session.as_deref(), &config).await?;
        }
    }

    Ok(())
}
