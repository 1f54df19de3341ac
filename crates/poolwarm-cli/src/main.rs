//! poolwarm CLI entrypoint.

use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod handlers;
mod logging;
mod report;

use commands::{Commands, ConnectionArgs};
use config::{CliConfig, overlay};

#[derive(Parser)]
#[command(name = "poolwarm")]
#[command(author, version, about = "Save and restore the InnoDB buffer pool working set", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Config file (default: per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), render_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CliConfig::load(cli.config.as_deref())?;
    config.apply_connection_args(&cli.connection);

    match cli.command {
        Commands::Save { file, format } => {
            overlay(&mut config.file, &file);
            overlay(&mut config.format, &format);
            handlers::save(&config).await?
        }
        Commands::Restore {
            file,
            format,
            batch_size,
            concurrency,
        } => {
            overlay(&mut config.file, &file);
            overlay(&mut config.batch_size, &batch_size);
            overlay(&mut config.concurrency, &concurrency);
            handlers::restore(&config, format.as_deref()).await?
        }
        Commands::Inspect {
            file,
            format,
            pages,
        } => {
            overlay(&mut config.file, &file);
            handlers::inspect(&config, format.as_deref(), pages).await?
        }
        Commands::Formats => handlers::formats(),
    }

    Ok(())
}

/// Join the cause chain, skipping causes whose text the message already
/// carries.
fn render_error(error: &anyhow::Error) -> String {
    let mut rendered = error.to_string();
    for cause in error.chain().skip(1) {
        let message = cause.to_string();
        if !rendered.contains(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
    }
    rendered
}
