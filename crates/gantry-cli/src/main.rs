//! Gantry CLI entrypoint.

use clap::Parser;

mod commands;
mod handlers;

use commands::Commands;

/// Exit codes: 0 pipeline success, 1 pipeline failure, 2 configuration
/// error.
#[derive(Parser)]
#[command(name = "gantry")]
#[command(author, version, about = "Gantry CI pipeline engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run(args) => handlers::run(args).await,
        Commands::Validate { workflow } => handlers::validate(&workflow),
    };

    std::process::exit(code);
}
