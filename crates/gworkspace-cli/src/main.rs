//! gworkspace-mcp CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use gworkspace_cli::cli::{Cli, Command, MigrateAction};
use gworkspace_cli::commands::{self, Context};
use gworkspace_cli::config::ClientConfig;
use gworkspace_cli::error::{ClientError, ClientResult};
use gworkspace_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else if cli.command.is_stdio_server() {
        TracingConfig::mcp()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<ExitCode> {
    let config_path = cli.config.unwrap_or_else(ClientConfig::default_path);
    let config = ClientConfig::load_or_default(&config_path).map_err(ClientError::Config)?;
    let ctx = Context::new(config, config_path)?;

    match cli.command {
        Command::Setup { credentials, force } => commands::setup::run(&ctx, credentials, force).await,
        Command::Doctor => commands::doctor::run(&ctx),
        Command::Mcp { credentials } => commands::mcp::run(&ctx, credentials).await,
        Command::Migrate { action } => match action {
            MigrateAction::Status { json } => commands::migrate::status(&ctx, json),
            MigrateAction::Run { dry_run } => commands::migrate::run(&ctx, dry_run),
        },
        Command::Logout => commands::logout::run(&ctx),
    }
}
