//! `mcp`: serve tools over stdin/stdout.

use std::process::ExitCode;
use std::sync::Arc;

use gworkspace_core::{Capabilities, ToolAvailability};
use gworkspace_server::{McpServer, Toolbox};
use tracing::{info, warn};

use crate::cli::CredentialArgs;
use crate::commands::Context;
use crate::error::ClientResult;

pub async fn run(ctx: &Context, args: CredentialArgs) -> ClientResult<ExitCode> {
    for (tool, availability) in Capabilities::probe().iter() {
        match availability {
            ToolAvailability::Available { version } => {
                info!(tool = tool.program(), %version, "external tool available")
            }
            ToolAvailability::Unavailable { reason } => {
                info!(tool = tool.program(), %reason, "{} unavailable", tool.purpose())
            }
        }
    }

    let credentials = ctx
        .config
        .google
        .resolve_credentials(args.client_id, args.client_secret)?
        .map(|resolved| resolved.credentials);
    if credentials.is_none() {
        warn!("no OAuth client credentials configured; expired tokens cannot be refreshed");
    }

    let manager = ctx.manager(ctx.migrated_storage()?, credentials)?;
    info!(token_file = %manager.token_path().display(), "starting stdio server");

    let toolbox = Toolbox::new(Arc::new(manager), ctx.config.http.timeouts())?;
    McpServer::new(toolbox).run_stdio().await?;

    info!("stdio server stopped");
    Ok(ExitCode::SUCCESS)
}
