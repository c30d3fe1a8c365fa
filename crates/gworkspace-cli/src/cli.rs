//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// gworkspace-mcp - Google Workspace tools for MCP clients
#[derive(Debug, Parser)]
#[command(name = "gworkspace-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "GWORKSPACE_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// OAuth client credentials from Google Cloud Console.
#[derive(Debug, Clone, Default, Args)]
pub struct CredentialArgs {
    /// OAuth client ID
    #[arg(long, env = "GOOGLE_OAUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "GOOGLE_OAUTH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authorize access to Google Workspace and store the tokens
    Setup {
        #[command(flatten)]
        credentials: CredentialArgs,

        /// Re-authenticate even if a valid token is stored
        #[arg(long, short)]
        force: bool,
    },

    /// Check external tools, stored tokens and migrations
    Doctor,

    /// Serve MCP tools over stdin/stdout
    Mcp {
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Inspect or apply data migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Remove the stored token
    Logout,
}

/// Migration actions.
#[derive(Debug, Subcommand)]
pub enum MigrateAction {
    /// Show applied and pending migrations
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending migrations
    Run {
        /// Report what would change without touching anything
        #[arg(long)]
        dry_run: bool,
    },
}

impl Command {
    /// Returns true for the stdio server, whose stdout carries protocol frames.
    pub fn is_stdio_server(&self) -> bool {
        matches!(self, Self::Mcp { .. })
    }
}
