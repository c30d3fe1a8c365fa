//! `setup`: run the OAuth consent flow and store the token.

use std::process::ExitCode;

use gworkspace_auth::{AuthError, CLIENT_ID_ENV, CLIENT_SECRET_ENV};
use tracing::{info, warn};

use crate::cli::CredentialArgs;
use crate::commands::Context;
use crate::config::{CredentialSource, ResolvedCredentials, save_credentials};
use crate::error::ClientResult;

pub async fn run(ctx: &Context, args: CredentialArgs, force: bool) -> ClientResult<ExitCode> {
    let Some(resolved) = ctx
        .config
        .google
        .resolve_credentials(args.client_id, args.client_secret)?
    else {
        return Err(AuthError::configuration(missing_credentials_help(ctx)).into());
    };
    let credentials = resolved.credentials.clone();
    credentials.require()?;
    if !credentials.looks_like_google_client() {
        warn!(
            client_id = %credentials.client_id,
            "client id does not end in .apps.googleusercontent.com"
        );
    }

    let manager = ctx.manager(ctx.migrated_storage()?, Some(credentials.clone()))?;

    if manager.has_valid_tokens().await && !force {
        persist(ctx, &resolved);
        println!("Already authenticated. Tokens are stored in {}", manager.token_path().display());
        println!("Use --force to re-authenticate.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Starting Google Workspace authorization...");
    println!();
    println!("A browser window will open for you to grant access.");
    println!("If it does not, open the URL printed below.");
    println!();

    let token = manager
        .authenticate(ctx.config.google.scopes.clone(), &credentials)
        .await?;

    persist(ctx, &resolved);

    info!(expires_at = %token.expires_at, "setup complete");
    println!();
    println!("Authorization successful.");
    println!("Tokens saved to {}", manager.token_path().display());
    println!("Granted {} scope(s).", token.scopes.len());
    Ok(ExitCode::SUCCESS)
}

/// Writes flag/env credentials to config.toml so `mcp` can refresh without them.
fn persist(ctx: &Context, resolved: &ResolvedCredentials) {
    if resolved.source == CredentialSource::Config {
        return;
    }
    match save_credentials(&ctx.config_path, &resolved.credentials) {
        Ok(()) => println!("Credentials saved to {}", ctx.config_path.display()),
        Err(e) => warn!(
            path = %ctx.config_path.display(),
            error = %e,
            "could not save credentials"
        ),
    }
}

fn missing_credentials_help(ctx: &Context) -> String {
    format!(
        "Google OAuth client credentials are required. Provide them via:\n  \
         - --client-id and --client-secret\n  \
         - the {} and {} environment variables\n  \
         - client_id and client_secret under [google] in {}\n\
         Create a Desktop OAuth client at https://console.cloud.google.com/apis/credentials",
        CLIENT_ID_ENV,
        CLIENT_SECRET_ENV,
        ctx.config_path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn context(tmp: &tempfile::TempDir) -> Context {
        let mut config = ClientConfig::default();
        config.storage.credentials_dir = Some(tmp.path().join("creds").display().to_string());
        Context::new(config, tmp.path().join("config.toml")).unwrap()
    }

    #[tokio::test]
    async fn missing_credentials_fail_with_instructions() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(&tmp);

        let err = run(&ctx, CredentialArgs::default(), false).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains(CLIENT_ID_ENV));
        assert!(text.contains(CLIENT_SECRET_ENV));
        assert!(!tmp.path().join("creds").join("tokens.json").exists());
    }

    #[test]
    fn flag_credentials_are_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(&tmp);
        let resolved = ResolvedCredentials {
            credentials: gworkspace_auth::OAuthCredentials::new("flag-id", "flag-secret"),
            source: CredentialSource::Flags,
        };

        persist(&ctx, &resolved);

        let config = ClientConfig::load_from(&ctx.config_path).unwrap();
        assert_eq!(config.google.client_id.as_deref(), Some("flag-id"));
    }

    #[test]
    fn config_credentials_are_not_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(&tmp);
        let resolved = ResolvedCredentials {
            credentials: gworkspace_auth::OAuthCredentials::new("id", "secret"),
            source: CredentialSource::Config,
        };

        persist(&ctx, &resolved);

        assert!(!ctx.config_path.exists());
    }
}
