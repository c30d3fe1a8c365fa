//! `doctor`: report what is installed, stored and pending.

use std::path::Path;
use std::process::ExitCode;

use chrono::Utc;
use gworkspace_auth::{DEFAULT_SERVICE_NAME, SETUP_COMMAND, StoredToken, TokenStatus, TokenStorage};
use gworkspace_core::{Capabilities, ToolAvailability};

use crate::commands::Context;
use crate::error::ClientResult;

pub fn run(ctx: &Context) -> ClientResult<ExitCode> {
    println!("External tools:");
    for line in capability_lines(&Capabilities::probe()) {
        println!("  {}", line);
    }
    println!();

    let (status, stored) = read_token(&ctx.paths.token_file)?;
    println!("Token file: {}", ctx.paths.token_file.display());
    for line in token_lines(status, stored.as_ref()) {
        println!("  {}", line);
    }
    println!();

    let migrations = ctx.migration_runner().status()?;
    println!("Migrations:");
    println!("  current version: {}", migrations.current_version);
    println!(
        "  applied: {}, pending: {}",
        migrations.applied_count, migrations.pending_count
    );
    for pending in &migrations.pending_migrations {
        println!("    - {} ({})", pending.id, pending.description);
    }

    Ok(if is_healthy(status) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Reads the default token without creating the credentials directory.
fn read_token(token_file: &Path) -> ClientResult<(TokenStatus, Option<StoredToken>)> {
    if !token_file.parent().is_some_and(Path::is_dir) {
        return Ok((TokenStatus::Missing, None));
    }
    let storage = TokenStorage::new(token_file)?;
    Ok((
        storage.get_status(DEFAULT_SERVICE_NAME),
        storage.retrieve(DEFAULT_SERVICE_NAME),
    ))
}

/// MISSING and INVALID need user action; EXPIRED is refreshed on the next call.
fn is_healthy(status: TokenStatus) -> bool {
    matches!(status, TokenStatus::Valid | TokenStatus::Expired)
}

fn capability_lines(caps: &Capabilities) -> Vec<String> {
    caps.iter()
        .map(|(tool, availability)| match availability {
            ToolAvailability::Available { version } => {
                format!("{:<8} available ({})", tool.program(), version)
            }
            ToolAvailability::Unavailable { .. } => format!(
                "{:<8} not found, {} disabled",
                tool.program(),
                tool.purpose()
            ),
        })
        .collect()
}

fn token_lines(status: TokenStatus, stored: Option<&StoredToken>) -> Vec<String> {
    let mut lines = vec![format!("status: {}", status)];
    match (status, stored) {
        (TokenStatus::Valid, Some(stored)) => {
            let remaining = stored.token.expires_at - Utc::now();
            lines.push(format!(
                "expires: {} (in {} min)",
                stored.token.expires_at.to_rfc3339(),
                remaining.num_minutes()
            ));
            lines.push(format!("scopes: {}", stored.token.scopes.len()));
        }
        (TokenStatus::Expired, Some(stored)) => {
            let note = if stored.token.refresh_token.is_some() {
                "it will be refreshed on next use"
            } else {
                "no refresh token is stored"
            };
            lines.push(format!("expired at {}; {}", stored.token.expires_at.to_rfc3339(), note));
        }
        (TokenStatus::Invalid, _) => {
            lines.push(format!("the token record is unreadable; run `{}`", SETUP_COMMAND));
        }
        _ => lines.push(format!("no token stored; run `{}`", SETUP_COMMAND)),
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gworkspace_auth::{OAuthToken, TokenMetadata};
    use gworkspace_core::ExternalTool;

    fn stored(expires_in: Duration, refresh: Option<&str>) -> StoredToken {
        StoredToken::new(
            OAuthToken::new(
                "ya29.access",
                refresh.map(str::to_string),
                Utc::now() + expires_in,
                vec!["a".to_string(), "b".to_string()],
            ),
            TokenMetadata::new(DEFAULT_SERVICE_NAME),
        )
    }

    #[test]
    fn read_token_leaves_absent_credentials_dir_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let creds = tmp.path().join(".gworkspace-mcp");

        let (status, stored) = read_token(&creds.join("tokens.json")).unwrap();
        assert_eq!(status, TokenStatus::Missing);
        assert!(stored.is_none());
        assert!(!creds.exists());
    }

    #[test]
    fn read_token_reports_stored_token() {
        let tmp = tempfile::tempdir().unwrap();
        let token_file = tmp.path().join("creds/tokens.json");
        let token = stored(Duration::hours(1), Some("1//r"));
        TokenStorage::new(&token_file)
            .unwrap()
            .store(DEFAULT_SERVICE_NAME, &token.token, &token.metadata)
            .unwrap();

        let (status, stored) = read_token(&token_file).unwrap();
        assert_eq!(status, TokenStatus::Valid);
        assert_eq!(stored.unwrap().token.access_token, "ya29.access");
    }

    #[test]
    fn health_follows_status() {
        assert!(is_healthy(TokenStatus::Valid));
        assert!(is_healthy(TokenStatus::Expired));
        assert!(!is_healthy(TokenStatus::Missing));
        assert!(!is_healthy(TokenStatus::Invalid));
    }

    #[test]
    fn valid_token_shows_expiry_and_scope_count() {
        let token = stored(Duration::hours(1), Some("1//r"));
        let lines = token_lines(TokenStatus::Valid, Some(&token));
        assert_eq!(lines[0], "status: VALID");
        assert!(lines[1].starts_with("expires: "));
        assert_eq!(lines[2], "scopes: 2");
    }

    #[test]
    fn expired_token_mentions_refresh() {
        let token = stored(Duration::hours(-1), Some("1//r"));
        let lines = token_lines(TokenStatus::Expired, Some(&token));
        assert_eq!(lines[0], "status: EXPIRED");
        assert!(lines[1].contains("refreshed on next use"));

        let token = stored(Duration::hours(-1), None);
        let lines = token_lines(TokenStatus::Expired, Some(&token));
        assert!(lines[1].contains("no refresh token"));
    }

    #[test]
    fn missing_token_points_at_setup() {
        let lines = token_lines(TokenStatus::Missing, None);
        assert_eq!(lines[0], "status: MISSING");
        assert!(lines[1].contains(SETUP_COMMAND));
    }

    #[test]
    fn capability_lines_name_each_tool() {
        let caps = Capabilities::probe_with(|tool| match tool {
            ExternalTool::Rclone => ToolAvailability::Available {
                version: "rclone v1.66.0".to_string(),
            },
            _ => ToolAvailability::Unavailable {
                reason: "not found".to_string(),
            },
        });
        let lines = capability_lines(&caps);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("rclone"));
        assert!(lines[0].contains("available (rclone v1.66.0)"));
        assert!(lines[1].contains("not found, document conversion disabled"));
        assert!(lines[2].starts_with("mmdc"));
    }
}
