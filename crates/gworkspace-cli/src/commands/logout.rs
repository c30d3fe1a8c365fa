//! `logout`: forget the stored token.

use std::process::ExitCode;

use gworkspace_auth::{DEFAULT_SERVICE_NAME, TokenStorage};

use crate::commands::Context;
use crate::error::ClientResult;

pub fn run(ctx: &Context) -> ClientResult<ExitCode> {
    let storage = ctx.storage()?;
    if remove_token(&storage)? {
        println!("Removed the stored token from {}", storage.path().display());
    } else {
        println!("No stored token to remove.");
    }
    Ok(ExitCode::SUCCESS)
}

fn remove_token(storage: &TokenStorage) -> ClientResult<bool> {
    Ok(storage.delete(DEFAULT_SERVICE_NAME)?)
}
