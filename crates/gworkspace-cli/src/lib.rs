//! The `gworkspace-mcp` command-line interface.
//!
//! `setup` authorizes access and stores tokens, `mcp` serves tools over
//! stdio, `doctor`, `migrate` and `logout` look after the on-disk state.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
