//! `migrate status` and `migrate run`.

use std::process::ExitCode;

use gworkspace_migrations::{MigrationRunner, MigrationStatus};

use crate::commands::Context;
use crate::error::ClientResult;

pub fn status(ctx: &Context, json: bool) -> ClientResult<ExitCode> {
    let status = ctx.migration_runner().status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in status_lines(&status) {
            println!("{}", line);
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn run(ctx: &Context, dry_run: bool) -> ClientResult<ExitCode> {
    let runner = ctx
        .migration_runner()
        .with_progress(|line| println!("{}", line));
    Ok(if apply(&runner, dry_run)? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Runs every pending migration. Returns false if the run stopped early.
fn apply(runner: &MigrationRunner, dry_run: bool) -> ClientResult<bool> {
    let pending = runner.get_pending_migrations()?;
    if pending.is_empty() {
        println!("No pending migrations.");
        return Ok(true);
    }

    let applied = runner.run_all_pending(dry_run)?;
    if applied.len() < pending.len() {
        eprintln!(
            "Migration run stopped: {} of {} migration(s) completed.",
            applied.len(),
            pending.len()
        );
        return Ok(false);
    }

    if dry_run {
        println!("{} migration(s) would be applied.", applied.len());
    } else {
        println!("Applied {} migration(s).", applied.len());
    }
    Ok(true)
}

fn status_lines(status: &MigrationStatus) -> Vec<String> {
    let mut lines = vec![
        format!("Current version: {}", status.current_version),
        format!(
            "Migrations: {} total, {} applied, {} pending",
            status.total_migrations, status.applied_count, status.pending_count
        ),
    ];
    for applied in &status.applied_migrations {
        lines.push(format!(
            "  [applied] {} ({}, {})",
            applied.id,
            applied.version,
            applied.applied_at.format("%Y-%m-%d %H:%M")
        ));
    }
    for pending in &status.pending_migrations {
        lines.push(format!(
            "  [pending] {} ({}): {}",
            pending.id, pending.version, pending.description
        ));
    }
    lines
}
