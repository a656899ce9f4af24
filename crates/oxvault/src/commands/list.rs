//! List command - show live secrets with their current version.
//!
//! # Examples
//!
//! ```bash
//! oxvault list
//! oxvault list --json | jq '.secrets[].name'
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use super::Context;
use crate::output::{create_table, format_timestamp};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Names only, one per line (script-friendly)
    #[arg(short = '1')]
    pub one_per_line: bool,
}

#[derive(Serialize)]
struct ListOutput {
    secrets: Vec<SecretSummary>,
}

#[derive(Serialize)]
struct SecretSummary {
    name: String,
    version: u64,
    versions: usize,
    updated_at: DateTime<Utc>,
}

#[instrument(level = "info", name = "cmd::list", skip_all)]
pub fn execute(ctx: &Context<'_>, args: &Args) -> Result<()> {
    let (vault, _) = ctx.dir.open_with_resolved_key(ctx.options.clone())?;

    let mut secrets = Vec::new();
    for name in vault.list_keys()? {
        let versions = vault.list_versions(&name)?;
        if let Some(current) = versions.last() {
            secrets.push(SecretSummary {
                version: current.version,
                versions: versions.len(),
                updated_at: current.created_at,
                name,
            });
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ListOutput { secrets })?);
        return Ok(());
    }
    if args.one_per_line {
        for secret in &secrets {
            println!("{}", secret.name);
        }
        return Ok(());
    }
    if secrets.is_empty() {
        if !ctx.quiet {
            println!("No secrets stored");
        }
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Name", "Version", "History", "Updated"]);
    for secret in &secrets {
        table.add_row(vec![
            secret.name.clone(),
            secret.version.to_string(),
            secret.versions.to_string(),
            format_timestamp(&secret.updated_at),
        ]);
    }
    println!("{table}");
    Ok(())
}
