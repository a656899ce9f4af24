//! Audit command - show or export the audit trail.
//!
//! # Examples
//!
//! ```bash
//! oxvault audit
//! oxvault audit --name API_KEY --operation set --limit 5
//! oxvault audit --export audit.json
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_core::vault::{AuditOperation, AuditQuery};

use super::Context;
use crate::output::{create_table, format_timestamp};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Only entries for this secret
    #[arg(long)]
    pub name: Option<String>,

    /// Only entries of this operation (set, get, delete, rotate)
    #[arg(long)]
    pub operation: Option<AuditOperation>,

    /// Maximum number of entries, most recent first
    #[arg(short, long, default_value_t = 20)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the full trail, oldest first, to a JSON file
    #[arg(long, value_name = "PATH", conflicts_with_all = ["name", "operation", "json"])]
    pub export: Option<PathBuf>,
}

#[instrument(level = "info", name = "cmd::audit", skip_all)]
pub fn execute(ctx: &Context<'_>, args: &Args) -> Result<()> {
    let (vault, _) = ctx.dir.open_with_resolved_key(ctx.options.clone())?;

    if let Some(path) = &args.export {
        let snapshot = vault.snapshot()?;
        snapshot
            .audit
            .export_json(path)
            .with_context(|| format!("Failed to export audit trail to {}", path.display()))?;
        if !ctx.quiet {
            println!("Exported {} entries to {}", snapshot.audit.len(), path.display());
        }
        return Ok(());
    }

    let mut query = AuditQuery::new().with_limit(args.limit);
    if let Some(name) = &args.name {
        query = query.with_name(name.clone());
    }
    if let Some(operation) = args.operation {
        query = query.with_operation(operation);
    }
    let entries = vault.audit_query(&query)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        if !ctx.quiet {
            println!("No audit entries");
        }
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Seq", "Time", "Operation", "Name", "Version"]);
    for entry in &entries {
        table.add_row(vec![
            entry.sequence.to_string(),
            format_timestamp(&entry.timestamp),
            entry.operation.to_string(),
            entry.name.clone().unwrap_or_else(|| "-".to_string()),
            entry
                .version
                .map_or_else(|| "-".to_string(), |v| v.to_string()),
        ]);
    }
    println!("{table}");
    Ok(())
}
