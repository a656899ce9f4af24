use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use super::Context;
use crate::output::{create_table, format_metadata, format_timestamp};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Secret name (deleted secrets keep their history)
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::versions", skip_all, fields(name = %args.name))]
pub fn execute(ctx: &Context<'_>, args: &Args) -> Result<()> {
    let (vault, _) = ctx.dir.open_with_resolved_key(ctx.options.clone())?;
    let versions = vault
        .list_versions(&args.name)
        .with_context(|| format!("Failed to list versions of '{}'", args.name))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }

    let live = vault.list_keys()?.contains(&args.name);
    let mut table = create_table();
    table.set_header(vec!["Version", "Created", "Metadata"]);
    for info in &versions {
        table.add_row(vec![
            info.version.to_string(),
            format_timestamp(&info.created_at),
            format_metadata(&info.metadata),
        ]);
    }
    println!("{table}");
    if !live && !ctx.quiet {
        println!("{} is deleted; older versions remain readable with --version", args.name);
    }
    Ok(())
}
