use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_core::vault::VaultError;

use super::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Secret name
    pub name: String,
}

#[instrument(level = "info", name = "cmd::delete", skip_all, fields(name = %args.name))]
pub fn execute(ctx: &Context<'_>, args: &Args) -> Result<()> {
    let (vault, _) = ctx.dir.open_with_resolved_key(ctx.options.clone())?;
    let deleted = vault
        .delete(&args.name)
        .with_context(|| format!("Failed to delete secret '{}'", args.name))?;

    if !deleted {
        return Err(VaultError::NotFound {
            name: args.name.clone(),
        }
        .into());
    }
    if !ctx.quiet {
        println!("Deleted {}", args.name);
    }
    Ok(())
}
