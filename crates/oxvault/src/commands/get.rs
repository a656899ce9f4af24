use std::io::{self, Write};

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use secrecy::ExposeSecret;
use tracing::instrument;

use super::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Secret name
    pub name: String,

    /// Read a specific version instead of the current one
    #[arg(long)]
    pub version: Option<u64>,

    /// Do not print a trailing newline
    #[arg(short = 'n', long)]
    pub no_newline: bool,
}

#[instrument(level = "info", name = "cmd::get", skip_all, fields(name = %args.name))]
pub fn execute(ctx: &Context<'_>, args: &Args) -> Result<()> {
    let (vault, _) = ctx.dir.open_with_resolved_key(ctx.options.clone())?;
    let value = vault
        .get(&args.name, args.version)
        .with_context(|| format!("Failed to read secret '{}'", args.name))?;

    // Read audit entries are only committed with the next write
    if vault.is_dirty()? {
        vault.save().context("Failed to record read in audit trail")?;
    }

    let mut stdout = io::stdout().lock();
    stdout.write_all(value.expose_secret().as_bytes())?;
    if !args.no_newline {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
