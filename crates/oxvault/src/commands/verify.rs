use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use super::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {}

#[instrument(level = "info", name = "cmd::verify", skip_all)]
pub fn execute(ctx: &Context<'_>, _args: &Args) -> Result<()> {
    let (vault, _) = ctx.dir.open_with_resolved_key(ctx.options.clone())?;
    let report = vault.verify()?;

    if !report.is_clean() {
        for (name, version) in &report.failures {
            eprintln!("  {name} version {version}: failed authentication");
        }
        anyhow::bail!(
            "vault is corrupt: {} of {} records failed authentication",
            report.failures.len(),
            report.checked
        );
    }
    if !ctx.quiet {
        println!(
            "OK: {} records authenticate under key {}",
            report.checked,
            vault.key_fingerprint()?
        );
    }
    Ok(())
}
