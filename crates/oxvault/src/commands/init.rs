use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use oxvault_core::crypto::MasterKey;

use super::Context;
use crate::config::{MASTER_KEY_ENV, write_key_file};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Use the key from OXVAULT_MASTER_KEY instead of generating one
    #[arg(long)]
    pub use_env_key: bool,
}

#[instrument(level = "info", name = "cmd::init", skip_all)]
pub fn execute(ctx: &Context<'_>, args: &Args) -> Result<()> {
    let dir = ctx.dir;
    if dir.is_initialized() {
        anyhow::bail!("A vault already exists at {}", dir.root().display());
    }

    // Later commands would read the env key, not the one generated here
    if !args.use_env_key
        && !dir.has_explicit_key_file()
        && std::env::var_os(MASTER_KEY_ENV).is_some()
    {
        anyhow::bail!(
            "{MASTER_KEY_ENV} is set; pass --use-env-key to initialize with it, or unset it"
        );
    }

    std::fs::create_dir_all(dir.root())
        .with_context(|| format!("Failed to create vault directory: {}", dir.root().display()))?;

    let key = if args.use_env_key {
        let encoded = std::env::var(MASTER_KEY_ENV)
            .with_context(|| format!("{MASTER_KEY_ENV} is not set"))?;
        MasterKey::from_base64(&encoded)
            .with_context(|| format!("Invalid master key in {MASTER_KEY_ENV}"))?
    } else {
        let key = MasterKey::random()?;
        write_key_file(&dir.key_path(), &key, false)?;
        key
    };
    let fingerprint = key.fingerprint()?;

    // Commit an empty snapshot so later commands find the vault
    let vault = dir.open_uninitialized(key, ctx.options.clone())?;
    vault.save().context("Failed to write initial snapshot")?;

    if !ctx.quiet {
        println!("Created new vault at: {}", dir.root().display());
        if !args.use_env_key {
            println!("Master key written to: {}", dir.key_path().display());
        }
        println!("Key fingerprint: {fingerprint}");
    }
    Ok(())
}
