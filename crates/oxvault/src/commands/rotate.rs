//! Rotate command - re-encrypt the vault under a new master key.
//!
//! The new key is written next to the current key file as `<key>.pending`
//! before the snapshot is replaced, and renamed over the old key only after
//! the commit succeeds. A crash in between leaves both keys on disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument, warn};

use oxvault_core::crypto::MasterKey;
use oxvault_core::vault::{Vault, VaultError};

use super::Context;
use crate::config::{KeySource, write_key_file};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Rotate to the base64 key in this file instead of generating one
    #[arg(long, value_name = "PATH")]
    pub new_key_file: Option<PathBuf>,

    /// Print the new key (base64) to stdout
    #[arg(long)]
    pub print_key: bool,
}

fn pending_key_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".pending");
    PathBuf::from(name)
}

/// Rotate, retrying a failed commit without re-encrypting.
fn rotate_with_retry(vault: &Vault, candidate: MasterKey) -> Result<MasterKey, VaultError> {
    let mut result = vault.rotate(Some(candidate));
    while let Err(VaultError::Persistence(e)) = &result {
        if vault.pending_rotation()?.is_none() {
            break;
        }
        warn!(error = %e, "Rotation commit failed, retrying");
        result = vault.retry_rotation_commit();
    }
    result
}

#[instrument(level = "info", name = "cmd::rotate", skip_all)]
pub fn execute(ctx: &Context<'_>, args: &Args) -> Result<()> {
    let (vault, source) = ctx.dir.open_with_resolved_key(ctx.options.clone())?;
    let old_fingerprint = vault.key_fingerprint()?;
    let candidate = match &args.new_key_file {
        Some(path) => {
            let encoded = fs::read_to_string(path)
                .with_context(|| format!("Failed to read new key file: {}", path.display()))?;
            MasterKey::from_base64(&encoded)
                .with_context(|| format!("Invalid master key in {}", path.display()))?
        }
        None => MasterKey::random()?,
    };

    let key_path = match &source {
        KeySource::File(path) => Some(path.clone()),
        KeySource::Env => None,
    };
    let pending = key_path.as_deref().map(pending_key_path);
    if let Some(pending) = &pending {
        write_key_file(pending, &candidate, true)?;
    }

    let new_key = match rotate_with_retry(&vault, candidate) {
        Ok(key) => key,
        Err(e) => {
            if let Some(pending) = &pending
                && let Err(remove_err) = fs::remove_file(pending)
            {
                warn!(error = %remove_err, path = %pending.display(), "Failed to remove pending key");
            }
            return Err(e).context("Rotation failed; the vault still uses the old key");
        }
    };

    if let (Some(pending), Some(key_path)) = (&pending, &key_path) {
        fs::rename(pending, key_path).with_context(|| {
            format!(
                "Vault rotated but the new key is still at {}; move it to {}",
                pending.display(),
                key_path.display()
            )
        })?;
    }
    let new_fingerprint = new_key.fingerprint()?;
    info!(old = %old_fingerprint, new = %new_fingerprint, "Key rotated");

    if args.print_key || source == KeySource::Env {
        println!("{}", new_key.to_base64()?.as_str());
    }
    if !ctx.quiet {
        eprintln!("Rotated master key {old_fingerprint} -> {new_fingerprint}");
        match &key_path {
            Some(path) => eprintln!("New key written to: {}", path.display()),
            None => eprintln!(
                "Key came from the environment; store the printed key before discarding it"
            ),
        }
    }
    Ok(())
}
