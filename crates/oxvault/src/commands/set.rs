use std::io::{self, IsTerminal, Read};

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use oxvault_core::vault::Metadata;

use super::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Secret name
    pub name: String,

    /// Secret value (read from stdin when omitted)
    pub value: Option<String>,

    /// Attach metadata to this version (repeatable)
    #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_metadata_pair)]
    pub metadata: Vec<(String, String)>,
}

fn parse_metadata_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err("metadata key cannot be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

fn read_value(args: &Args) -> Result<SecretString> {
    if let Some(value) = &args.value {
        return Ok(SecretString::from(value.clone()));
    }
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("Value for {}: ", args.name);
    }
    let mut value = String::new();
    stdin
        .read_to_string(&mut value)
        .context("Failed to read value from stdin")?;
    // Drop a single trailing newline from `echo` style input
    if value.ends_with('\n') {
        value.pop();
        if value.ends_with('\r') {
            value.pop();
        }
    }
    Ok(SecretString::from(value))
}

#[instrument(level = "info", name = "cmd::set", skip_all, fields(name = %args.name))]
pub fn execute(ctx: &Context<'_>, args: &Args) -> Result<()> {
    let value = read_value(args)?;
    let metadata = (!args.metadata.is_empty())
        .then(|| args.metadata.iter().cloned().collect::<Metadata>());

    let (vault, _) = ctx.dir.open_with_resolved_key(ctx.options.clone())?;
    let version = vault
        .set(&args.name, value.expose_secret(), metadata)
        .with_context(|| format!("Failed to store secret '{}'", args.name))?;

    if !ctx.quiet {
        println!("Stored {} version {version}", args.name);
    }
    Ok(())
}
