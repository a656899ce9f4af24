#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;
mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oxvault_core::crypto::CryptoError;
use oxvault_core::vault::{PersistenceError, VaultError, VaultOptions};

use crate::commands::{audit, delete, get, init, list, rotate, set, verify, versions};
use crate::config::VaultDir;

/// Versioned, encrypted secret store with key rotation
#[derive(Parser)]
#[command(name = "oxvault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    oxvault init                           Create a vault in ./.oxvault
    oxvault set API_KEY abc123             Store a new version
    echo -n s3cret | oxvault set DB_PASS   Read the value from stdin
    oxvault get API_KEY --version 1        Read an older version
    oxvault rotate                         Re-encrypt under a fresh key
    oxvault audit --name API_KEY           Show the audit trail for one secret")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Vault directory
    #[arg(long, env = "OXVAULT_DIR", default_value = ".oxvault", global = true)]
    vault: PathBuf,

    /// Master key file (base64); overrides OXVAULT_MASTER_KEY and <vault>/master.key
    #[arg(long, env = "OXVAULT_KEY_FILE", hide_env_values = true, global = true)]
    key_file: Option<PathBuf>,

    /// Record an audit entry for every read
    #[arg(long, env = "OXVAULT_AUDIT_READS", global = true)]
    audit_reads: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault and master key
    Init(init::Args),

    /// Store a new version of a secret
    Set(set::Args),

    /// Print the value of a secret
    #[command(disable_version_flag = true)]
    Get(get::Args),

    /// Delete a secret (history is kept)
    Delete(delete::Args),

    /// List live secrets
    List(list::Args),

    /// Show the version history of a secret
    Versions(versions::Args),

    /// Re-encrypt every version under a new master key
    Rotate(rotate::Args),

    /// Show the audit trail
    Audit(audit::Args),

    /// Check that every stored version authenticates under the current key
    Verify(verify::Args),
}

fn main() -> ExitCode {
    let is_quiet = std::env::args().any(|a| a == "-q" || a == "--quiet");

    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);
            if !is_quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let dir = VaultDir::new(&cli.vault, cli.key_file.clone());
    let options = VaultOptions::default().with_audit_reads(cli.audit_reads);
    let ctx = commands::Context {
        dir: &dir,
        options,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Init(args) => init::execute(&ctx, &args),
        Commands::Set(args) => set::execute(&ctx, &args),
        Commands::Get(args) => get::execute(&ctx, &args),
        Commands::Delete(args) => delete::execute(&ctx, &args),
        Commands::List(args) => list::execute(&ctx, &args),
        Commands::Versions(args) => versions::execute(&ctx, &args),
        Commands::Rotate(args) => rotate::execute(&ctx, &args),
        Commands::Audit(args) => audit::execute(&ctx, &args),
        Commands::Verify(args) => verify::execute(&ctx, &args),
    }
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(vault_err) = cause.downcast_ref::<VaultError>() {
            match vault_err {
                VaultError::NotFound { .. } | VaultError::VersionNotFound { .. } => {
                    return exit_code::NOT_FOUND;
                }
                VaultError::InvalidKey { .. } | VaultError::AuthenticationFailed { .. } => {
                    return exit_code::AUTH_FAILED;
                }
                VaultError::InvariantViolation(_) | VaultError::RotationAborted { .. } => {
                    return exit_code::VAULT_INVALID;
                }
                _ => {}
            }
        }

        // Key decoding failures
        if let Some(crypto_err) = cause.downcast_ref::<CryptoError>()
            && matches!(
                crypto_err,
                CryptoError::InvalidKey { .. }
                    | CryptoError::InvalidKeyEncoding(_)
                    | CryptoError::AuthenticationFailed
            )
        {
            return exit_code::AUTH_FAILED;
        }

        if let Some(persist_err) = cause.downcast_ref::<PersistenceError>()
            && matches!(
                persist_err,
                PersistenceError::Corrupt { .. } | PersistenceError::UnsupportedFormat { .. }
            )
        {
            return exit_code::VAULT_INVALID;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                io::ErrorKind::NotFound => return exit_code::VAULT_INVALID,
                _ => {}
            }
        }
    }

    // Fallback for errors without a typed variant
    let msg = format!("{e:#}").to_lowercase();
    if msg.contains("no vault found") || (msg.contains("vault") && msg.contains("corrupt")) {
        exit_code::VAULT_INVALID
    } else {
        exit_code::GENERAL_ERROR
    }
}
