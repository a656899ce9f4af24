pub mod audit;
pub mod delete;
pub mod get;
pub mod init;
pub mod list;
pub mod rotate;
pub mod set;
pub mod verify;
pub mod versions;

use oxvault_core::vault::VaultOptions;

use crate::config::VaultDir;

/// Settings shared by every subcommand.
pub struct Context<'a> {
    pub dir: &'a VaultDir,
    pub options: VaultOptions,
    pub quiet: bool,
}
