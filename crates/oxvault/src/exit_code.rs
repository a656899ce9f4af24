//! Exit codes for the CLI.
//!
//! Scripts can branch on these instead of parsing error text.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Wrong master key, unreadable key file, or a record that failed authentication
pub const AUTH_FAILED: u8 = 3;

/// Vault directory missing, corrupt, or in an unsupported format
pub const VAULT_INVALID: u8 = 4;

/// Permission denied on the vault directory or key file
pub const PERMISSION_DENIED: u8 = 5;

/// Secret or version not found
pub const NOT_FOUND: u8 = 7;
