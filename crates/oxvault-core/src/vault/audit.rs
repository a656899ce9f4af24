//! Ordered, append-only audit trail.

use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Kind of operation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Set,
    Get,
    Delete,
    Rotate,
}

impl AuditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOperation::Set => "set",
            AuditOperation::Get => "get",
            AuditOperation::Delete => "delete",
            AuditOperation::Rotate => "rotate",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "set" => Ok(AuditOperation::Set),
            "get" => Ok(AuditOperation::Get),
            "delete" => Ok(AuditOperation::Delete),
            "rotate" => Ok(AuditOperation::Rotate),
            other => Err(format!("unknown audit operation '{other}'")),
        }
    }
}

/// One immutable audit record. `name` and `version` are absent for `rotate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub operation: AuditOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Filter for [`AuditLog::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub name: Option<String>,
    pub operation: Option<AuditOperation>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: AuditOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &AuditEntry) -> bool {
        self.name
            .as_deref()
            .is_none_or(|name| entry.name.as_deref() == Some(name))
            && self.operation.is_none_or(|op| entry.operation == op)
    }
}

/// Audit trail validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("audit sequence {found} follows {previous}; sequences must strictly increase")]
pub struct AuditOrderError {
    pub previous: u64,
    pub found: u64,
}

/// The audit trail stored in a vault snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AuditEntry>", into = "Vec<AuditEntry>")]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl TryFrom<Vec<AuditEntry>> for AuditLog {
    type Error = AuditOrderError;

    fn try_from(entries: Vec<AuditEntry>) -> Result<Self, Self::Error> {
        let mut previous = 0;
        for entry in &entries {
            if entry.sequence <= previous {
                return Err(AuditOrderError {
                    previous,
                    found: entry.sequence,
                });
            }
            previous = entry.sequence;
        }
        Ok(AuditLog { entries })
    }
}

impl From<AuditLog> for Vec<AuditEntry> {
    fn from(log: AuditLog) -> Self {
        log.entries
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The sequence number the next entry will receive.
    pub fn next_sequence(&self) -> u64 {
        self.entries.last().map_or(1, |e| e.sequence + 1)
    }

    /// Append an entry and return a copy of it.
    pub fn record(
        &mut self,
        operation: AuditOperation,
        name: Option<&str>,
        version: Option<u64>,
    ) -> AuditEntry {
        let entry = AuditEntry {
            sequence: self.next_sequence(),
            operation,
            name: name.map(str::to_string),
            version,
            timestamp: Utc::now(),
        };
        debug!(sequence = entry.sequence, %operation, "Audit entry recorded");
        self.entries.push(entry.clone());
        entry
    }

    /// Entries in recording order.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries with a sequence greater than `sequence`, oldest first.
    pub fn entries_after(&self, sequence: u64) -> &[AuditEntry] {
        let start = self.entries.partition_point(|e| e.sequence <= sequence);
        &self.entries[start..]
    }

    /// Most recent entries first, optionally restricted to one name.
    pub fn entries_for(&self, name: Option<&str>, limit: usize) -> Vec<AuditEntry> {
        self.query(&AuditQuery {
            name: name.map(str::to_string),
            operation: None,
            limit: Some(limit),
        })
    }

    /// Most recent matching entries first.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Write the whole trail to `path` as pretty-printed JSON.
    pub fn export_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(&self.entries)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&json)?;
        file.sync_all()
    }
}
