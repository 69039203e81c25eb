//! Error and warning taxonomy.
//!
//! Only [`ContainerError`] is fatal. Everything else is downgraded to a
//! warning string on the import result and processing continues.

use thiserror::Error;

use crate::container::Role;

/// The archive itself could not be used
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("not a readable backup archive: {0}")]
    InvalidArchive(String),

    #[error("backup archive contains no members")]
    Empty,

    #[error("failed to write backup archive: {0}")]
    Write(String),
}

/// A logical role has no member in the archive
#[derive(Debug, Clone, Error)]
#[error("no member found for {role} (looked for {candidates})")]
pub struct MissingMember {
    pub role: Role,
    pub candidates: String,
}

impl MissingMember {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            candidates: role.candidates().join(", "),
        }
    }
}

/// Invalid import configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("min_account_yield must be at least 1")]
    ZeroAccountYield,

    #[error("max_records must be at least 1")]
    ZeroRecordCap,

    #[error("max_member_bytes must be at least 1 when set")]
    ZeroMemberBudget,

    #[error("entity_timeout_ms must be at least 1 when set")]
    ZeroTimeout,
}
