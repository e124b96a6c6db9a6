//! Debug information error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from debug information lookups.
#[derive(Debug, Error)]
pub enum DebugInfoError {
    /// The compiled debug-info artifact does not exist.
    #[error("debug info file not found: {0}")]
    NotFound(PathBuf),

    /// The artifact could not be parsed.
    #[error("debug info parse error: {0}")]
    Parse(String),

    /// An I/O error occurred while reading the artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cache was entered while another lookup held it.
    #[error("debug info cache contention during {query}")]
    Contention {
        /// The lookup that was refused.
        query: String,
    },

    /// No method or trap point covers the address.
    #[error("no debug info for address {0:#010x}")]
    UnknownAddress(u32),

    /// No label with this name exists.
    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    /// No method with this id exists.
    #[error("unknown method id {0}")]
    UnknownMethod(i64),

    /// No field map or field info with this name exists.
    #[error("unknown type or field '{0}'")]
    UnknownType(String),
}
