//! Debug-stub transport error types.

use thiserror::Error;

/// Errors from debug-stub transport operations.
#[derive(Debug, Error)]
pub enum StubError {
    /// The underlying stream could not be opened.
    #[error("failed to open debug port: {0}")]
    Open(#[from] std::io::Error),

    /// The port specification could not be parsed.
    #[error("invalid debug port '{spec}': {reason}")]
    InvalidPort {
        /// The offending specification string.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The stub sent bytes that cannot form a notification.
    #[error("malformed notification: {0}")]
    Malformed(String),

    /// The connection's writer has stopped; no more commands can be sent.
    #[error("debug stub disconnected")]
    Disconnected,
}
