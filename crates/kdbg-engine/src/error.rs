//! Engine error types.

use kdbg_debuginfo::DebugInfoError;
use kdbg_stub::StubError;
use thiserror::Error;

use crate::breakpoint::SlotId;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Every stub breakpoint slot is in use.
    #[error("maximum number of active breakpoints exceeded ({max})")]
    CapacityExceeded {
        /// Number of slots the stub provides.
        max: usize,
    },

    /// Address 0 cannot be bound; the stub reads it as a delete.
    #[error("cannot set a breakpoint at address 0")]
    NullAddress,

    /// The slot holds no breakpoint that can be deleted.
    #[error("breakpoint slot {0} is not active")]
    InactiveSlot(SlotId),

    /// No trap address was compiled for the source line.
    #[error("no code at {document}:{line}")]
    UnknownSourceLine {
        /// Source document.
        document: String,
        /// 1-based line number.
        line: u32,
    },

    /// A debug information lookup failed.
    #[error(transparent)]
    DebugInfo(#[from] DebugInfoError),

    /// A command could not be handed to the stub.
    #[error(transparent)]
    Stub(#[from] StubError),
}
