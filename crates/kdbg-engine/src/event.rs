//! Events the engine reports to the shell.

use tokio::sync::mpsc;

use crate::asm_window::AssemblyWindow;
use crate::breakpoint::SlotId;

/// Receiving end of the engine's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Something the shell should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The transport is open.
    ConnectionEstablished,
    /// The transport closed; the session is over.
    ConnectionLost(String),
    /// The kernel booted and bound breakpoints were re-armed.
    SessionStarted,
    /// Execution stopped at source breakpoints.
    BreakpointHit(Vec<SlotId>),
    /// Execution stopped on request, or at an assembly breakpoint.
    Break,
    /// A step finished.
    StepComplete,
    RegistersUpdated(Vec<u8>),
    FrameUpdated(Vec<u8>),
    StackUpdated(Vec<u8>),
    /// Assembly around the current address.
    AssemblySource(AssemblyWindow),
    Trace(u32),
    Text(String),
    /// Diagnostic text about the session itself.
    DebugMessage(String),
    StackCorruption(u32),
    NullReference(u32),
    MessageBox(String),
    Channel {
        channel: u8,
        command: u8,
        payload: Vec<u8>,
    },
    Pong(Vec<u8>),
}
