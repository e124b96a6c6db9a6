//! kdbg-engine — source-level control of a kernel under the debug stub.
//!
//! The [`Engine`] turns debugger actions (breakpoints, stepping, continue,
//! break) into stub commands and turns the stub's notifications back into
//! [`EngineEvent`]s. It owns the [`BreakpointManager`] that maps the stub's
//! 256 breakpoint slots to addresses, and the stepping state that decides
//! what every break means.

pub mod asm_window;
pub mod breakpoint;
pub mod engine;
pub mod error;
pub mod event;
pub mod refresh;
pub mod state;
pub mod stepping;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience.
pub use asm_window::{AsmWindowHandle, AssemblyWindow};
pub use breakpoint::{AsmBreakpoint, BreakpointManager, SlotId, MAX_BREAKPOINT_SLOTS};
pub use engine::{Engine, EngineOptions};
pub use error::EngineError;
pub use event::{EngineEvent, EventReceiver};
pub use state::ExecutionState;
pub use stepping::{StepMode, StepPhase};
