//! Execution state of the debugged target.

use crate::breakpoint::AsmBreakpoint;
use crate::stepping::{StepMode, StepPhase};

/// Offset of the saved instruction pointer in a register snapshot.
const EIP_OFFSET: usize = 36;

/// What the engine knows about the halted (or running) target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionState {
    /// Address the target is halted at. `None` while running.
    pub current_address: Option<u32>,
    /// Stopped and waiting for the user. Register snapshots only move
    /// `current_address` while this is set.
    pub halted: bool,
    pub step_mode: StepMode,
    pub phase: StepPhase,
    /// Assembly breakpoint being stepped toward from its anchor.
    pub pending_asm_target: Option<AsmBreakpoint>,
}

impl ExecutionState {
    pub fn new(step_mode: StepMode) -> Self {
        Self {
            step_mode,
            ..Self::default()
        }
    }

    pub fn is_user_requested_break(&self) -> bool {
        self.phase.is_user_requested_break()
    }

    pub fn is_stepping(&self) -> bool {
        self.phase.is_stepping()
    }
}

/// The instruction pointer saved in a register snapshot, if the snapshot is
/// long enough to hold one.
pub fn instruction_pointer(registers: &[u8]) -> Option<u32> {
    let bytes = registers.get(EIP_OFFSET..EIP_OFFSET + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eip_is_little_endian_at_offset_36() {
        let mut regs = vec![0u8; 40];
        regs[36..40].copy_from_slice(&[0x10, 0x40, 0x00, 0x00]);
        assert_eq!(instruction_pointer(&regs), Some(0x4010));
    }

    #[test]
    fn short_snapshot_has_no_eip() {
        assert_eq!(instruction_pointer(&[0u8; 39]), None);
        assert_eq!(instruction_pointer(&[]), None);
    }

    #[test]
    fn new_state_is_idle() {
        let state = ExecutionState::new(StepMode::Assembly);
        assert_eq!(state.phase, StepPhase::Idle);
        assert_eq!(state.step_mode, StepMode::Assembly);
        assert!(!state.is_stepping());
        assert!(!state.halted);
        assert!(state.current_address.is_none());
    }
}
