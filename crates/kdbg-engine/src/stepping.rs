//! Stepping state and break arbitration.

use std::fmt;
use std::str::FromStr;

use crate::breakpoint::{AsmBreakpoint, SlotId};

/// Label fragment the compiler emits at the second exception epilogue of a
/// method. Passing it twice means the method has returned.
pub const END_OF_METHOD_MARKER: &str = "END__OF__METHOD_EXCEPTION__2";

/// Granularity of step commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepMode {
    #[default]
    Source,
    Assembly,
}

impl StepMode {
    pub fn toggled(self) -> Self {
        match self {
            StepMode::Source => StepMode::Assembly,
            StepMode::Assembly => StepMode::Source,
        }
    }
}

impl fmt::Display for StepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepMode::Source => write!(f, "source"),
            StepMode::Assembly => write!(f, "assembly"),
        }
    }
}

impl FromStr for StepMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Ok(StepMode::Source),
            "assembly" | "asm" => Ok(StepMode::Assembly),
            other => Err(format!("unknown step mode '{other}'")),
        }
    }
}

/// What the engine is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepPhase {
    /// Nothing outstanding; a break is a breakpoint or a trap on the way to
    /// an assembly breakpoint.
    #[default]
    Idle,
    /// The user asked the target to halt.
    AwaitingBreak,
    /// A source-level step is running.
    SteppingSource,
    /// A single-instruction step is running.
    SteppingAssembly,
    /// An assembly step over a `CALL` is waiting for the call to return.
    AssemblyStepOverAwaitingCallReturn,
    /// Assembly step-out is single-stepping toward the end of the method.
    AssemblyStepOutScanning {
        /// End-of-method markers passed so far.
        markers: u8,
    },
}

impl StepPhase {
    pub fn is_user_requested_break(self) -> bool {
        self == StepPhase::AwaitingBreak
    }

    pub fn is_stepping(self) -> bool {
        matches!(
            self,
            StepPhase::SteppingSource
                | StepPhase::SteppingAssembly
                | StepPhase::AssemblyStepOverAwaitingCallReturn
                | StepPhase::AssemblyStepOutScanning { .. }
        )
    }
}

/// Whether a disassembly line is a call instruction.
pub fn is_call(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|op| op.eq_ignore_ascii_case("CALL"))
}

/// Whether any of `labels` marks the end of a method.
pub fn has_end_of_method_marker<S: AsRef<str>>(labels: &[S]) -> bool {
    labels
        .iter()
        .any(|l| l.as_ref().contains(END_OF_METHOD_MARKER))
}

/// Everything break arbitration looks at.
#[derive(Debug, Clone)]
pub struct BreakContext {
    pub address: u32,
    pub phase: StepPhase,
    /// Source breakpoint slots bound at `address`.
    pub user_slots: Vec<SlotId>,
    /// Assembly breakpoint the engine is currently stepping toward.
    pub pending_target: Option<AsmBreakpoint>,
    /// First assembly breakpoint anchored at `address`.
    pub anchored_here: Option<AsmBreakpoint>,
}

/// What a break means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakDecision {
    BreakpointHit(Vec<SlotId>),
    UserBreak,
    StepComplete,
    AsmTargetReached,
    /// Still between anchor and target: step one more instruction over.
    StepTowardAsm(AsmBreakpoint),
    /// Execution left the anchor's range; the target will not be hit.
    AbandonAsmTarget,
    /// A step trap fired outside any step.
    StrayTrap,
}

impl BreakDecision {
    /// Whether the target stays halted after this decision.
    pub fn halts(&self) -> bool {
        matches!(
            self,
            Self::BreakpointHit(_) | Self::UserBreak | Self::StepComplete | Self::AsmTargetReached
        )
    }
}

/// Decide what a break at `ctx.address` means, highest priority first.
pub fn arbitrate(ctx: BreakContext) -> BreakDecision {
    if !ctx.phase.is_user_requested_break() && !ctx.user_slots.is_empty() {
        return BreakDecision::BreakpointHit(ctx.user_slots);
    }
    if ctx.phase.is_user_requested_break() {
        return BreakDecision::UserBreak;
    }
    if ctx.phase.is_stepping() {
        return BreakDecision::StepComplete;
    }

    let Some(target) = ctx.pending_target.or(ctx.anchored_here) else {
        return BreakDecision::StrayTrap;
    };
    if target.asm_address == ctx.address {
        BreakDecision::AsmTargetReached
    } else if (target.anchor..=target.asm_address).contains(&ctx.address) {
        BreakDecision::StepTowardAsm(target)
    } else {
        BreakDecision::AbandonAsmTarget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: AsmBreakpoint = AsmBreakpoint {
        anchor: 0x4010,
        asm_address: 0x4018,
        slot: SlotId(0),
    };

    fn ctx(address: u32, phase: StepPhase) -> BreakContext {
        BreakContext {
            address,
            phase,
            user_slots: Vec::new(),
            pending_target: None,
            anchored_here: None,
        }
    }

    #[test]
    fn bound_slot_wins_while_stepping() {
        let mut c = ctx(0x4010, StepPhase::SteppingSource);
        c.user_slots = vec![SlotId(3)];
        assert_eq!(arbitrate(c), BreakDecision::BreakpointHit(vec![SlotId(3)]));
    }

    #[test]
    fn user_break_ignores_bound_slots() {
        let mut c = ctx(0x4010, StepPhase::AwaitingBreak);
        c.user_slots = vec![SlotId(3)];
        assert_eq!(arbitrate(c), BreakDecision::UserBreak);
    }

    #[test]
    fn step_completes_before_asm_targets() {
        let mut c = ctx(0x4018, StepPhase::SteppingAssembly);
        c.pending_target = Some(TARGET);
        assert_eq!(arbitrate(c), BreakDecision::StepComplete);
        assert_eq!(
            arbitrate(ctx(0x4000, StepPhase::AssemblyStepOverAwaitingCallReturn)),
            BreakDecision::StepComplete
        );
    }

    #[test]
    fn pending_target_reached() {
        let mut c = ctx(0x4018, StepPhase::Idle);
        c.pending_target = Some(TARGET);
        assert_eq!(arbitrate(c), BreakDecision::AsmTargetReached);
    }

    #[test]
    fn anchor_trap_starts_stepping_toward_target() {
        let mut c = ctx(0x4010, StepPhase::Idle);
        c.anchored_here = Some(TARGET);
        assert_eq!(arbitrate(c), BreakDecision::StepTowardAsm(TARGET));
    }

    #[test]
    fn jump_out_of_range_abandons_target() {
        let mut c = ctx(0x4030, StepPhase::Idle);
        c.pending_target = Some(TARGET);
        assert_eq!(arbitrate(c), BreakDecision::AbandonAsmTarget);
        let mut c = ctx(0x4000, StepPhase::Idle);
        c.pending_target = Some(TARGET);
        assert_eq!(arbitrate(c), BreakDecision::AbandonAsmTarget);
    }

    #[test]
    fn only_stopping_decisions_halt() {
        assert!(BreakDecision::UserBreak.halts());
        assert!(BreakDecision::AsmTargetReached.halts());
        assert!(!BreakDecision::StepTowardAsm(TARGET).halts());
        assert!(!BreakDecision::AbandonAsmTarget.halts());
        assert!(!BreakDecision::StrayTrap.halts());
    }

    #[test]
    fn unexplained_trap_is_stray() {
        assert_eq!(arbitrate(ctx(0x4020, StepPhase::Idle)), BreakDecision::StrayTrap);
    }

    #[test]
    fn call_detection_is_case_insensitive() {
        assert!(is_call("  Call   Screen_Write"));
        assert!(is_call("CALL EAX"));
        assert!(!is_call("Mov EAX, 1"));
        assert!(!is_call("Callee: ; label"));
        assert!(!is_call(""));
    }

    #[test]
    fn end_of_method_marker() {
        assert!(has_end_of_method_marker(&[
            "Kernel_Run.END__OF__METHOD_EXCEPTION__2"
        ]));
        assert!(!has_end_of_method_marker(&["Kernel_Run.END__OF__METHOD"]));
    }

    #[test]
    fn step_mode_parse_and_toggle() {
        assert_eq!("Assembly".parse::<StepMode>().unwrap(), StepMode::Assembly);
        assert_eq!("source".parse::<StepMode>().unwrap(), StepMode::Source);
        assert!("words".parse::<StepMode>().is_err());
        assert_eq!(StepMode::Source.toggled(), StepMode::Assembly);
    }

    #[test]
    fn stepping_phases() {
        assert!(!StepPhase::Idle.is_stepping());
        assert!(!StepPhase::AwaitingBreak.is_stepping());
        assert!(StepPhase::AssemblyStepOutScanning { markers: 1 }.is_stepping());
    }
}
