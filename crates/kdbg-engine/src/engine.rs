//! The control engine.
//!
//! [`Engine`] coordinates the breakpoint manager, the stepping state and the
//! debug-info cache. Shell actions are synchronous methods that send stub
//! commands immediately. Stub notifications are fed in one at a time through
//! [`Engine::handle_notification`], which decides what each break means and
//! reports the outcome as [`EngineEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use kdbg_debuginfo::{AsmListing, DebugInfoCache, DebugInfoError, DebugInfoStore};
use kdbg_stub::{Notification, StubCommand, StubTransport};
use tokio::sync::mpsc;

use crate::asm_window::{AsmWindowHandle, AsmWindowSync, AssemblyWindow};
use crate::breakpoint::{AsmBreakpoint, BreakpointManager, SlotId};
use crate::error::EngineError;
use crate::event::{EngineEvent, EventReceiver};
use crate::refresh::RefreshTokens;
use crate::state::{instruction_pointer, ExecutionState};
use crate::stepping::{arbitrate, has_end_of_method_marker, is_call, BreakContext, BreakDecision};
use crate::stepping::{StepMode, StepPhase};

/// Tunables of an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub step_mode: StepMode,
    /// How long to wait for the shell to report the assembly window.
    pub asm_window_timeout: Duration,
    /// Labels shown before and after the current one.
    pub asm_window_radius: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            step_mode: StepMode::Source,
            asm_window_timeout: Duration::from_secs(5),
            asm_window_radius: 10,
        }
    }
}

/// Source-level debugger control over one stub connection.
pub struct Engine {
    transport: Arc<dyn StubTransport>,
    debug_info: Arc<DebugInfoCache>,
    listing: Option<Arc<AsmListing>>,
    breakpoints: BreakpointManager,
    state: ExecutionState,
    asm_window: AsmWindowSync,
    refresh: RefreshTokens,
    events: mpsc::UnboundedSender<EngineEvent>,
    options: EngineOptions,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("breakpoints", &self.breakpoints)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine and the receiver for its events.
    pub fn new(
        transport: Arc<dyn StubTransport>,
        debug_info: Arc<DebugInfoCache>,
        options: EngineOptions,
    ) -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let store: Arc<dyn DebugInfoStore> = debug_info.clone();
        let engine = Self {
            breakpoints: BreakpointManager::new(Arc::clone(&transport), store),
            transport,
            debug_info,
            listing: None,
            state: ExecutionState::new(options.step_mode),
            asm_window: AsmWindowSync::new(),
            refresh: RefreshTokens::new(),
            events,
            options,
        };
        (engine, rx)
    }

    /// Use `listing` for the code of assembly windows.
    pub fn with_listing(mut self, listing: AsmListing) -> Self {
        self.listing = Some(Arc::new(listing));
        self
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    pub fn debug_info(&self) -> &DebugInfoCache {
        &self.debug_info
    }

    /// Handle for the shell to report the rendered assembly window.
    pub fn asm_window_handle(&self) -> AsmWindowHandle {
        self.asm_window.handle()
    }

    // -----------------------------------------------------------------
    // Step mode
    // -----------------------------------------------------------------

    pub fn step_mode(&self) -> StepMode {
        self.state.step_mode
    }

    pub fn set_step_mode(&mut self, mode: StepMode) {
        tracing::debug!(%mode, "step mode");
        self.state.step_mode = mode;
    }

    pub fn toggle_step_mode(&mut self) -> StepMode {
        self.set_step_mode(self.state.step_mode.toggled());
        self.state.step_mode
    }

    // -----------------------------------------------------------------
    // Breakpoints
    // -----------------------------------------------------------------

    pub fn set_breakpoint(&mut self, address: u32) -> Result<SlotId, EngineError> {
        self.breakpoints.set_breakpoint(address)
    }

    /// Set a breakpoint on the first trap address of a source line.
    pub fn set_breakpoint_at_line(
        &mut self,
        document: &str,
        line: u32,
    ) -> Result<SlotId, EngineError> {
        let address = self
            .debug_info
            .address_for_source_line(document, line)?
            .ok_or_else(|| EngineError::UnknownSourceLine {
                document: document.to_string(),
                line,
            })?;
        self.breakpoints.set_breakpoint(address)
    }

    pub fn delete_breakpoint(&mut self, slot: SlotId) -> Result<(), EngineError> {
        self.breakpoints.delete_breakpoint(slot)
    }

    pub fn set_assembly_breakpoint(&mut self, address: u32) -> Result<SlotId, EngineError> {
        self.breakpoints.set_assembly_breakpoint(address)
    }

    pub fn clear_assembly_breakpoint(&mut self, address: u32) -> Result<bool, EngineError> {
        self.breakpoints.clear_assembly_breakpoint(address)
    }

    pub fn toggle_assembly_breakpoint_at_label(&mut self, label: &str) -> Result<bool, EngineError> {
        self.breakpoints.toggle_assembly_breakpoint_at_label(label)
    }

    /// Run until the instruction at `label`, using the stub's one-shot
    /// assembly break. The stop is reported as a completed step.
    pub fn set_assembly_break_at_label_and_continue(
        &mut self,
        label: &str,
    ) -> Result<(), EngineError> {
        let address = self.debug_info.address_of_label(label)?;
        self.prepare_resume();
        self.send(StubCommand::SetAsmBreak(address))?;
        self.send(StubCommand::Continue)?;
        self.state.phase = StepPhase::SteppingAssembly;
        Ok(())
    }

    pub fn activate_bound_breakpoints(&mut self) -> Result<usize, EngineError> {
        self.breakpoints.activate_bound_breakpoints()
    }

    pub fn add_pending_breakpoint(&mut self, address: u32) -> Result<(), EngineError> {
        self.breakpoints.add_pending_breakpoint(address)
    }

    pub fn remove_pending_breakpoint(&mut self, address: u32) -> bool {
        self.breakpoints.remove_pending_breakpoint(address)
    }

    // -----------------------------------------------------------------
    // Execution control
    // -----------------------------------------------------------------

    /// Resume execution.
    ///
    /// If an assembly breakpoint lies ahead on the current source line the
    /// engine steps toward it instead of running freely.
    pub fn continue_execution(&mut self) -> Result<(), EngineError> {
        self.breakpoints.manage_tracepoints(None, true)?;
        self.state.phase = StepPhase::Idle;

        let target = self.state.current_address.and_then(|current| self.asm_target_ahead(current));
        if let Some(target) = target {
            tracing::debug!(
                "continue steps toward assembly breakpoint at {:#010x}",
                target.asm_address
            );
            self.state.pending_asm_target = Some(target);
            self.asm_step_over(false)?;
            self.forget_position();
        } else {
            self.state.pending_asm_target = None;
            self.forget_position();
            self.send(StubCommand::Continue)?;
        }
        Ok(())
    }

    /// Ask the target to halt.
    pub fn break_execution(&mut self) -> Result<(), EngineError> {
        self.state.phase = StepPhase::AwaitingBreak;
        self.send(StubCommand::Break)
    }

    pub fn step_into(&mut self) -> Result<(), EngineError> {
        self.prepare_resume();
        match self.state.step_mode {
            StepMode::Assembly => {
                self.state.phase = StepPhase::SteppingAssembly;
                self.send(StubCommand::AsmStepInto)?;
                self.send(StubCommand::RequestRegisters)
            }
            StepMode::Source => {
                self.breakpoints
                    .manage_tracepoints(self.state.current_address, false)?;
                self.state.phase = StepPhase::SteppingSource;
                self.send(StubCommand::StepInto)
            }
        }
    }

    pub fn step_over(&mut self) -> Result<(), EngineError> {
        self.prepare_resume();
        match self.state.step_mode {
            StepMode::Assembly => self.asm_step_over(true),
            StepMode::Source => {
                self.breakpoints
                    .manage_tracepoints(self.state.current_address, false)?;
                self.state.phase = StepPhase::SteppingSource;
                self.send(StubCommand::StepOver)
            }
        }
    }

    pub fn step_out(&mut self) -> Result<(), EngineError> {
        self.prepare_resume();
        self.breakpoints.manage_tracepoints(None, true)?;
        match self.state.step_mode {
            StepMode::Assembly => {
                self.state.phase = StepPhase::AssemblyStepOutScanning { markers: 0 };
                self.send(StubCommand::AsmStepInto)
            }
            StepMode::Source => {
                self.state.phase = StepPhase::SteppingSource;
                self.send(StubCommand::StepOut)
            }
        }
    }

    pub fn ping(&self) -> Result<(), EngineError> {
        self.send(StubCommand::Ping)
    }

    // -----------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------

    /// Apply one notification from the stub.
    pub async fn handle_notification(&mut self, notification: Notification) -> Result<(), EngineError> {
        match notification {
            Notification::Connected => {
                tracing::info!("debug stub connected");
                self.emit(EngineEvent::ConnectionEstablished);
            }
            Notification::Started => {
                tracing::info!("debug stub started");
                self.breakpoints.activate_bound_breakpoints()?;
                self.emit(EngineEvent::SessionStarted);
            }
            Notification::Break(address) => self.on_break(address).await?,
            Notification::Registers(bytes) => {
                if self.state.halted {
                    self.state.current_address = instruction_pointer(&bytes);
                } else {
                    tracing::debug!("registers while running, position kept");
                }
                self.emit(EngineEvent::RegistersUpdated(bytes));
            }
            Notification::Frame(bytes) => self.emit(EngineEvent::FrameUpdated(bytes)),
            Notification::Stack(bytes) => self.emit(EngineEvent::StackUpdated(bytes)),
            Notification::Pong(bytes) => self.emit(EngineEvent::Pong(bytes)),
            Notification::Trace(value) => self.emit(EngineEvent::Trace(value)),
            Notification::Text(text) => self.emit(EngineEvent::Text(text)),
            Notification::StackCorruption(address) => {
                tracing::warn!("stack corruption at {:#010x}", address);
                self.emit(EngineEvent::StackCorruption(address));
            }
            Notification::NullReference(address) => {
                tracing::warn!("null reference at {:#010x}", address);
                self.emit(EngineEvent::NullReference(address));
            }
            Notification::MessageBox(text) => self.emit(EngineEvent::MessageBox(text)),
            Notification::Channel {
                channel,
                command,
                payload,
            } => self.emit(EngineEvent::Channel {
                channel,
                command,
                payload,
            }),
            Notification::CommandCompleted(sequence) => {
                tracing::debug!(sequence, "command completed");
            }
            Notification::Unrecognized(op) => {
                tracing::warn!("unrecognized notification opcode {:#04x}", op);
                self.emit(EngineEvent::DebugMessage(format!(
                    "unrecognized notification opcode {op:#04x}"
                )));
            }
            Notification::ConnectionLost(reason) => {
                tracing::info!(%reason, "debug stub connection lost");
                self.refresh.invalidate();
                self.emit(EngineEvent::ConnectionLost(reason));
            }
        }
        Ok(())
    }

    async fn on_break(&mut self, address: u32) -> Result<(), EngineError> {
        tracing::debug!("break at {:#010x} ({:?})", address, self.state.phase);
        self.state.current_address = Some(address);
        self.asm_window.forget_current_line();

        if let StepPhase::AssemblyStepOutScanning { markers } = self.state.phase {
            self.state.halted = false;
            return self.continue_step_out(address, markers);
        }

        let phase = self.state.phase;
        let user_slots = if phase.is_user_requested_break() {
            Vec::new()
        } else {
            self.breakpoints.user_slots_at(address)
        };
        let pending_target = self.state.pending_asm_target;
        let anchored_here = if pending_target.is_none() {
            self.breakpoints
                .asm_breakpoints_anchored_at(address)
                .first()
                .copied()
        } else {
            None
        };

        let decision = arbitrate(BreakContext {
            address,
            phase,
            user_slots,
            pending_target,
            anchored_here,
        });
        tracing::debug!(?decision, "break arbitrated");
        self.state.halted = decision.halts();

        match decision {
            BreakDecision::BreakpointHit(slots) => {
                self.emit(EngineEvent::BreakpointHit(slots));
                self.request_full_refresh();
            }
            BreakDecision::UserBreak => {
                self.breakpoints.manage_tracepoints(None, true)?;
                self.state.phase = StepPhase::Idle;
                self.emit(EngineEvent::Break);
                self.request_full_refresh();
            }
            BreakDecision::StepComplete => {
                self.breakpoints.manage_tracepoints(None, true)?;
                self.state.phase = StepPhase::Idle;
                self.emit(EngineEvent::StepComplete);
                self.request_full_refresh();
            }
            BreakDecision::AsmTargetReached => {
                self.state.pending_asm_target = None;
                self.emit(EngineEvent::Break);
                self.request_full_refresh();
            }
            BreakDecision::StepTowardAsm(target) => {
                self.state.pending_asm_target = Some(target);
                self.sync_asm_window().await;
                self.asm_step_over(false)?;
            }
            BreakDecision::AbandonAsmTarget => {
                tracing::debug!("left anchor range at {:#010x}, continuing", address);
                self.state.pending_asm_target = None;
                self.send(StubCommand::Continue)?;
            }
            BreakDecision::StrayTrap => {
                tracing::debug!("stray trap at {:#010x}, stepping once more", address);
                self.state.phase = StepPhase::SteppingAssembly;
                self.send(StubCommand::AsmStepInto)?;
            }
        }
        Ok(())
    }

    fn continue_step_out(&mut self, address: u32, markers: u8) -> Result<(), EngineError> {
        let passed = match self.debug_info.labels_at(address) {
            Ok(labels) => has_end_of_method_marker(&labels),
            Err(e) => {
                tracing::warn!("step out: no labels for {:#010x}: {}", address, e);
                false
            }
        };
        let markers = markers + u8::from(passed);
        self.state.phase = if markers >= 2 {
            tracing::debug!("step out reached end of method");
            StepPhase::SteppingAssembly
        } else {
            StepPhase::AssemblyStepOutScanning { markers }
        };
        self.send(StubCommand::AsmStepInto)
    }

    /// Send a hidden assembly window and wait for the shell to report it.
    async fn sync_asm_window(&mut self) {
        let mut window = match self.current_window(true) {
            Ok(Some(window)) => window,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("assembly window unavailable: {}", e);
                return;
            }
        };
        let generation = self.asm_window.begin_update();
        window.generation = generation;
        self.emit(EngineEvent::AssemblySource(window));
        if !self
            .asm_window
            .wait_for_update(generation, self.options.asm_window_timeout)
            .await
        {
            tracing::warn!(
                "assembly window not acknowledged within {:?}",
                self.options.asm_window_timeout
            );
        }
    }

    /// Step over one instruction. A `CALL` is stepped over by breaking on the
    /// line after it; anything else is a single instruction step.
    fn asm_step_over(&mut self, user_initiated: bool) -> Result<(), EngineError> {
        let report = self.asm_window.snapshot();
        let current_is_call = report
            .current_line
            .as_deref()
            .is_some_and(|line| is_call(line.trim()));
        let next_line_known = report
            .next_line
            .as_deref()
            .is_some_and(|line| !line.trim().is_empty());

        if current_is_call && next_line_known {
            if let Some(label) = report.next_address_label.as_deref() {
                match self.debug_info.address_of_label(label) {
                    Ok(next) => {
                        self.send(StubCommand::SetAsmBreak(next))?;
                        self.send(StubCommand::Continue)?;
                        if user_initiated {
                            self.state.phase = StepPhase::AssemblyStepOverAwaitingCallReturn;
                        }
                        return Ok(());
                    }
                    Err(e) => tracing::warn!("step over call: {}", e),
                }
            }
        }

        if user_initiated {
            self.state.phase = StepPhase::SteppingAssembly;
        }
        self.send(StubCommand::AsmStepInto)
    }

    /// The nearest assembly breakpoint after `current` anchored on the same
    /// source trap.
    fn asm_target_ahead(&self, current: u32) -> Option<AsmBreakpoint> {
        let anchor = match self.debug_info.nearest_enclosing_trap_address(current) {
            Ok(anchor) => anchor,
            Err(DebugInfoError::UnknownAddress(_)) => return None,
            Err(e) => {
                tracing::warn!("continue: no anchor for {:#010x}: {}", current, e);
                return None;
            }
        };
        self.breakpoints
            .asm_breakpoints_anchored_at(anchor)
            .into_iter()
            .filter(|bp| bp.asm_address > current)
            .min_by_key(|bp| bp.asm_address)
    }

    fn current_window(&self, no_display: bool) -> Result<Option<AssemblyWindow>, DebugInfoError> {
        let Some(address) = self.state.current_address else {
            return Ok(None);
        };
        AssemblyWindow::build(
            self.debug_info.as_ref(),
            self.listing.as_deref(),
            address,
            self.options.asm_window_radius,
            no_display,
            self.state.step_mode == StepMode::Assembly,
            self.breakpoints.trapped_labels(),
        )
    }

    /// Emit the assembly window and ask the stub for registers, frame and
    /// stack, in the background. A newer refresh or a resume cancels it.
    fn request_full_refresh(&self) {
        let window = self
            .current_window(false)
            .unwrap_or_else(|e| {
                tracing::warn!("assembly window unavailable: {}", e);
                None
            })
            .map(|mut window| {
                window.generation = self.asm_window.begin_update();
                window
            });
        let token = self.refresh.issue();
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();

        tokio::spawn(async move {
            if let Some(window) = window {
                if !token.is_current() {
                    return;
                }
                let _ = events.send(EngineEvent::AssemblySource(window));
            }
            for command in [
                StubCommand::RequestRegisters,
                StubCommand::RequestFrame,
                StubCommand::RequestStack,
            ] {
                if !token.is_current() {
                    tracing::debug!("stale refresh dropped");
                    return;
                }
                if let Err(e) = transport.send(command) {
                    tracing::warn!("refresh aborted: {}", e);
                    return;
                }
            }
        });
    }

    fn prepare_resume(&mut self) {
        self.state.halted = false;
        self.refresh.invalidate();
        self.state.pending_asm_target = None;
    }

    fn forget_position(&mut self) {
        self.state.halted = false;
        self.refresh.invalidate();
        self.state.current_address = None;
        self.asm_window.forget_current_line();
    }

    fn send(&self, command: StubCommand) -> Result<(), EngineError> {
        self.transport.send(command)?;
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("engine event dropped, no receiver");
        }
    }
}
