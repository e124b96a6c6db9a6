//! Debug-stub protocol message types.
//!
//! Commands flow from the host to the stub and never get a direct reply.
//! Everything the stub has to say arrives later as a [`Notification`].

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// Opcodes of host-to-stub commands.
pub mod command_op {
    pub const BREAK: u8 = 3;
    pub const CONTINUE: u8 = 4;
    pub const STEP_INTO: u8 = 5;
    /// Binds a slot to an address. Address 0 clears the slot.
    pub const BREAK_ON_ADDRESS: u8 = 6;
    pub const BATCH_END: u8 = 8;
    pub const STEP_OVER: u8 = 11;
    pub const STEP_OUT: u8 = 12;
    pub const SEND_REGISTERS: u8 = 13;
    pub const SEND_FRAME: u8 = 14;
    pub const SEND_STACK: u8 = 15;
    pub const SET_ASM_BREAK: u8 = 16;
    pub const PING: u8 = 17;
    pub const ASM_STEP_INTO: u8 = 18;
    pub const SET_INT3: u8 = 19;
    pub const CLEAR_INT3: u8 = 20;
}

/// Opcodes of stub-to-host notifications.
pub mod notification_op {
    pub const TRACE: u8 = 1;
    pub const TEXT: u8 = 2;
    pub const BREAK: u8 = 3;
    pub const STARTED: u8 = 6;
    pub const COMMAND_COMPLETED: u8 = 9;
    pub const REGISTERS: u8 = 10;
    pub const FRAME: u8 = 11;
    pub const STACK: u8 = 12;
    pub const PONG: u8 = 13;
    pub const STACK_CORRUPTION: u8 = 14;
    pub const MESSAGE_BOX: u8 = 15;
    pub const NULL_REFERENCE: u8 = 16;
    /// First byte values at or above this start a side-channel packet.
    pub const CHANNEL_BASE: u8 = 0x80;
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A command sent to the debug stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubCommand {
    /// Resume execution.
    Continue,
    /// Halt execution as soon as possible.
    Break,
    /// Source-level step into; the stub runs to the next armed trap.
    StepInto,
    /// Source-level step over.
    StepOver,
    /// Source-level step out.
    StepOut,
    /// Execute exactly one instruction.
    AsmStepInto,
    /// Bind a stub breakpoint slot to an address.
    SetBreakpoint {
        /// Slot index.
        slot: u8,
        /// Trap address.
        address: u32,
    },
    /// Release a stub breakpoint slot.
    DeleteBreakpoint {
        /// Slot index.
        slot: u8,
    },
    /// Arm the trap instruction at an address without using a slot.
    SetRawTrap(u32),
    /// Disarm a trap previously armed with [`StubCommand::SetRawTrap`].
    ClearRawTrap(u32),
    /// One-shot break at an arbitrary instruction; the stub forgets it once hit.
    SetAsmBreak(u32),
    /// Keepalive; answered with a pong.
    Ping,
    /// Marks the end of a batch of breakpoint updates.
    BatchEnd,
    /// Ask for a register snapshot.
    RequestRegisters,
    /// Ask for the current stack frame.
    RequestFrame,
    /// Ask for the raw stack contents.
    RequestStack,
}

impl StubCommand {
    /// The wire opcode of this command.
    pub fn opcode(&self) -> u8 {
        match self {
            StubCommand::Continue => command_op::CONTINUE,
            StubCommand::Break => command_op::BREAK,
            StubCommand::StepInto => command_op::STEP_INTO,
            StubCommand::StepOver => command_op::STEP_OVER,
            StubCommand::StepOut => command_op::STEP_OUT,
            StubCommand::AsmStepInto => command_op::ASM_STEP_INTO,
            StubCommand::SetBreakpoint { .. } | StubCommand::DeleteBreakpoint { .. } => {
                command_op::BREAK_ON_ADDRESS
            }
            StubCommand::SetRawTrap(_) => command_op::SET_INT3,
            StubCommand::ClearRawTrap(_) => command_op::CLEAR_INT3,
            StubCommand::SetAsmBreak(_) => command_op::SET_ASM_BREAK,
            StubCommand::Ping => command_op::PING,
            StubCommand::BatchEnd => command_op::BATCH_END,
            StubCommand::RequestRegisters => command_op::SEND_REGISTERS,
            StubCommand::RequestFrame => command_op::SEND_FRAME,
            StubCommand::RequestStack => command_op::SEND_STACK,
        }
    }

    /// Whether this command lets the target run.
    pub fn resumes_target(&self) -> bool {
        matches!(
            self,
            StubCommand::Continue
                | StubCommand::StepInto
                | StubCommand::StepOver
                | StubCommand::StepOut
                | StubCommand::AsmStepInto
        )
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// A notification delivered by the transport.
///
/// `Connected` and `ConnectionLost` are produced locally by the connection;
/// everything else is decoded from stub bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The byte stream to the stub is open.
    Connected,
    /// The stub completed its handshake after the kernel booted.
    Started,
    /// Execution halted at an address.
    Break(u32),
    /// Register snapshot.
    Registers(Vec<u8>),
    /// Current stack frame bytes.
    Frame(Vec<u8>),
    /// Raw stack bytes.
    Stack(Vec<u8>),
    /// Answer to a ping.
    Pong(Vec<u8>),
    /// A traced value.
    Trace(u32),
    /// A line of text written by the kernel.
    Text(String),
    /// The stub detected stack corruption at an address.
    StackCorruption(u32),
    /// The kernel dereferenced null at an address.
    NullReference(u32),
    /// A message the kernel wants shown to the user.
    MessageBox(String),
    /// Raw side-channel payload.
    Channel {
        /// Channel number (≥ 0x80).
        channel: u8,
        /// Channel-specific command byte.
        command: u8,
        /// Payload bytes.
        payload: Vec<u8>,
    },
    /// The stub acknowledged a command by sequence number.
    CommandCompleted(u8),
    /// A byte that starts no known notification.
    Unrecognized(u8),
    /// The stream closed or failed; no further notifications follow.
    ConnectionLost(String),
}
