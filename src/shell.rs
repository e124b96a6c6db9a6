//! The line-oriented command shell.
//!
//! One command per line on stdin; engine events are printed to stdout.

use std::fmt::Write as _;
use std::str::FromStr;

use kdbg_engine::{AssemblyWindow, Engine, EngineError, EngineEvent, SlotId, StepMode};
use thiserror::Error;

/// A command typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Continue,
    Break,
    StepInto,
    StepOver,
    StepOut,
    /// Switch step mode, or toggle it when none is given.
    Mode(Option<StepMode>),
    BreakAt(u32),
    BreakAtLine { document: String, line: u32 },
    Delete(SlotId),
    AsmBreak(u32),
    AsmClear(u32),
    AsmToggle(String),
    RunTo(String),
    Pending(u32),
    Unpending(u32),
    Ping,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("'{command}' expects {expected}")]
    Usage {
        command: &'static str,
        expected: &'static str,
    },
    #[error("invalid address '{0}'")]
    Address(String),
}

pub const HELP: &str = "\
commands:
  c, continue            resume execution
  break                  halt the target
  s, step                step into
  n, next                step over
  out                    step out
  mode [source|asm]      set or toggle the step mode
  bp <addr>              breakpoint at an address
  bp <file>:<line>       breakpoint on a source line
  delete <slot>          delete a breakpoint
  asmbp <addr>           assembly breakpoint
  asmclear <addr>        clear an assembly breakpoint
  asmtoggle <label>      toggle an assembly breakpoint at a label
  runto <label>          run to a label
  pending <addr>         reserve an address, keeping step traps off it
  unpending <addr>       drop a pending breakpoint
  ping                   ping the stub
  status                 show the execution state
  q, quit                end the session";

/// Parse `0x`-prefixed hex or decimal.
fn parse_address(text: &str) -> Result<u32, ParseCommandError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| ParseCommandError::Address(text.to_string()))
}

impl FromStr for ShellCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err(ParseCommandError::Unknown(String::new()));
        };
        let arg = words.next();

        let address = |command: &'static str| {
            arg.ok_or(ParseCommandError::Usage {
                command,
                expected: "an address",
            })
            .and_then(parse_address)
        };
        let label = |command: &'static str| {
            arg.map(str::to_string).ok_or(ParseCommandError::Usage {
                command,
                expected: "a label",
            })
        };

        let parsed = match command {
            "c" | "continue" => ShellCommand::Continue,
            "break" => ShellCommand::Break,
            "s" | "step" => ShellCommand::StepInto,
            "n" | "next" => ShellCommand::StepOver,
            "out" => ShellCommand::StepOut,
            "mode" => match arg {
                None => ShellCommand::Mode(None),
                Some(mode) => ShellCommand::Mode(Some(mode.parse::<StepMode>().map_err(|_| {
                    ParseCommandError::Usage {
                        command: "mode",
                        expected: "'source' or 'asm'",
                    }
                })?)),
            },
            "bp" => match arg.and_then(|a| a.rsplit_once(':')) {
                Some((document, line)) if !document.is_empty() => {
                    let line = line.parse().map_err(|_| ParseCommandError::Usage {
                        command: "bp",
                        expected: "<file>:<line>",
                    })?;
                    ShellCommand::BreakAtLine {
                        document: document.to_string(),
                        line,
                    }
                }
                _ => ShellCommand::BreakAt(address("bp")?),
            },
            "delete" => {
                let slot = arg
                    .map(|a| a.trim_start_matches('#'))
                    .and_then(|a| a.parse().ok())
                    .ok_or(ParseCommandError::Usage {
                        command: "delete",
                        expected: "a slot number",
                    })?;
                ShellCommand::Delete(SlotId(slot))
            }
            "asmbp" => ShellCommand::AsmBreak(address("asmbp")?),
            "asmclear" => ShellCommand::AsmClear(address("asmclear")?),
            "asmtoggle" => ShellCommand::AsmToggle(label("asmtoggle")?),
            "runto" => ShellCommand::RunTo(label("runto")?),
            "pending" => ShellCommand::Pending(address("pending")?),
            "unpending" => ShellCommand::Unpending(address("unpending")?),
            "ping" => ShellCommand::Ping,
            "status" => ShellCommand::Status,
            "help" | "?" => ShellCommand::Help,
            "q" | "quit" | "exit" => ShellCommand::Quit,
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(parsed)
    }
}

/// Run `command` against the engine. Returns what to print, if anything.
pub fn execute(engine: &mut Engine, command: ShellCommand) -> Result<Option<String>, EngineError> {
    let reply = match command {
        ShellCommand::Continue => {
            engine.continue_execution()?;
            None
        }
        ShellCommand::Break => {
            engine.break_execution()?;
            None
        }
        ShellCommand::StepInto => {
            engine.step_into()?;
            None
        }
        ShellCommand::StepOver => {
            engine.step_over()?;
            None
        }
        ShellCommand::StepOut => {
            engine.step_out()?;
            None
        }
        ShellCommand::Mode(Some(mode)) => {
            engine.set_step_mode(mode);
            Some(format!("step mode: {mode}"))
        }
        ShellCommand::Mode(None) => Some(format!("step mode: {}", engine.toggle_step_mode())),
        ShellCommand::BreakAt(address) => {
            let slot = engine.set_breakpoint(address)?;
            Some(format!("breakpoint {slot} at {address:#010x}"))
        }
        ShellCommand::BreakAtLine { document, line } => {
            let slot = engine.set_breakpoint_at_line(&document, line)?;
            let address = engine.breakpoints().slot_address(slot).unwrap_or_default();
            Some(format!("breakpoint {slot} at {document}:{line} ({address:#010x})"))
        }
        ShellCommand::Delete(slot) => {
            engine.delete_breakpoint(slot)?;
            Some(format!("deleted breakpoint {slot}"))
        }
        ShellCommand::AsmBreak(address) => {
            let slot = engine.set_assembly_breakpoint(address)?;
            Some(format!("assembly breakpoint at {address:#010x}, anchor {slot}"))
        }
        ShellCommand::AsmClear(address) => Some(if engine.clear_assembly_breakpoint(address)? {
            format!("cleared assembly breakpoint at {address:#010x}")
        } else {
            format!("no assembly breakpoint at {address:#010x}")
        }),
        ShellCommand::AsmToggle(label) => {
            let set = engine.toggle_assembly_breakpoint_at_label(&label)?;
            Some(format!(
                "assembly breakpoint at {label} {}",
                if set { "set" } else { "cleared" }
            ))
        }
        ShellCommand::RunTo(label) => {
            engine.set_assembly_break_at_label_and_continue(&label)?;
            None
        }
        ShellCommand::Pending(address) => {
            engine.add_pending_breakpoint(address)?;
            Some(format!("pending breakpoint at {address:#010x}"))
        }
        ShellCommand::Unpending(address) => Some(if engine.remove_pending_breakpoint(address) {
            format!("removed pending breakpoint at {address:#010x}")
        } else {
            format!("no pending breakpoint at {address:#010x}")
        }),
        ShellCommand::Ping => {
            engine.ping()?;
            None
        }
        ShellCommand::Status => Some(status(engine)),
        ShellCommand::Help => Some(HELP.to_string()),
        ShellCommand::Quit => None,
    };
    Ok(reply)
}

fn status(engine: &Engine) -> String {
    let state = engine.state();
    let breakpoints = engine.breakpoints();
    let mut out = String::new();
    let _ = match state.current_address.filter(|_| state.halted) {
        Some(address) => writeln!(out, "halted at {address:#010x}"),
        None => writeln!(out, "running"),
    };
    let _ = writeln!(out, "step mode: {}, phase: {:?}", state.step_mode, state.phase);
    let _ = write!(
        out,
        "breakpoints: {}, assembly: {}, tracepoints: {}",
        breakpoints.active_count(),
        breakpoints.asm_breakpoints().len(),
        breakpoints.tracepoints().len()
    );
    out
}

/// Printable form of an event. Hidden assembly windows print nothing.
pub fn render_event(event: &EngineEvent) -> Option<String> {
    let text = match event {
        EngineEvent::ConnectionEstablished => "connected".to_string(),
        EngineEvent::ConnectionLost(reason) => format!("connection lost: {reason}"),
        EngineEvent::SessionStarted => "kernel started".to_string(),
        EngineEvent::BreakpointHit(slots) => {
            let slots: Vec<String> = slots.iter().map(SlotId::to_string).collect();
            format!("breakpoint hit: {}", slots.join(", "))
        }
        EngineEvent::Break => "break".to_string(),
        EngineEvent::StepComplete => "step complete".to_string(),
        EngineEvent::AssemblySource(window) if window.no_display => return None,
        EngineEvent::AssemblySource(window) => window.to_wire_text().replace("\r\n", "\n"),
        EngineEvent::RegistersUpdated(bytes) => format!("registers: {}", hex(bytes)),
        EngineEvent::FrameUpdated(bytes) => format!("frame: {}", hex(bytes)),
        EngineEvent::StackUpdated(bytes) => format!("stack: {}", hex(bytes)),
        EngineEvent::Trace(value) => format!("trace {value:#010x}"),
        EngineEvent::Text(text) => text.clone(),
        EngineEvent::DebugMessage(text) => format!("debug: {text}"),
        EngineEvent::StackCorruption(address) => format!("stack corruption at {address:#010x}"),
        EngineEvent::NullReference(address) => format!("null reference at {address:#010x}"),
        EngineEvent::MessageBox(text) => format!("message: {text}"),
        EngineEvent::Channel {
            channel,
            command,
            payload,
        } => format!("channel {channel:#04x} command {command}: {}", hex(payload)),
        EngineEvent::Pong(_) => "pong".to_string(),
    };
    Some(text)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

/// Disassembly lines around the current instruction of a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowLines {
    pub current: String,
    /// The following instruction and the label it sits under.
    pub next: Option<(String, String)>,
}

fn as_label(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed.strip_suffix(':').filter(|l| !l.contains(char::is_whitespace))
}

fn is_instruction(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with(';') && as_label(line).is_none()
}

/// Locate the current and next instruction in `window`.
///
/// The current instruction is the first one under the window's current
/// label. `None` when the label is not in the code.
pub fn window_lines(window: &AssemblyWindow) -> Option<WindowLines> {
    let code = &window.code;
    let start = code
        .iter()
        .position(|line| as_label(line) == Some(window.current_label.as_str()))?;

    let mut label = window.current_label.as_str();
    let mut instructions = code.iter().skip(start + 1).filter_map(|line| {
        if let Some(l) = as_label(line) {
            label = l;
            None
        } else if is_instruction(line) {
            Some((line.trim().to_string(), label.to_string()))
        } else {
            None
        }
    });

    let (current, _) = instructions.next()?;
    Some(WindowLines {
        current,
        next: instructions.next(),
    })
}
