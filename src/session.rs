//! The interactive session loop.

use anyhow::Result;
use kdbg_engine::{AsmWindowHandle, AssemblyWindow, Engine, EngineEvent, EventReceiver};
use kdbg_stub::{Notification, NotificationReceiver};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::shell::{self, render_event, window_lines, ShellCommand};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    InputClosed,
    ConnectionLost(String),
}

/// Drive `engine` from stub notifications and shell input until the user
/// quits or the connection drops. Notifications take priority over input.
pub async fn run<R>(
    mut engine: Engine,
    mut notifications: NotificationReceiver,
    events: EventReceiver,
    input: R,
) -> Result<SessionEnd>
where
    R: AsyncBufRead + Unpin,
{
    let printer = spawn_printer(events, engine.asm_window_handle());
    let mut lines = input.lines();

    let end = loop {
        tokio::select! {
            biased;
            note = notifications.recv() => match note {
                Some(Notification::ConnectionLost(reason)) => {
                    engine
                        .handle_notification(Notification::ConnectionLost(reason.clone()))
                        .await?;
                    break SessionEnd::ConnectionLost(reason);
                }
                Some(note) => {
                    if let Err(e) = engine.handle_notification(note).await {
                        warn!("notification failed: {e}");
                        println!("error: {e}");
                    }
                }
                None => break SessionEnd::ConnectionLost("notification stream closed".into()),
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break SessionEnd::InputClosed;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ShellCommand>() {
                    Ok(ShellCommand::Quit) => break SessionEnd::Quit,
                    Ok(command) => {
                        debug!(?command, "shell command");
                        match shell::execute(&mut engine, command) {
                            Ok(Some(reply)) => println!("{reply}"),
                            Ok(None) => {}
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
        }
    };

    info!(?end, "session ended");
    drop(engine);
    if let Err(e) = printer.await {
        warn!("event printer failed: {e}");
    }
    Ok(end)
}

/// Print events as they arrive and acknowledge every assembly window.
fn spawn_printer(mut events: EventReceiver, handle: AsmWindowHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let EngineEvent::AssemblySource(window) = &event {
                report_window(&handle, window);
            }
            if let Some(text) = render_event(&event) {
                println!("{text}");
            }
        }
    })
}

/// Report the current and next instruction of `window`. Without
/// disassembly the current line is reported empty, so the engine single
/// steps instead of waiting.
pub fn report_window(handle: &AsmWindowHandle, window: &AssemblyWindow) {
    let lines = window_lines(window);
    let (current, next) = match lines {
        Some(lines) => (lines.current, lines.next),
        None => (String::new(), None),
    };
    let generation = window.generation;
    handle.set_current_line(generation, current);
    match next {
        Some((line, label)) => {
            handle.set_next_address_label(generation, label);
            handle.set_next_line(generation, Some(line));
        }
        None => {
            // A missing next line clears the label again.
            handle.set_next_address_label(generation, window.current_label.clone());
            handle.set_next_line(generation, None);
        }
    }
}
