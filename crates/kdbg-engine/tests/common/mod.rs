//! Fixtures shared by the engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kdbg_debuginfo::{DebugInfoCache, DebugInfoTable};
use kdbg_engine::{Engine, EngineOptions, EventReceiver};
use kdbg_stub::{StubCommand, StubError, StubTransport};

/// Transport that records every command instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<StubCommand>>,
}

impl RecordingTransport {
    pub fn take(&self) -> Vec<StubCommand> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl StubTransport for RecordingTransport {
    fn send(&self, command: StubCommand) -> Result<(), StubError> {
        self.sent.lock().unwrap().push(command);
        Ok(())
    }
}

/// `Kernel_Run` (0x4000..=0x40FF) with source traps at 0x4000, 0x4010,
/// 0x4020 and 0x4030; `Screen_Write` (0x5000..=0x50FF) with one trap.
pub const KERNEL_JSON: &str = r#"{
    "labels": [
        {"address": 16384, "name": "Kernel_Run"},
        {"address": 16384, "name": "Kernel_Run.IL_0000.00"},
        {"address": 16400, "name": "Kernel_Run.IL_0010"},
        {"address": 16400, "name": "Kernel_Run.IL_0010.00"},
        {"address": 16404, "name": "Kernel_Run.IL_0010.01"},
        {"address": 16408, "name": "Kernel_Run.IL_0010.02"},
        {"address": 16416, "name": "Kernel_Run.IL_0020"},
        {"address": 16432, "name": "Kernel_Run.IL_0030"},
        {"address": 16624, "name": "Kernel_Run.END__OF__METHOD_EXCEPTION__2"},
        {"address": 20480, "name": "Screen_Write"}
    ],
    "methods": [
        {"id": 1, "label_call": "Kernel_Run", "label_end": "Kernel_Run.END__OF__METHOD",
         "start_address": 16384, "end_address": 16639, "document": "Kernel.cs",
         "line_start": 10, "line_end": 20},
        {"id": 2, "label_call": "Screen_Write", "label_end": "Screen_Write.END__OF__METHOD",
         "start_address": 20480, "end_address": 20735}
    ],
    "source_infos": [
        {"address": 16384, "document": "Kernel.cs", "line": 11, "column": 9},
        {"address": 16400, "document": "Kernel.cs", "line": 12, "column": 9},
        {"address": 16416, "document": "Kernel.cs", "line": 13, "column": 9},
        {"address": 16432, "document": "Kernel.cs", "line": 14, "column": 9}
    ],
    "trap_points": [
        {"address": 16384, "label": "Kernel_Run", "method_id": 1},
        {"address": 16400, "label": "Kernel_Run.IL_0010", "method_id": 1},
        {"address": 16416, "label": "Kernel_Run.IL_0020", "method_id": 1},
        {"address": 16432, "label": "Kernel_Run.IL_0030", "method_id": 1},
        {"address": 20480, "label": "Screen_Write", "method_id": 2}
    ]
}"#;

pub fn kernel_cache() -> Arc<DebugInfoCache> {
    let table = DebugInfoTable::from_json_str(KERNEL_JSON).unwrap();
    Arc::new(DebugInfoCache::new(table))
}

pub fn engine_with(options: EngineOptions) -> (Engine, EventReceiver, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let (engine, events) = Engine::new(transport.clone(), kernel_cache(), options);
    (engine, events, transport)
}

pub fn engine() -> (Engine, EventReceiver, Arc<RecordingTransport>) {
    engine_with(EngineOptions {
        asm_window_timeout: Duration::from_secs(5),
        ..EngineOptions::default()
    })
}

/// Let spawned refresh tasks run to completion.
pub async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}
