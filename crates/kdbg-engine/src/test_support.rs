//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use kdbg_debuginfo::{
    DebugInfoCache, DebugInfoData, DebugInfoTable, Label, Method, SourceInfo, TrapPoint,
};
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

/// `Kernel_Run` spans 0x4000..=0x40FF with source traps every 0x10 up to
/// 0x4030. `Screen_Write` spans 0x5000..=0x50FF with one trap.
pub fn kernel_debug_info() -> DebugInfoData {
    let label = |address, name: &str| Label {
        address,
        name: name.to_string(),
    };
    let trap = |address, name: &str, method_id| TrapPoint {
        address,
        label: name.to_string(),
        method_id,
        already_owned: false,
    };
    let source = |address, line| SourceInfo {
        address,
        document: "Kernel.cs".to_string(),
        line,
        column: 9,
        end_line: line,
        end_column: 30,
    };

    DebugInfoData {
        labels: vec![
            label(0x4000, "Kernel_Run"),
            label(0x4000, "Kernel_Run.IL_0000.00"),
            label(0x4004, "Kernel_Run.IL_0000.01"),
            label(0x4010, "Kernel_Run.IL_0010"),
            label(0x4010, "Kernel_Run.IL_0010.00"),
            label(0x4014, "Kernel_Run.IL_0010.01"),
            label(0x4018, "Kernel_Run.IL_0010.02"),
            label(0x4020, "Kernel_Run.IL_0020"),
            label(0x4030, "Kernel_Run.IL_0030"),
            label(0x40F0, "Kernel_Run.END__OF__METHOD_EXCEPTION__2"),
            label(0x5000, "Screen_Write"),
        ],
        methods: vec![
            Method {
                id: 1,
                label_call: "Kernel_Run".into(),
                label_end: "Kernel_Run.END__OF__METHOD".into(),
                start_address: 0x4000,
                end_address: 0x40FF,
                document: Some("Kernel.cs".into()),
                line_start: 10,
                col_start: 5,
                line_end: 20,
                col_end: 6,
            },
            Method {
                id: 2,
                label_call: "Screen_Write".into(),
                label_end: "Screen_Write.END__OF__METHOD".into(),
                start_address: 0x5000,
                end_address: 0x50FF,
                document: None,
                line_start: 0,
                col_start: 0,
                line_end: 0,
                col_end: 0,
            },
        ],
        source_infos: vec![
            source(0x4000, 11),
            source(0x4010, 12),
            source(0x4020, 13),
            source(0x4030, 14),
        ],
        trap_points: vec![
            trap(0x4000, "Kernel_Run", 1),
            trap(0x4010, "Kernel_Run.IL_0010", 1),
            trap(0x4020, "Kernel_Run.IL_0020", 1),
            trap(0x4030, "Kernel_Run.IL_0030", 1),
            trap(0x5000, "Screen_Write", 2),
        ],
        ..DebugInfoData::default()
    }
}

pub fn kernel_cache() -> Arc<DebugInfoCache> {
    Arc::new(DebugInfoCache::new(DebugInfoTable::new(kernel_debug_info())))
}
