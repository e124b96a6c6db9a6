//! The assembly window shown by the shell, and its acknowledgement.
//!
//! After a break the engine sends the shell an [`AssemblyWindow`]. The shell
//! renders it and reports back, through an [`AsmWindowHandle`], which
//! disassembly line is current and which comes next. Assembly step-over
//! needs those lines to recognize calls.

use std::sync::Arc;
use std::time::Duration;

use kdbg_debuginfo::{AsmListing, DebugInfoError, DebugInfoStore};
use tokio::sync::watch;

/// Header used when no label names the current address.
pub const NO_METHOD_LABEL: &str = "NO_METHOD_LABEL_FOUND";

/// Assembly around the current address, plus the header the shell needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyWindow {
    /// Longest label at the current address.
    pub current_label: String,
    /// Refresh the shell's state without showing the window.
    pub no_display: bool,
    pub asm_step_mode: bool,
    /// Labels of every trapped address.
    pub filter_labels: Vec<String>,
    pub code: Vec<String>,
    /// Identifies this window in the shell's reports. Set by the engine
    /// when the window is sent.
    pub generation: u64,
}

impl AssemblyWindow {
    /// Build the window around `address`.
    ///
    /// Returns `None` when no source position covers the address. Up to
    /// `radius` labels before and after the label at or before `address`
    /// are included.
    pub fn build(
        store: &dyn DebugInfoStore,
        listing: Option<&AsmListing>,
        address: u32,
        radius: usize,
        no_display: bool,
        asm_step_mode: bool,
        filter_labels: Vec<String>,
    ) -> Result<Option<Self>, DebugInfoError> {
        if store.source_info_at(address)?.is_none() {
            return Ok(None);
        }

        let labels = store.method_labels(address)?;
        let centre = labels
            .iter()
            .rposition(|l| l.address <= address)
            .unwrap_or(0);
        let start = centre.saturating_sub(radius);
        let end = centre.saturating_add(radius).min(labels.len());
        let names: Vec<&str> = labels
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|l| l.name.as_str())
            .collect();

        let code = match listing {
            Some(listing) => listing.source_for_labels(&names),
            None => names.iter().map(|n| format!("{n}:")).collect(),
        };

        let current_label = store
            .labels_at(address)?
            .into_iter()
            .max_by_key(String::len)
            .unwrap_or_else(|| NO_METHOD_LABEL.to_string());

        tracing::debug!(
            "assembly window at {:#010x}: {} labels, {} lines",
            address,
            names.len(),
            code.len()
        );
        Ok(Some(Self {
            current_label,
            no_display,
            asm_step_mode,
            filter_labels,
            code,
            generation: 0,
        }))
    }

    /// The three header lines followed by the code, CRLF separated.
    pub fn to_wire_text(&self) -> String {
        let params = format!(
            "{}|{}",
            if self.no_display { "NoDisplay" } else { "" },
            if self.asm_step_mode { "AsmStepMode" } else { "" }
        );
        let filters = self
            .filter_labels
            .iter()
            .map(|l| format!("{l}.00"))
            .collect::<Vec<_>>()
            .join("|");

        let mut lines = vec![self.current_label.clone(), params, filters];
        lines.extend(self.code.iter().cloned());
        let mut text = lines.join("\r\n");
        text.push_str("\r\n");
        text
    }
}

/// The shell's latest report on the rendered window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsmWindowReport {
    /// Generation of the window this report is collected for.
    pub generation: u64,
    pub current_line: Option<String>,
    pub next_line: Option<String>,
    pub next_address_label: Option<String>,
    current_line_set: bool,
    next_line_set: bool,
    next_address_set: bool,
}

impl AsmWindowReport {
    /// Whether all three values were reported since the last window.
    pub fn is_complete(&self) -> bool {
        self.current_line_set && self.next_line_set && self.next_address_set
    }
}

/// Shell-side reporter for the assembly window. Cheap to clone.
///
/// Every report names the [`AssemblyWindow::generation`] it answers.
/// Reports for any other window are dropped.
#[derive(Debug, Clone)]
pub struct AsmWindowHandle {
    tx: Arc<watch::Sender<AsmWindowReport>>,
}

impl AsmWindowHandle {
    pub fn set_current_line(&self, generation: u64, line: impl Into<String>) {
        let line = line.into();
        self.update(generation, |r| {
            r.current_line = Some(line);
            r.current_line_set = true;
        });
    }

    /// Report the line after the current one. `None` means there is none,
    /// which also forgets the next address.
    pub fn set_next_line(&self, generation: u64, line: Option<String>) {
        self.update(generation, |r| {
            if line.is_none() {
                r.next_address_label = None;
            }
            r.next_line = line;
            r.next_line_set = true;
        });
    }

    /// Report the label of the line after the current one.
    pub fn set_next_address_label(&self, generation: u64, label: impl Into<String>) {
        let label = label.into();
        self.update(generation, |r| {
            r.next_address_label = Some(label);
            r.next_address_set = true;
        });
    }

    fn update(&self, generation: u64, apply: impl FnOnce(&mut AsmWindowReport)) {
        let accepted = self.tx.send_if_modified(|r| {
            if r.generation != generation {
                return false;
            }
            apply(r);
            true
        });
        if !accepted {
            tracing::debug!(generation, "stale assembly window report dropped");
        }
    }
}

/// Engine-side end of the acknowledgement channel.
#[derive(Debug)]
pub(crate) struct AsmWindowSync {
    tx: Arc<watch::Sender<AsmWindowReport>>,
}

impl AsmWindowSync {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(AsmWindowReport::default());
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn handle(&self) -> AsmWindowHandle {
        AsmWindowHandle {
            tx: Arc::clone(&self.tx),
        }
    }

    pub(crate) fn snapshot(&self) -> AsmWindowReport {
        self.tx.borrow().clone()
    }

    /// Drop the current line. Reports for the window on screen are no
    /// longer accepted.
    pub(crate) fn forget_current_line(&self) {
        self.tx.send_modify(|r| {
            r.generation += 1;
            r.current_line = None;
        });
    }

    /// Start collecting the report for a new window and return its
    /// generation. Values are kept, only the "reported" flags are reset.
    pub(crate) fn begin_update(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|r| {
            r.generation += 1;
            r.current_line_set = false;
            r.next_line_set = false;
            r.next_address_set = false;
            generation = r.generation;
        });
        generation
    }

    /// Wait until the shell reported all three values for window
    /// `generation`, or `limit` elapsed. Returns whether the report is
    /// complete.
    pub(crate) async fn wait_for_update(&self, generation: u64, limit: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let reported = rx.wait_for(|r| r.generation == generation && r.is_complete());
        let done = matches!(tokio::time::timeout(limit, reported).await, Ok(Ok(_)));
        done
    }
}
