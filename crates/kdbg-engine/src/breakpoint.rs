//! Breakpoint slot management.
//!
//! The stub only knows slot indices. [`BreakpointManager`] is the single
//! source of truth for which address each of the 256 slots traps, for the
//! assembly breakpoints realized through those slots, and for the transient
//! tracepoints a source-level step arms.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use kdbg_debuginfo::DebugInfoStore;
use kdbg_stub::{StubCommand, StubTransport};

use crate::error::EngineError;

/// Number of breakpoint slots the stub provides.
pub const MAX_BREAKPOINT_SLOTS: usize = 256;

/// Index of a stub breakpoint slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub u8);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A user assembly breakpoint.
///
/// The stub can only trap at source-level trap addresses, so the breakpoint
/// is armed at `anchor` (the nearest enclosing trap) and the engine steps
/// from there to `asm_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsmBreakpoint {
    pub anchor: u32,
    pub asm_address: u32,
    pub slot: SlotId,
}

#[derive(Debug, Clone)]
struct SlotBinding {
    address: u32,
    label: String,
    /// Source breakpoints the shell holds on this slot.
    user_refs: u32,
    /// Assembly breakpoints anchored on this slot.
    anchor_refs: u32,
}

#[derive(Clone, Copy)]
enum Owner {
    User,
    Anchor,
}

/// Owns the slot table, assembly breakpoints, tracepoints and pending set.
pub struct BreakpointManager {
    transport: Arc<dyn StubTransport>,
    debug_info: Arc<dyn DebugInfoStore>,
    slots: Vec<Option<SlotBinding>>,
    asm_breakpoints: Vec<AsmBreakpoint>,
    /// Step-owned traps, in installation order.
    tracepoints: Vec<(u32, String)>,
    pending: BTreeSet<u32>,
}

impl fmt::Debug for BreakpointManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakpointManager")
            .field("active", &self.active_count())
            .field("asm_breakpoints", &self.asm_breakpoints)
            .field("tracepoints", &self.tracepoints)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl BreakpointManager {
    pub fn new(transport: Arc<dyn StubTransport>, debug_info: Arc<dyn DebugInfoStore>) -> Self {
        Self {
            transport,
            debug_info,
            slots: vec![None; MAX_BREAKPOINT_SLOTS],
            asm_breakpoints: Vec::new(),
            tracepoints: Vec::new(),
            pending: BTreeSet::new(),
        }
    }

    // -----------------------------------------------------------------
    // Source breakpoints
    // -----------------------------------------------------------------

    /// Trap at `address`, returning the slot that holds it.
    ///
    /// An address that is already bound keeps its slot and gains a
    /// reference; no command is sent.
    ///
    /// # Errors
    ///
    /// [`EngineError::CapacityExceeded`] when every slot is in use, and
    /// [`EngineError::NullAddress`] for address 0.
    pub fn set_breakpoint(&mut self, address: u32) -> Result<SlotId, EngineError> {
        self.bind(address, Owner::User)
    }

    /// Drop one reference to `slot`, releasing it once nothing uses it.
    ///
    /// # Errors
    ///
    /// [`EngineError::InactiveSlot`] if the slot holds no source breakpoint.
    pub fn delete_breakpoint(&mut self, slot: SlotId) -> Result<(), EngineError> {
        match self.slots[usize::from(slot.0)].as_mut() {
            Some(binding) if binding.user_refs > 0 => binding.user_refs -= 1,
            _ => return Err(EngineError::InactiveSlot(slot)),
        }
        self.release_if_unused(slot)
    }

    fn bind(&mut self, address: u32, owner: Owner) -> Result<SlotId, EngineError> {
        if address == 0 {
            return Err(EngineError::NullAddress);
        }
        if let Some(slot) = self.slot_at(address) {
            if let Some(binding) = self.slots[usize::from(slot.0)].as_mut() {
                match owner {
                    Owner::User => binding.user_refs += 1,
                    Owner::Anchor => binding.anchor_refs += 1,
                }
            }
            return Ok(slot);
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(EngineError::CapacityExceeded {
                max: MAX_BREAKPOINT_SLOTS,
            })?;
        let slot = SlotId(u8::try_from(index).map_err(|_| EngineError::CapacityExceeded {
            max: MAX_BREAKPOINT_SLOTS,
        })?);

        let label = self.display_label(address)?;
        self.transport.send(StubCommand::SetBreakpoint {
            slot: slot.0,
            address,
        })?;
        tracing::debug!("breakpoint {} bound at {:#010x} ({})", slot, address, label);

        // The slot now owns any step trap already armed here.
        self.tracepoints.retain(|(a, _)| *a != address);

        let (user_refs, anchor_refs) = match owner {
            Owner::User => (1, 0),
            Owner::Anchor => (0, 1),
        };
        self.slots[index] = Some(SlotBinding {
            address,
            label,
            user_refs,
            anchor_refs,
        });
        Ok(slot)
    }

    fn release_if_unused(&mut self, slot: SlotId) -> Result<(), EngineError> {
        let index = usize::from(slot.0);
        let unused = self.slots[index]
            .as_ref()
            .is_some_and(|b| b.user_refs == 0 && b.anchor_refs == 0);
        if unused {
            self.slots[index] = None;
            tracing::debug!(%slot, "breakpoint released");
            self.transport
                .send(StubCommand::DeleteBreakpoint { slot: slot.0 })?;
        }
        Ok(())
    }

    fn display_label(&self, address: u32) -> Result<String, EngineError> {
        Ok(self
            .debug_info
            .labels_at(address)?
            .into_iter()
            .next()
            .unwrap_or_else(|| format!("0x{address:08X}")))
    }

    // -----------------------------------------------------------------
    // Assembly breakpoints
    // -----------------------------------------------------------------

    /// Break at an arbitrary instruction. Setting the same address twice
    /// returns the existing slot.
    pub fn set_assembly_breakpoint(&mut self, asm_address: u32) -> Result<SlotId, EngineError> {
        if let Some(existing) = self.find_asm_breakpoint_at(asm_address) {
            return Ok(existing.slot);
        }
        let anchor = self.debug_info.nearest_enclosing_trap_address(asm_address)?;
        let slot = self.bind(anchor, Owner::Anchor)?;
        self.asm_breakpoints.push(AsmBreakpoint {
            anchor,
            asm_address,
            slot,
        });
        Ok(slot)
    }

    /// Remove the assembly breakpoint at `asm_address`. Returns whether one
    /// existed.
    pub fn clear_assembly_breakpoint(&mut self, asm_address: u32) -> Result<bool, EngineError> {
        let Some(pos) = self
            .asm_breakpoints
            .iter()
            .position(|bp| bp.asm_address == asm_address)
        else {
            return Ok(false);
        };
        let bp = self.asm_breakpoints.remove(pos);
        if let Some(binding) = self.slots[usize::from(bp.slot.0)].as_mut() {
            binding.anchor_refs = binding.anchor_refs.saturating_sub(1);
        }
        self.release_if_unused(bp.slot)?;
        Ok(true)
    }

    /// Toggle the assembly breakpoint at a label. Returns whether it is set
    /// afterwards.
    pub fn toggle_assembly_breakpoint_at_label(&mut self, label: &str) -> Result<bool, EngineError> {
        let address = self.debug_info.address_of_label(label)?;
        if self.clear_assembly_breakpoint(address)? {
            Ok(false)
        } else {
            self.set_assembly_breakpoint(address)?;
            Ok(true)
        }
    }

    /// Assembly breakpoints armed through the trap at `anchor`, in the order
    /// they were set.
    pub fn asm_breakpoints_anchored_at(&self, anchor: u32) -> Vec<AsmBreakpoint> {
        self.asm_breakpoints
            .iter()
            .filter(|bp| bp.anchor == anchor)
            .copied()
            .collect()
    }

    pub fn find_asm_breakpoint_at(&self, asm_address: u32) -> Option<AsmBreakpoint> {
        self.asm_breakpoints
            .iter()
            .find(|bp| bp.asm_address == asm_address)
            .copied()
    }

    pub fn asm_breakpoints(&self) -> &[AsmBreakpoint] {
        &self.asm_breakpoints
    }

    // -----------------------------------------------------------------
    // Bound / pending
    // -----------------------------------------------------------------

    /// Re-arm every bound slot, then close the batch.
    ///
    /// Returns the number of slots sent.
    pub fn activate_bound_breakpoints(&mut self) -> Result<usize, EngineError> {
        let mut count = 0;
        for (index, binding) in self.slots.iter().enumerate() {
            if let Some(binding) = binding {
                let slot = u8::try_from(index).map_err(|_| EngineError::CapacityExceeded {
                    max: MAX_BREAKPOINT_SLOTS,
                })?;
                self.transport.send(StubCommand::SetBreakpoint {
                    slot,
                    address: binding.address,
                })?;
                count += 1;
            }
        }
        self.transport.send(StubCommand::BatchEnd)?;
        tracing::info!("activated {} bound breakpoints", count);
        Ok(count)
    }

    /// Record an address the shell is about to bind.
    ///
    /// A step trap already armed there is disarmed so the two never
    /// overlap.
    pub fn add_pending_breakpoint(&mut self, address: u32) -> Result<(), EngineError> {
        self.pending.insert(address);
        if let Some(pos) = self.tracepoints.iter().position(|(a, _)| *a == address) {
            self.tracepoints.remove(pos);
            self.transport.send(StubCommand::ClearRawTrap(address))?;
        }
        Ok(())
    }

    pub fn remove_pending_breakpoint(&mut self, address: u32) -> bool {
        self.pending.remove(&address)
    }

    pub fn pending_addresses(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending.iter().copied()
    }

    // -----------------------------------------------------------------
    // Tracepoints
    // -----------------------------------------------------------------

    /// Arm (`clear == false`) a step trap at every trap address of the
    /// method containing `current`, or disarm (`clear == true`) every step
    /// trap armed so far. Real breakpoints are never touched.
    ///
    /// Installing without a current address does nothing. Returns the
    /// number of traps changed.
    pub fn manage_tracepoints(
        &mut self,
        current: Option<u32>,
        clear: bool,
    ) -> Result<usize, EngineError> {
        if clear {
            let installed = std::mem::take(&mut self.tracepoints);
            let count = installed.len();
            for (address, _) in installed {
                self.transport.send(StubCommand::ClearRawTrap(address))?;
            }
            if count > 0 {
                tracing::debug!("cleared {} tracepoints", count);
            }
            return Ok(count);
        }

        let Some(current) = current else {
            return Ok(0);
        };
        let method = self.debug_info.method_at(current)?;
        let traps = self.debug_info.all_trap_addresses_for_method(&method, true)?;

        let mut count = 0;
        for (address, label) in traps {
            if self.is_real_breakpoint(address) || self.is_tracepoint(address) {
                continue;
            }
            self.transport.send(StubCommand::SetRawTrap(address))?;
            self.tracepoints.push((address, label));
            count += 1;
        }
        tracing::debug!(method = %method.label_call, "installed {} tracepoints", count);
        Ok(count)
    }

    pub fn tracepoints(&self) -> &[(u32, String)] {
        &self.tracepoints
    }

    fn is_tracepoint(&self, address: u32) -> bool {
        self.tracepoints.iter().any(|(a, _)| *a == address)
    }

    fn is_real_breakpoint(&self, address: u32) -> bool {
        self.pending.contains(&address) || self.slot_at(address).is_some()
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// The slot bound at `address`, whoever owns it.
    pub fn slot_at(&self, address: u32) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|b| b.as_ref().is_some_and(|b| b.address == address))
            .and_then(|i| u8::try_from(i).ok())
            .map(SlotId)
    }

    /// Slots bound at `address` that hold a source breakpoint.
    pub fn user_slots_at(&self, address: u32) -> Vec<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, b)| {
                let b = b.as_ref()?;
                (b.address == address && b.user_refs > 0).then_some(i)
            })
            .filter_map(|i| u8::try_from(i).ok().map(SlotId))
            .collect()
    }

    pub fn slot_address(&self, slot: SlotId) -> Option<u32> {
        self.slots[usize::from(slot.0)].as_ref().map(|b| b.address)
    }

    pub fn slot_label(&self, slot: SlotId) -> Option<&str> {
        self.slots[usize::from(slot.0)]
            .as_ref()
            .map(|b| b.label.as_str())
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|b| b.is_some()).count()
    }

    /// Addresses of all bound slots, by slot index.
    pub fn active_addresses(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter_map(|b| b.as_ref().map(|b| b.address))
            .collect()
    }

    /// Labels of every trapped address: bound slots first, then tracepoints.
    pub fn trapped_labels(&self) -> Vec<String> {
        self.slots
            .iter()
            .flatten()
            .map(|b| b.label.clone())
            .chain(self.tracepoints.iter().map(|(_, l)| l.clone()))
            .collect()
    }
}
