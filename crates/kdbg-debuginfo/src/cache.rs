//! Memoizing front for a [`DebugInfoStore`].
//!
//! Debug information is immutable for the whole session, so every distinct
//! lookup is answered by the store at most once. The memo sits behind a
//! mutex that is only ever try-acquired: a lookup entered while another is
//! in flight fails with [`DebugInfoError::Contention`] instead of waiting.

use std::collections::HashMap;
use std::sync::{Mutex, TryLockError};

use crate::error::DebugInfoError;
use crate::store::DebugInfoStore;
use crate::types::{FieldInfo, FieldMap, Label, LocalArgumentInfo, Method, SourceInfo};

/// Identity of a memoized lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    LabelsAt(u32),
    SourceInfoAt(u32),
    MethodAt(u32),
    MethodById(i64),
    MethodLabels(u32),
    NearestTrap(u32),
    AddressOfLabel(String),
    TrapAddresses { method_id: i64, include_already_owned: bool },
    FieldMap(String),
    FieldInfo(String),
    LocalsAndArgs(String),
    AddressForLine(String, u32),
}

#[derive(Debug, Clone)]
enum LookupValue {
    Names(Vec<String>),
    Source(Option<SourceInfo>),
    Method(Method),
    Labels(Vec<Label>),
    Address(u32),
    Traps(Vec<(u32, String)>),
    FieldMap(FieldMap),
    FieldInfo(FieldInfo),
    Locals(Vec<LocalArgumentInfo>),
    MaybeAddress(Option<u32>),
}

/// Try-lock memo cache over a debug-info store.
pub struct DebugInfoCache {
    store: Box<dyn DebugInfoStore>,
    memo: Mutex<HashMap<LookupKey, LookupValue>>,
}

impl std::fmt::Debug for DebugInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugInfoCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Answer `$key` from the memo, or run `$call` against the store and keep
/// its result as `LookupValue::$variant`.
macro_rules! memoized {
    ($self:ident, $key:expr, $variant:ident, $store:ident => $call:expr) => {
        match $self.cached($key, |$store: &dyn DebugInfoStore| {
            $call.map(LookupValue::$variant)
        })? {
            LookupValue::$variant(value) => Ok(value),
            other => Err(DebugInfoError::Parse(format!(
                "memo entry has unexpected shape: {other:?}"
            ))),
        }
    };
}

impl DebugInfoCache {
    pub fn new(store: impl DebugInfoStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Number of memoized lookups. Zero while another lookup holds the memo.
    pub fn len(&self) -> usize {
        self.memo.try_lock().map(|memo| memo.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(
        &self,
        key: LookupKey,
        fetch: impl FnOnce(&dyn DebugInfoStore) -> Result<LookupValue, DebugInfoError>,
    ) -> Result<LookupValue, DebugInfoError> {
        let mut memo = match self.memo.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                tracing::warn!("debug info cache busy, refusing {:?}", key);
                return Err(DebugInfoError::Contention {
                    query: format!("{key:?}"),
                });
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        if let Some(value) = memo.get(&key) {
            return Ok(value.clone());
        }

        tracing::debug!("debug info lookup {:?}", key);
        let value = fetch(self.store.as_ref())?;
        memo.insert(key, value.clone());
        Ok(value)
    }
}

impl DebugInfoStore for DebugInfoCache {
    fn labels_at(&self, address: u32) -> Result<Vec<String>, DebugInfoError> {
        memoized!(self, LookupKey::LabelsAt(address), Names, s => s.labels_at(address))
    }

    fn source_info_at(&self, address: u32) -> Result<Option<SourceInfo>, DebugInfoError> {
        memoized!(self, LookupKey::SourceInfoAt(address), Source, s => s.source_info_at(address))
    }

    fn method_at(&self, address: u32) -> Result<Method, DebugInfoError> {
        memoized!(self, LookupKey::MethodAt(address), Method, s => s.method_at(address))
    }

    fn method_by_id(&self, id: i64) -> Result<Method, DebugInfoError> {
        memoized!(self, LookupKey::MethodById(id), Method, s => s.method_by_id(id))
    }

    fn method_labels(&self, address: u32) -> Result<Vec<Label>, DebugInfoError> {
        memoized!(self, LookupKey::MethodLabels(address), Labels, s => s.method_labels(address))
    }

    fn nearest_enclosing_trap_address(&self, address: u32) -> Result<u32, DebugInfoError> {
        memoized!(
            self,
            LookupKey::NearestTrap(address),
            Address,
            s => s.nearest_enclosing_trap_address(address)
        )
    }

    fn address_of_label(&self, name: &str) -> Result<u32, DebugInfoError> {
        memoized!(
            self,
            LookupKey::AddressOfLabel(name.to_string()),
            Address,
            s => s.address_of_label(name)
        )
    }

    fn all_trap_addresses_for_method(
        &self,
        method: &Method,
        include_already_owned: bool,
    ) -> Result<Vec<(u32, String)>, DebugInfoError> {
        let key = LookupKey::TrapAddresses {
            method_id: method.id,
            include_already_owned,
        };
        memoized!(
            self,
            key,
            Traps,
            s => s.all_trap_addresses_for_method(method, include_already_owned)
        )
    }

    fn field_map(&self, type_name: &str) -> Result<FieldMap, DebugInfoError> {
        memoized!(
            self,
            LookupKey::FieldMap(type_name.to_string()),
            FieldMap,
            s => s.field_map(type_name)
        )
    }

    fn field_info(&self, name: &str) -> Result<FieldInfo, DebugInfoError> {
        memoized!(
            self,
            LookupKey::FieldInfo(name.to_string()),
            FieldInfo,
            s => s.field_info(name)
        )
    }

    fn locals_and_args(&self, method_label: &str) -> Result<Vec<LocalArgumentInfo>, DebugInfoError> {
        memoized!(
            self,
            LookupKey::LocalsAndArgs(method_label.to_string()),
            Locals,
            s => s.locals_and_args(method_label)
        )
    }

    fn address_for_source_line(
        &self,
        document: &str,
        line: u32,
    ) -> Result<Option<u32>, DebugInfoError> {
        memoized!(
            self,
            LookupKey::AddressForLine(document.to_string(), line),
            MaybeAddress,
            s => s.address_for_source_line(document, line)
        )
    }
}
