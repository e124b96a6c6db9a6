//! The read-only lookup contract over compiled debug information.

use crate::error::DebugInfoError;
use crate::types::{FieldInfo, FieldMap, Label, LocalArgumentInfo, Method, SourceInfo};

/// Read-only queries over the debug information of one compiled kernel.
///
/// The underlying data never changes during a debug session, so any result
/// may be memoized by callers.
pub trait DebugInfoStore: Send + Sync {
    /// Names of all labels at `address`. Empty if there are none.
    fn labels_at(&self, address: u32) -> Result<Vec<String>, DebugInfoError>;

    /// Source position of `address`, if the compiler recorded one.
    fn source_info_at(&self, address: u32) -> Result<Option<SourceInfo>, DebugInfoError>;

    /// The method whose body contains `address`.
    fn method_at(&self, address: u32) -> Result<Method, DebugInfoError>;

    /// The method with the given id.
    fn method_by_id(&self, id: i64) -> Result<Method, DebugInfoError>;

    /// Every label of the method containing `address`, ordered by address.
    fn method_labels(&self, address: u32) -> Result<Vec<Label>, DebugInfoError>;

    /// The closest source-level trap address at or before `address` within
    /// the same method.
    fn nearest_enclosing_trap_address(&self, address: u32) -> Result<u32, DebugInfoError>;

    /// Address of the label called `name`.
    fn address_of_label(&self, name: &str) -> Result<u32, DebugInfoError>;

    /// All source-level trap addresses of `method` with their labels,
    /// ordered by address. Traps the image keeps armed permanently are only
    /// included when `include_already_owned` is set.
    fn all_trap_addresses_for_method(
        &self,
        method: &Method,
        include_already_owned: bool,
    ) -> Result<Vec<(u32, String)>, DebugInfoError>;

    /// Field layout of a type.
    fn field_map(&self, type_name: &str) -> Result<FieldMap, DebugInfoError>;

    /// Layout of a single field by its full name.
    fn field_info(&self, name: &str) -> Result<FieldInfo, DebugInfoError>;

    /// Locals and arguments of the method whose header label is `method_label`.
    fn locals_and_args(&self, method_label: &str) -> Result<Vec<LocalArgumentInfo>, DebugInfoError>;

    /// First trap address compiled for `line` of `document`.
    fn address_for_source_line(
        &self,
        document: &str,
        line: u32,
    ) -> Result<Option<u32>, DebugInfoError>;
}
