//! Debug information entities.

use serde::{Deserialize, Serialize};

/// A named address. Several labels may share one address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub address: u32,
    pub name: String,
}

/// A compiled method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Method {
    pub id: i64,
    /// Label of the method header.
    pub label_call: String,
    /// Label of the method footer.
    pub label_end: String,
    /// First address of the method body.
    pub start_address: u32,
    /// Last address of the method body (inclusive).
    pub end_address: u32,
    /// Source document the method was compiled from.
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub line_start: u32,
    #[serde(default)]
    pub col_start: u32,
    #[serde(default)]
    pub line_end: u32,
    #[serde(default)]
    pub col_end: u32,
}

impl Method {
    /// Whether `address` lies inside this method.
    pub fn contains(&self, address: u32) -> bool {
        (self.start_address..=self.end_address).contains(&address)
    }
}

/// Source position of an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInfo {
    pub address: u32,
    pub document: String,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub end_column: u32,
}

/// An address the compiler emitted as a source-level trap point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrapPoint {
    pub address: u32,
    pub label: String,
    pub method_id: i64,
    /// The image keeps this trap armed permanently (e.g. an explicit break
    /// compiled into the kernel), independent of the debugger.
    #[serde(default)]
    pub already_owned: bool,
}

/// Field names of a type, in layout order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldMap {
    pub type_name: String,
    pub field_names: Vec<String>,
}

/// Layout of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub type_name: String,
    pub offset: i32,
}

/// A local variable or argument of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalArgumentInfo {
    pub method_label: String,
    pub name: String,
    pub index: u32,
    pub is_argument: bool,
    pub type_name: String,
    /// Offset from the frame base.
    pub offset: i32,
}
