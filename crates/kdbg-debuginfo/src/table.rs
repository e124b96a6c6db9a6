//! In-memory debug information loaded from the compiled JSON artifact.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DebugInfoError;
use crate::store::DebugInfoStore;
use crate::types::{FieldInfo, FieldMap, Label, LocalArgumentInfo, Method, SourceInfo, TrapPoint};

/// Serialized form of the debug-info artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfoData {
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub source_infos: Vec<SourceInfo>,
    #[serde(default)]
    pub trap_points: Vec<TrapPoint>,
    #[serde(default)]
    pub field_maps: Vec<FieldMap>,
    #[serde(default)]
    pub field_infos: Vec<FieldInfo>,
    #[serde(default)]
    pub locals: Vec<LocalArgumentInfo>,
}

/// Indexed, immutable debug information.
#[derive(Debug, Default)]
pub struct DebugInfoTable {
    labels_by_address: BTreeMap<u32, Vec<String>>,
    address_by_label: HashMap<String, u32>,
    methods: Vec<Method>,
    source_infos: BTreeMap<u32, SourceInfo>,
    trap_points: BTreeMap<u32, TrapPoint>,
    field_maps: HashMap<String, FieldMap>,
    field_infos: HashMap<String, FieldInfo>,
    locals: HashMap<String, Vec<LocalArgumentInfo>>,
}

impl DebugInfoTable {
    /// Build the lookup indices over `data`.
    pub fn new(data: DebugInfoData) -> Self {
        let mut table = Self::default();

        for label in data.labels {
            table
                .address_by_label
                .entry(label.name.clone())
                .or_insert(label.address);
            table
                .labels_by_address
                .entry(label.address)
                .or_default()
                .push(label.name);
        }

        table.methods = data.methods;
        table.methods.sort_by_key(|m| m.start_address);

        table.source_infos = data
            .source_infos
            .into_iter()
            .map(|si| (si.address, si))
            .collect();
        table.trap_points = data
            .trap_points
            .into_iter()
            .map(|tp| (tp.address, tp))
            .collect();
        table.field_maps = data
            .field_maps
            .into_iter()
            .map(|fm| (fm.type_name.clone(), fm))
            .collect();
        table.field_infos = data
            .field_infos
            .into_iter()
            .map(|fi| (fi.name.clone(), fi))
            .collect();
        for local in data.locals {
            table
                .locals
                .entry(local.method_label.clone())
                .or_default()
                .push(local);
        }
        for list in table.locals.values_mut() {
            list.sort_by_key(|l| (l.is_argument, l.index));
        }

        table
    }

    /// Parse the artifact from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`DebugInfoError::Parse`] on malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self, DebugInfoError> {
        let data: DebugInfoData =
            serde_json::from_str(json).map_err(|e| DebugInfoError::Parse(e.to_string()))?;
        Ok(Self::new(data))
    }

    /// Load the artifact from disk.
    ///
    /// # Errors
    ///
    /// Returns [`DebugInfoError::NotFound`] if the file does not exist, or
    /// an I/O or parse error.
    pub fn load(path: &Path) -> Result<Self, DebugInfoError> {
        if !path.exists() {
            return Err(DebugInfoError::NotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&json)?;
        tracing::info!(
            "loaded debug info from {}: {} methods, {} trap points",
            path.display(),
            table.methods.len(),
            table.trap_points.len()
        );
        Ok(table)
    }
}

impl DebugInfoStore for DebugInfoTable {
    fn labels_at(&self, address: u32) -> Result<Vec<String>, DebugInfoError> {
        Ok(self
            .labels_by_address
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    fn source_info_at(&self, address: u32) -> Result<Option<SourceInfo>, DebugInfoError> {
        let Some((_, info)) = self.source_infos.range(..=address).next_back() else {
            return Ok(None);
        };
        if info.address == address {
            return Ok(Some(info.clone()));
        }
        // A preceding position only applies inside the same method.
        match self.method_at(address) {
            Ok(method) if method.contains(info.address) => Ok(Some(info.clone())),
            _ => Ok(None),
        }
    }

    fn method_at(&self, address: u32) -> Result<Method, DebugInfoError> {
        self.methods
            .iter()
            .find(|m| m.contains(address))
            .cloned()
            .ok_or(DebugInfoError::UnknownAddress(address))
    }

    fn method_by_id(&self, id: i64) -> Result<Method, DebugInfoError> {
        self.methods
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(DebugInfoError::UnknownMethod(id))
    }

    fn method_labels(&self, address: u32) -> Result<Vec<Label>, DebugInfoError> {
        let method = self.method_at(address)?;
        Ok(self
            .labels_by_address
            .range(method.start_address..=method.end_address)
            .flat_map(|(&address, names)| {
                names.iter().map(move |name| Label {
                    address,
                    name: name.clone(),
                })
            })
            .collect())
    }

    fn nearest_enclosing_trap_address(&self, address: u32) -> Result<u32, DebugInfoError> {
        let method = self.method_at(address)?;
        self.trap_points
            .range(method.start_address..=address)
            .next_back()
            .map(|(&trap, _)| trap)
            .ok_or(DebugInfoError::UnknownAddress(address))
    }

    fn address_of_label(&self, name: &str) -> Result<u32, DebugInfoError> {
        self.address_by_label
            .get(name)
            .copied()
            .ok_or_else(|| DebugInfoError::UnknownLabel(name.to_string()))
    }

    fn all_trap_addresses_for_method(
        &self,
        method: &Method,
        include_already_owned: bool,
    ) -> Result<Vec<(u32, String)>, DebugInfoError> {
        Ok(self
            .trap_points
            .range(method.start_address..=method.end_address)
            .map(|(_, tp)| tp)
            .filter(|tp| tp.method_id == method.id)
            .filter(|tp| include_already_owned || !tp.already_owned)
            .map(|tp| (tp.address, tp.label.clone()))
            .collect())
    }

    fn field_map(&self, type_name: &str) -> Result<FieldMap, DebugInfoError> {
        self.field_maps
            .get(type_name)
            .cloned()
            .ok_or_else(|| DebugInfoError::UnknownType(type_name.to_string()))
    }

    fn field_info(&self, name: &str) -> Result<FieldInfo, DebugInfoError> {
        self.field_infos
            .get(name)
            .cloned()
            .ok_or_else(|| DebugInfoError::UnknownType(name.to_string()))
    }

    fn locals_and_args(&self, method_label: &str) -> Result<Vec<LocalArgumentInfo>, DebugInfoError> {
        Ok(self.locals.get(method_label).cloned().unwrap_or_default())
    }

    fn address_for_source_line(
        &self,
        document: &str,
        line: u32,
    ) -> Result<Option<u32>, DebugInfoError> {
        Ok(self
            .source_infos
            .values()
            .filter(|si| si.document == document && si.line == line)
            .map(|si| si.address)
            .find(|a| self.trap_points.contains_key(a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DebugInfoTable {
        let json = r#"{
            "labels": [
                {"address": 4096, "name": "Kernel_Run"},
                {"address": 4096, "name": "Kernel_Run.IL_0000"},
                {"address": 4100, "name": "Kernel_Run.IL_0000.00"},
                {"address": 4112, "name": "Kernel_Run.IL_0005"},
                {"address": 4128, "name": "Kernel_Run.END__OF__METHOD"},
                {"address": 8192, "name": "Screen_Write"}
            ],
            "methods": [
                {"id": 1, "label_call": "Kernel_Run", "label_end": "Kernel_Run.END__OF__METHOD",
                 "start_address": 4096, "end_address": 4140,
                 "document": "Kernel.cs", "line_start": 10, "line_end": 20},
                {"id": 2, "label_call": "Screen_Write", "label_end": "Screen_Write.END",
                 "start_address": 8192, "end_address": 8256}
            ],
            "source_infos": [
                {"address": 4096, "document": "Kernel.cs", "line": 11, "column": 9},
                {"address": 4112, "document": "Kernel.cs", "line": 12, "column": 9}
            ],
            "trap_points": [
                {"address": 4096, "label": "Kernel_Run.IL_0000", "method_id": 1, "already_owned": true},
                {"address": 4112, "label": "Kernel_Run.IL_0005", "method_id": 1},
                {"address": 8192, "label": "Screen_Write.IL_0000", "method_id": 2}
            ],
            "field_maps": [{"type_name": "Kernel", "field_names": ["mCount", "mFlag"]}],
            "field_infos": [{"name": "Kernel.mCount", "type_name": "System.Int32", "offset": 0}],
            "locals": [
                {"method_label": "Kernel_Run", "name": "x", "index": 0, "is_argument": false,
                 "type_name": "System.Int32", "offset": -4},
                {"method_label": "Kernel_Run", "name": "this", "index": 0, "is_argument": true,
                 "type_name": "Kernel", "offset": 8}
            ]
        }"#;
        DebugInfoTable::from_json_str(json).expect("sample parses")
    }

    #[test]
    fn labels_share_an_address() {
        let table = sample();
        let labels = table.labels_at(4096).unwrap();
        assert_eq!(labels, vec!["Kernel_Run", "Kernel_Run.IL_0000"]);
        assert!(table.labels_at(4097).unwrap().is_empty());
    }

    #[test]
    fn method_at_covers_inclusive_range() {
        let table = sample();
        assert_eq!(table.method_at(4096).unwrap().id, 1);
        assert_eq!(table.method_at(4140).unwrap().id, 1);
        assert!(matches!(
            table.method_at(4141),
            Err(DebugInfoError::UnknownAddress(4141))
        ));
    }

    #[test]
    fn source_info_uses_preceding_position_in_same_method() {
        let table = sample();
        let si = table.source_info_at(4104).unwrap().unwrap();
        assert_eq!(si.line, 11);
        // 8200 is in Screen_Write, which has no source info of its own.
        assert!(table.source_info_at(8200).unwrap().is_none());
    }

    #[test]
    fn nearest_trap_stays_within_method() {
        let table = sample();
        assert_eq!(table.nearest_enclosing_trap_address(4120).unwrap(), 4112);
        assert_eq!(table.nearest_enclosing_trap_address(4112).unwrap(), 4112);
        assert_eq!(table.nearest_enclosing_trap_address(4100).unwrap(), 4096);
        assert_eq!(table.nearest_enclosing_trap_address(8200).unwrap(), 8192);
    }

    #[test]
    fn trap_addresses_filter_already_owned() {
        let table = sample();
        let method = table.method_by_id(1).unwrap();
        let all = table.all_trap_addresses_for_method(&method, true).unwrap();
        assert_eq!(
            all,
            vec![
                (4096, "Kernel_Run.IL_0000".to_string()),
                (4112, "Kernel_Run.IL_0005".to_string())
            ]
        );
        let free = table.all_trap_addresses_for_method(&method, false).unwrap();
        assert_eq!(free, vec![(4112, "Kernel_Run.IL_0005".to_string())]);
    }

    #[test]
    fn method_labels_are_ordered_by_address() {
        let table = sample();
        let labels = table.method_labels(4112).unwrap();
        let addresses: Vec<u32> = labels.iter().map(|l| l.address).collect();
        assert_eq!(addresses, vec![4096, 4096, 4100, 4112, 4128]);
    }

    #[test]
    fn label_address_lookup() {
        let table = sample();
        assert_eq!(table.address_of_label("Kernel_Run.IL_0005").unwrap(), 4112);
        assert!(matches!(
            table.address_of_label("Nope"),
            Err(DebugInfoError::UnknownLabel(_))
        ));
    }

    #[test]
    fn locals_list_locals_before_arguments() {
        let table = sample();
        let locals = table.locals_and_args("Kernel_Run").unwrap();
        assert_eq!(locals.len(), 2);
        assert_eq!(locals[0].name, "x");
        assert_eq!(locals[1].name, "this");
        assert!(table.locals_and_args("Screen_Write").unwrap().is_empty());
    }

    #[test]
    fn field_lookups() {
        let table = sample();
        assert_eq!(table.field_map("Kernel").unwrap().field_names.len(), 2);
        assert_eq!(table.field_info("Kernel.mCount").unwrap().offset, 0);
        assert!(matches!(
            table.field_map("Missing"),
            Err(DebugInfoError::UnknownType(_))
        ));
    }

    #[test]
    fn source_line_resolves_to_trap_address() {
        let table = sample();
        assert_eq!(
            table.address_for_source_line("Kernel.cs", 12).unwrap(),
            Some(4112)
        );
        assert_eq!(table.address_for_source_line("Kernel.cs", 99).unwrap(), None);
    }

    #[test]
    fn source_line_without_trap_has_no_address() {
        let json = r#"{
            "source_infos": [
                {"address": 4096, "document": "Kernel.cs", "line": 11, "column": 9},
                {"address": 4100, "document": "Kernel.cs", "line": 11, "column": 20}
            ],
            "trap_points": [
                {"address": 4100, "label": "Kernel_Run.IL_0000.00", "method_id": 1}
            ]
        }"#;
        let table = DebugInfoTable::from_json_str(json).unwrap();
        assert_eq!(table.address_for_source_line("Kernel.cs", 11).unwrap(), Some(4100));

        let json = r#"{
            "source_infos": [{"address": 4096, "document": "Kernel.cs", "line": 11, "column": 9}]
        }"#;
        let table = DebugInfoTable::from_json_str(json).unwrap();
        assert_eq!(table.address_for_source_line("Kernel.cs", 11).unwrap(), None);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = DebugInfoTable::load(&dir.path().join("Kernel.cdb.json")).unwrap_err();
        assert!(matches!(err, DebugInfoError::NotFound(_)));
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Kernel.cdb.json");
        std::fs::write(&path, r#"{"labels": [{"address": 16, "name": "Start"}]}"#).unwrap();
        let table = DebugInfoTable::load(&path).unwrap();
        assert_eq!(table.address_of_label("Start").unwrap(), 16);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = DebugInfoTable::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, DebugInfoError::Parse(_)));
    }
}
