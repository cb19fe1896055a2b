//! The periodic table (PT): a read-only mapping from element symbol to a
//! property dictionary (atomic mass and friends), loaded from an external
//! JSON file.
//!
//! Ground truth: `chemistry_lang/ch_periodic_table.py`. The schema is a flat
//! JSON object of objects:
//!
//! ```json
//! { "H": { "AtomicMass": "1.008", "number": "1" }, "He": { "AtomicMass": "4.0026", "number": "2" } }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json;

use crate::error::ErrorHandler;

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
struct ElementProps(HashMap<String, String>);

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
struct RawTable(HashMap<String, ElementProps>);

/// Read-only element property table. Values are kept as `Decimal` so lookups
/// feed directly into [`crate::number::SigDigNumber`] arithmetic.
#[derive(Debug, Clone)]
pub struct PeriodicTable {
    table: HashMap<String, HashMap<String, Decimal>>,
}

impl PeriodicTable {
    /// Look up `symbol`'s default location beside the running executable,
    /// falling back to `override_path` (set from `--periodic-table` or
    /// `CHEMLANG_PERIODIC_TABLE`) when given.
    pub fn resolve_path(override_path: Option<&Path>) -> PathBuf {
        if let Some(p) = override_path {
            return p.to_path_buf();
        }
        if let Ok(env_path) = std::env::var("CHEMLANG_PERIODIC_TABLE") {
            return PathBuf::from(env_path);
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("periodic_table.json")))
            .unwrap_or_else(|| PathBuf::from("periodic_table.json"))
    }

    pub fn load(path: &Path, handler: &mut ErrorHandler) -> Result<Self, crate::error::ChemError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| handler.io(format!("Failed to read {}", path.display()), None))?;
        Self::from_json_str(&contents, handler)
    }

    pub fn from_json_str(
        contents: &str,
        handler: &mut ErrorHandler,
    ) -> Result<Self, crate::error::ChemError> {
        let raw: RawTable = serde_json::from_str(contents)
            .map_err(|e| handler.io(format!("Malformed periodic table: {e}"), None))?;
        let mut table = HashMap::new();
        for (symbol, props) in raw.0 {
            let mut parsed = HashMap::new();
            for (key, value) in props.0 {
                if let Ok(decimal) = Decimal::from_str_exact(&value) {
                    parsed.insert(key, decimal);
                } else {
                    parsed.insert(key, Decimal::from_str_exact(value.trim()).unwrap_or_default());
                }
            }
            table.insert(symbol, parsed);
        }
        Ok(PeriodicTable { table })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.table.contains_key(symbol)
    }

    pub fn get(
        &self,
        symbol: &str,
        key: &str,
        handler: &mut ErrorHandler,
    ) -> Result<Decimal, crate::error::ChemError> {
        self.table
            .get(symbol)
            .and_then(|props| props.get(key))
            .copied()
            .ok_or_else(|| handler.name(format!("Element '{symbol}' has no '{key}'"), None))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "H": {"AtomicMass": "1.008", "number": "1"},
        "O": {"AtomicMass": "15.999", "number": "8"}
    }"#;

    #[test]
    fn loads_and_looks_up() {
        let mut h = ErrorHandler::new();
        let pt = PeriodicTable::from_json_str(SAMPLE, &mut h).unwrap();
        assert!(pt.contains("H"));
        assert_eq!(pt.get("O", "AtomicMass", &mut h).unwrap(), Decimal::from_str_exact("15.999").unwrap());
    }

    #[test]
    fn missing_key_reports_name_error() {
        let mut h = ErrorHandler::new();
        let pt = PeriodicTable::from_json_str(SAMPLE, &mut h).unwrap();
        assert!(pt.get("H", "electronegativity", &mut h).is_err());
        assert!(h.had_error());
    }

    #[test]
    fn missing_symbol_reports_name_error() {
        let mut h = ErrorHandler::new();
        let pt = PeriodicTable::from_json_str(SAMPLE, &mut h).unwrap();
        assert!(pt.get("Zz", "AtomicMass", &mut h).is_err());
    }
}
