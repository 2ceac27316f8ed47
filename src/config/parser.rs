//! TOML layer parsing.
//!
//! Every configuration file is a TOML document. Nested tables are flattened into
//! `Section:Key` entries so the rest of the crate only ever deals with a flat key-value
//! view, e.g.
//!
//! ```toml
//! AppName = "billing"
//!
//! [Update]
//! URL = "http://10.1.0.7:8080"
//! AcceptFrom = ["10.0.0.0/8", "::1"]
//! ```
//!
//! yields `AppName`, `Update:URL` and `Update:AcceptFrom = "10.0.0.0/8;::1"`.

use crate::core::HotError;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use toml::{Table, Value};

/// Parse a TOML file into flattened `Section:Key` pairs.
///
/// Returns `Ok(None)` when the file does not exist so optional layers can be skipped
/// without a separate existence check.
pub fn parse_layer(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    if !path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_layer_str(&content)
        .map(Some)
        .map_err(|reason| {
            HotError::ConfigParse {
                file: path.display().to_string(),
                reason,
            }
            .into()
        })
}

/// Parse TOML text into flattened pairs.
pub fn parse_layer_str(content: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let table: Table = toml::from_str(content).map_err(|e| e.to_string())?;
    let mut out = BTreeMap::new();
    flatten_table("", &table, &mut out);
    Ok(out)
}

fn flatten_table(prefix: &str, table: &Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}:{key}")
        };
        flatten_value(&full_key, value, out);
    }
}

fn flatten_value(key: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Table(table) => flatten_table(key, table, out),
        Value::Array(items) if items.iter().all(|v| !v.is_table() && !v.is_array()) => {
            // Lists of scalars become the `;`-separated form the allow-list and
            // listen addresses already accept.
            let joined: Vec<String> = items.iter().map(scalar_to_string).collect();
            out.insert(key.to_string(), joined.join(";"));
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(&format!("{key}:{index}"), item, out);
            }
        }
        scalar => {
            out.insert(key.to_string(), scalar_to_string(scalar));
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
