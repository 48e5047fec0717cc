//! Flat-table utilities — nested data ↔ dotted columns
//!
//! Extraction and reduction `data` payloads are nested maps; the on-disk
//! tables are flat. `flatten_data` turns a nested object into dotted
//! columns (`data.frame0.points.x`), with every leaf encoded as JSON text
//! so the round trip through a delimited file is lossless and parsed back
//! by a strict decoder, never evaluated. `unflatten_data` is the inverse
//! over a row's `data.*` cells.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors rebuilding nested data from a row's flat cells.
#[derive(Debug, Error)]
pub enum UnflattenError {
    #[error("column '{column}' does not hold valid JSON: {source}")]
    BadCell {
        column: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("column '{column}' conflicts with a sibling column")]
    PathConflict { column: String },
}

/// Flatten a nested object into dotted columns under `prefix`.
///
/// Nested objects recurse into deeper column names; any other value
/// (scalars and arrays alike) becomes a JSON-encoded leaf cell.
pub fn flatten_data(prefix: &str, data: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut columns = BTreeMap::new();
    flatten_into(prefix, data, &mut columns);
    columns
}

fn flatten_into(prefix: &str, data: &Map<String, Value>, columns: &mut BTreeMap<String, String>) {
    for (key, value) in data {
        let column = format!("{}.{}", prefix, key);
        match value {
            Value::Object(nested) => flatten_into(&column, nested, columns),
            leaf => {
                // Serializing a Value cannot fail.
                columns.insert(column, serde_json::to_string(leaf).unwrap());
            }
        }
    }
}

/// Rebuild the nested object from a row's `data.*` cells.
///
/// Cells outside the `data.` namespace and empty cells (columns another
/// row contributed to the table) are ignored.
pub fn unflatten_data(cells: &BTreeMap<String, String>) -> Result<Map<String, Value>, UnflattenError> {
    let mut data = Map::new();
    for (column, cell) in cells {
        let path = match column.strip_prefix("data.") {
            Some(path) => path,
            None => continue,
        };
        if cell.is_empty() {
            continue;
        }
        let leaf: Value = serde_json::from_str(cell).map_err(|source| UnflattenError::BadCell {
            column: column.clone(),
            source,
        })?;
        insert_path(&mut data, path, leaf)
            .map_err(|_| UnflattenError::PathConflict { column: column.clone() })?;
    }
    Ok(data)
}

fn insert_path(data: &mut Map<String, Value>, path: &str, leaf: Value) -> Result<(), ()> {
    let mut current = data;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            if current.contains_key(segment) {
                return Err(());
            }
            current.insert(segment.to_string(), leaf);
            return Ok(());
        }
        let next = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = next.as_object_mut().ok_or(())?;
    }
    Ok(())
}

/// Derive a stage's output path from the caller's base name:
/// `{prefix}_{base_stem}.csv`, alongside the base path.
pub fn prefixed_output(base: &std::path::Path, prefix: &str) -> std::path::PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let name = format!("{}_{}.csv", prefix, stem);
    match base.parent() {
        Some(parent) if parent.as_os_str().is_empty() => std::path::PathBuf::from(name),
        Some(parent) => parent.join(name),
        None => std::path::PathBuf::from(name),
    }
}

/// Order data columns alphabetically, pinning columns whose last path
/// segment matches a `front` name (in `front` order) to the head.
pub fn order_columns(columns: &[String], front: &[&str]) -> Vec<String> {
    let mut pinned: Vec<String> = Vec::new();
    for name in front {
        for column in columns {
            if column.rsplit('.').next() == Some(*name) && !pinned.contains(column) {
                pinned.push(column.clone());
            }
        }
    }
    let mut rest: Vec<String> = columns
        .iter()
        .filter(|column| !pinned.contains(column))
        .cloned()
        .collect();
    rest.sort();
    pinned.extend(rest);
    pinned
}
