//! Rendering contract
//!
//! Column layout and detail text belong to adapters. The core only fixes the
//! shape of a renderer and ships [`JsonRenderer`], which reads columns from
//! the JSON payload by dot-notation path.

use crate::resource::{raw_json, unwrap_all_ref, Resource};
use serde::Deserialize;
use serde_json::Value;

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnDef {
    pub header: String,
    pub json_path: String,
    pub width: u16,
}

impl ColumnDef {
    pub fn new(header: &str, json_path: &str, width: u16) -> Self {
        Self {
            header: header.to_string(),
            json_path: json_path.to_string(),
            width,
        }
    }
}

/// Adapter-provided presentation of one resource kind
///
/// Renderers receive the unwrapped adapter value, never a region decorator.
pub trait Renderer: Send + Sync {
    fn columns(&self) -> Vec<ColumnDef>;

    /// Text of column `index` for `resource`, `"-"` when unavailable
    fn cell(&self, resource: &dyn Resource, index: usize) -> String;

    /// Multi-line detail view
    fn detail(&self, resource: &dyn Resource) -> String;

    /// Every cell of a row, unwrapping region layers first
    fn row(&self, resource: &dyn Resource) -> Vec<String> {
        let resource = unwrap_all_ref(resource);
        (0..self.columns().len())
            .map(|index| self.cell(resource, index))
            .collect()
    }
}

/// Renderer driven by JSON column paths
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer {
    columns: Vec<ColumnDef>,
}

impl JsonRenderer {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }
}

impl Renderer for JsonRenderer {
    fn columns(&self) -> Vec<ColumnDef> {
        self.columns.clone()
    }

    fn cell(&self, resource: &dyn Resource, index: usize) -> String {
        let Some(column) = self.columns.get(index) else {
            return "-".to_string();
        };
        match column.json_path.as_str() {
            "$id" => resource.id(),
            "$name" => resource.name().to_string(),
            "$arn" => resource.arn().to_string(),
            path => raw_json(resource)
                .map(|raw| extract_json_value(raw, path))
                .unwrap_or_else(|| "-".to_string()),
        }
    }

    fn detail(&self, resource: &dyn Resource) -> String {
        let resource = unwrap_all_ref(resource);
        match raw_json(resource) {
            Some(raw) => serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string()),
            None => format!("{:#?}", resource),
        }
    }
}

/// Extract a value from JSON using a dot-notation path
pub fn extract_json_value(item: &Value, path: &str) -> String {
    let mut current = item;

    for part in path.split('.') {
        let next = match part.parse::<usize>() {
            Ok(idx) => current.get(idx),
            Err(_) => current.get(part),
        };
        current = match next {
            Some(v) => v,
            None => return "-".to_string(),
        };
    }

    match current {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(_) => "[object]".to_string(),
    }
}
