use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{InsightError, Result};
use crate::record::RawRow;

/// Ascending identifier order. Integer ids come first, in numeric order;
/// every other id follows in lexicographic order. Numeric ties (`"01"` vs
/// `"1"`) fall back to text, so the order is total.
#[must_use]
pub fn compare_identifiers(a: &str, b: &str) -> Ordering {
    identifier_key(a).cmp(&identifier_key(b))
}

fn identifier_key(id: &str) -> (bool, i64, &str) {
    match id.parse::<i64>() {
        Ok(number) => (false, number, id),
        Err(_) => (true, 0, id),
    }
}

#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(InsightError::MissingPath {
            path: path.to_path_buf(),
        })
    }
}

pub fn write_string(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    fs::write(path, content)?;
    Ok(())
}

/// Read a JSON array of row objects.
pub fn read_json_rows(path: &Path) -> Result<Vec<RawRow>> {
    ensure_exists(path)?;
    let content = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    let serde_json::Value::Array(items) = value else {
        return Err(InsightError::invalid(format!(
            "{} must contain a JSON array of row objects",
            path.display()
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            serde_json::Value::Object(map) => Ok(map.into_iter().collect::<RawRow>()),
            other => Err(InsightError::invalid(format!(
                "row #{index} is not an object: {other}"
            ))),
        })
        .collect()
}
