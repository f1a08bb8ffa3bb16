use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Deduplication identity of a long-running operation.
///
/// Two keys with the same digest describe the same logical work.
#[derive(Debug, Clone)]
pub struct OperationKey {
    file_path: String,
    operation_type: String,
    options: Value,
}

impl OperationKey {
    pub fn new<P: AsRef<Path>, S: Into<String>>(file_path: P, operation_type: S, options: Value) -> Self {
        Self {
            file_path: normalize_path(file_path.as_ref()),
            operation_type: operation_type.into(),
            options,
        }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    /// Lowercase hex SHA-256 over `[path, type, options]` in canonical form
    pub fn digest(&self) -> String {
        let payload = Value::Array(vec![
            Value::String(self.file_path.clone()),
            Value::String(self.operation_type.clone()),
            self.options.clone(),
        ]);

        let mut canonical = String::new();
        write_canonical(&payload, &mut canonical);

        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

/// Lexically normalized, lower-cased path text.
///
/// Callers resolve the path against the filesystem first; nothing here
/// touches the filesystem or the working directory.
fn normalize_path(path: &Path) -> String {
    lexical_normalize(path).to_string_lossy().to_lowercase()
}

/// Resolve `.` and `..` components without consulting the filesystem
pub(crate) fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Sorted object keys, one numeric form per value, no whitespace
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }

    match n.as_f64() {
        Some(f) if f == 0.0 => "0".to_string(),
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("{}", f as i64),
        Some(f) => format!("{}", f),
        None => n.to_string(),
    }
}
