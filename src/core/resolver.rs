//! Path resolution, value merging and `{{ path }}` substitution.
//!
//! Templates reference dotted paths into a JSON context such as
//! `{ "state": {...}, "values": {...} }`. A string that is exactly one
//! placeholder resolves to the referenced value with its type preserved;
//! any other string has each placeholder replaced by its text form.

use super::types::Values;
use crate::error::{AutomateError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

// ============================================================================
// Dependency paths
// ============================================================================

/// Resolve a dependency path declared in `config_path`.
///
/// Absolute paths are kept; relative ones are joined to the config's
/// directory. The result is canonical. A missing target is reported with
/// the dependency key and the declaring config.
pub fn resolve_dependency_path(key: &str, declared: &str, config_path: &Path) -> Result<PathBuf> {
    let declared_path = Path::new(declared);
    let candidate = if declared_path.is_absolute() {
        declared_path.to_path_buf()
    } else {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(declared_path)
    };
    candidate
        .canonicalize()
        .map_err(|_| AutomateError::DependencyPathNotFound {
            key: key.to_string(),
            path: candidate,
            config: config_path.to_path_buf(),
        })
}

// ============================================================================
// Values
// ============================================================================

/// Deep-merge value maps left to right; later layers win, nested maps merge.
pub fn merge_values<'a>(layers: impl IntoIterator<Item = &'a Values>) -> Values {
    let mut merged = Values::new();
    for layer in layers {
        merge_into(&mut merged, layer);
    }
    merged
}

fn merge_into(target: &mut Values, layer: &Values) {
    for (key, incoming) in layer {
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge_into(existing, nested),
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

/// JS-like truthiness used by branch conditions.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Look up a dotted path (`state.a.b`, `values.list.0`) in a JSON context.
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn lookup_required<'a>(context: &'a Value, path: &str) -> Result<&'a Value> {
    lookup(context, path)
        .ok_or_else(|| AutomateError::template(format!("unknown template variable: {}", path)))
}

/// Text form used when a value is spliced into a larger string.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The path of a string that is exactly one `{{ path }}` placeholder.
fn sole_placeholder(template: &str) -> Option<&str> {
    let inner = template.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    (!inner.contains("{{") && !inner.contains("}}")).then(|| inner.trim())
}

/// Replace every placeholder in `template` with its text form.
pub fn resolve_template(template: &str, context: &Value) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| AutomateError::template(format!("unclosed template at position {}", open)))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim().to_string();
        let value = value_to_text(lookup_required(context, &key)?);

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Resolve one template to a value, keeping the type of a sole placeholder.
pub fn resolve_value(template: &str, context: &Value) -> Result<Value> {
    match sole_placeholder(template) {
        Some(path) => lookup_required(context, path).cloned(),
        None => resolve_template(template, context).map(Value::String),
    }
}

/// Substitute placeholders in every string leaf of `values`.
pub fn bind_values(values: &Values, context: &Value) -> Result<Values> {
    values
        .iter()
        .map(|(k, v)| Ok((k.clone(), bind_value(v, context)?)))
        .collect()
}

fn bind_value(value: &Value, context: &Value) -> Result<Value> {
    match value {
        Value::String(s) if s.contains("{{") => resolve_value(s, context),
        Value::Array(items) => items
            .iter()
            .map(|v| bind_value(v, context))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => bind_values(map, context).map(Value::Object),
        other => Ok(other.clone()),
    }
}
