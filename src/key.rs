//! Cache key normalization and derivation.
//!
//! Every key, explicit or derived, goes through [`KeyNormalizer`] so that
//! keys differing only by case or incidental whitespace collide.

use crate::evaluator::Evaluator;
use crate::expression::Expr;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Write;
use std::sync::Arc;

/// Turns arbitrary key material into a deterministic string.
pub struct KeyNormalizer;

impl KeyNormalizer {
    /// Normalize any serializable key.
    ///
    /// Never fails: a value serde cannot represent is keyed by its type
    /// name and logged.
    pub fn normalize<K: Serialize + ?Sized>(key: &K) -> String {
        match serde_json::to_value(key) {
            Ok(value) => Self::normalize_value(&value),
            Err(e) => {
                warn!(
                    "Key of type {} is not serializable ({}), keying by type name",
                    std::any::type_name::<K>(),
                    e
                );
                Self::fold(&format!("unserializable:{}", std::any::type_name::<K>()))
            }
        }
    }

    /// Normalize an already extracted value.
    pub fn normalize_value(value: &Value) -> String {
        let raw = match value {
            Value::Null => "null".to_string(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            structured => {
                let mut out = String::new();
                write_canonical(structured, &mut out);
                out
            }
        };
        Self::fold(&raw)
    }

    /// Lower-case and collapse whitespace runs into single spaces.
    pub fn fold(raw: &str) -> String {
        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

// JSON with object keys sorted, independent of serde_json's map ordering.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
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
        Value::Object(fields) => {
            let mut entries: Vec<_> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, field)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", Value::String(name.clone()));
                write_canonical(field, out);
            }
            out.push('}');
        }
        scalar => {
            let _ = write!(out, "{}", scalar);
        }
    }
}

/// Derives keys for descriptors (the auto-key path).
#[derive(Clone, Default)]
pub struct KeyDeriver {
    evaluator: Arc<Evaluator>,
}

impl KeyDeriver {
    pub fn new(evaluator: Evaluator) -> Self {
        KeyDeriver {
            evaluator: Arc::new(evaluator),
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Key for `expr`: its rendering paired with its evaluated value.
    ///
    /// The rendering keeps apart descriptors that evaluate to the same
    /// value through different computations.
    pub fn derive(&self, expr: &Expr) -> String {
        let value = self.evaluator.evaluate(expr);
        KeyNormalizer::normalize_value(&json!({
            "expression": expr.to_string(),
            "value": value,
        }))
    }
}
