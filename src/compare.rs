//! Structural equality and display formatting for graded values.
//!
//! `equal` never fails: anything it cannot decompose (functions, circular or
//! absurdly deep structures) is simply "not equal" unless it is the very same
//! value.

use serde_json::Value as Json;

use crate::script::Value;

const MAX_DEPTH: usize = crate::script::MAX_NESTING;

pub fn equal(a: &Value, b: &Value) -> bool {
  if a.same_value(b) {
    return true;
  }
  structural(a, b, 0).unwrap_or(false)
}

/// `None` when the pair cannot be compared structurally.
fn structural(a: &Value, b: &Value, depth: usize) -> Option<bool> {
  if depth > MAX_DEPTH {
    return None;
  }
  match (a, b) {
    (Value::Array(x), Value::Array(y)) => {
      let (x, y) = (x.borrow(), y.borrow());
      if x.len() != y.len() {
        return Some(false);
      }
      for (l, r) in x.iter().zip(y.iter()) {
        if !l.same_value(r) && !structural(l, r, depth + 1)? {
          return Some(false);
        }
      }
      Some(true)
    }
    (Value::Object(x), Value::Object(y)) => {
      let (x, y) = (x.borrow(), y.borrow());
      if x.len() != y.len() || x.keys().any(|k| !y.contains_key(k)) {
        return Some(false);
      }
      for (k, l) in x.iter() {
        let r = &y[k];
        if !l.same_value(r) && !structural(l, r, depth + 1)? {
          return Some(false);
        }
      }
      Some(true)
    }
    (Value::Function(_) | Value::Native(_), _) | (_, Value::Function(_) | Value::Native(_)) => None,
    _ => Some(a.same_value(b)),
  }
}

/// Display form used in test reports: strings quoted, everything else as JSON
/// where possible, falling back to the value's plain text.
pub fn format_value(value: &Value) -> String {
  if let Value::Str(s) = value {
    return format!("\"{}\"", s);
  }
  match value.to_json() {
    Ok(Some(json)) => serde_json::to_string(&json).unwrap_or_else(|_| value.to_display_string()),
    Ok(None) => value.to_display_string(),
    Err(()) => "[Circular]".into(),
  }
}

pub fn format_json(json: &Json) -> String {
  format_value(&Value::from_json(json))
}
