//! Runtime values of the solution language and their conversions.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value as Json;

use super::ast::FunctionDef;
use super::interp::Env;

/// Nesting limit for conversions; deeper structures are treated as circular.
pub const MAX_NESTING: usize = 128;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<BTreeMap<String, Value>>>;

#[derive(Clone)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  Str(Rc<str>),
  Array(ArrayRef),
  Object(ObjectRef),
  Function(Rc<Closure>),
  Native(Native),
}

pub struct Closure {
  pub def: Rc<FunctionDef>,
  pub env: Env,
}

/// Built-in callables reachable through globals (`Math.max`, `Object.keys`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Native {
  MathMax, MathMin, MathFloor, MathCeil, MathAbs, MathSqrt, MathRound,
  ObjectKeys, ArrayIsArray, StringCtor, NumberCtor, ErrorCtor,
}

impl fmt::Debug for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Function(c) => write!(f, "[Function {}]", c.def.name.as_deref().unwrap_or("(anonymous)")),
      Value::Native(n) => write!(f, "[Native {:?}]", n),
      other => f.write_str(&other.to_display_string()),
    }
  }
}

impl Value {
  pub fn str(s: impl AsRef<str>) -> Self {
    Value::Str(Rc::from(s.as_ref()))
  }

  pub fn array(items: Vec<Value>) -> Self {
    Value::Array(Rc::new(RefCell::new(items)))
  }

  pub fn object(entries: BTreeMap<String, Value>) -> Self {
    Value::Object(Rc::new(RefCell::new(entries)))
  }

  pub fn is_callable(&self) -> bool {
    matches!(self, Value::Function(_) | Value::Native(_))
  }

  pub fn type_of(&self) -> &'static str {
    match self {
      Value::Undefined => "undefined",
      Value::Null | Value::Array(_) | Value::Object(_) => "object",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::Str(_) => "string",
      Value::Function(_) | Value::Native(_) => "function",
    }
  }

  pub fn truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null => false,
      Value::Bool(b) => *b,
      Value::Number(n) => *n != 0.0 && !n.is_nan(),
      Value::Str(s) => !s.is_empty(),
      _ => true,
    }
  }

  /// Identity: equal primitives (NaN equals NaN) or the very same reference.
  pub fn same_value(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
      (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
      (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
      (Value::Native(a), Value::Native(b)) => a == b,
      _ => false,
    }
  }

  pub fn to_number(&self) -> f64 {
    match self {
      Value::Undefined => f64::NAN,
      Value::Null => 0.0,
      Value::Bool(b) => if *b { 1.0 } else { 0.0 },
      Value::Number(n) => *n,
      Value::Str(s) => {
        let t = s.trim();
        if t.is_empty() { 0.0 } else { t.parse::<f64>().unwrap_or(f64::NAN) }
      }
      Value::Array(items) => {
        let items = items.borrow();
        match items.len() {
          0 => 0.0,
          1 => items[0].to_number(),
          _ => f64::NAN,
        }
      }
      _ => f64::NAN,
    }
  }

  /// `String(value)` semantics.
  pub fn to_display_string(&self) -> String {
    self.display_at(0)
  }

  fn display_at(&self, depth: usize) -> String {
    if depth > MAX_NESTING { return String::new(); }
    match self {
      Value::Undefined => "undefined".into(),
      Value::Null => "null".into(),
      Value::Bool(b) => b.to_string(),
      Value::Number(n) => number_to_string(*n),
      Value::Str(s) => s.to_string(),
      Value::Array(items) => items
        .borrow()
        .iter()
        .map(|v| match v {
          Value::Undefined | Value::Null => String::new(),
          other => other.display_at(depth + 1),
        })
        .collect::<Vec<_>>()
        .join(","),
      Value::Object(_) => "[object Object]".into(),
      Value::Function(c) => format!("function {}() {{ ... }}", c.def.name.as_deref().unwrap_or("")),
      Value::Native(n) => format!("function {:?}() {{ [native code] }}", n),
    }
  }

  pub fn from_json(json: &Json) -> Value {
    match json {
      Json::Null => Value::Null,
      Json::Bool(b) => Value::Bool(*b),
      Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
      Json::String(s) => Value::str(s),
      Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
      Json::Object(map) => Value::object(
        map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
      ),
    }
  }

  /// JSON projection following `JSON.stringify` rules: `undefined` and
  /// functions vanish (or become `null` inside arrays), non-finite numbers
  /// become `null`. Returns `Err(())` for circular (too deep) structures.
  pub fn to_json(&self) -> Result<Option<Json>, ()> {
    self.json_at(0)
  }

  fn json_at(&self, depth: usize) -> Result<Option<Json>, ()> {
    if depth > MAX_NESTING { return Err(()); }
    Ok(match self {
      Value::Undefined | Value::Function(_) | Value::Native(_) => None,
      Value::Null => Some(Json::Null),
      Value::Bool(b) => Some(Json::Bool(*b)),
      Value::Number(n) => Some(number_to_json(*n)),
      Value::Str(s) => Some(Json::String(s.to_string())),
      Value::Array(items) => {
        let mut out = Vec::new();
        for item in items.borrow().iter() {
          out.push(item.json_at(depth + 1)?.unwrap_or(Json::Null));
        }
        Some(Json::Array(out))
      }
      Value::Object(map) => {
        let mut out = serde_json::Map::new();
        for (k, v) in map.borrow().iter() {
          if let Some(j) = v.json_at(depth + 1)? {
            out.insert(k.clone(), j);
          }
        }
        Some(Json::Object(out))
      }
    })
  }
}

fn number_to_json(n: f64) -> Json {
  if !n.is_finite() {
    return Json::Null;
  }
  if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
    return Json::from(n as i64);
  }
  serde_json::Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

pub fn number_to_string(n: f64) -> String {
  if n.is_nan() {
    "NaN".into()
  } else if n.is_infinite() {
    if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
  } else if n == 0.0 {
    // Covers -0 as well.
    "0".into()
  } else if n.abs() >= 1e21 {
    // Exponent form with an explicit sign, as in `1e+21`.
    format!("{:e}", n).replacen('e', "e+", 1)
  } else {
    format!("{}", n)
  }
}
