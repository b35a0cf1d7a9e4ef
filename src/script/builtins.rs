//! Globals (`Math`, `Object`, `Array`, `String`, `Number`, `Error`) and the
//! property/method surface of arrays, strings and objects.

use std::collections::BTreeMap;

use super::interp::{Env, Interpreter};
use super::value::{number_to_string, Native, Value};
use super::ScriptError;

/// Most slots a single index assignment may append to an array.
const MAX_ARRAY_GROWTH: usize = 1_000_000;

pub fn install_globals(globals: &Env) {
  let math = [
    ("max", Native::MathMax),
    ("min", Native::MathMin),
    ("floor", Native::MathFloor),
    ("ceil", Native::MathCeil),
    ("abs", Native::MathAbs),
    ("sqrt", Native::MathSqrt),
    ("round", Native::MathRound),
  ];
  let mut math: BTreeMap<String, Value> = math.iter().map(|(k, n)| (k.to_string(), Value::Native(*n))).collect();
  math.insert("PI".into(), Value::Number(std::f64::consts::PI));

  let object = BTreeMap::from([("keys".to_string(), Value::Native(Native::ObjectKeys))]);
  let array = BTreeMap::from([("isArray".to_string(), Value::Native(Native::ArrayIsArray))]);

  globals.declare("Math", Value::object(math));
  globals.declare("Object", Value::object(object));
  globals.declare("Array", Value::object(array));
  globals.declare("String", Value::Native(Native::StringCtor));
  globals.declare("Number", Value::Native(Native::NumberCtor));
  globals.declare("Error", Value::Native(Native::ErrorCtor));
  globals.declare("Infinity", Value::Number(f64::INFINITY));
  globals.declare("NaN", Value::Number(f64::NAN));
}

fn arg(args: &[Value], i: usize) -> Value {
  args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn math_fold(args: &[Value], start: f64, pick: fn(f64, f64) -> f64) -> Value {
  let mut acc = start;
  for v in args {
    let n = v.to_number();
    if n.is_nan() { return Value::Number(f64::NAN); }
    acc = pick(acc, n);
  }
  Value::Number(acc)
}

pub fn call_native(native: Native, args: Vec<Value>) -> Result<Value, ScriptError> {
  let first = arg(&args, 0);
  Ok(match native {
    Native::MathMax => math_fold(&args, f64::NEG_INFINITY, f64::max),
    Native::MathMin => math_fold(&args, f64::INFINITY, f64::min),
    Native::MathFloor => Value::Number(first.to_number().floor()),
    Native::MathCeil => Value::Number(first.to_number().ceil()),
    Native::MathAbs => Value::Number(first.to_number().abs()),
    Native::MathSqrt => Value::Number(first.to_number().sqrt()),
    Native::MathRound => Value::Number((first.to_number() + 0.5).floor()),
    Native::ObjectKeys => match first {
      Value::Object(map) => Value::array(map.borrow().keys().map(Value::str).collect()),
      Value::Array(items) => Value::array((0..items.borrow().len()).map(|i| Value::str(i.to_string())).collect()),
      Value::Undefined | Value::Null => {
        return Err(ScriptError::Type("Cannot convert undefined or null to object".into()))
      }
      _ => Value::array(Vec::new()),
    },
    Native::ArrayIsArray => Value::Bool(matches!(first, Value::Array(_))),
    Native::StringCtor => Value::str(if args.is_empty() { String::new() } else { first.to_display_string() }),
    Native::NumberCtor => Value::Number(if args.is_empty() { 0.0 } else { first.to_number() }),
    Native::ErrorCtor => {
      let message = match first {
        Value::Undefined => String::new(),
        other => other.to_display_string(),
      };
      Value::object(BTreeMap::from([
        ("name".to_string(), Value::str("Error")),
        ("message".to_string(), Value::str(message)),
      ]))
    }
  })
}

fn index_of(key: &Value) -> Option<usize> {
  let n = match key {
    Value::Number(n) => *n,
    Value::Str(s) => s.parse::<f64>().ok()?,
    _ => return None,
  };
  if n >= 0.0 && n.fract() == 0.0 { Some(n as usize) } else { None }
}

fn key_string(key: &Value) -> String {
  match key {
    Value::Number(n) => number_to_string(*n),
    other => other.to_display_string(),
  }
}

pub fn get_property(base: &Value, key: &Value) -> Result<Value, ScriptError> {
  let name = key_string(key);
  match base {
    Value::Undefined | Value::Null => Err(ScriptError::Type(format!(
      "Cannot read properties of {} (reading '{}')",
      base.to_display_string(),
      name
    ))),
    Value::Array(items) => {
      let items = items.borrow();
      if name == "length" {
        return Ok(Value::Number(items.len() as f64));
      }
      Ok(index_of(key).and_then(|i| items.get(i).cloned()).unwrap_or(Value::Undefined))
    }
    Value::Str(s) => {
      if name == "length" {
        return Ok(Value::Number(s.chars().count() as f64));
      }
      Ok(index_of(key)
        .and_then(|i| s.chars().nth(i))
        .map(|c| Value::str(c.to_string()))
        .unwrap_or(Value::Undefined))
    }
    Value::Object(map) => Ok(map.borrow().get(&name).cloned().unwrap_or(Value::Undefined)),
    _ => Ok(Value::Undefined),
  }
}

pub fn set_property(base: &Value, key: &Value, value: Value) -> Result<(), ScriptError> {
  match base {
    Value::Array(items) => {
      let Some(i) = index_of(key) else {
        return Err(ScriptError::Type(format!("Cannot set property '{}' of array", key_string(key))));
      };
      let mut items = items.borrow_mut();
      if i >= items.len() {
        let new_len = i
          .checked_add(1)
          .filter(|n| n - items.len() <= MAX_ARRAY_GROWTH)
          .ok_or_else(|| ScriptError::Type("Invalid array length".into()))?;
        items.resize(new_len, Value::Undefined);
      }
      items[i] = value;
      Ok(())
    }
    Value::Object(map) => {
      map.borrow_mut().insert(key_string(key), value);
      Ok(())
    }
    other => Err(ScriptError::Type(format!(
      "Cannot set properties of {} (setting '{}')",
      other.to_display_string(),
      key_string(key)
    ))),
  }
}

/// Built-in methods of arrays and strings. `None` when `name` is not one of them.
pub fn call_method(
  it: &mut Interpreter,
  receiver: &Value,
  name: &str,
  args: &[Value],
) -> Option<Result<Value, ScriptError>> {
  match receiver {
    Value::Array(items) => array_method(it, items, name, args),
    Value::Str(s) => string_method(s, name, args).map(Ok),
    _ => None,
  }
}

/// Resolves a possibly negative `slice`/`indexOf` position against `len`.
fn relative(pos: &Value, len: usize, default: usize) -> usize {
  if matches!(pos, Value::Undefined) { return default; }
  let n = pos.to_number();
  if n.is_nan() { return 0; }
  let n = n.trunc();
  if n < 0.0 { (len as f64 + n).max(0.0) as usize } else { (n as usize).min(len) }
}

fn array_method(
  it: &mut Interpreter,
  items: &super::value::ArrayRef,
  name: &str,
  args: &[Value],
) -> Option<Result<Value, ScriptError>> {
  let result = match name {
    "push" => {
      let mut v = items.borrow_mut();
      v.extend(args.iter().cloned());
      Value::Number(v.len() as f64)
    }
    "pop" => items.borrow_mut().pop().unwrap_or(Value::Undefined),
    "slice" => {
      let v = items.borrow();
      let start = relative(&arg(args, 0), v.len(), 0);
      let end = relative(&arg(args, 1), v.len(), v.len());
      Value::array(if start < end { v[start..end].to_vec() } else { Vec::new() })
    }
    "indexOf" => {
      let needle = arg(args, 0);
      let pos = items
        .borrow()
        .iter()
        .position(|v| super::interp::binary(super::ast::BinOp::StrictEq, v, &needle).truthy());
      Value::Number(pos.map(|p| p as f64).unwrap_or(-1.0))
    }
    "includes" => {
      let needle = arg(args, 0);
      Value::Bool(items.borrow().iter().any(|v| v.same_value(&needle)))
    }
    "join" => {
      let sep = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        other => other.to_display_string(),
      };
      let parts: Vec<String> = items
        .borrow()
        .iter()
        .map(|v| match v {
          Value::Undefined | Value::Null => String::new(),
          other => other.to_display_string(),
        })
        .collect();
      Value::str(parts.join(&sep))
    }
    "reverse" => {
      items.borrow_mut().reverse();
      Value::Array(items.clone())
    }
    "map" | "filter" => {
      let callback = arg(args, 0);
      // Snapshot so the callback may mutate the array freely.
      let snapshot = items.borrow().clone();
      let mut out = Vec::with_capacity(snapshot.len());
      for (i, item) in snapshot.into_iter().enumerate() {
        let call_args = vec![item.clone(), Value::Number(i as f64), Value::Array(items.clone())];
        let r = match it.call_value(&callback, call_args, &format!("{} callback", name)) {
          Ok(r) => r,
          Err(e) => return Some(Err(e)),
        };
        if name == "map" {
          out.push(r);
        } else if r.truthy() {
          out.push(item);
        }
      }
      Value::array(out)
    }
    _ => return None,
  };
  Some(Ok(result))
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Option<Value> {
  let chars: Vec<char> = s.chars().collect();
  Some(match name {
    "toUpperCase" => Value::str(s.to_uppercase()),
    "toLowerCase" => Value::str(s.to_lowercase()),
    "trim" => Value::str(s.trim()),
    "charAt" => {
      let i = arg(args, 0).to_number();
      let i = if i.is_nan() { 0.0 } else { i.trunc() };
      if i < 0.0 {
        Value::str("")
      } else {
        Value::str(chars.get(i as usize).map(|c| c.to_string()).unwrap_or_default())
      }
    }
    "slice" => {
      let start = relative(&arg(args, 0), chars.len(), 0);
      let end = relative(&arg(args, 1), chars.len(), chars.len());
      Value::str(if start < end { chars[start..end].iter().collect::<String>() } else { String::new() })
    }
    "indexOf" => {
      let needle = arg(args, 0).to_display_string();
      let pos = s.find(&needle).map(|byte| s[..byte].chars().count() as f64);
      Value::Number(pos.unwrap_or(-1.0))
    }
    "includes" => Value::Bool(s.contains(&arg(args, 0).to_display_string())),
    "split" => match arg(args, 0) {
      Value::Undefined => Value::array(vec![Value::str(s)]),
      sep => {
        let sep = sep.to_display_string();
        if sep.is_empty() {
          Value::array(chars.iter().map(|c| Value::str(c.to_string())).collect())
        } else {
          Value::array(s.split(sep.as_str()).map(Value::str).collect())
        }
      }
    },
    _ => return None,
  })
}
