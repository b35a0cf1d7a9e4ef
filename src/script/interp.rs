//! Tree-walking evaluator.
//!
//! Every statement, expression and call charges one step against the budget in
//! `Limits`; call nesting is capped separately. Both budgets reset for each
//! top-level entry (`load` / `call`).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use super::ast::*;
use super::builtins;
use super::parser::parse_program;
use super::value::{Closure, Value};
use super::{Limits, ScriptError};

pub type Env = Rc<Scope>;

pub struct Scope {
  vars: RefCell<HashMap<String, Value>>,
  parent: Option<Env>,
}

impl Scope {
  fn lookup(&self, name: &str) -> Option<Value> {
    if let Some(v) = self.vars.borrow().get(name) {
      return Some(v.clone());
    }
    self.parent.as_ref().and_then(|p| p.lookup(name))
  }

  fn assign(&self, name: &str, value: Value) -> bool {
    if let Some(slot) = self.vars.borrow_mut().get_mut(name) {
      *slot = value;
      return true;
    }
    match &self.parent {
      Some(p) => p.assign(name, value),
      None => false,
    }
  }

  pub(super) fn declare(&self, name: &str, value: Value) {
    self.vars.borrow_mut().insert(name.to_string(), value);
  }
}

enum Flow {
  Normal,
  Return(Value),
  Break,
  Continue,
}

pub struct Interpreter {
  globals: Env,
  limits: Limits,
  steps: u64,
  depth: usize,
  // Closures capture their scope chain and scopes hold closures. Every chain a
  // closure captured is emptied on drop so those cycles do not outlive the run.
  captured: Vec<Env>,
  captured_ptrs: HashSet<usize>,
}

impl Drop for Interpreter {
  fn drop(&mut self) {
    for scope in &self.captured {
      scope.vars.borrow_mut().clear();
    }
  }
}

impl Interpreter {
  pub fn new(limits: Limits) -> Self {
    let globals = Rc::new(Scope { vars: RefCell::default(), parent: None });
    builtins::install_globals(&globals);
    Self { globals, limits, steps: 0, depth: 0, captured: Vec::new(), captured_ptrs: HashSet::new() }
  }

  /// Parse `source` and execute its top level in the global scope.
  pub fn load(&mut self, source: &str) -> Result<(), ScriptError> {
    let program = parse_program(source)?;
    self.steps = 0;
    let globals = self.globals.clone();
    match self.exec_block(&program, &globals)? {
      Flow::Normal => Ok(()),
      Flow::Return(_) => Err(ScriptError::Misplaced("'return' outside of function".into())),
      Flow::Break | Flow::Continue => Err(ScriptError::Misplaced("'break' or 'continue' outside of loop".into())),
    }
  }

  pub fn global(&self, name: &str) -> Option<Value> {
    self.globals.lookup(name)
  }

  /// Invoke a callable with a fresh step budget.
  pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    self.steps = 0;
    self.depth = 0;
    self.call_value(callee, args, "function")
  }

  fn tick(&mut self) -> Result<(), ScriptError> {
    self.steps += 1;
    if self.steps > self.limits.max_steps {
      return Err(ScriptError::StepLimit(self.limits.max_steps));
    }
    Ok(())
  }

  fn child_scope(&self, parent: &Env) -> Env {
    Rc::new(Scope { vars: RefCell::default(), parent: Some(parent.clone()) })
  }

  pub(super) fn call_value(&mut self, callee: &Value, args: Vec<Value>, label: &str) -> Result<Value, ScriptError> {
    self.tick()?;
    match callee {
      Value::Native(native) => builtins::call_native(*native, args),
      Value::Function(closure) => {
        if self.depth >= self.limits.max_call_depth {
          return Err(ScriptError::CallDepth);
        }
        self.depth += 1;
        let result = self.invoke(closure, args);
        self.depth -= 1;
        result
      }
      _ => Err(ScriptError::Type(format!("{} is not a function", label))),
    }
  }

  fn invoke(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> Result<Value, ScriptError> {
    let scope = self.child_scope(&closure.env);
    let mut args = args.into_iter();
    for param in &closure.def.params {
      scope.declare(param, args.next().unwrap_or(Value::Undefined));
    }
    match &closure.def.body {
      FunctionBody::Expr(expr) => self.eval(expr, &scope),
      FunctionBody::Block(body) => match self.exec_block(body, &scope)? {
        Flow::Return(v) => Ok(v),
        _ => Ok(Value::Undefined),
      },
    }
  }

  fn make_closure(&mut self, def: &Rc<FunctionDef>, env: &Env) -> Value {
    let mut cursor = Some(env.clone());
    while let Some(scope) = cursor {
      // Chains are registered whole, so a known scope means its ancestors are known too.
      if !self.captured_ptrs.insert(Rc::as_ptr(&scope) as usize) { break; }
      cursor = scope.parent.clone();
      self.captured.push(scope);
    }
    Value::Function(Rc::new(Closure { def: def.clone(), env: env.clone() }))
  }

  // --- statements ---

  fn exec_block(&mut self, body: &[Stmt], env: &Env) -> Result<Flow, ScriptError> {
    // Function declarations are visible throughout their block.
    for stmt in body {
      if let Stmt::Function(def) = stmt {
        if let Some(name) = &def.name {
          env.declare(name, self.make_closure(def, env));
        }
      }
    }
    for stmt in body {
      match self.exec(stmt, env)? {
        Flow::Normal => {}
        other => return Ok(other),
      }
    }
    Ok(Flow::Normal)
  }

  fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, ScriptError> {
    self.tick()?;
    match stmt {
      Stmt::Empty | Stmt::Function(_) => Ok(Flow::Normal),
      Stmt::Let(decls) => {
        for (name, init) in decls {
          let value = match init {
            Some(expr) => self.eval(expr, env)?,
            None => Value::Undefined,
          };
          env.declare(name, value);
        }
        Ok(Flow::Normal)
      }
      Stmt::Expr(expr) => {
        self.eval(expr, env)?;
        Ok(Flow::Normal)
      }
      Stmt::If(test, then, other) => {
        if self.eval(test, env)?.truthy() {
          self.exec(then, env)
        } else if let Some(other) = other {
          self.exec(other, env)
        } else {
          Ok(Flow::Normal)
        }
      }
      Stmt::While(test, body) => {
        while self.eval(test, env)?.truthy() {
          match self.exec(body, env)? {
            Flow::Break => break,
            Flow::Return(v) => return Ok(Flow::Return(v)),
            Flow::Normal | Flow::Continue => {}
          }
        }
        Ok(Flow::Normal)
      }
      Stmt::For { init, test, update, body } => {
        let scope = self.child_scope(env);
        if let Some(init) = init {
          self.exec(init, &scope)?;
        }
        loop {
          if let Some(test) = test {
            if !self.eval(test, &scope)?.truthy() { break; }
          }
          match self.exec(body, &scope)? {
            Flow::Break => break,
            Flow::Return(v) => return Ok(Flow::Return(v)),
            Flow::Normal | Flow::Continue => {}
          }
          if let Some(update) = update {
            self.eval(update, &scope)?;
          }
        }
        Ok(Flow::Normal)
      }
      Stmt::ForOf { name, iterable, body } => {
        let items: Vec<Value> = match self.eval(iterable, env)? {
          Value::Array(items) => items.borrow().clone(),
          Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
          other => return Err(ScriptError::Type(format!("{} is not iterable", other.to_display_string()))),
        };
        for item in items {
          let scope = self.child_scope(env);
          scope.declare(name, item);
          match self.exec(body, &scope)? {
            Flow::Break => break,
            Flow::Return(v) => return Ok(Flow::Return(v)),
            Flow::Normal | Flow::Continue => {}
          }
        }
        Ok(Flow::Normal)
      }
      Stmt::Return(expr) => {
        let value = match expr {
          Some(e) => self.eval(e, env)?,
          None => Value::Undefined,
        };
        Ok(Flow::Return(value))
      }
      Stmt::Break => Ok(Flow::Break),
      Stmt::Continue => Ok(Flow::Continue),
      Stmt::Throw(expr) => {
        let value = self.eval(expr, env)?;
        Err(ScriptError::Thrown(thrown_message(&value)))
      }
      Stmt::Block(body) => {
        let scope = self.child_scope(env);
        self.exec_block(body, &scope)
      }
    }
  }

  // --- expressions ---

  fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, ScriptError> {
    self.tick()?;
    match expr {
      Expr::Num(n) => Ok(Value::Number(*n)),
      Expr::Str(s) => Ok(Value::str(s)),
      Expr::Bool(b) => Ok(Value::Bool(*b)),
      Expr::Null => Ok(Value::Null),
      Expr::Undefined => Ok(Value::Undefined),
      Expr::Ident(name) => env
        .lookup(name)
        .ok_or_else(|| ScriptError::Reference(name.clone())),
      Expr::Array(items) => {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
          out.push(self.eval(item, env)?);
        }
        Ok(Value::array(out))
      }
      Expr::Object(props) => {
        let mut out = BTreeMap::new();
        for (key, value) in props {
          let v = self.eval(value, env)?;
          out.insert(key.clone(), v);
        }
        Ok(Value::object(out))
      }
      Expr::Unary(op, operand) => {
        if *op == UnaryOp::TypeOf {
          // `typeof undeclared` is "undefined", not a ReferenceError.
          if let Expr::Ident(name) = operand.as_ref() {
            return Ok(Value::str(env.lookup(name).map(|v| v.type_of()).unwrap_or("undefined")));
          }
        }
        let v = self.eval(operand, env)?;
        Ok(match op {
          UnaryOp::Not => Value::Bool(!v.truthy()),
          UnaryOp::Neg => Value::Number(-v.to_number()),
          UnaryOp::Plus => Value::Number(v.to_number()),
          UnaryOp::TypeOf => Value::str(v.type_of()),
        })
      }
      Expr::Binary(op, left, right) => {
        let l = self.eval(left, env)?;
        let r = self.eval(right, env)?;
        Ok(binary(*op, &l, &r))
      }
      Expr::Logical(op, left, right) => {
        let l = self.eval(left, env)?;
        match (op, l.truthy()) {
          (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(l),
          _ => self.eval(right, env),
        }
      }
      Expr::Conditional(test, then, other) => {
        if self.eval(test, env)?.truthy() { self.eval(then, env) } else { self.eval(other, env) }
      }
      Expr::Assign(op, target, value) => {
        let new_value = match op {
          None => self.eval(value, env)?,
          Some(op) => {
            let current = self.eval(target, env)?;
            let rhs = self.eval(value, env)?;
            binary(*op, &current, &rhs)
          }
        };
        self.store(target, new_value.clone(), env)?;
        Ok(new_value)
      }
      Expr::Update { delta, prefix, target } => {
        let old = self.eval(target, env)?.to_number();
        let new = old + delta;
        self.store(target, Value::Number(new), env)?;
        Ok(Value::Number(if *prefix { new } else { old }))
      }
      Expr::Member(object, name) => {
        let base = self.eval(object, env)?;
        builtins::get_property(&base, &Value::str(name))
      }
      Expr::Index(object, index) => {
        let base = self.eval(object, env)?;
        let key = self.eval(index, env)?;
        builtins::get_property(&base, &key)
      }
      Expr::Call(callee, args) => self.eval_call(callee, args, env),
      Expr::Function(def) => Ok(self.make_closure(def, env)),
    }
  }

  fn eval_call(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> Result<Value, ScriptError> {
    // Method calls on arrays and strings dispatch to built-in methods.
    if let Expr::Member(object, name) = callee {
      let receiver = self.eval(object, env)?;
      let argv = self.eval_args(args, env)?;
      if let Some(result) = builtins::call_method(self, &receiver, name, &argv) {
        return result;
      }
      let method = builtins::get_property(&receiver, &Value::str(name))?;
      return self.call_value(&method, argv, &describe(callee));
    }

    let function = self.eval(callee, env)?;
    let argv = self.eval_args(args, env)?;
    self.call_value(&function, argv, &describe(callee))
  }

  fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>, ScriptError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
      out.push(self.eval(arg, env)?);
    }
    Ok(out)
  }

  fn store(&mut self, target: &Expr, value: Value, env: &Env) -> Result<(), ScriptError> {
    match target {
      Expr::Ident(name) => {
        if !env.assign(name, value.clone()) {
          // Sloppy-mode assignment to an undeclared name creates a global.
          self.globals.declare(name, value);
        }
        Ok(())
      }
      Expr::Member(object, name) => {
        let base = self.eval(object, env)?;
        builtins::set_property(&base, &Value::str(name), value)
      }
      Expr::Index(object, index) => {
        let base = self.eval(object, env)?;
        let key = self.eval(index, env)?;
        builtins::set_property(&base, &key, value)
      }
      _ => Err(ScriptError::Type("Invalid assignment target".into())),
    }
  }
}

fn describe(expr: &Expr) -> String {
  match expr {
    Expr::Ident(name) => name.clone(),
    Expr::Member(object, name) => format!("{}.{}", describe(object), name),
    _ => "expression".into(),
  }
}

/// Message carried by a `throw`: an Error's `message`, otherwise the value's text.
fn thrown_message(value: &Value) -> String {
  if let Value::Object(map) = value {
    if let Some(msg) = map.borrow().get("message") {
      return msg.to_display_string();
    }
  }
  value.to_display_string()
}

pub(super) fn binary(op: BinOp, l: &Value, r: &Value) -> Value {
  match op {
    BinOp::Add => match (l, r) {
      (Value::Str(_), _) | (_, Value::Str(_)) | (Value::Array(_), _) | (_, Value::Array(_))
      | (Value::Object(_), _) | (_, Value::Object(_)) => {
        Value::str(format!("{}{}", l.to_display_string(), r.to_display_string()))
      }
      _ => Value::Number(l.to_number() + r.to_number()),
    },
    BinOp::Sub => Value::Number(l.to_number() - r.to_number()),
    BinOp::Mul => Value::Number(l.to_number() * r.to_number()),
    BinOp::Div => Value::Number(l.to_number() / r.to_number()),
    BinOp::Rem => Value::Number(l.to_number() % r.to_number()),
    BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
      let ord = match (l, r) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
      };
      let Some(ord) = ord else { return Value::Bool(false) };
      Value::Bool(match op {
        BinOp::Lt => ord.is_lt(),
        BinOp::Le => ord.is_le(),
        BinOp::Gt => ord.is_gt(),
        _ => ord.is_ge(),
      })
    }
    BinOp::StrictEq => Value::Bool(strict_equals(l, r)),
    BinOp::StrictNe => Value::Bool(!strict_equals(l, r)),
    BinOp::LooseEq => Value::Bool(loose_equals(l, r)),
    BinOp::LooseNe => Value::Bool(!loose_equals(l, r)),
  }
}

fn strict_equals(l: &Value, r: &Value) -> bool {
  match (l, r) {
    (Value::Number(a), Value::Number(b)) => a == b,
    _ => l.same_value(r),
  }
}

fn loose_equals(l: &Value, r: &Value) -> bool {
  match (l, r) {
    (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
    (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
    (Value::Number(_), Value::Str(_)) | (Value::Str(_), Value::Number(_))
    | (Value::Bool(_), _) | (_, Value::Bool(_)) => l.to_number() == r.to_number(),
    _ => strict_equals(l, r),
  }
}
