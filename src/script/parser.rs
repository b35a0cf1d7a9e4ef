//! Recursive-descent parser producing the statement/expression tree in `ast`.
//!
//! Semicolons are optional: a statement ends where the next token can no longer
//! continue it.

use std::rc::Rc;

use super::ast::*;
use super::lexer::{tokenize, Tok, Token};
use super::value::MAX_NESTING;
use super::ScriptError;

pub fn parse_program(src: &str) -> Result<Vec<Stmt>, ScriptError> {
  let mut p = Parser { toks: tokenize(src)?, pos: 0, depth: 0 };
  let mut body = Vec::new();
  while !p.at_eof() {
    body.push(p.statement()?);
  }
  Ok(body)
}

struct Parser {
  toks: Vec<Token>,
  pos: usize,
  /// Open statement/expression levels; bounded so deep input cannot exhaust the stack.
  depth: usize,
}

impl Parser {
  fn peek(&self) -> &Tok { &self.toks[self.pos].tok }
  fn peek_at(&self, offset: usize) -> &Tok {
    let idx = (self.pos + offset).min(self.toks.len() - 1);
    &self.toks[idx].tok
  }
  fn line(&self) -> usize { self.toks[self.pos].line }
  fn at_eof(&self) -> bool { matches!(self.peek(), Tok::Eof) }

  fn advance(&mut self) -> Tok {
    let t = self.toks[self.pos].tok.clone();
    if self.pos < self.toks.len() - 1 { self.pos += 1; }
    t
  }

  fn is_punct(&self, p: &str) -> bool { matches!(self.peek(), Tok::Punct(q) if *q == p) }
  fn is_word(&self, w: &str) -> bool { matches!(self.peek(), Tok::Ident(s) if s == w) }

  fn eat_punct(&mut self, p: &str) -> bool {
    if self.is_punct(p) { self.advance(); true } else { false }
  }
  fn eat_word(&mut self, w: &str) -> bool {
    if self.is_word(w) { self.advance(); true } else { false }
  }

  fn expect_punct(&mut self, p: &str) -> Result<(), ScriptError> {
    if self.eat_punct(p) { Ok(()) } else { Err(self.unexpected(&format!("'{}'", p))) }
  }

  fn ident(&mut self) -> Result<String, ScriptError> {
    match self.peek().clone() {
      Tok::Ident(name) if !is_reserved(&name) => { self.advance(); Ok(name) }
      _ => Err(self.unexpected("identifier")),
    }
  }

  fn unexpected(&self, wanted: &str) -> ScriptError {
    let found = match self.peek() {
      Tok::Num(n) => format!("number {}", n),
      Tok::Str(s) => format!("string \"{}\"", s),
      Tok::Ident(s) => format!("'{}'", s),
      Tok::Punct(p) => format!("'{}'", p),
      Tok::Eof => "end of input".to_string(),
    };
    ScriptError::syntax(format!("expected {}, found {}", wanted, found), self.line())
  }

  fn nested<T>(&mut self, f: fn(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
    if self.depth >= MAX_NESTING {
      return Err(ScriptError::syntax("nesting too deep", self.line()));
    }
    self.depth += 1;
    let out = f(self);
    self.depth -= 1;
    out
  }

  // --- statements ---

  fn statement(&mut self) -> Result<Stmt, ScriptError> {
    self.nested(Self::statement_level)
  }

  fn statement_level(&mut self) -> Result<Stmt, ScriptError> {
    if self.eat_punct(";") { return Ok(Stmt::Empty); }
    if self.is_punct("{") { return Ok(Stmt::Block(self.block()?)); }

    if self.is_word("let") || self.is_word("const") || self.is_word("var") {
      let decl = self.declaration()?;
      self.eat_punct(";");
      return Ok(decl);
    }
    if self.is_word("function") && matches!(self.peek_at(1), Tok::Ident(_)) {
      self.advance();
      let def = self.function_rest(true)?;
      return Ok(Stmt::Function(def));
    }
    if self.eat_word("if") {
      self.expect_punct("(")?;
      let test = self.expression()?;
      self.expect_punct(")")?;
      let then = Box::new(self.statement()?);
      let other = if self.eat_word("else") { Some(Box::new(self.statement()?)) } else { None };
      return Ok(Stmt::If(test, then, other));
    }
    if self.eat_word("while") {
      self.expect_punct("(")?;
      let test = self.expression()?;
      self.expect_punct(")")?;
      return Ok(Stmt::While(test, Box::new(self.statement()?)));
    }
    if self.eat_word("for") {
      return self.for_statement();
    }
    if self.eat_word("return") {
      let value = if self.is_punct(";") || self.is_punct("}") || self.at_eof() {
        None
      } else {
        Some(self.expression()?)
      };
      self.eat_punct(";");
      return Ok(Stmt::Return(value));
    }
    if self.eat_word("break") { self.eat_punct(";"); return Ok(Stmt::Break); }
    if self.eat_word("continue") { self.eat_punct(";"); return Ok(Stmt::Continue); }
    if self.eat_word("throw") {
      let value = self.expression()?;
      self.eat_punct(";");
      return Ok(Stmt::Throw(value));
    }

    let expr = self.expression()?;
    self.eat_punct(";");
    Ok(Stmt::Expr(expr))
  }

  fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
    self.expect_punct("{")?;
    let mut body = Vec::new();
    while !self.is_punct("}") {
      if self.at_eof() { return Err(self.unexpected("'}'")); }
      body.push(self.statement()?);
    }
    self.advance();
    Ok(body)
  }

  fn declaration(&mut self) -> Result<Stmt, ScriptError> {
    self.advance(); // let / const / var
    let mut names = Vec::new();
    loop {
      let name = self.ident()?;
      let init = if self.eat_punct("=") { Some(self.assignment()?) } else { None };
      names.push((name, init));
      if !self.eat_punct(",") { break; }
    }
    Ok(Stmt::Let(names))
  }

  fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
    self.expect_punct("(")?;

    // for (const x of xs)
    let declares = self.is_word("let") || self.is_word("const") || self.is_word("var");
    if declares && matches!(self.peek_at(2), Tok::Ident(w) if w == "of") {
      self.advance();
      let name = self.ident()?;
      self.advance(); // of
      let iterable = self.expression()?;
      self.expect_punct(")")?;
      let body = Box::new(self.statement()?);
      return Ok(Stmt::ForOf { name, iterable, body });
    }

    let init = if self.is_punct(";") {
      None
    } else if declares {
      Some(Box::new(self.declaration()?))
    } else {
      Some(Box::new(Stmt::Expr(self.expression()?)))
    };
    self.expect_punct(";")?;
    let test = if self.is_punct(";") { None } else { Some(self.expression()?) };
    self.expect_punct(";")?;
    let update = if self.is_punct(")") { None } else { Some(self.expression()?) };
    self.expect_punct(")")?;
    let body = Box::new(self.statement()?);
    Ok(Stmt::For { init, test, update, body })
  }

  /// Parses `name? (params) { body }` after the `function` keyword.
  fn function_rest(&mut self, named: bool) -> Result<Rc<FunctionDef>, ScriptError> {
    let name = if named || matches!(self.peek(), Tok::Ident(_)) { Some(self.ident()?) } else { None };
    let params = self.params()?;
    let body = FunctionBody::Block(self.block()?);
    Ok(Rc::new(FunctionDef { name, params, body }))
  }

  fn params(&mut self) -> Result<Vec<String>, ScriptError> {
    self.expect_punct("(")?;
    let mut params = Vec::new();
    while !self.is_punct(")") {
      params.push(self.ident()?);
      if !self.eat_punct(",") { break; }
    }
    self.expect_punct(")")?;
    Ok(params)
  }

  // --- expressions ---

  fn expression(&mut self) -> Result<Expr, ScriptError> {
    self.assignment()
  }

  fn assignment(&mut self) -> Result<Expr, ScriptError> {
    self.nested(Self::assignment_level)
  }

  fn assignment_level(&mut self) -> Result<Expr, ScriptError> {
    if let Some(arrow) = self.try_arrow()? {
      return Ok(arrow);
    }

    let target = self.conditional()?;
    let op = match self.peek() {
      Tok::Punct("=") => None,
      Tok::Punct("+=") => Some(BinOp::Add),
      Tok::Punct("-=") => Some(BinOp::Sub),
      Tok::Punct("*=") => Some(BinOp::Mul),
      Tok::Punct("/=") => Some(BinOp::Div),
      Tok::Punct("%=") => Some(BinOp::Rem),
      _ => return Ok(target),
    };
    if !matches!(target, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
      return Err(ScriptError::syntax("invalid assignment target", self.line()));
    }
    self.advance();
    let value = self.assignment()?;
    Ok(Expr::Assign(op, Box::new(target), Box::new(value)))
  }

  /// `x => ...` or `(a, b) => ...`; leaves the position untouched otherwise.
  fn try_arrow(&mut self) -> Result<Option<Expr>, ScriptError> {
    let params = match self.peek().clone() {
      Tok::Ident(name) if !is_reserved(&name) && matches!(self.peek_at(1), Tok::Punct("=>")) => {
        self.advance();
        vec![name]
      }
      Tok::Punct("(") => {
        // Scan to the matching ')' and check for '=>' right after it.
        let mut depth = 0usize;
        let mut offset = 0usize;
        loop {
          match self.peek_at(offset) {
            Tok::Punct("(") => depth += 1,
            Tok::Punct(")") => {
              depth -= 1;
              if depth == 0 { break; }
            }
            Tok::Eof => return Ok(None),
            _ => {}
          }
          offset += 1;
        }
        if !matches!(self.peek_at(offset + 1), Tok::Punct("=>")) {
          return Ok(None);
        }
        self.params()?
      }
      _ => return Ok(None),
    };
    self.expect_punct("=>")?;
    let body = if self.is_punct("{") {
      FunctionBody::Block(self.block()?)
    } else {
      FunctionBody::Expr(Box::new(self.assignment()?))
    };
    Ok(Some(Expr::Function(Rc::new(FunctionDef { name: None, params, body }))))
  }

  fn conditional(&mut self) -> Result<Expr, ScriptError> {
    let test = self.logical_or()?;
    if !self.eat_punct("?") { return Ok(test); }
    let then = self.assignment()?;
    self.expect_punct(":")?;
    let other = self.assignment()?;
    Ok(Expr::Conditional(Box::new(test), Box::new(then), Box::new(other)))
  }

  fn logical_or(&mut self) -> Result<Expr, ScriptError> {
    let mut left = self.logical_and()?;
    while self.eat_punct("||") {
      let right = self.logical_and()?;
      left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn logical_and(&mut self) -> Result<Expr, ScriptError> {
    let mut left = self.equality()?;
    while self.eat_punct("&&") {
      let right = self.equality()?;
      left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn equality(&mut self) -> Result<Expr, ScriptError> {
    let mut left = self.relational()?;
    loop {
      let op = match self.peek() {
        Tok::Punct("==") => BinOp::LooseEq,
        Tok::Punct("!=") => BinOp::LooseNe,
        Tok::Punct("===") => BinOp::StrictEq,
        Tok::Punct("!==") => BinOp::StrictNe,
        _ => return Ok(left),
      };
      self.advance();
      let right = self.relational()?;
      left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
  }

  fn relational(&mut self) -> Result<Expr, ScriptError> {
    let mut left = self.additive()?;
    loop {
      let op = match self.peek() {
        Tok::Punct("<") => BinOp::Lt,
        Tok::Punct("<=") => BinOp::Le,
        Tok::Punct(">") => BinOp::Gt,
        Tok::Punct(">=") => BinOp::Ge,
        _ => return Ok(left),
      };
      self.advance();
      let right = self.additive()?;
      left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
  }

  fn additive(&mut self) -> Result<Expr, ScriptError> {
    let mut left = self.multiplicative()?;
    loop {
      let op = match self.peek() {
        Tok::Punct("+") => BinOp::Add,
        Tok::Punct("-") => BinOp::Sub,
        _ => return Ok(left),
      };
      self.advance();
      let right = self.multiplicative()?;
      left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
  }

  fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
    let mut left = self.unary()?;
    loop {
      let op = match self.peek() {
        Tok::Punct("*") => BinOp::Mul,
        Tok::Punct("/") => BinOp::Div,
        Tok::Punct("%") => BinOp::Rem,
        _ => return Ok(left),
      };
      self.advance();
      let right = self.unary()?;
      left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
  }

  fn unary(&mut self) -> Result<Expr, ScriptError> {
    self.nested(Self::unary_level)
  }

  fn unary_level(&mut self) -> Result<Expr, ScriptError> {
    let op = match self.peek() {
      Tok::Punct("!") => Some(UnaryOp::Not),
      Tok::Punct("-") => Some(UnaryOp::Neg),
      Tok::Punct("+") => Some(UnaryOp::Plus),
      Tok::Ident(w) if w == "typeof" => Some(UnaryOp::TypeOf),
      _ => None,
    };
    if let Some(op) = op {
      self.advance();
      return Ok(Expr::Unary(op, Box::new(self.unary()?)));
    }

    let delta = match self.peek() {
      Tok::Punct("++") => Some(1.0),
      Tok::Punct("--") => Some(-1.0),
      _ => None,
    };
    if let Some(delta) = delta {
      self.advance();
      let target = self.unary()?;
      return Ok(Expr::Update { delta, prefix: true, target: Box::new(target) });
    }

    let expr = self.call_member()?;
    let delta = match self.peek() {
      Tok::Punct("++") => 1.0,
      Tok::Punct("--") => -1.0,
      _ => return Ok(expr),
    };
    self.advance();
    Ok(Expr::Update { delta, prefix: false, target: Box::new(expr) })
  }

  fn call_member(&mut self) -> Result<Expr, ScriptError> {
    let mut expr = if self.eat_word("new") {
      // `new Error(msg)` behaves like a plain call to the constructor.
      let callee = self.primary()?;
      let args = if self.is_punct("(") { self.arguments()? } else { Vec::new() };
      Expr::Call(Box::new(callee), args)
    } else {
      self.primary()?
    };

    loop {
      if self.eat_punct(".") {
        let name = match self.advance() {
          Tok::Ident(name) => name,
          _ => return Err(ScriptError::syntax("expected property name after '.'", self.line())),
        };
        expr = Expr::Member(Box::new(expr), name);
      } else if self.eat_punct("[") {
        let index = self.expression()?;
        self.expect_punct("]")?;
        expr = Expr::Index(Box::new(expr), Box::new(index));
      } else if self.is_punct("(") {
        let args = self.arguments()?;
        expr = Expr::Call(Box::new(expr), args);
      } else {
        return Ok(expr);
      }
    }
  }

  fn arguments(&mut self) -> Result<Vec<Expr>, ScriptError> {
    self.expect_punct("(")?;
    let mut args = Vec::new();
    while !self.is_punct(")") {
      args.push(self.assignment()?);
      if !self.eat_punct(",") { break; }
    }
    self.expect_punct(")")?;
    Ok(args)
  }

  fn primary(&mut self) -> Result<Expr, ScriptError> {
    match self.peek().clone() {
      Tok::Num(n) => { self.advance(); Ok(Expr::Num(n)) }
      Tok::Str(s) => { self.advance(); Ok(Expr::Str(s)) }
      Tok::Punct("(") => {
        self.advance();
        let inner = self.expression()?;
        self.expect_punct(")")?;
        Ok(inner)
      }
      Tok::Punct("[") => {
        self.advance();
        let mut items = Vec::new();
        while !self.is_punct("]") {
          items.push(self.assignment()?);
          if !self.eat_punct(",") { break; }
        }
        self.expect_punct("]")?;
        Ok(Expr::Array(items))
      }
      Tok::Punct("{") => {
        self.advance();
        let mut props = Vec::new();
        while !self.is_punct("}") {
          let key = match self.advance() {
            Tok::Ident(k) | Tok::Str(k) => k,
            Tok::Num(n) => super::value::number_to_string(n),
            _ => return Err(ScriptError::syntax("expected property key", self.line())),
          };
          let value = if self.eat_punct(":") {
            self.assignment()?
          } else {
            Expr::Ident(key.clone()) // shorthand `{ a }`
          };
          props.push((key, value));
          if !self.eat_punct(",") { break; }
        }
        self.expect_punct("}")?;
        Ok(Expr::Object(props))
      }
      Tok::Ident(word) => {
        self.advance();
        match word.as_str() {
          "true" => Ok(Expr::Bool(true)),
          "false" => Ok(Expr::Bool(false)),
          "null" => Ok(Expr::Null),
          "undefined" => Ok(Expr::Undefined),
          "function" => Ok(Expr::Function(self.function_rest(false)?)),
          w if is_reserved(w) => {
            self.pos -= 1;
            Err(self.unexpected("expression"))
          }
          _ => Ok(Expr::Ident(word)),
        }
      }
      _ => Err(self.unexpected("expression")),
    }
  }
}

fn is_reserved(word: &str) -> bool {
  matches!(
    word,
    "let" | "const" | "var" | "function" | "if" | "else" | "while" | "for" | "return" | "break"
      | "continue" | "throw" | "new" | "typeof" | "true" | "false" | "null"
  )
}
