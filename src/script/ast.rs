use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinOp {
  Add, Sub, Mul, Div, Rem,
  Lt, Le, Gt, Ge,
  LooseEq, LooseNe, StrictEq, StrictNe,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogicalOp { And, Or }

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnaryOp { Not, Neg, Plus, TypeOf }

#[derive(Debug)]
pub enum Expr {
  Num(f64),
  Str(String),
  Bool(bool),
  Null,
  Undefined,
  Ident(String),
  Array(Vec<Expr>),
  Object(Vec<(String, Expr)>),
  Unary(UnaryOp, Box<Expr>),
  Binary(BinOp, Box<Expr>, Box<Expr>),
  Logical(LogicalOp, Box<Expr>, Box<Expr>),
  Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
  /// `op` is `Some` for compound assignment (`+=` and friends).
  Assign(Option<BinOp>, Box<Expr>, Box<Expr>),
  Update { delta: f64, prefix: bool, target: Box<Expr> },
  Member(Box<Expr>, String),
  Index(Box<Expr>, Box<Expr>),
  Call(Box<Expr>, Vec<Expr>),
  Function(Rc<FunctionDef>),
}

#[derive(Debug)]
pub enum FunctionBody {
  Block(Vec<Stmt>),
  Expr(Box<Expr>),
}

#[derive(Debug)]
pub struct FunctionDef {
  pub name: Option<String>,
  pub params: Vec<String>,
  pub body: FunctionBody,
}

#[derive(Debug)]
pub enum Stmt {
  Let(Vec<(String, Option<Expr>)>),
  Function(Rc<FunctionDef>),
  Expr(Expr),
  If(Expr, Box<Stmt>, Option<Box<Stmt>>),
  While(Expr, Box<Stmt>),
  For { init: Option<Box<Stmt>>, test: Option<Expr>, update: Option<Expr>, body: Box<Stmt> },
  ForOf { name: String, iterable: Expr, body: Box<Stmt> },
  Return(Option<Expr>),
  Break,
  Continue,
  Throw(Expr),
  Block(Vec<Stmt>),
  Empty,
}
