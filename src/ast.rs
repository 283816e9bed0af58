use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::ptr;
use std::rc::Rc;

use crate::error::Error;
use crate::interpreter::ScopeChain;

// --- Types ---

/// Result of executing an Executable
///
/// `Value` carries the completion value of an expression statement, which becomes the result of
/// the program when nothing more specific (a `return`) overrides it.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecResult {
    Break,
    None,
    Return(Value),
    Value(Value),
}

impl ExecResult {
    /// The value a program or script ends with: its `return` or completion value, else null
    pub fn into_value(self) -> Value {
        match self {
            ExecResult::Return(x) | ExecResult::Value(x) => x,
            ExecResult::Break | ExecResult::None => Value::None,
        }
    }
}

/// Language expression
///
/// Numbers, strings, lists, function calls, identifiers and operations thereon. Anything that can
/// be evaluated to a Value.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr<'src> {
    BinOp(Box<Expr<'src>>, Opcode, Box<Expr<'src>>),
    Bool(bool),
    Dict(Vec<(Cow<'src, str>, Expr<'src>)>),
    FuncCall(Box<Expr<'src>>, Vec<Expr<'src>>),
    Id(Ident<'src>),
    Index(Box<Expr<'src>>, Box<Expr<'src>>),
    Int(i64),
    List(Vec<Expr<'src>>),
    Member(Box<Expr<'src>>, Ident<'src>),
    None,
    Real(f64),
    Str(Cow<'src, str>),
    UnaryOp(Opcode, Box<Expr<'src>>),
}

/// Script-defined functions
///
/// Contains a list of statements (StmtBlock) that are executed when the Function is called, and a
/// list of argument Idents that will be assigned to actual values during the call.
#[derive(Debug)]
pub struct Function<'src> {
    pub args:  Vec<Ident<'src>>,
    pub stmts: StmtBlock<'src>,
}

/// Language identifier
///
/// Used to represent a variable or function name.
pub type Ident<'src> = &'src str;

/// Operation codes
///
/// Contains variants representing various operations that can be performed on expressions, such as
/// arithmetic, logical and relational.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Opcode {
    Add,
    Div,
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    Mod,
    Mul,
    Neg,
    Not,
    NotEqual,
    Sub,
}

/// Language statements
///
/// Any single program instruction, such as a variable assignment, function call, conditional,
/// loop.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt<'src> {
    Break,
    Expr(Expr<'src>),
    FnDef(Ident<'src>, Vec<Ident<'src>>, StmtBlock<'src>),
    If(Expr<'src>, StmtBlock<'src>),
    IfElse(Expr<'src>, StmtBlock<'src>, StmtBlock<'src>),
    Let(Ident<'src>, Expr<'src>),
    ListItemAssignment(Ident<'src>, Expr<'src>, Expr<'src>),
    Loop(StmtBlock<'src>),
    Return(Expr<'src>),
    Throw(Expr<'src>),
}

impl<'src> Stmt<'src> {
    /// True for statements whose source ends with a `}` block; these need no `;` after them
    pub fn ends_with_block(&self) -> bool {
        matches!(
            self,
            Stmt::FnDef(..) | Stmt::If(..) | Stmt::IfElse(..) | Stmt::Loop(..)
        )
    }
}

/// Statement block
///
/// A block of zero or more Stmts
pub type StmtBlock<'src> = Vec<Stmt<'src>>;

/// Result of evaluating an Evaluatable
///
/// Values own their data: strings read from stdin or decoded from JSON outlive nothing in the
/// source text.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Dict(BTreeMap<String, Value>),
    Int(i64),
    List(Vec<Value>),
    Module(Rc<Module>),
    None,
    Real(f64),
    Str(String),
}

impl Value {
    /// Name of the Value's type as shown in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_)   => "bool",
            Value::Dict(_)   => "dict",
            Value::Int(_)    => "int",
            Value::List(_)   => "list",
            Value::Module(_) => "module",
            Value::None      => "null",
            Value::Real(_)   => "real",
            Value::Str(_)    => "str",
        }
    }

    /// Nesting depth: 0 for scalars, one more than the deepest item for lists and dicts
    pub fn depth(&self) -> usize {
        match self {
            Value::List(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            Value::Dict(map) => 1 + map.values().map(Value::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Writes the Value as it appears nested inside a list or dict (strings quoted)
    fn fmt_nested(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(x) => write!(f, "{}", x),
            Value::Dict(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: ", k)?;
                    v.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
            Value::Int(x) => write!(f, "{}", x),
            Value::List(list) => {
                write!(f, "[")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    v.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            Value::Module(m) => write!(f, "[module {}]", m.name()),
            Value::None => write!(f, "null"),
            Value::Real(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Int(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<&str> for Value {
    fn from(x: &str) -> Self {
        Value::Str(x.to_string())
    }
}

impl From<String> for Value {
    fn from(x: String) -> Self {
        Value::Str(x)
    }
}

/// Host capability object
///
/// A named bundle of NativeFunctions and constant Values, reached from scripts via member access
/// (e.g. `os.platform`, `std.getenv("HOME")`).
pub struct Module {
    name:   &'static str,
    consts: BTreeMap<&'static str, Value>,
    funcs:  BTreeMap<&'static str, Rc<dyn NativeFunction>>,
}

impl Module {
    pub fn new(name: &'static str) -> Module {
        Module {
            name,
            consts: BTreeMap::new(),
            funcs:  BTreeMap::new(),
        }
    }

    pub fn with_const(mut self, key: &'static str, val: Value) -> Module {
        self.consts.insert(key, val);
        self
    }

    pub fn with_func<F: NativeFunction + 'static>(mut self, key: &'static str, func: F) -> Module {
        self.funcs.insert(key, Rc::new(func));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get_const(&self, key: &str) -> Option<&Value> {
        self.consts.get(key)
    }

    pub fn get_func(&self, key: &str) -> Option<Rc<dyn NativeFunction>> {
        self.funcs.get(key).map(Rc::clone)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("consts", &self.consts)
            .field("funcs", &self.funcs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Modules are compared by identity
impl PartialEq for Module {
    fn eq(&self, other: &Module) -> bool {
        ptr::eq(self, other)
    }
}

// --- Traits ---

/// Trait allowing various language elements to be evaluated
pub trait Evaluatable<'src> {
    fn eval(&self, scopes: &mut ScopeChain<'src>) -> Result<Value, Error>;
}

/// Trait allowing various language elements to be executed
pub trait Executable<'src> {
    fn exec(&self, scopes: &mut ScopeChain<'src>) -> Result<ExecResult, Error>;
}

/// Trait used to allow structs to be called from a script
///
/// The `execute()` method will be called via the script interpreter with the current ScopeChain
/// and a list of argument values.
pub trait NativeFunction {
    fn execute<'src>(&self, scopes: &mut ScopeChain<'src>, args: &[Value]) -> Result<Value, Error>;
    fn as_any(&self) -> &dyn Any;
}

/// Output sink for everything a script prints
pub trait ScriptInterface {
    fn print(&mut self, s: &str) -> io::Result<()>;

    fn eprint(&mut self, s: &str) -> io::Result<()>;

    fn println(&mut self, s: &str) -> io::Result<()> {
        self.print(s)?;
        self.print("\n")
    }
}

/// ScriptInterface writing to the process's stdout and stderr
#[derive(Default)]
pub struct DefaultScriptInterface {}

impl DefaultScriptInterface {
    pub fn new() -> DefaultScriptInterface {
        DefaultScriptInterface {}
    }
}

impl ScriptInterface for DefaultScriptInterface {
    fn print(&mut self, s: &str) -> io::Result<()> {
        io::stdout().write_all(s.as_bytes())
    }

    fn eprint(&mut self, s: &str) -> io::Result<()> {
        io::stderr().write_all(s.as_bytes())
    }
}
