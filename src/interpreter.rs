use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use log::trace;

use crate::ast::{
    Evaluatable, ExecResult, Executable, Expr, Function, Ident, NativeFunction, Opcode, Stmt,
    StmtBlock, Value,
};
use crate::error::Error;

/// Maximum number of nested script function calls
pub const MAX_CALL_DEPTH: usize = 200;

/// Maximum nesting of lists and dicts inside one Value
///
/// Clone, Drop, comparison, display and JSON encoding all recurse through a Value, so it has to
/// stay shallow enough for the native stack.
pub const MAX_VALUE_DEPTH: usize = 100;

/// Passes `value` through unless it nests deeper than MAX_VALUE_DEPTH
pub(crate) fn limit_depth(value: Value) -> Result<Value, Error> {
    if value.depth() > MAX_VALUE_DEPTH {
        return Err(Error::Nesting(MAX_VALUE_DEPTH));
    }
    Ok(value)
}

/// Language scope struct
///
/// Contains HashMaps mapping Idents to Functions, NativeFunctions and Values (variables) in the
/// scope
#[derive(Default)]
pub struct Scope<'src> {
    pub funcs: HashMap<Ident<'src>, Rc<Function<'src>>>,
    pub native_funcs: HashMap<Ident<'src>, Rc<dyn NativeFunction>>,
    pub vars: HashMap<Ident<'src>, Value>,
}
impl<'src> Scope<'src> {
    /// Create an empty Scope
    pub fn new() -> Scope<'src> {
        Scope::default()
    }

    /// When creating a Scope for a Function invocation, inserts variables for each of the
    /// Function's arguments with the values passed to the invocation. Missing arguments are null.
    pub fn from_args(params: &[Ident<'src>], args: &[Value]) -> Scope<'src> {
        let mut scope = Scope::new();
        for (i, param) in params.iter().enumerate() {
            scope.vars.insert(*param, args.get(i).cloned().unwrap_or(Value::None));
        }
        scope
    }
}

/// Chain of Scopes
///
///   - A stack of Scopes.
///   - Contains methods to resolve variables, Functions, etc and to modify Scope items.
///   - Each function call pushes a new Scope onto the current ScopeChain.
///   - All evaluations/executions require a ScopeChain.
#[derive(Default)]
pub struct ScopeChain<'src> {
    scopes: Vec<Scope<'src>>,
    base_depth: usize,
}
impl<'src> ScopeChain<'src> {
    /// Creates an empty ScopeChain
    pub fn new() -> ScopeChain<'src> {
        ScopeChain {
            scopes: vec![],
            base_depth: 0,
        }
    }

    /// Creates a new ScopeChain with a single root Scope
    pub fn from_scope(scope: Scope<'src>) -> ScopeChain<'src> {
        ScopeChain {
            scopes: vec![scope],
            base_depth: 0,
        }
    }

    /// Creates a chain for source evaluated from within this one
    ///
    /// The new root Scope holds copies of this chain's global bindings. Its depth continues from
    /// this chain's, so MAX_CALL_DEPTH bounds nested evaluations too.
    pub fn detached<'x>(&self) -> ScopeChain<'x>
    where
        'src: 'x,
    {
        let mut root = Scope::new();
        if let Some(globals) = self.scopes.first() {
            for (key, f) in globals.funcs.iter() {
                root.funcs.insert(*key, Rc::clone(f));
            }
            for (key, f) in globals.native_funcs.iter() {
                root.native_funcs.insert(*key, Rc::clone(f));
            }
            for (key, val) in globals.vars.iter() {
                root.vars.insert(*key, val.clone());
            }
        }
        ScopeChain {
            scopes: vec![root],
            base_depth: self.depth(),
        }
    }

    /// Number of Scopes on the stack, plus those of the chains this one was detached from
    pub fn depth(&self) -> usize {
        self.base_depth + self.scopes.len()
    }

    /// Pushes a new Scope onto the stack
    pub fn push(&mut self, scope: Scope<'src>) {
        self.scopes.push(scope);
    }

    /// Pops the last Scope from the stack
    pub fn pop(&mut self) -> Option<Scope<'src>> {
        self.scopes.pop()
    }

    /// Inserts a Function into the last Scope with the Ident `key`
    pub fn insert_func(&mut self, key: Ident<'src>, val: Function<'src>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.funcs.insert(key, Rc::new(val));
        }
    }

    /// Inserts or updates a Value for a variable identified by `key`
    pub fn insert_var(&mut self, key: Ident<'src>, val: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.insert(key, val);
        }
    }

    /// Searches from last to first Scope for a Function identified by `key` and returns a
    /// reference
    pub fn resolve_func(&self, key: &str) -> Option<Rc<Function<'src>>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.funcs.get(key).map(Rc::clone))
    }

    /// Searches from last to first Scope for a NativeFunction identified by `key` and returns a
    /// reference
    pub fn resolve_native_func(&self, key: &str) -> Option<Rc<dyn NativeFunction>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.native_funcs.get(key).map(Rc::clone))
    }

    /// Searches from last to first Scope for a variable identified by `key` and returns a
    /// reference to its Value
    pub fn resolve_var(&self, key: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.vars.get(key))
    }

    /// Like `resolve_var`, but returns a mutable reference for in-place updates
    pub fn resolve_var_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.scopes.iter_mut().rev().find_map(|scope| scope.vars.get_mut(key))
    }

    /// Calls the script Function or NativeFunction named `key`
    pub fn call(&mut self, key: &str, args: &[Value]) -> Result<Value, Error> {
        if let Some(f) = self.resolve_func(key) {
            trace!("calling function `{}` with {} args", key, args.len());
            return f.execute(self, args);
        }
        match self.resolve_native_func(key) {
            Some(f) => {
                trace!("calling native function `{}` with {} args", key, args.len());
                f.execute(self, args)
            }
            None => Err(Error::UndefinedFunction(key.to_string())),
        }
    }
}

impl Opcode {
    /// Calculates an Opcode's integer result given left and right operands
    fn calc_i(self, l: i64, r: i64) -> Result<i64, Error> {
        let res = match self {
            Opcode::Add => l.checked_add(r),
            Opcode::Mul => l.checked_mul(r),
            Opcode::Sub => l.checked_sub(r),
            Opcode::Mod => {
                if r == 0 {
                    return Err(Error::Arithmetic("modulo by zero"));
                }
                l.checked_rem(r)
            }
            _ => Some(0),
        };
        res.ok_or(Error::Arithmetic("integer overflow"))
    }

    /// Calculates an Opcode's floating-point result given left and right operands
    fn calc_f(self, l: f64, r: f64) -> f64 {
        match self {
            Opcode::Add => l + r,
            Opcode::Div => l / r,
            Opcode::Mod => l % r,
            Opcode::Mul => l * r,
            Opcode::Sub => l - r,
            _ => 0f64,
        }
    }

    /// Evaluates the Opcode given left and right operands according to the operand types
    pub fn eval(self, l: Value, r: Value) -> Result<Value, Error> {
        let res = match self {
            Opcode::Add => match (l, r) {
                (Value::Str(l), r) => Value::Str(format!("{}{}", l, r)),
                (l, Value::Str(r)) => Value::Str(format!("{}{}", l, r)),
                (Value::List(mut l), Value::List(r)) => {
                    l.extend(r);
                    Value::List(l)
                }
                (l, r) => self.arithmetic(l, r)?,
            },
            Opcode::Mul | Opcode::Sub | Opcode::Mod => self.arithmetic(l, r)?,
            Opcode::Div => match (l, r) {
                (Value::Int(l),  Value::Int(r))  => Value::Real(self.calc_f(l as f64, r as f64)),
                (Value::Int(l),  Value::Real(r)) => Value::Real(self.calc_f(l as f64, r)),
                (Value::Real(l), Value::Int(r))  => Value::Real(self.calc_f(l, r as f64)),
                (Value::Real(l), Value::Real(r)) => Value::Real(self.calc_f(l, r)),
                (_, _) => Value::None,
            },
            Opcode::Equal => Value::Bool(equals(&l, &r)),
            Opcode::NotEqual => Value::Bool(!equals(&l, &r)),
            Opcode::LessThan
            | Opcode::GreaterThan
            | Opcode::LessThanOrEqual
            | Opcode::GreaterThanOrEqual
            | Opcode::LogicalAnd
            | Opcode::LogicalOr
            | Opcode::LogicalXor => self.logical(l, r),

            Opcode::Neg | Opcode::Not => Value::None,
        };
        Ok(res)
    }

    /// Evaluates `+ - * %` on numbers, promoting to Real when either side is Real
    fn arithmetic(self, l: Value, r: Value) -> Result<Value, Error> {
        Ok(match (l, r) {
            (Value::Int(l),  Value::Int(r))  => Value::Int(self.calc_i(l, r)?),
            (Value::Int(l),  Value::Real(r)) => Value::Real(self.calc_f(l as f64, r)),
            (Value::Real(l), Value::Int(r))  => Value::Real(self.calc_f(l, r as f64)),
            (Value::Real(l), Value::Real(r)) => Value::Real(self.calc_f(l, r)),
            (_, _) => Value::None,
        })
    }

    /// Evaluates the unary Opcode given Value of the operand
    pub fn eval_unary(self, x: Value) -> Result<Value, Error> {
        Ok(match self {
            Opcode::Not => match x {
                Value::Bool(x) => Value::Bool(!x),
                Value::None    => Value::Bool(true),
                _ => Value::Bool(false),
            },
            Opcode::Neg => match x {
                Value::Int(x)  => Value::Int(x.checked_neg().ok_or(Error::Arithmetic("integer overflow"))?),
                Value::Real(x) => Value::Real(-x),
                _ => Value::None,
            },
            _ => Value::None,
        })
    }

    /// Calculates an Opcode's logical result given left and right operands
    fn logical(self, l: Value, r: Value) -> Value {
        match self {
            Opcode::LessThan => compare(&l, &r, |o| o.is_lt()),
            Opcode::GreaterThan => compare(&l, &r, |o| o.is_gt()),
            Opcode::LessThanOrEqual => compare(&l, &r, |o| o.is_le()),
            Opcode::GreaterThanOrEqual => compare(&l, &r, |o| o.is_ge()),
            Opcode::LogicalAnd => match (l, r) {
                (Value::Bool(l), Value::Bool(r)) => Value::Bool(l && r),
                (_, _) => Value::None,
            },
            Opcode::LogicalOr => match (l, r) {
                (Value::Bool(l), Value::Bool(r)) => Value::Bool(l || r),
                (_, _) => Value::None,
            },
            Opcode::LogicalXor => match (l, r) {
                (Value::Bool(l), Value::Bool(r)) => Value::Bool(l ^ r),
                (_, _) => Value::None,
            },
            _ => Value::None,
        }
    }
}

/// Structural equality; Ints and Reals compare numerically
fn equals(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(l),  Value::Real(r)) => *l as f64 == *r,
        (Value::Real(l), Value::Int(r))  => *l == *r as f64,
        (l, r) => l == r,
    }
}

/// Orders numbers and strings; any other combination is null
fn compare<F>(l: &Value, r: &Value, pred: F) -> Value
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    let ord = match (l, r) {
        (Value::Int(l),  Value::Int(r))  => Some(l.cmp(r)),
        (Value::Int(l),  Value::Real(r)) => (*l as f64).partial_cmp(r),
        (Value::Real(l), Value::Int(r))  => l.partial_cmp(&(*r as f64)),
        (Value::Real(l), Value::Real(r)) => l.partial_cmp(r),
        (Value::Str(l),  Value::Str(r))  => Some(l.cmp(r)),
        (_, _) => None,
    };
    match ord {
        Some(ord) => Value::Bool(pred(ord)),
        None => Value::None,
    }
}

impl<'src> Function<'src> {
    /// Executes the Function
    ///
    ///   - Creates a new Function Scope
    ///   - Executes the Function's statements (StmtBlock)
    ///   - Removes the Function's Scope
    ///   - Returns the Function result Value
    pub fn execute(&self, scopes: &mut ScopeChain<'src>, args: &[Value]) -> Result<Value, Error> {
        if scopes.depth() > MAX_CALL_DEPTH {
            return Err(Error::StackOverflow(MAX_CALL_DEPTH));
        }

        // Push new function scope onto chain
        scopes.push(Scope::from_args(&self.args, args));

        let res = self.stmts.exec(scopes);

        // Pop function Scope from chain, also when the body failed
        scopes.pop();

        match res? {
            ExecResult::Return(x) => Ok(x),
            _ => Ok(Value::None),
        }
    }
}

/// Calls the method `name` on `target`: a Module function or a builtin method of the Value type
fn call_method<'src>(
    scopes: &mut ScopeChain<'src>,
    target: Value,
    name: &str,
    args: &[Value],
) -> Result<Value, Error> {
    if let Value::Module(ref module) = target {
        return match module.get_func(name) {
            Some(f) => {
                trace!("calling `{}.{}` with {} args", module.name(), name, args.len());
                f.execute(scopes, args)
            }
            None => Err(Error::UndefinedFunction(format!("{}.{}", module.name(), name))),
        };
    }

    let arg = move |i: usize| args.get(i).unwrap_or(&Value::None);
    let res = match (&target, name) {
        (Value::Str(s),  "len")      => Value::Int(s.chars().count() as i64),
        (Value::Str(s),  "trim")     => Value::Str(s.trim().to_string()),
        (Value::Str(s),  "upper")    => Value::Str(s.to_uppercase()),
        (Value::Str(s),  "lower")    => Value::Str(s.to_lowercase()),
        (Value::Str(s),  "lines")    => Value::List(s.lines().map(Value::from).collect()),
        (Value::Str(s),  "split")    => match arg(0) {
            Value::Str(sep) if !sep.is_empty() => Value::List(s.split(sep.as_str()).map(Value::from).collect()),
            _ => Value::List(s.split_whitespace().map(Value::from).collect()),
        },
        (Value::Str(s),  "contains") => match arg(0) {
            Value::Str(needle) => Value::Bool(s.contains(needle.as_str())),
            other => return Err(Error::argument("contains", format!("expected str, got {}", other.type_name()))),
        },
        (Value::List(l), "len")      => Value::Int(l.len() as i64),
        (Value::List(l), "contains") => Value::Bool(l.iter().any(|x| equals(x, arg(0)))),
        (Value::List(l), "join")     => {
            let sep = match arg(0) {
                Value::Str(sep) => sep.as_str(),
                Value::None => "",
                other => return Err(Error::argument("join", format!("expected str, got {}", other.type_name()))),
            };
            Value::Str(l.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(sep))
        }
        (Value::Dict(d), "len")      => Value::Int(d.len() as i64),
        (Value::Dict(d), "keys")     => Value::List(d.keys().map(|k| Value::from(k.as_str())).collect()),
        (Value::Dict(d), "values")   => Value::List(d.values().cloned().collect()),
        (Value::Dict(d), "contains") => match arg(0) {
            Value::Str(key) => Value::Bool(d.contains_key(key)),
            _ => Value::Bool(false),
        },
        _ => {
            return Err(Error::Type(format!(
                "{} has no method `{}`",
                target.type_name(),
                name
            )))
        }
    };
    Ok(res)
}

/// Looks up `idx` in a list, dict or string
fn index(target: &Value, idx: &Value) -> Result<Value, Error> {
    Ok(match (target, idx) {
        (Value::List(list), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| list.get(i))
            .cloned()
            .unwrap_or(Value::None),
        (Value::Dict(dict), Value::Str(key)) => dict.get(key).cloned().unwrap_or(Value::None),
        (Value::Str(s), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or(Value::None),
        (target, idx) => {
            return Err(Error::Type(format!(
                "cannot index {} with {}",
                target.type_name(),
                idx.type_name()
            )))
        }
    })
}

impl<'src> Evaluatable<'src> for Expr<'src> {
    /// Evaluate an Expr
    fn eval(&self, scopes: &mut ScopeChain<'src>) -> Result<Value, Error> {
        match *self {
            // && and || short-circuit on a Bool left operand
            Expr::BinOp(ref l, opc @ Opcode::LogicalAnd, ref r)
            | Expr::BinOp(ref l, opc @ Opcode::LogicalOr, ref r) => {
                let l = l.eval(scopes)?;
                match (opc, &l) {
                    (Opcode::LogicalAnd, Value::Bool(false)) => Ok(Value::Bool(false)),
                    (Opcode::LogicalOr, Value::Bool(true)) => Ok(Value::Bool(true)),
                    _ => opc.eval(l, r.eval(scopes)?),
                }
            }
            Expr::BinOp(ref l, opc, ref r) => {
                let l = l.eval(scopes)?;
                opc.eval(l, r.eval(scopes)?)
            }
            Expr::Bool(x) => Ok(Value::Bool(x)),
            Expr::Dict(ref items) => {
                let mut map = BTreeMap::new();
                for (key, val) in items.iter() {
                    map.insert(key.to_string(), val.eval(scopes)?);
                }
                limit_depth(Value::Dict(map))
            }
            Expr::FuncCall(ref callee, ref args) => match **callee {
                Expr::Id(func_id) => {
                    let args = eval_all(args, scopes)?;
                    scopes.call(func_id, &args)
                }
                Expr::Member(ref target, name) => {
                    let target = target.eval(scopes)?;
                    let args = eval_all(args, scopes)?;
                    call_method(scopes, target, name, &args)
                }
                _ => {
                    let callee = callee.eval(scopes)?;
                    Err(Error::Type(format!("{} is not callable", callee.type_name())))
                }
            },
            Expr::Id(x) => match scopes.resolve_var(x) {
                Some(x) => Ok(x.clone()),
                None => Err(Error::UndefinedVariable(x.to_string())),
            },
            Expr::Index(ref target, ref idx) => {
                let target = target.eval(scopes)?;
                let idx = idx.eval(scopes)?;
                index(&target, &idx)
            }
            Expr::Int(x) => Ok(Value::Int(x)),
            Expr::List(ref exprs) => limit_depth(Value::List(eval_all(exprs, scopes)?)),
            Expr::Member(ref target, name) => match target.eval(scopes)? {
                Value::Dict(mut dict) => Ok(dict.remove(name).unwrap_or(Value::None)),
                Value::Module(module) => match module.get_const(name) {
                    Some(x) => Ok(x.clone()),
                    None if module.get_func(name).is_some() => Err(Error::Type(format!(
                        "`{}.{}` is a function and must be called",
                        module.name(),
                        name
                    ))),
                    None => Err(Error::UndefinedVariable(format!("{}.{}", module.name(), name))),
                },
                other => Err(Error::Type(format!(
                    "{} has no member `{}`",
                    other.type_name(),
                    name
                ))),
            },
            Expr::None    => Ok(Value::None),
            Expr::Real(x) => Ok(Value::Real(x)),
            Expr::Str(ref x) => Ok(Value::Str(x.to_string())),
            Expr::UnaryOp(opc, ref x) => opc.eval_unary(x.eval(scopes)?),
        }
    }
}

/// Evaluates each Expr in order, stopping at the first failure
fn eval_all<'src>(exprs: &[Expr<'src>], scopes: &mut ScopeChain<'src>) -> Result<Vec<Value>, Error> {
    exprs.iter().map(|x| x.eval(scopes)).collect()
}

/// Assigns `val` at `idx` inside the list or dict stored in variable `id`
fn assign_item(scopes: &mut ScopeChain, id: &str, idx: Value, val: Value) -> Result<(), Error> {
    let coll = match scopes.resolve_var_mut(id) {
        Some(coll) => coll,
        None => return Err(Error::UndefinedVariable(id.to_string())),
    };
    if val.depth() >= MAX_VALUE_DEPTH && matches!(*coll, Value::List(_) | Value::Dict(_)) {
        return Err(Error::Nesting(MAX_VALUE_DEPTH));
    }
    match (coll, idx) {
        (Value::List(lst), Value::Int(i)) => {
            let slot = usize::try_from(i)
                .map_err(|_| Error::Type(format!("negative list index {}", i)))?;
            if lst.len() <= slot {
                let too_large = || Error::Type(format!("cannot grow list to index {}", i));
                let len = slot.checked_add(1).ok_or_else(too_large)?;
                lst.try_reserve_exact(len - lst.len()).map_err(|_| too_large())?;
                lst.resize(len, Value::None);
            }
            lst[slot] = val;
        }
        (Value::Dict(dict), Value::Str(key)) => {
            dict.insert(key, val);
        }
        (coll, idx) => {
            return Err(Error::Type(format!(
                "cannot assign to {} with {} index",
                coll.type_name(),
                idx.type_name()
            )))
        }
    }
    Ok(())
}

impl<'src> Executable<'src> for Stmt<'src> {
    /// Execute a Stmt
    fn exec(&self, scopes: &mut ScopeChain<'src>) -> Result<ExecResult, Error> {
        match *self {
            // Break from a loop
            Stmt::Break => Ok(ExecResult::Break),

            // Single Expr (e.g. function call); its Value is the completion value
            Stmt::Expr(ref exp) => Ok(ExecResult::Value(exp.eval(scopes)?)),

            // Create a new Function in the Scope
            Stmt::FnDef(fn_id, ref arg_ids, ref stmts) => {
                scopes.insert_func(
                    fn_id,
                    Function {
                        args:  arg_ids.clone(),
                        stmts: stmts.clone(),
                    },
                );
                Ok(ExecResult::None)
            }

            // If condition without an else
            Stmt::If(ref cond, ref stmts) => match cond.eval(scopes)? {
                Value::Bool(true) => stmts.exec(scopes),
                _ => Ok(ExecResult::None),
            },

            // If condition with an else
            Stmt::IfElse(ref cond, ref stmts, ref else_stmts) => match cond.eval(scopes)? {
                Value::Bool(true) => stmts.exec(scopes),
                _ => else_stmts.exec(scopes),
            },

            // Evaluate "expr" and update variable table (key: "id") with result
            Stmt::Let(id, ref expr) => {
                let eval_res = expr.eval(scopes)?;
                scopes.insert_var(id, eval_res);
                Ok(ExecResult::None)
            }

            // Assign a Value to a list item (integer index) or dict entry (string key)
            Stmt::ListItemAssignment(id, ref idx, ref val) => {
                let idx = idx.eval(scopes)?;
                let val = val.eval(scopes)?;
                assign_item(scopes, id, idx, val)?;
                Ok(ExecResult::None)
            }

            // Execute a loop until the loop body breaks or returns
            Stmt::Loop(ref stmts) => loop {
                match stmts.exec(scopes)? {
                    ExecResult::Break => return Ok(ExecResult::None),
                    ExecResult::Return(x) => return Ok(ExecResult::Return(x)),
                    _ => {}
                }
            },

            // Return from a Function
            Stmt::Return(ref expr) => Ok(ExecResult::Return(expr.eval(scopes)?)),

            Stmt::Throw(ref expr) => Err(Error::Thrown(expr.eval(scopes)?)),
        }
    }
}

impl<'src> Executable<'src> for StmtBlock<'src> {
    /// Execute StmtBlock: execute all Stmts in turn, stopping prematurely if an ExecResult::Break
    /// or ExecResult::Return is encountered. Otherwise the last completion value wins.
    fn exec(&self, scopes: &mut ScopeChain<'src>) -> Result<ExecResult, Error> {
        let mut last = ExecResult::None;
        for stmt in self {
            match stmt.exec(scopes)? {
                res @ ExecResult::Return(_) => return Ok(res),
                ExecResult::Break => return Ok(ExecResult::Break),
                res @ ExecResult::Value(_) => last = res,
                ExecResult::None => {}
            }
        }
        Ok(last)
    }
}
