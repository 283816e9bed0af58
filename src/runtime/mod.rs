//! Host-provided bindings: output functions, the `std` and `os` modules and the JSON helpers

use std::any::Any;
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::ast::{NativeFunction, ScriptInterface, Value};
use crate::error::Error;
use crate::interpreter::{Scope, ScopeChain};

pub mod json;
pub mod os;
pub mod sys;

/// Shared handle to the output sink used by every printing function
pub type SharedInterface = Rc<RefCell<dyn ScriptInterface>>;

/// NativeFunction backed by a closure that only needs its arguments
pub struct NativeFn<F> {
    func: F,
}

impl<F> NativeFn<F>
where
    F: Fn(&[Value]) -> Result<Value, Error>,
{
    pub fn new(func: F) -> NativeFn<F> {
        NativeFn { func }
    }
}

impl<F> NativeFunction for NativeFn<F>
where
    F: Fn(&[Value]) -> Result<Value, Error> + 'static,
{
    fn execute<'src>(&self, _scopes: &mut ScopeChain<'src>, args: &[Value]) -> Result<Value, Error> {
        (self.func)(args)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Print function: writes the display form of each argument
pub struct Print {
    interface: SharedInterface,
}
impl Print {
    pub fn new(interface: SharedInterface) -> Print {
        Print { interface }
    }
}
impl NativeFunction for Print {
    fn execute<'src>(&self, _scopes: &mut ScopeChain<'src>, args: &[Value]) -> Result<Value, Error> {
        self.interface
            .borrow_mut()
            .print(&concat_display(args))
            .map_err(Error::io("print"))?;
        Ok(Value::None)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Println function: like Print, followed by a newline
pub struct Println {
    interface: SharedInterface,
}
impl Println {
    pub fn new(interface: SharedInterface) -> Println {
        Println { interface }
    }
}
impl NativeFunction for Println {
    fn execute<'src>(&self, _scopes: &mut ScopeChain<'src>, args: &[Value]) -> Result<Value, Error> {
        self.interface
            .borrow_mut()
            .println(&concat_display(args))
            .map_err(Error::io("println"))?;
        Ok(Value::None)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Inserts the output functions and JSON helpers into `scope`
pub fn insert_native_functions(scope: &mut Scope, interface: SharedInterface) {
    scope
        .native_funcs
        .insert("print", Rc::new(Print::new(Rc::clone(&interface))));
    scope
        .native_funcs
        .insert("println", Rc::new(Println::new(interface)));
    scope.native_funcs.insert("parse", Rc::new(json::Parse {}));
    scope
        .native_funcs
        .insert("stringify", Rc::new(json::Stringify {}));
}

/// ScriptInterface collecting output in memory
#[derive(Default)]
pub struct BufferInterface {
    pub out: String,
    pub err: String,
}

impl ScriptInterface for BufferInterface {
    fn print(&mut self, s: &str) -> io::Result<()> {
        self.out.push_str(s);
        Ok(())
    }

    fn eprint(&mut self, s: &str) -> io::Result<()> {
        self.err.push_str(s);
        Ok(())
    }
}

/// Concatenates the display forms of `args` without separator
pub(crate) fn concat_display(args: &[Value]) -> String {
    args.iter().map(|x| x.to_string()).collect()
}

/// Argument `i`, or null when missing
pub(crate) fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&Value::None)
}

pub(crate) fn arg_str<'a>(func: &str, args: &'a [Value], i: usize) -> Result<&'a str, Error> {
    match arg(args, i) {
        Value::Str(s) => Ok(s.as_str()),
        other => Err(Error::argument(
            func,
            format!("argument {} must be str, got {}", i + 1, other.type_name()),
        )),
    }
}

pub(crate) fn arg_int(func: &str, args: &[Value], i: usize) -> Result<i64, Error> {
    match arg(args, i) {
        Value::Int(x) => Ok(*x),
        Value::Real(x) if x.fract() == 0.0 => Ok(*x as i64),
        other => Err(Error::argument(
            func,
            format!("argument {} must be int, got {}", i + 1, other.type_name()),
        )),
    }
}
