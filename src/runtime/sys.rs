//! The `std` module: process streams, environment, exit and whole-file I/O

use std::any::Any;
use std::env;
use std::fs;
use std::rc::Rc;

use log::debug;

use crate::ast::{Executable, Module, NativeFunction, Value};
use crate::error::Error;
use crate::interpreter::{ScopeChain, MAX_CALL_DEPTH};
use crate::parser::parse;

use super::{arg_int, arg_str, concat_display, NativeFn, SharedInterface};

/// Builds the `std` module writing through `interface`
pub fn module(interface: SharedInterface) -> Module {
    let out = Rc::clone(&interface);
    let err = interface;

    Module::new("std")
        .with_func(
            "puts",
            NativeFn::new(move |args: &[Value]| {
                out.borrow_mut()
                    .print(&concat_display(args))
                    .map_err(Error::io("std.puts"))?;
                Ok(Value::None)
            }),
        )
        .with_func(
            "eputs",
            NativeFn::new(move |args: &[Value]| {
                err.borrow_mut()
                    .eprint(&concat_display(args))
                    .map_err(Error::io("std.eputs"))?;
                Ok(Value::None)
            }),
        )
        .with_func(
            "getenv",
            NativeFn::new(|args: &[Value]| {
                Ok(env::var(arg_str("std.getenv", args, 0)?)
                    .map(Value::Str)
                    .unwrap_or(Value::None))
            }),
        )
        .with_func(
            "getenviron",
            NativeFn::new(|_args: &[Value]| {
                Ok(Value::Dict(
                    env::vars_os()
                        .map(|(k, v)| {
                            let v = Value::Str(v.to_string_lossy().into_owned());
                            (k.to_string_lossy().into_owned(), v)
                        })
                        .collect(),
                ))
            }),
        )
        .with_func(
            "setenv",
            NativeFn::new(|args: &[Value]| {
                let name = arg_str("std.setenv", args, 0)?;
                let value = arg_str("std.setenv", args, 1)?;
                if name.is_empty() || name.contains(['=', '\0']) || value.contains('\0') {
                    return Err(Error::argument("std.setenv", "invalid variable name or value"));
                }
                env::set_var(name, value);
                Ok(Value::None)
            }),
        )
        .with_func(
            "unsetenv",
            NativeFn::new(|args: &[Value]| {
                let name = arg_str("std.unsetenv", args, 0)?;
                if name.is_empty() || name.contains(['=', '\0']) {
                    return Err(Error::argument("std.unsetenv", "invalid variable name"));
                }
                env::remove_var(name);
                Ok(Value::None)
            }),
        )
        .with_func(
            "exit",
            NativeFn::new(|args: &[Value]| {
                let code = match args.first() {
                    None | Some(Value::None) => 0,
                    Some(_) => arg_int("std.exit", args, 0)?,
                };
                debug!("std.exit({}) requested", code);
                Err(Error::Exit(code as i32))
            }),
        )
        .with_func(
            "loadFile",
            NativeFn::new(|args: &[Value]| {
                let path = arg_str("std.loadFile", args, 0)?;
                match fs::read(path) {
                    Ok(bytes) => Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned())),
                    Err(e) => {
                        debug!("std.loadFile({}) failed: {}", path, e);
                        Ok(Value::None)
                    }
                }
            }),
        )
        .with_func(
            "writeFile",
            NativeFn::new(|args: &[Value]| {
                let path = arg_str("std.writeFile", args, 0)?;
                let data = arg_str("std.writeFile", args, 1)?;
                fs::write(path, data).map_err(Error::io("std.writeFile"))?;
                Ok(Value::None)
            }),
        )
        .with_func("evalScript", EvalScript {})
}

/// `std.evalScript(src)`
///
/// Runs `src` against a copy of the caller's global bindings and returns its completion value.
/// Definitions made by `src` stay inside it.
pub struct EvalScript {}
impl NativeFunction for EvalScript {
    fn execute<'src>(&self, scopes: &mut ScopeChain<'src>, args: &[Value]) -> Result<Value, Error> {
        let src = arg_str("std.evalScript", args, 0)?;
        if scopes.depth() > MAX_CALL_DEPTH {
            return Err(Error::StackOverflow(MAX_CALL_DEPTH));
        }
        debug!("std.evalScript: {} bytes", src.len());
        let stmts = parse(src)?;
        let mut inner = scopes.detached();
        Ok(stmts.exec(&mut inner)?.into_value())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::ast::{ExecResult, Executable};
    use crate::interpreter::{Scope, ScopeChain};
    use crate::parser::parse;
    use crate::runtime::BufferInterface;

    fn run(src: &str, buffer: &Rc<RefCell<BufferInterface>>) -> Result<ExecResult, Error> {
        let mut scope = Scope::new();
        scope
            .vars
            .insert("std", Value::Module(Rc::new(module(buffer.clone()))));
        let mut scopes = ScopeChain::from_scope(scope);
        parse(src)?.exec(&mut scopes)
    }

    fn value_of(src: &str) -> Value {
        let buffer = Rc::new(RefCell::new(BufferInterface::default()));
        match run(src, &buffer) {
            Ok(ExecResult::Value(x)) => x,
            other => panic!("`{}` produced {:?}", src, other),
        }
    }

    #[test]
    fn puts_and_eputs() {
        let buffer = Rc::new(RefCell::new(BufferInterface::default()));
        run(r#"std.puts("a", 1); std.eputs("oops\n"); std.puts("b")"#, &buffer).unwrap();
        assert_eq!("a1b", buffer.borrow().out);
        assert_eq!("oops\n", buffer.borrow().err);
    }

    #[test]
    fn environment() {
        assert_eq!(
            Value::from("set"),
            value_of(r#"std.setenv("STDEVAL_SYS_TEST", "set"); std.getenv("STDEVAL_SYS_TEST")"#)
        );
        assert_eq!(
            Value::None,
            value_of(r#"std.unsetenv("STDEVAL_SYS_TEST"); std.getenv("STDEVAL_SYS_TEST")"#)
        );
        let buffer = Rc::new(RefCell::new(BufferInterface::default()));
        assert!(matches!(
            run(r#"std.setenv("A=B", "x")"#, &buffer),
            Err(Error::Argument { .. })
        ));
        assert!(matches!(run("std.getenv(1)", &buffer), Err(Error::Argument { .. })));
    }

    #[test]
    fn environment_listing() {
        env::set_var("STDEVAL_SYS_LISTED", "yes");
        match value_of("std.getenviron()") {
            Value::Dict(vars) => assert_eq!(Some(&Value::from("yes")), vars.get("STDEVAL_SYS_LISTED")),
            other => assert!(false, "unexpected environment {:?}", other),
        }
        assert_eq!(Value::from("yes"), value_of(r#"std.getenviron()["STDEVAL_SYS_LISTED"]"#));
    }

    #[test]
    fn eval_script() {
        assert_eq!(Value::Int(3), value_of(r#"std.evalScript("1 + 2")"#));
        assert_eq!(Value::None, value_of(r#"std.evalScript("")"#));
        assert_eq!(Value::Int(7), value_of(r#"let a = 5; fn inc(x) { return x + 2; }; std.evalScript("inc(a)")"#));
        assert_eq!(Value::Int(1), value_of(r#"std.evalScript("return 1; 2")"#));

        let buffer = Rc::new(RefCell::new(BufferInterface::default()));
        run(r#"std.evalScript("std.puts('inner')")"#, &buffer).unwrap();
        assert_eq!("inner", buffer.borrow().out);

        // Bindings made by the script do not leak out
        assert!(matches!(
            run(r#"std.evalScript("let hidden = 1"); hidden"#, &buffer),
            Err(Error::UndefinedVariable(_))
        ));
        assert_eq!(Value::Int(5), value_of(r#"let a = 5; std.evalScript("let a = 6"); a"#));

        assert!(matches!(run(r#"std.evalScript("1 +")"#, &buffer), Err(Error::Syntax { .. })));
        assert!(matches!(run(r#"std.evalScript("throw 'x'")"#, &buffer), Err(Error::Thrown(_))));
        assert!(matches!(run("std.evalScript(1)", &buffer), Err(Error::Argument { .. })));

        // Each nested script adds its own frames, so recurse on a roomier stack
        let overflowed = std::thread::Builder::new()
            .stack_size(64 << 20)
            .spawn(|| {
                let buffer = Rc::new(RefCell::new(BufferInterface::default()));
                let res = run(r#"fn f() { return std.evalScript("f()"); }; f()"#, &buffer);
                matches!(res, Err(Error::StackOverflow(MAX_CALL_DEPTH)))
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(overflowed);
    }

    #[test]
    fn exit_request() {
        let buffer = Rc::new(RefCell::new(BufferInterface::default()));
        assert!(matches!(run("std.exit(3); 1", &buffer), Err(Error::Exit(3))));
        assert!(matches!(run("std.exit()", &buffer), Err(Error::Exit(0))));
    }

    #[test]
    fn files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let path = path.to_string_lossy().replace('\\', "/");

        let src = format!(
            r#"std.writeFile("{0}", "line 1\nline 2"); std.loadFile("{0}").lines()"#,
            path
        );
        assert_eq!(
            Value::List(vec![Value::from("line 1"), Value::from("line 2")]),
            value_of(&src)
        );

        let missing = format!(r#"std.loadFile("{}/missing")"#, dir.path().to_string_lossy());
        assert_eq!(Value::None, value_of(&missing));

        let buffer = Rc::new(RefCell::new(BufferInterface::default()));
        let unwritable = format!(r#"std.writeFile("{}/no/such/dir", "x")"#, dir.path().to_string_lossy());
        assert!(matches!(run(&unwritable, &buffer), Err(Error::Io { .. })));
    }

    #[test]
    fn module_is_not_callable_as_value() {
        let buffer = Rc::new(RefCell::new(BufferInterface::default()));
        assert!(matches!(run("std.puts", &buffer), Err(Error::Type(_))));
        assert!(matches!(run("std.nope()", &buffer), Err(Error::UndefinedFunction(_))));
        assert_eq!(Value::from("[module std]"), value_of(r#""" + std"#));
    }
}
