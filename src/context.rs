use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{DefaultScriptInterface, Module, Value};
use crate::interpreter::Scope;
use crate::runtime::{self, os, sys, SharedInterface};

/// Everything an evaluation may observe from its host
///
/// Holds the captured standard input and the output sink. `global_scope()` turns it into the root
/// Scope with the bindings `std`, `os`, `stdin`, `parse`, `stringify`, `print` and `println`.
pub struct EvalContext {
    stdin: String,
    interface: SharedInterface,
    std_module: Rc<Module>,
    os_module: Rc<Module>,
}

impl EvalContext {
    /// Creates a context writing to the process's stdout and stderr
    pub fn new(stdin: impl Into<String>) -> EvalContext {
        EvalContext::with_interface(stdin, Rc::new(RefCell::new(DefaultScriptInterface::new())))
    }

    /// Creates a context writing to `interface`
    pub fn with_interface(stdin: impl Into<String>, interface: SharedInterface) -> EvalContext {
        EvalContext {
            stdin: stdin.into(),
            std_module: Rc::new(sys::module(Rc::clone(&interface))),
            os_module: Rc::new(os::module()),
            interface,
        }
    }

    pub fn stdin(&self) -> &str {
        &self.stdin
    }

    /// Builds the root Scope of an evaluation
    pub fn global_scope<'src>(&self) -> Scope<'src> {
        let mut scope = Scope::new();
        runtime::insert_native_functions(&mut scope, Rc::clone(&self.interface));
        scope.vars.insert("stdin", Value::Str(self.stdin.clone()));
        scope.vars.insert("std", Value::Module(Rc::clone(&self.std_module)));
        scope.vars.insert("os", Value::Module(Rc::clone(&self.os_module)));
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::BufferInterface;

    #[test]
    fn bindings() {
        let ctx = EvalContext::new("hello");
        assert_eq!("hello", ctx.stdin());

        let scope = ctx.global_scope();
        assert_eq!(Some(&Value::from("hello")), scope.vars.get("stdin"));
        for name in ["std", "os"] {
            assert!(matches!(scope.vars.get(name), Some(Value::Module(_))), "{} missing", name);
        }
        for name in ["parse", "stringify", "print", "println"] {
            assert!(scope.native_funcs.contains_key(name), "{} missing", name);
        }
    }

    #[test]
    fn modules_are_shared_between_scopes() {
        let ctx = EvalContext::with_interface("", Rc::new(RefCell::new(BufferInterface::default())));
        let a = ctx.global_scope();
        let b = ctx.global_scope();
        assert_eq!(a.vars.get("std"), b.vars.get("std"));
        assert_ne!(a.vars.get("std"), a.vars.get("os"));
    }
}
