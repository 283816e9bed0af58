pub mod ast;
mod context;
mod error;
pub mod interpreter;
mod parser;
pub mod runtime;

use log::{debug, trace};

use ast::{ExecResult, Executable, Value};
use interpreter::{Scope, ScopeChain};

pub use context::EvalContext;
pub use error::Error;
pub use parser::parse;

/// Result of parsing and executing code
///
///   - `exec_result`: actual resulting value from execution, or the failure that stopped it
///   - `scope_chain`: ScopeChain after execution
pub struct InterpretResult<'src> {
    pub exec_result: Result<ExecResult, Error>,
    pub scope_chain: ScopeChain<'src>,
}

/// Interprets given source code under a Scope
///
/// # Params
///
///   - `src: &str`: source code to parse and execute
///   - `global_scope: Scope`: root scope under which to execute the code
///
pub fn interpret<'src>(src: &'src str, global_scope: Scope<'src>) -> InterpretResult<'src> {
    let mut scopes = ScopeChain::from_scope(global_scope);
    let er = match parse(src) {
        Ok(stmts) => {
            trace!("parsed {} top-level statements", stmts.len());
            stmts.exec(&mut scopes)
        }
        Err(e) => Err(e),
    };
    InterpretResult {
        exec_result: er,
        scope_chain: scopes,
    }
}

/// Evaluates `src` in the global scope built from `ctx` and returns its completion value
///
/// The empty program evaluates to null.
pub fn evaluate(src: &str, ctx: &EvalContext) -> Result<Value, Error> {
    debug!("evaluating {} bytes with {} bytes of stdin", src.len(), ctx.stdin().len());
    Ok(interpret(src, ctx.global_scope()).exec_result?.into_value())
}
