//! `parse` and `stringify`: conversions between script Values and JSON text

use std::any::Any;
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Map, Number, Value as Json};

use crate::ast::{NativeFunction, Value};
use crate::error::Error;
use crate::interpreter::{limit_depth, ScopeChain};

use super::{arg, arg_str};

/// Converts decoded JSON into a Value. Integers that fit in i64 become Int, other numbers Real.
pub fn from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::None,
        Json::Bool(x) => Value::Bool(x),
        Json::Number(n) => match n.as_i64() {
            Some(x) => Value::Int(x),
            None => n.as_f64().map(Value::Real).unwrap_or(Value::None),
        },
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        Json::Object(map) => Value::Dict(
            map.into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

/// Converts a Value into JSON. Non-finite reals become null; modules are rejected.
pub fn to_json(value: &Value) -> Result<Json, Error> {
    Ok(match value {
        Value::None => Json::Null,
        Value::Bool(x) => Json::Bool(*x),
        Value::Int(x) => Json::Number(Number::from(*x)),
        Value::Real(x) => Number::from_f64(*x).map(Json::Number).unwrap_or(Json::Null),
        Value::Str(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Dict(map) => {
            let mut obj = Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), to_json(v)?);
            }
            Json::Object(obj)
        }
        Value::Module(m) => {
            return Err(Error::Type(format!("cannot stringify module `{}`", m.name())))
        }
    })
}

/// Widest indent `stringify` pretty-prints with; larger requests are clamped
pub const MAX_INDENT: usize = 10;

/// Decodes JSON text
pub fn parse_json(src: &str) -> Result<Value, Error> {
    limit_depth(from_json(serde_json::from_str(src)?))
}

/// Encodes a Value as JSON text, pretty-printed with `indent` spaces (at most MAX_INDENT) when
/// `indent > 0`
pub fn stringify(value: &Value, indent: usize) -> Result<String, Error> {
    let json = to_json(value)?;
    if indent == 0 {
        return Ok(serde_json::to_string(&json)?);
    }
    let indent = " ".repeat(indent.min(MAX_INDENT));
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
    json.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// `parse(str)`
pub struct Parse {}
impl NativeFunction for Parse {
    fn execute<'src>(&self, _scopes: &mut ScopeChain<'src>, args: &[Value]) -> Result<Value, Error> {
        parse_json(arg_str("parse", args, 0)?)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `stringify(value[, indent])`
pub struct Stringify {}
impl NativeFunction for Stringify {
    fn execute<'src>(&self, _scopes: &mut ScopeChain<'src>, args: &[Value]) -> Result<Value, Error> {
        let indent = match arg(args, 1) {
            Value::Int(x) if *x > 0 => usize::try_from(*x).unwrap_or(MAX_INDENT),
            _ => 0,
        };
        Ok(Value::Str(stringify(arg(args, 0), indent)?))
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
