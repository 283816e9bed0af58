//! The `os` module: filesystem, working directory, time and child processes

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::process::Command;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;

use crate::ast::{Module, Value};
use crate::error::Error;

use super::{arg, arg_int, arg_str, NativeFn};

fn millis_since_epoch(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn path_string(path: &std::path::Path) -> Value {
    Value::Str(path.to_string_lossy().into_owned())
}

/// Builds the `os` module
pub fn module() -> Module {
    Module::new("os")
        .with_const("platform", Value::from(env::consts::OS))
        .with_func(
            "getcwd",
            NativeFn::new(|_args: &[Value]| {
                let cwd = env::current_dir().map_err(Error::io("os.getcwd"))?;
                Ok(path_string(&cwd))
            }),
        )
        .with_func(
            "chdir",
            NativeFn::new(|args: &[Value]| {
                env::set_current_dir(arg_str("os.chdir", args, 0)?).map_err(Error::io("os.chdir"))?;
                Ok(Value::None)
            }),
        )
        .with_func(
            "readdir",
            NativeFn::new(|args: &[Value]| {
                let path = arg_str("os.readdir", args, 0)?;
                let mut names = vec![];
                for entry in fs::read_dir(path).map_err(Error::io("os.readdir"))? {
                    let entry = entry.map_err(Error::io("os.readdir"))?;
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
                names.sort();
                Ok(Value::List(names.into_iter().map(Value::Str).collect()))
            }),
        )
        .with_func(
            "mkdir",
            NativeFn::new(|args: &[Value]| {
                fs::create_dir(arg_str("os.mkdir", args, 0)?).map_err(Error::io("os.mkdir"))?;
                Ok(Value::None)
            }),
        )
        .with_func(
            "remove",
            NativeFn::new(|args: &[Value]| {
                let path = arg_str("os.remove", args, 0)?;
                let meta = fs::symlink_metadata(path).map_err(Error::io("os.remove"))?;
                if meta.is_dir() {
                    fs::remove_dir(path).map_err(Error::io("os.remove"))?;
                } else {
                    fs::remove_file(path).map_err(Error::io("os.remove"))?;
                }
                Ok(Value::None)
            }),
        )
        .with_func(
            "rename",
            NativeFn::new(|args: &[Value]| {
                let from = arg_str("os.rename", args, 0)?;
                let to = arg_str("os.rename", args, 1)?;
                fs::rename(from, to).map_err(Error::io("os.rename"))?;
                Ok(Value::None)
            }),
        )
        .with_func(
            "realpath",
            NativeFn::new(|args: &[Value]| {
                let path = fs::canonicalize(arg_str("os.realpath", args, 0)?)
                    .map_err(Error::io("os.realpath"))?;
                Ok(path_string(&path))
            }),
        )
        .with_func(
            "stat",
            NativeFn::new(|args: &[Value]| {
                let meta = fs::metadata(arg_str("os.stat", args, 0)?).map_err(Error::io("os.stat"))?;
                let mut stat = BTreeMap::new();
                stat.insert("size".to_string(), Value::Int(meta.len() as i64));
                stat.insert("is_dir".to_string(), Value::Bool(meta.is_dir()));
                stat.insert("is_file".to_string(), Value::Bool(meta.is_file()));
                stat.insert(
                    "mtime".to_string(),
                    Value::Int(meta.modified().map(millis_since_epoch).unwrap_or(0)),
                );
                Ok(Value::Dict(stat))
            }),
        )
        .with_func(
            "sleep",
            NativeFn::new(|args: &[Value]| {
                let ms = arg_int("os.sleep", args, 0)?.max(0) as u64;
                thread::sleep(Duration::from_millis(ms));
                Ok(Value::None)
            }),
        )
        .with_func(
            "now",
            NativeFn::new(|_args: &[Value]| Ok(Value::Int(millis_since_epoch(SystemTime::now())))),
        )
        .with_func(
            "exec",
            NativeFn::new(|args: &[Value]| {
                let argv = match arg(args, 0) {
                    Value::List(items) if !items.is_empty() => items
                        .iter()
                        .map(|x| match x {
                            Value::Str(s) => Ok(s.as_str()),
                            other => Err(Error::argument(
                                "os.exec",
                                format!("command arguments must be str, got {}", other.type_name()),
                            )),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => return Err(Error::argument("os.exec", "expected a non-empty list")),
                };
                debug!("os.exec {:?}", argv);
                let status = Command::new(argv[0])
                    .args(&argv[1..])
                    .status()
                    .map_err(Error::io("os.exec"))?;
                Ok(Value::Int(status.code().unwrap_or(-1) as i64))
            }),
        )
}
