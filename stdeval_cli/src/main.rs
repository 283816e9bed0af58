use std::env;
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use stdeval::{evaluate, Error, EvalContext};

use config::Config;

mod config;
mod logger;

/// Evaluates an expression with standard input bound to `stdin`
#[derive(Parser, Debug)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Expression pieces, joined without separator
    #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    expression: Vec<String>,
}

impl Args {
    /// Joins the pieces into the expression text
    ///
    /// clap consumes a leading `--` as the end of options. It is expression text here, so it
    /// is restored when `raw` (the arguments after the program name) starts with one that
    /// did not reach `expression`.
    fn into_expression(self, raw: &[OsString]) -> String {
        let mut pieces = self.expression;
        if raw.first().map(OsString::as_os_str) == Some(OsStr::new("--")) && pieces.len() < raw.len() {
            pieces.insert(0, "--".to_string());
        }
        pieces.concat()
    }
}

fn main() -> ExitCode {
    let raw: Vec<OsString> = env::args_os().skip(1).collect();
    let args = Args::parse();

    let config = Config::from_env();
    let level = match config {
        Ok(ref config) => config.log_level,
        Err(_) => LevelFilter::Warn,
    };
    if let Err(e) = logger::init(level) {
        eprintln!("error: {:#}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = config {
        warn!("{:#}", e);
    }

    match run(args.into_expression(&raw)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(expression: String) -> Result<ExitCode> {
    let mut input = Vec::new();
    io::stdin()
        .read_to_end(&mut input)
        .context("unable to read standard input")?;
    let stdin = String::from_utf8_lossy(&input).into_owned();
    debug!("read {} bytes of standard input", input.len());
    debug!("expression: {}", expression);

    let ctx = EvalContext::new(stdin);
    let res = evaluate(&expression, &ctx);
    io::stdout()
        .flush()
        .context("unable to flush standard output")?;

    match res {
        Ok(value) => {
            info!("result: {}", value);
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Exit(code)) => {
            debug!("exiting with status {}", code);
            Ok(ExitCode::from(code as u8))
        }
        Err(e) => {
            error!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(pieces: &[&str]) -> String {
        let raw: Vec<OsString> = pieces.iter().map(OsString::from).collect();
        let args = Args::try_parse_from(std::iter::once("stdeval").chain(pieces.iter().copied())).unwrap();
        args.into_expression(&raw)
    }

    #[test]
    fn arguments_are_concatenated() {
        let cases: &[&[&str]] = &[
            &[],
            &[""],
            &["1+", "1"],
            &["--", "'a'"],
            &["--"],
            &["--", "--"],
            &["--", "-1"],
            &["1", "--", "2"],
            &["-", "-1"],
            &["-2", "+3"],
            &["--help"],
            &["-V", "x"],
            &["let", " a = 1;", "a"],
        ];
        for pieces in cases {
            assert_eq!(pieces.concat(), joined(pieces), "pieces {:?}", pieces);
        }
    }
}
