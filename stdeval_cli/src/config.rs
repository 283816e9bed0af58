use std::env;

use anyhow::{bail, Result};
use log::LevelFilter;

/// Environment variable selecting the log level
pub const LOG_ENV: &str = "STDEVAL_LOG";

/// Settings read from the environment
#[derive(Debug, PartialEq)]
pub struct Config {
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: LevelFilter::Warn,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_value(env::var(LOG_ENV).ok().as_deref())
    }

    fn from_value(level: Option<&str>) -> Result<Config> {
        let log_level = match level.map(str::trim) {
            None | Some("") => return Ok(Config::default()),
            Some(level) => match level.parse::<LevelFilter>() {
                Ok(level) => level,
                Err(_) => bail!(
                    "invalid {} value `{}`, expected one of off, error, warn, info, debug, trace",
                    LOG_ENV,
                    level
                ),
            },
        };
        Ok(Config { log_level })
    }
}
