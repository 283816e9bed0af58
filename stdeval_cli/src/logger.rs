use anyhow::Result;
use console::style;
use log::{Level, LevelFilter, Metadata, Record};

struct Logger {
    level: LevelFilter,
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let prefix = match record.level() {
                Level::Error => style("error: ").red().bold(),
                Level::Warn => style("warn:  ").yellow().bold(),
                Level::Info => style("info:  ").cyan().bold(),
                Level::Debug => style("debug: ").dim().bold(),
                Level::Trace => style("trace: ").dim(),
            };
            eprintln!("{}{}", prefix, record.args());
        }
    }

    fn flush(&self) {}
}

pub fn init(level: LevelFilter) -> Result<()> {
    log::set_boxed_logger(Box::new(Logger { level }))
        .map(|()| log::set_max_level(level))?;
    Ok(())
}
