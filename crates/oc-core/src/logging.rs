//! Logging infrastructure for the PPU recompiler

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, LogLevel};

/// Map a configured level to a tracing level (`None` for `Off`)
pub fn level_of(log_level: LogLevel) -> Option<Level> {
    match log_level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    }
}

/// Initialize the logging system based on configuration
pub fn init(config: &Config) {
    let Some(level) = level_of(config.debug.log_level) else {
        return;
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true),
    );

    if config.debug.log_to_file {
        if let Ok(file) = std::fs::File::create(&config.debug.log_path) {
            let file_layer = fmt::layer().with_writer(file).with_ansi(false);
            let _ = subscriber.with(file_layer).try_init();
        } else {
            let _ = subscriber.try_init();
        }
    } else {
        let _ = subscriber.try_init();
    }
}

/// Initialize logging with default settings (for tests and tools)
pub fn init_default() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Log a PPU trace message
#[macro_export]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "ppu", $($arg)*)
    };
}

/// Log a PPU debug message
#[macro_export]
macro_rules! ppu_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "ppu", $($arg)*)
    };
}

/// Log a translator trace message
#[macro_export]
macro_rules! jit_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "jit", $($arg)*)
    };
}

/// Log a translator debug message
#[macro_export]
macro_rules! jit_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "jit", $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_of(LogLevel::Off), None);
        assert_eq!(level_of(LogLevel::Warn), Some(Level::WARN));
        assert_eq!(level_of(LogLevel::Trace), Some(Level::TRACE));
    }
}
