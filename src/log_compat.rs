//! Compatibility bridge for the Rust `log` crate.
//!
//! [`install_log_bridge`] registers an implementation of `log::Log` that
//! forwards records into a [`Logger`], so libraries logging through the
//! `log` facade are shipped too. `log` records carry no [`Scope`], so bridged
//! entries never have an instruction reference.
//!
//! Records emitted by this crate itself (the writer's own diagnostics) never
//! enter the buffer they describe. Warnings and errors among them are written
//! to the fallback channel; routine debug and info chatter is dropped.

use std::sync::OnceLock;

use log::{LevelFilter, Metadata, Record};
use thiserror::Error;

use crate::{
    context::Scope,
    fallback::Fallback,
    level::Level,
    log_entry::CallSite,
    sink::Logger,
};

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Errors raised when installing the bridge.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("the logship log bridge is already installed")]
    AlreadyInstalled,
    #[error("another global logger is already set")]
    ForeignLogger,
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace | log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

/// Adapter implementing `log::Log` on top of a [`Logger`].
pub struct LogBridge {
    logger: Logger,
    fallback: Fallback,
}

impl LogBridge {
    pub fn new(logger: Logger, fallback: Fallback) -> Self {
        Self { logger, fallback }
    }
}

fn is_own_target(target: &str) -> bool {
    target
        .strip_prefix(OWN_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        log::max_level() >= metadata.level().to_level_filter()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        if is_own_target(record.target()) {
            if record.level() > log::Level::Warn {
                return;
            }
            self.fallback
                .write_line(&format!("{} {}: {message}", record.level(), record.target()));
            return;
        }
        let site = record
            .file()
            .zip(record.line())
            .map(|(file, line)| CallSite::new(file, line));
        self.logger
            .log_at(&Scope::root(), Level::from(record.level()), site, &message);
    }

    fn flush(&self) {}
}

static BRIDGE: OnceLock<LogBridge> = OnceLock::new();

/// Install the bridge as the global `log` logger.
///
/// Installation happens at most once per process; later calls fail with
/// [`BridgeError::AlreadyInstalled`].
pub fn install_log_bridge(logger: Logger, fallback: Fallback) -> Result<(), BridgeError> {
    let mut installed_here = false;
    let bridge = BRIDGE.get_or_init(|| {
        installed_here = true;
        LogBridge::new(logger, fallback)
    });
    if !installed_here {
        return Err(BridgeError::AlreadyInstalled);
    }
    log::set_logger(bridge).map_err(|_| BridgeError::ForeignLogger)?;
    log::set_max_level(LevelFilter::Trace);
    Ok(())
}
