//! Non-blocking remote log shipping.
//!
//! Code that logs receives a [`Logger`]. Each call becomes a [`LogEntry`]
//! tagged with the instruction identifier found in the caller's [`Scope`] and
//! is pushed onto a bounded buffer without blocking; when the buffer is full
//! the message is written to stderr instead. A background [`RemoteWriter`]
//! drains the buffer into a streaming connection and reconnects after a fixed
//! delay whenever the connection fails.
//!
//! ```no_run
//! use logship::{RemoteLoggingBuilder, Scope, TcpConnector, setup_remote_logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RemoteLoggingBuilder::new()
//!     .with_endpoint("localhost:8088")
//!     .build()?;
//! let logging = setup_remote_logging(&config, TcpConnector::from_config(&config))?;
//!
//! let logger = logging.logger();
//! let scope = Scope::root().with_instruction_id("bundle-1");
//! logger.info(&scope, "processing bundle");
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cancel;
pub mod config;
pub mod context;
pub mod fallback;
pub mod history;
pub mod level;
#[cfg(feature = "log-compat")]
pub mod log_compat;
pub mod log_entry;
pub mod remote;
pub mod setup;
pub mod sink;

pub use buffer::{DEFAULT_BUFFER_CAPACITY, EntryConsumer, EntryProducer, entry_buffer};
pub use cancel::{CancelToken, Canceller, cancellation};
pub use config::{ConfigError, RemoteLoggingBuilder, RemoteLoggingConfig};
pub use context::{ContextKey, INSTRUCTION_ID, Scope};
pub use fallback::Fallback;
pub use level::{Level, Severity};
#[cfg(feature = "log-compat")]
pub use log_compat::{BridgeError, install_log_bridge};
pub use log_entry::{CallSite, LogEntry, LogEntryList};
pub use remote::{
    Connection, Connector, LogStream, RemoteWriter, TcpConnector, WriterError, WriterSettings,
    WriterState,
};
pub use setup::{RemoteLogging, setup_remote_logging, setup_remote_logging_with_fallback};
pub use sink::{LogSink, Logger, NoopSink, RemoteSink};
