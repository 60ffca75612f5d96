//! Remote delivery of buffered log entries.
//!
//! [`RemoteWriter`] drains the log buffer into a streaming call opened
//! through a [`Connector`]. When the connection fails it reports the failure
//! on the fallback channel, waits a fixed delay and reconnects, for as long as
//! its cancel token allows. [`TcpConnector`] is the default connector:
//! length-prefixed MessagePack frames over TCP, TLS, or a Unix domain socket.

mod serialise;
mod transport;
mod writer;

#[cfg(test)]
mod tests;

pub use serialise::{WireTimestamp, decode_batch, serialise_batch};
pub use transport::{
    Connection, Connector, Endpoint, FramedLogStream, LogStream, SocketConnection, TcpConnector,
    TlsOptions,
};
pub use writer::{RemoteWriter, WriterError, WriterSettings, WriterState, WriterStatus};
