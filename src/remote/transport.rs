//! Connection factory used by the remote writer, plus the default socket
//! implementation.
//!
//! The writer only sees the [`Connector`], [`Connection`] and [`LogStream`]
//! traits. [`TcpConnector`] implements them over TCP (optionally TLS) or a
//! Unix domain socket, sending each batch as a length-prefixed MessagePack
//! frame.

use std::{
    fmt,
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

#[cfg(unix)]
use std::thread;

#[cfg(unix)]
use crossbeam_channel::{bounded, select};
use native_tls::{TlsConnector, TlsStream};
use parking_lot::Mutex;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::{cancel::CancelToken, config::RemoteLoggingConfig, log_entry::LogEntryList};

use super::serialise::{frame_payload, serialise_batch};

/// Produces connections to the remote logging service.
pub trait Connector: Send + 'static {
    type Connection: Connection;

    /// Connect to `endpoint`, giving up after `timeout`.
    ///
    /// Implementations should return early once `cancel` fires.
    fn dial(
        &mut self,
        endpoint: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> io::Result<Self::Connection>;
}

/// An established connection able to carry a client-streaming log call.
pub trait Connection: Send {
    type Stream: LogStream;

    fn open_log_stream(&mut self) -> io::Result<Self::Stream>;

    /// Release the connection. Called exactly once, after the stream is closed.
    fn close(&mut self);
}

/// Send side of a client-streaming log call.
pub trait LogStream: Send {
    fn send(&mut self, batch: &LogEntryList) -> io::Result<()>;

    /// Half-close the call. Called exactly once, before the connection closes.
    fn close_send(&mut self) -> io::Result<()>;
}

/// Parsed endpoint address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`, IPv6 literals in brackets.
    Tcp { host: String, port: u16 },
    /// `unix:/path/to/socket`.
    Unix(PathBuf),
}

impl Endpoint {
    pub fn parse(raw: &str) -> io::Result<Self> {
        let raw = raw.trim();
        if let Some(path) = raw.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid_endpoint(raw, "missing socket path"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        let (host, port) = raw
            .rsplit_once(':')
            .ok_or_else(|| invalid_endpoint(raw, "expected host:port"))?;
        let port = port
            .parse()
            .map_err(|_| invalid_endpoint(raw, "port is not a number"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid_endpoint(raw, "missing host"));
        }
        Ok(Self::Tcp {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

fn invalid_endpoint(raw: &str, reason: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("invalid endpoint {raw:?}: {reason}"),
    )
}

/// TLS connection options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    /// Domain name presented during the TLS handshake.
    pub domain: String,
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

impl TlsOptions {
    fn connector(&self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self.insecure_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}

/// Active socket state.
enum ActiveConnection {
    PlainTcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ActiveConnection {
    fn set_write_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.set_write_timeout(Some(timeout)),
            ActiveConnection::Tls(stream) => stream.get_ref().set_write_timeout(Some(timeout)),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.set_write_timeout(Some(timeout)),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.write_all(buf),
            ActiveConnection::Tls(stream) => stream.write_all(buf),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.flush(),
            ActiveConnection::Tls(stream) => stream.flush(),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.flush(),
        }
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.shutdown(Shutdown::Write),
            ActiveConnection::Tls(stream) => {
                stream.shutdown()?;
                stream.get_ref().shutdown(Shutdown::Write)
            }
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.shutdown(Shutdown::Write),
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match self {
            ActiveConnection::PlainTcp(stream) => stream.shutdown(Shutdown::Both),
            ActiveConnection::Tls(stream) => stream.get_ref().shutdown(Shutdown::Both),
            #[cfg(unix)]
            ActiveConnection::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

/// Default [`Connector`] over TCP, TLS, or Unix domain sockets.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    tls: Option<TlsOptions>,
    write_timeout: Duration,
    max_frame_size: usize,
}

impl TcpConnector {
    pub fn new(tls: Option<TlsOptions>, write_timeout: Duration, max_frame_size: usize) -> Self {
        Self {
            tls,
            write_timeout,
            max_frame_size,
        }
    }

    /// Connector using the transport settings of `config`.
    pub fn from_config(config: &RemoteLoggingConfig) -> Self {
        Self::new(
            config.tls.clone(),
            config.write_timeout,
            config.max_frame_size,
        )
    }

    fn connect_tcp(
        host: &str,
        port: u16,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> io::Result<TcpStream> {
        let deadline = Instant::now() + timeout;
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut last_err = None;
        for addr in addrs {
            match connect_addr(&addr, deadline, cancel) {
                Ok(stream) => {
                    stream.set_nonblocking(false)?;
                    return Ok(stream);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => return Err(err),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host}:{port} resolved to no addresses"),
            )
        }))
    }

    fn wrap_tls(
        &self,
        tls: &TlsOptions,
        stream: TcpStream,
        timeout: Duration,
    ) -> io::Result<ActiveConnection> {
        let connector = tls.connector()?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let stream = connector
            .connect(&tls.domain, stream)
            .map_err(io::Error::other)?;
        let tcp_ref = stream.get_ref();
        tcp_ref.set_read_timeout(None)?;
        tcp_ref.set_write_timeout(None)?;
        Ok(ActiveConnection::Tls(Box::new(stream)))
    }
}

impl Connector for TcpConnector {
    type Connection = SocketConnection;

    fn dial(
        &mut self,
        endpoint: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> io::Result<SocketConnection> {
        let active = match Endpoint::parse(endpoint)? {
            Endpoint::Tcp { host, port } => {
                let stream = Self::connect_tcp(&host, port, timeout, cancel)?;
                match &self.tls {
                    Some(tls) => self.wrap_tls(tls, stream, timeout)?,
                    None => ActiveConnection::PlainTcp(stream),
                }
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                ActiveConnection::Unix(connect_unix(path, timeout, cancel)?)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix domain sockets are not supported on this platform",
                ));
            }
        };
        Ok(SocketConnection {
            socket: Arc::new(Mutex::new(active)),
            write_timeout: self.write_timeout,
            max_frame_size: self.max_frame_size,
        })
    }
}

/// Longest single blocking connect; the cancel token is checked in between.
const DIAL_SLICE: Duration = Duration::from_millis(100);

fn dial_cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "dial cancelled")
}

/// Connect to `addr` in short slices until `deadline`, stopping once `cancel`
/// fires.
fn connect_addr(
    addr: &SocketAddr,
    deadline: Instant,
    cancel: &CancelToken,
) -> io::Result<TcpStream> {
    loop {
        if cancel.is_cancelled() {
            return Err(dial_cancelled());
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {addr} timed out"),
            ));
        }
        match TcpStream::connect_timeout(addr, remaining.min(DIAL_SLICE)) {
            Ok(stream) => return Ok(stream),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
            Err(err) => return Err(err),
        }
    }
}

/// `UnixStream` has no connect timeout, so the blocking connect runs on a
/// helper thread. On timeout or cancellation the helper is abandoned and its
/// stream, if it ever connects, is dropped.
#[cfg(unix)]
fn connect_unix(
    path: PathBuf,
    timeout: Duration,
    cancel: &CancelToken,
) -> io::Result<UnixStream> {
    if cancel.is_cancelled() {
        return Err(dial_cancelled());
    }
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("logship-unix-dial".into())
        .spawn(move || {
            let _ = tx.send(UnixStream::connect(&path));
        })?;
    select! {
        recv(rx) -> result => {
            result.unwrap_or_else(|_| Err(io::Error::other("unix dial thread exited")))
        }
        recv(cancel.receiver()) -> _ => Err(dial_cancelled()),
        default(timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "connecting to unix socket timed out",
        )),
    }
}

/// Connection produced by [`TcpConnector`].
pub struct SocketConnection {
    socket: Arc<Mutex<ActiveConnection>>,
    write_timeout: Duration,
    max_frame_size: usize,
}

impl Connection for SocketConnection {
    type Stream = FramedLogStream;

    fn open_log_stream(&mut self) -> io::Result<FramedLogStream> {
        self.socket.lock().set_write_timeout(self.write_timeout)?;
        Ok(FramedLogStream {
            socket: Arc::clone(&self.socket),
            max_frame_size: self.max_frame_size,
        })
    }

    fn close(&mut self) {
        if let Err(err) = self.socket.lock().shutdown() {
            log::debug!("closing log connection failed: {err}");
        }
    }
}

impl fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConnection")
            .field("write_timeout", &self.write_timeout)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

/// Log stream writing one length-prefixed MessagePack frame per batch.
pub struct FramedLogStream {
    socket: Arc<Mutex<ActiveConnection>>,
    max_frame_size: usize,
}

impl LogStream for FramedLogStream {
    fn send(&mut self, batch: &LogEntryList) -> io::Result<()> {
        let payload = serialise_batch(batch)?;
        let frame = frame_payload(&payload, self.max_frame_size).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "encoded batch of {} bytes exceeds frame limit of {} bytes",
                    payload.len(),
                    self.max_frame_size
                ),
            )
        })?;
        let mut socket = self.socket.lock();
        socket.write_all(&frame)?;
        socket.flush()
    }

    fn close_send(&mut self) -> io::Result<()> {
        self.socket.lock().shutdown_write()
    }
}

impl fmt::Debug for FramedLogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedLogStream")
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}
