//! Configuration for remote log shipping.
//!
//! [`RemoteLoggingBuilder`] collects optional overrides, validates them and
//! produces a [`RemoteLoggingConfig`]. Builders can also be read from the
//! `[remote_logging]` section of an INI file:
//!
//! ```ini
//! [remote_logging]
//! endpoint = logs.internal:8088
//! capacity = 2000
//! retry_delay_ms = 5000
//! tls_domain = logs.internal
//! ```

use std::{fs, path::Path, str::FromStr, time::Duration};

use ini::Ini;
use thiserror::Error;

use crate::{
    buffer::DEFAULT_BUFFER_CAPACITY,
    remote::{Endpoint, TlsOptions},
};

/// Default timeout for establishing a connection.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default fixed delay between a failure and the next connection attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Default timeout applied to each stream write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default maximum encoded batch size (in bytes).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20; // 1 MiB
/// Default number of recently sent entries kept for inspection.
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;
/// INI section read by [`RemoteLoggingBuilder::from_ini_str`].
pub const INI_SECTION: &str = "remote_logging";

/// Errors raised while assembling a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid remote logging configuration: {0}")]
    InvalidConfig(String),
    #[error("malformed configuration file: {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Validated settings consumed by
/// [`setup_remote_logging`](crate::setup_remote_logging) and
/// [`TcpConnector`](crate::remote::TcpConnector).
#[derive(Clone, Debug)]
pub struct RemoteLoggingConfig {
    pub endpoint: String,
    pub capacity: usize,
    pub dial_timeout: Duration,
    pub retry_delay: Duration,
    pub write_timeout: Duration,
    pub max_frame_size: usize,
    pub history_capacity: usize,
    pub tls: Option<TlsOptions>,
}

impl RemoteLoggingConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            capacity: DEFAULT_BUFFER_CAPACITY,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            tls: None,
        }
    }
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

#[derive(Clone, Debug, Default)]
struct TlsConfig {
    domain: Option<String>,
    insecure: bool,
}

/// Builder for [`RemoteLoggingConfig`].
#[derive(Clone, Debug, Default)]
pub struct RemoteLoggingBuilder {
    endpoint: Option<String>,
    capacity: Option<usize>,
    dial_timeout_ms: Option<u64>,
    retry_delay_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    max_frame_size: Option<usize>,
    history_capacity: Option<usize>,
    tls: Option<TlsConfig>,
}

impl RemoteLoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint: `host:port`, or `unix:/path/to/socket`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Enable TLS. Without a domain, the endpoint's host name is presented.
    pub fn with_tls(mut self, domain: Option<String>, insecure: bool) -> Self {
        self.tls = Some(TlsConfig { domain, insecure });
        self
    }

    option_setter!(
        #[doc = "Set the bounded buffer capacity."]
        with_capacity,
        capacity,
        usize
    );
    option_setter!(with_dial_timeout_ms, dial_timeout_ms, u64);
    option_setter!(
        #[doc = "Set the fixed delay between reconnection attempts."]
        with_retry_delay_ms,
        retry_delay_ms,
        u64
    );
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_max_frame_size, max_frame_size, usize);
    option_setter!(
        #[doc = "Set how many sent entries are remembered. Zero disables the history."]
        with_history_capacity,
        history_capacity,
        usize
    );

    /// Validate the overrides and produce a configuration.
    pub fn build(&self) -> Result<RemoteLoggingConfig, ConfigError> {
        let endpoint = self.validate_endpoint()?;
        let mut config = RemoteLoggingConfig::new(endpoint.to_string());
        if let Some(capacity) = self.capacity {
            config.capacity = ensure_positive!(capacity, "capacity")?;
        }
        if let Some(ms) = self.dial_timeout_ms {
            config.dial_timeout = Duration::from_millis(ensure_positive!(ms, "dial_timeout_ms")?);
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry_delay = Duration::from_millis(ensure_positive!(ms, "retry_delay_ms")?);
        }
        if let Some(ms) = self.write_timeout_ms {
            config.write_timeout =
                Duration::from_millis(ensure_positive!(ms, "write_timeout_ms")?);
        }
        if let Some(size) = self.max_frame_size {
            config.max_frame_size = ensure_positive!(size, "max_frame_size")?;
        }
        if let Some(history) = self.history_capacity {
            config.history_capacity = history;
        }
        config.tls = self.build_tls(&endpoint)?;
        Ok(config)
    }

    fn validate_endpoint(&self) -> Result<Endpoint, ConfigError> {
        let raw = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| {
                ConfigError::InvalidConfig("remote logging requires an endpoint".into())
            })?;
        Endpoint::parse(raw).map_err(|err| ConfigError::InvalidConfig(err.to_string()))
    }

    fn build_tls(&self, endpoint: &Endpoint) -> Result<Option<TlsOptions>, ConfigError> {
        let Some(tls) = &self.tls else {
            return Ok(None);
        };
        match endpoint {
            Endpoint::Unix(_) => Err(ConfigError::InvalidConfig(
                "tls is only supported for tcp endpoints".into(),
            )),
            Endpoint::Tcp { host, .. } => Ok(Some(TlsOptions {
                domain: tls.domain.clone().unwrap_or_else(|| host.clone()),
                insecure_skip_verify: tls.insecure,
            })),
        }
    }

    /// Read overrides from the `[remote_logging]` section of INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let section = ini.section(Some(INI_SECTION)).ok_or_else(|| {
            ConfigError::InvalidConfig(format!("missing [{INI_SECTION}] section"))
        })?;

        let mut builder = Self::new();
        let mut tls_domain = None;
        let mut tls_insecure = None;
        for (key, value) in section.iter() {
            match key {
                "endpoint" => builder = builder.with_endpoint(value),
                "capacity" => builder = builder.with_capacity(parse_value(key, value)?),
                "dial_timeout_ms" => {
                    builder = builder.with_dial_timeout_ms(parse_value(key, value)?);
                }
                "retry_delay_ms" => {
                    builder = builder.with_retry_delay_ms(parse_value(key, value)?);
                }
                "write_timeout_ms" => {
                    builder = builder.with_write_timeout_ms(parse_value(key, value)?);
                }
                "max_frame_size" => {
                    builder = builder.with_max_frame_size(parse_value(key, value)?);
                }
                "history_capacity" => {
                    builder = builder.with_history_capacity(parse_value(key, value)?);
                }
                "tls_domain" => tls_domain = Some(value.to_owned()),
                "tls_insecure" => tls_insecure = Some(parse_value(key, value)?),
                other => {
                    return Err(ConfigError::InvalidConfig(format!(
                        "unknown key {other:?} in [{INI_SECTION}]"
                    )));
                }
            }
        }
        if tls_domain.is_some() || tls_insecure.is_some() {
            builder = builder.with_tls(tls_domain, tls_insecure.unwrap_or(false));
        }
        Ok(builder)
    }

    /// Read overrides from an INI file on disk.
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_ini_str(&text)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidConfig(format!("{key} has invalid value {value:?}")))
}
