// ABOUTME: gRPC channel creation with keep-alive and TLS configuration.
// ABOUTME: Turns a broker host (bare or URL) into a connected tonic Channel.

use std::time::Duration;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use crate::error::GrpcClientError;

/// Keep-alive settings for the long-lived broker stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveConfig {
    /// Interval between HTTP/2 pings while the connection is idle.
    pub interval: Duration,
    /// How long to wait for a ping ack before the connection is considered dead.
    pub timeout: Duration,
    /// Ping even when no stream is open.
    pub while_idle: bool,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(20),
            while_idle: true,
        }
    }
}

/// Configuration for creating a gRPC channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Full URL of the server (e.g., "https://grpc.example.com").
    pub address: String,
    /// Keep-alive configuration. If None, keep-alive is disabled.
    pub keep_alive: Option<KeepAliveConfig>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Enable TLS for the connection.
    pub use_tls: bool,
}

impl ChannelConfig {
    /// Channel config for a full URL. `https://` enables TLS.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into().trim().to_string();
        let use_tls = address.to_lowercase().starts_with("https://");
        Self {
            address,
            keep_alive: Some(KeepAliveConfig::default()),
            connect_timeout: Some(Duration::from_secs(30)),
            use_tls,
        }
    }

    /// Channel config for a broker host that may or may not carry a scheme.
    ///
    /// Bare hosts (`grpc.example.com`, `localhost:5051`) get `https://`, or
    /// `http://` when `insecure` is set. A host that already has a scheme is
    /// normalised to match `insecure`.
    pub fn for_host(host: &str, insecure: bool) -> Self {
        let host = host.trim();
        let config = if has_scheme(host) {
            Self::new(host)
        } else if insecure {
            Self::new(format!("http://{host}"))
        } else {
            Self::new(format!("https://{host}"))
        };

        if insecure {
            config.without_tls()
        } else {
            config.with_tls()
        }
    }

    /// Disable keep-alive.
    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive = None;
        self
    }

    /// Set custom keep-alive configuration.
    pub fn with_keep_alive(mut self, config: KeepAliveConfig) -> Self {
        self.keep_alive = Some(config);
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Enable TLS, rewriting an `http://` address to `https://`.
    pub fn with_tls(mut self) -> Self {
        self.use_tls = true;
        self.address = replace_scheme(&self.address, "https://");
        self
    }

    /// Disable TLS, rewriting an `https://` address to `http://`.
    pub fn without_tls(mut self) -> Self {
        self.use_tls = false;
        self.address = replace_scheme(&self.address, "http://");
        self
    }
}

fn has_scheme(address: &str) -> bool {
    address.contains("://")
}

fn replace_scheme(address: &str, scheme: &str) -> String {
    match address.find("://") {
        Some(idx) => format!("{scheme}{}", &address[idx + 3..]),
        None => format!("{scheme}{address}"),
    }
}

/// Connect a gRPC channel with the given configuration.
///
/// Keep-alive matters for the broker stream: intermediaries drop idle
/// HTTP/2 connections, and pings surface a dead peer as a stream error.
pub async fn create_channel(config: &ChannelConfig) -> Result<Channel, GrpcClientError> {
    let mut endpoint = Endpoint::from_shared(config.address.clone())
        .map_err(|e| GrpcClientError::InvalidAddress(e.to_string()))?;

    if config.use_tls {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new())
            .map_err(|e| GrpcClientError::ConnectionFailed(format!("TLS config error: {}", e)))?;
    }

    if let Some(ka) = &config.keep_alive {
        endpoint = endpoint
            .http2_keep_alive_interval(ka.interval)
            .keep_alive_timeout(ka.timeout)
            .keep_alive_while_idle(ka.while_idle);
    }

    if let Some(timeout) = config.connect_timeout {
        endpoint = endpoint.connect_timeout(timeout);
    }

    let channel = endpoint
        .connect()
        .await
        .map_err(|e| GrpcClientError::ConnectionFailed(e.to_string()))?;

    tracing::debug!(
        address = %config.address,
        keep_alive = config.keep_alive.is_some(),
        use_tls = config.use_tls,
        "gRPC channel connected"
    );

    Ok(channel)
}
