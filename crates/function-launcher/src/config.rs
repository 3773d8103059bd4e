// ABOUTME: Launcher configuration.
// ABOUTME: BrokerConfig for reaching and authenticating with the broker, LoopSettings for the dispatch loop.

use std::fmt;
use std::time::Duration;

use launcher_grpc::ChannelConfig;

/// Broker host used when none is configured.
pub const DEFAULT_GRPC_HOST: &str = "grpc.openobd.com";

/// Cluster used when none is configured.
pub const DEFAULT_CLUSTER_ID: &str = "001";

/// Where the broker lives and who we are.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// `host[:port]` or a full URL.
    pub host: String,
    pub cluster_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Plaintext HTTP/2 instead of TLS.
    pub insecure: bool,
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    /// Config for the default broker and cluster.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_GRPC_HOST.to_string(),
            cluster_id: DEFAULT_CLUSTER_ID.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            insecure: false,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// URL the channel connects to.
    pub fn endpoint_url(&self) -> String {
        self.channel_config().address
    }

    /// Channel settings. Keep-alive stays on so idle streams survive load balancers.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::for_host(&self.host, self.insecure).with_connect_timeout(self.connect_timeout)
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("cluster_id", &self.cluster_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("insecure", &self.insecure)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Timing and retry knobs for the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSettings {
    /// Sleep between polls while nothing is queued.
    pub poll_interval: Duration,
    /// Reconnect attempts before the launcher gives up.
    pub max_reconnect_attempts: u32,
    /// Base of the linear reconnect backoff.
    pub reconnect_backoff: Duration,
    /// Upper bound for one executor start call.
    pub dispatch_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_reconnect_attempts: 10,
            reconnect_backoff: Duration::from_secs(1),
            dispatch_timeout: Duration::from_secs(5),
        }
    }
}

impl LoopSettings {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }
}
