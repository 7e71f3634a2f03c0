//! Client configuration.
//!
//! Builders validate before the core is constructed; the handlers trust
//! the values they receive. Validation collects every problem instead of
//! stopping at the first one.

use std::time::Duration;

use crate::error::{Result, RoomzinError};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Default timeout for one HTTP discovery probe.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default TCP keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_millis(30_000);

/// Default bound of the outbound request queue.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 1024;

/// Default cadence of the follower re-probe.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(2_000);

/// Configuration for a clustered deployment.
///
/// Immutable for the handler's lifetime.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Seed hosts probed for topology discovery.
    pub seed_hosts: Vec<String>,
    /// HTTP port of the discovery endpoints.
    pub api_port: u16,
    /// TCP port of the cache protocol.
    pub tcp_port: u16,
    /// Bearer token for login and probes.
    pub auth_token: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Timeout for one HTTP probe.
    pub http_timeout: Duration,
    /// TCP keep-alive interval.
    pub keep_alive: Duration,
    /// Bound of the outbound request queue.
    pub max_queue_depth: usize,
    /// Cadence of the follower re-probe.
    pub probe_interval: Duration,
}

/// Builder for [`ClusterConfig`].
///
/// # Example
///
/// ```
/// use roomzin_client::config::ClusterConfigBuilder;
///
/// let cfg = ClusterConfigBuilder::new()
///     .seed_hosts(["10.0.0.1", "10.0.0.2"])
///     .api_port(9000)
///     .tcp_port(7777)
///     .auth_token("secret")
///     .build()
///     .unwrap();
/// assert_eq!(cfg.seed_hosts.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    seed_hosts: Vec<String>,
    api_port: u16,
    tcp_port: u16,
    auth_token: String,
    request_timeout: Option<Duration>,
    http_timeout: Option<Duration>,
    keep_alive: Option<Duration>,
    max_queue_depth: Option<usize>,
    probe_interval: Option<Duration>,
}

impl ClusterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the seed host list.
    pub fn seed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_hosts = hosts
            .into_iter()
            .map(|h| h.into().trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        self
    }

    /// Set the seed host list from a comma-separated string.
    pub fn seed_hosts_csv(self, hosts: &str) -> Self {
        self.seed_hosts(hosts.split(','))
    }

    pub fn api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval);
        self
    }

    pub fn max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = Some(interval);
        self
    }

    /// Validate and build the config, collecting every violation.
    pub fn build(self) -> Result<ClusterConfig> {
        let mut errors = Vec::new();
        if self.seed_hosts.is_empty() {
            errors.push("at least one seed address is required");
        }
        if self.tcp_port == 0 {
            errors.push("TCP port is required");
        }
        if self.api_port == 0 {
            errors.push("API port is required in clustered mode");
        }
        if self.auth_token.is_empty() {
            errors.push("authentication requires a token");
        }
        if !errors.is_empty() {
            return Err(RoomzinError::Validation(format!(
                "cluster config: {}",
                errors.join("; ")
            )));
        }

        Ok(ClusterConfig {
            seed_hosts: self.seed_hosts,
            api_port: self.api_port,
            tcp_port: self.tcp_port,
            auth_token: self.auth_token,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            http_timeout: self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT),
            keep_alive: self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE),
            max_queue_depth: self.max_queue_depth.unwrap_or(DEFAULT_MAX_QUEUE_DEPTH),
            probe_interval: self.probe_interval.unwrap_or(DEFAULT_PROBE_INTERVAL),
        })
    }
}

/// Configuration for a single-node deployment.
#[derive(Debug, Clone)]
pub struct SingleConfig {
    /// Server host, with or without a port suffix.
    pub host: String,
    /// TCP port of the cache protocol.
    pub tcp_port: u16,
    /// Bearer token for login.
    pub auth_token: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// TCP keep-alive interval.
    pub keep_alive: Duration,
}

/// Builder for [`SingleConfig`].
#[derive(Debug, Default)]
pub struct SingleConfigBuilder {
    host: String,
    tcp_port: u16,
    auth_token: String,
    request_timeout: Option<Duration>,
    keep_alive: Option<Duration>,
}

impl SingleConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim().to_string();
        self
    }

    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval);
        self
    }

    /// Validate and build the config, collecting every violation.
    pub fn build(self) -> Result<SingleConfig> {
        let mut errors = Vec::new();
        if self.host.is_empty() {
            errors.push("server address is required");
        }
        if self.tcp_port == 0 {
            errors.push("TCP port is required");
        }
        if self.auth_token.is_empty() {
            errors.push("authentication requires a token");
        }
        if !errors.is_empty() {
            return Err(RoomzinError::Validation(format!(
                "single config: {}",
                errors.join("; ")
            )));
        }

        Ok(SingleConfig {
            host: self.host,
            tcp_port: self.tcp_port,
            auth_token: self.auth_token,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            keep_alive: self.keep_alive.unwrap_or(DEFAULT_KEEP_ALIVE),
        })
    }
}
