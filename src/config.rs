//! Configuration surface.
//!
//! A plain, serializable struct with defaults, built up through a small
//! builder. Parsing this from a file, env, or CLI flags is left to the
//! host application.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

pub const DEFAULT_CONNECT_TIMEOUT_MILLIS: u64 = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MILLIS: u64 = 30_000;
pub const DEFAULT_IDLE_CONNECTION_MILLIS: u64 = 300_000;
pub const DEFAULT_VERSIONS_REQUEST_TIMEOUT_MILLIS: u64 = 500;
pub const DEFAULT_MAX_ASYNC_REQUESTS: usize = 10;
pub const DEFAULT_CLIENT_ID: &str = "kafka-node-client";

/// Bootstrap/reconnect retry schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryOptions {
    pub retries: u32,
    pub factor: f64,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub randomize: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        RetryOptions {
            retries: 5,
            factor: 2.0,
            min_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(60),
            randomize: true,
        }
    }
}

/// API-version negotiation options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VersionNegotiationOptions {
    pub disabled: bool,
    pub request_timeout: Duration,
}

impl Default for VersionNegotiationOptions {
    fn default() -> Self {
        VersionNegotiationOptions {
            disabled: false,
            request_timeout: Duration::from_millis(DEFAULT_VERSIONS_REQUEST_TIMEOUT_MILLIS),
        }
    }
}

/// TLS transport options. `BrokerConnection::open`
/// turns these paths into a `rustls::ClientConfig` via `network::tls::build_connector`
/// when set; leaving every field `None` still builds a connector, but one
/// trusting no roots, so every handshake fails closed rather than open.
#[derive(Debug, Clone, Default)]
pub struct SslOptions {
    pub ca_cert_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub kafka_hosts: Vec<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub idle_connection: Duration,
    pub auto_connect: bool,
    pub ssl_options: Option<SslOptions>,
    pub client_id: String,
    pub versions: VersionNegotiationOptions,
    pub connect_retry_options: RetryOptions,
    pub max_async_requests: usize,
    pub no_ack_batch_options: Option<()>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            kafka_hosts: vec!["localhost:9092".to_owned()],
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MILLIS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MILLIS),
            idle_connection: Duration::from_millis(DEFAULT_IDLE_CONNECTION_MILLIS),
            auto_connect: true,
            ssl_options: None,
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            versions: VersionNegotiationOptions::default(),
            connect_retry_options: RetryOptions::default(),
            max_async_requests: DEFAULT_MAX_ASYNC_REQUESTS,
            no_ack_batch_options: None,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || !self.client_id.is_ascii() {
            return Err(Error::InvalidClientId(self.client_id.clone()));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = ClientConfigBuilder::default();
        builder.config.kafka_hosts = hosts.into_iter().map(Into::into).collect();
        builder
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn idle_connection(mut self, timeout: Duration) -> Self {
        self.config.idle_connection = timeout;
        self
    }

    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.config.auto_connect = auto_connect;
        self
    }

    pub fn ssl_options(mut self, opts: SslOptions) -> Self {
        self.config.ssl_options = Some(opts);
        self
    }

    pub fn versions_disabled(mut self, disabled: bool) -> Self {
        self.config.versions.disabled = disabled;
        self
    }

    pub fn connect_retry_options(mut self, opts: RetryOptions) -> Self {
        self.config.connect_retry_options = opts;
        self
    }

    pub fn max_async_requests(mut self, n: usize) -> Self {
        self.config.max_async_requests = n;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parses the `kafkaHost` comma-list, unwrapping bracketed IPv6 hosts.
pub fn parse_hosts(raw: &str) -> Vec<(String, u16)> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| parse_host(s.trim()))
        .collect()
}

fn parse_host(s: &str) -> Option<(String, u16)> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, rest) = rest.split_once(']')?;
        let port = rest.strip_prefix(':')?;
        return Some((host.to_owned(), port.parse().ok()?));
    }
    let (host, port) = s.rsplit_once(':')?;
    Some((host.to_owned(), port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_hosts() {
        let hosts = parse_hosts("a:9092,b:9093");
        assert_eq!(hosts, vec![("a".to_owned(), 9092), ("b".to_owned(), 9093)]);
    }

    #[test]
    fn unwraps_bracketed_ipv6_hosts() {
        let hosts = parse_hosts("[::1]:9092");
        assert_eq!(hosts, vec![("::1".to_owned(), 9092)]);
    }

    #[test]
    fn rejects_empty_client_id() {
        let config = ClientConfigBuilder::from_hosts(["a:9092"])
            .client_id("")
            .build();
        assert!(config.is_err());
    }
}
