//! Configuration types for corectld-dns.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::error::DnsError;

/// Recursive resolvers used when none are configured.
pub const DEFAULT_NAMESERVERS: [&str; 2] = ["8.8.8.8:53", "8.8.4.4:53"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Record store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a TOML file (optional) overlaid with
    /// `CORECTLD_DNS__*` environment variables.
    pub fn load(path: &Path) -> Result<Self, DnsError> {
        Self::load_with(path, environment())
    }

    fn load_with(path: &Path, env: config::Environment) -> Result<Self, DnsError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| DnsError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), DnsError> {
        if self.dns.domain_root.trim_matches('.').is_empty() {
            return Err(DnsError::Config("domain_root must not be empty".into()));
        }
        if self.dns.local_domain.trim_matches('.').is_empty() {
            return Err(DnsError::Config("local_domain must not be empty".into()));
        }
        if self.dns.restart_delay_ms == 0 {
            return Err(DnsError::Config("restart_delay_ms must be positive".into()));
        }
        Ok(())
    }
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for the DNS server to listen on (UDP and TCP), `host:port`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Zone served from the record store (e.g. "coreos.local").
    #[serde(default = "default_domain")]
    pub domain_root: String,

    /// Suffix appended to registered host names.
    #[serde(default = "default_domain")]
    pub local_domain: String,

    /// Upstream recursive resolvers; empty means [`DEFAULT_NAMESERVERS`].
    #[serde(default)]
    pub nameservers: Vec<String>,

    /// Address guests should reach this host on. Probed when unset.
    #[serde(default)]
    pub host_address: Option<Ipv4Addr>,

    /// TTL written into dynamically registered records.
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,

    /// TTL served for records that carry none.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Zone minimum TTL (SOA minimum).
    #[serde(default = "default_min_ttl")]
    pub min_ttl: u32,

    /// SRV priority served for records that carry none.
    #[serde(default = "default_priority")]
    pub priority: u16,

    /// Delay between serving attempts, in milliseconds.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Store-side expiry for registered keys, in seconds. Unset keeps them
    /// until they are deleted.
    #[serde(default)]
    pub key_ttl: Option<u64>,
}

impl DnsConfig {
    /// Delay between serving attempts.
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            domain_root: default_domain(),
            local_domain: default_domain(),
            nameservers: Vec::new(),
            host_address: None,
            record_ttl: default_record_ttl(),
            ttl: default_ttl(),
            min_ttl: default_min_ttl(),
            priority: default_priority(),
            restart_delay_ms: default_restart_delay_ms(),
            key_ttl: None,
        }
    }
}

/// Which record store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// etcd v2 keys API over HTTP.
    #[default]
    Etcd,
    /// In-process map; records vanish with the process.
    Memory,
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store implementation.
    #[serde(default)]
    pub kind: StoreKind,

    /// etcd client endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "corectld_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<std::net::SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

/// `CORECTLD_DNS__<SECTION>__<KEY>` variables; nameservers are comma separated.
fn environment() -> config::Environment {
    config::Environment::with_prefix("CORECTLD_DNS")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("dns.nameservers")
}

fn default_listen_addr() -> String {
    "127.0.0.1:15353".to_string()
}

fn default_domain() -> String {
    "coreos.local".to_string()
}

fn default_record_ttl() -> u32 {
    20
}

fn default_ttl() -> u32 {
    3600
}

fn default_min_ttl() -> u32 {
    30
}

fn default_priority() -> u16 {
    10
}

fn default_restart_delay_ms() -> u64 {
    1000
}

fn default_endpoint() -> String {
    "http://127.0.0.1:2379".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}
