//! DNS serving engine: catalog assembly and the socket loop.

use async_trait::async_trait;
use hickory_proto::rr::{LowerName, Name};
use hickory_proto::xfer::Protocol;
use hickory_resolver::config::{NameServerConfig, NameServerConfigGroup, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::store::forwarder::{ForwardAuthority, ForwardConfig};
use hickory_server::ServerFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, info};

use crate::backend::{BackendConfig, StoreAuthority, REVERSE_ZONE};
use crate::config::DEFAULT_NAMESERVERS;
use crate::error::DnsError;
use crate::store::KvStore;

/// Idle timeout for TCP DNS connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// A long-running task that only returns when it stops serving.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Serve until a fatal condition, returning why it stopped.
    async fn run(&self) -> Result<(), DnsError>;
}

/// Engine settings bound at start time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address to serve UDP and TCP on.
    pub listen_addr: SocketAddr,
    /// Zone answered from the record store.
    pub domain_root: String,
    /// Upstream resolvers for everything outside our zones.
    pub nameservers: Vec<SocketAddr>,
    /// Zone minimum TTL.
    pub min_ttl: u32,
}

impl EngineConfig {
    /// Build engine settings, substituting [`DEFAULT_NAMESERVERS`] for an
    /// empty resolver list.
    pub fn new(
        listen_addr: SocketAddr,
        domain_root: &str,
        nameservers: &[String],
        min_ttl: u32,
    ) -> Result<Self, DnsError> {
        let nameservers = if nameservers.is_empty() {
            DEFAULT_NAMESERVERS.iter().map(|s| s.to_string()).collect()
        } else {
            nameservers.to_vec()
        };

        let nameservers = nameservers
            .iter()
            .map(|ns| parse_nameserver(ns))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            listen_addr,
            domain_root: domain_root.to_string(),
            nameservers,
            min_ttl,
        })
    }
}

/// Parse `ip:port` or a bare IP (port 53).
fn parse_nameserver(ns: &str) -> Result<SocketAddr, DnsError> {
    if let Ok(addr) = ns.parse::<SocketAddr>() {
        return Ok(addr);
    }
    ns.parse::<std::net::IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| DnsError::InvalidAddress(ns.to_string()))
}

/// Hickory-based DNS server over the record store.
pub struct DnsEngine {
    config: EngineConfig,
    forward: Arc<StoreAuthority>,
    reverse: Arc<StoreAuthority>,
}

impl DnsEngine {
    /// Create an engine serving `config.domain_root` and the reverse zone from `store`.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KvStore>,
        backend: BackendConfig,
    ) -> Result<Self, DnsError> {
        let backend = BackendConfig {
            min_ttl: config.min_ttl,
            ..backend
        };
        let forward = StoreAuthority::new(&config.domain_root, store.clone(), backend)?;
        let reverse = StoreAuthority::new(REVERSE_ZONE, store, backend)?;

        Ok(Self {
            config,
            forward: Arc::new(forward),
            reverse: Arc::new(reverse),
        })
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Catalog with the store-backed zones, plus a root forwarder when
    /// `with_forwarder` is set.
    pub fn catalog(&self, with_forwarder: bool) -> Result<Catalog, DnsError> {
        let mut catalog = Catalog::new();

        for authority in [&self.forward, &self.reverse] {
            let origin = authority.origin().clone();
            let authority: Arc<dyn AuthorityObject> = authority.clone();
            catalog.upsert(origin, vec![authority]);
        }

        if with_forwarder && !self.config.nameservers.is_empty() {
            let forwarder: Arc<dyn AuthorityObject> = Arc::new(self.forwarder()?);
            catalog.upsert(LowerName::from(Name::root()), vec![forwarder]);
        }

        Ok(catalog)
    }

    fn forwarder(&self) -> Result<ForwardAuthority<TokioConnectionProvider>, DnsError> {
        let servers: Vec<NameServerConfig> = self
            .config
            .nameservers
            .iter()
            .map(|addr| NameServerConfig::new(*addr, Protocol::Udp))
            .collect();

        let config = ForwardConfig {
            name_servers: NameServerConfigGroup::from(servers),
            options: Some(ResolverOpts::default()),
        };

        ForwardAuthority::builder_tokio(config)
            .build()
            .map_err(DnsError::Config)
    }
}

#[async_trait]
impl Runner for DnsEngine {
    async fn run(&self) -> Result<(), DnsError> {
        let catalog = self.catalog(true)?;
        let mut server = ServerFuture::new(catalog);

        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        info!(
            domain_root = %self.config.domain_root,
            upstreams = ?self.config.nameservers,
            "DNS server ready to serve queries"
        );

        server.block_until_done().await?;
        debug!("DNS server loop returned");
        Ok(())
    }
}
