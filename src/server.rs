//! DNS subsystem lifecycle: start once, stop once.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::BackendConfig;
use crate::config::DnsConfig;
use crate::engine::{DnsEngine, EngineConfig, Runner};
use crate::error::DnsError;
use crate::identity::HostIdentity;
use crate::record::{Registrar, TeardownPolicy};
use crate::store::KvStore;
use crate::supervisor;

/// Name guests use to reach the host.
pub const HOST_NAME: &str = "corectld";

/// Alias of [`HOST_NAME`] under the zone's nameserver label.
pub const HOST_ALIAS: &str = "corectld.ns.dns";

/// Label used for the supervised serving task.
const TASK_NAME: &str = "dns";

/// A running DNS subsystem.
struct ServerHandle {
    _runner: Arc<dyn Runner>,
    listen_addr: SocketAddr,
    host_ip: Ipv4Addr,
    token: CancellationToken,
    _task: JoinHandle<()>,
}

enum State {
    NotStarted,
    Started(ServerHandle),
    Stopped,
}

type SinkFactory = Box<dyn Fn() -> Box<dyn std::io::Write + Send> + Send + Sync>;

/// Owns the DNS subsystem: bootstrap records plus the supervised engine.
///
/// Start and stop are serialized internally, so concurrent callers cannot
/// double-start or double-cancel.
pub struct DnsServer {
    config: DnsConfig,
    store: Arc<dyn KvStore>,
    identity: Arc<dyn HostIdentity>,
    registrar: Registrar,
    sink: SinkFactory,
    state: Mutex<State>,
}

impl DnsServer {
    /// Create a stopped server writing records to `store`.
    pub fn new(
        config: DnsConfig,
        store: Arc<dyn KvStore>,
        identity: Arc<dyn HostIdentity>,
    ) -> Self {
        let registrar = Registrar::new(store.clone(), &config.local_domain, config.record_ttl)
            .with_key_ttl(config.key_ttl);
        Self {
            config,
            store,
            identity,
            registrar,
            sink: Box::new(|| Box::new(std::io::stderr())),
            state: Mutex::new(State::NotStarted),
        }
    }

    /// Send supervisor status lines to writers produced by `sink` instead of stderr.
    pub fn with_status_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn() -> Box<dyn std::io::Write + Send> + Send + Sync + 'static,
    {
        self.sink = Box::new(sink);
        self
    }

    /// Registrar bound to this server's store and domain.
    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    /// Whether the serving task is live.
    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, State::Started(_))
    }

    /// Address the running server was bound to.
    pub async fn listen_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            State::Started(handle) => Some(handle.listen_addr),
            _ => None,
        }
    }

    /// Start with settings taken from the server's configuration.
    pub async fn start_configured(&self) -> Result<(), DnsError> {
        self.start(
            &self.config.domain_root,
            &self.config.listen_addr,
            &self.config.nameservers,
        )
        .await
    }

    /// Start serving `domain_root` on `listen_address`, forwarding other names
    /// to `nameservers` (public resolvers when empty).
    ///
    /// Bootstrap records are registered before the engine is launched. Returns
    /// as soon as the engine task is spawned. Calling this while started logs
    /// a warning and does nothing.
    pub async fn start(
        &self,
        domain_root: &str,
        listen_address: &str,
        nameservers: &[String],
    ) -> Result<(), DnsError> {
        let mut state = self.state.lock().await;
        if let State::Started(handle) = &*state {
            warn!(addr = %handle.listen_addr, "DNS server already started");
            return Ok(());
        }

        let listen_addr = resolve_listen_addr(listen_address).await?;
        let engine_config =
            EngineConfig::new(listen_addr, domain_root, nameservers, self.config.min_ttl)?;
        let backend = BackendConfig {
            ttl: self.config.ttl,
            priority: self.config.priority,
            min_ttl: self.config.min_ttl,
        };
        let engine = DnsEngine::new(engine_config, self.store.clone(), backend)?;

        // make the host visible to guests by name
        let host_ip = self.identity.address()?;
        self.registrar.register(HOST_NAME, host_ip).await?;
        if let Err(e) = self.registrar.register_forward(HOST_ALIAS, host_ip).await {
            // still NotStarted, so stop() would not clean up the pair
            warn!(error = %e, "alias registration failed, removing host records");
            let _ = self
                .registrar
                .teardown(HOST_NAME, Some(host_ip), TeardownPolicy::BestEffort)
                .await;
            return Err(e);
        }

        let runner: Arc<dyn Runner> = Arc::new(engine);
        let token = CancellationToken::new();
        let task = supervisor::until(
            runner.clone(),
            (self.sink)(),
            TASK_NAME,
            self.config.restart_delay(),
            token.clone(),
        );

        info!(%listen_addr, domain_root, %host_ip, "DNS server started");
        *state = State::Started(ServerHandle {
            _runner: runner,
            listen_addr,
            host_ip,
            token,
            _task: task,
        });
        Ok(())
    }

    /// Remove bootstrap records and stop restarting the engine.
    ///
    /// Record removal is best-effort. An engine attempt that is already
    /// serving keeps running until it returns on its own. Stopping a server
    /// that is not running does nothing.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let handle = match std::mem::replace(&mut *state, State::Stopped) {
            State::Started(handle) => handle,
            previous => {
                debug!("DNS server not running, nothing to stop");
                *state = previous;
                return;
            }
        };

        self.teardown(handle.host_ip).await;
        handle.token.cancel();
        info!(addr = %handle.listen_addr, "DNS server stopped");
    }

    async fn teardown(&self, host_ip: Ipv4Addr) {
        // errors are logged by the registrar under BestEffort
        let _ = self
            .registrar
            .teardown(HOST_NAME, Some(host_ip), TeardownPolicy::BestEffort)
            .await;
        let _ = self
            .registrar
            .teardown(HOST_ALIAS, None, TeardownPolicy::BestEffort)
            .await;
    }
}

/// Resolve `addr` (`host:port`) to the first socket address it names.
async fn resolve_listen_addr(addr: &str) -> Result<SocketAddr, DnsError> {
    let lookup = tokio::time::timeout(Duration::from_secs(5), tokio::net::lookup_host(addr))
        .await
        .map_err(|_| DnsError::Config(format!("timed out resolving listen address {}", addr)))?;

    lookup
        .map_err(|e| DnsError::Config(format!("invalid listen address {}: {}", addr, e)))?
        .next()
        .ok_or_else(|| DnsError::Config(format!("listen address {} resolved to nothing", addr)))
}
