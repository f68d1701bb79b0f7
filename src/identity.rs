//! Where guests can reach this host.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use tracing::debug;

use crate::error::DnsError;

/// Supplies the host's externally reachable IPv4 address.
pub trait HostIdentity: Send + Sync {
    /// Address bootstrap records point at.
    fn address(&self) -> Result<Ipv4Addr, DnsError>;
}

/// Fixed, configured address.
#[derive(Debug, Clone, Copy)]
pub struct StaticIdentity(pub Ipv4Addr);

impl HostIdentity for StaticIdentity {
    fn address(&self) -> Result<Ipv4Addr, DnsError> {
        Ok(self.0)
    }
}

/// Address of the interface the host routes `probe` through.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
#[derive(Debug, Clone, Copy)]
pub struct RouteIdentity {
    probe: SocketAddr,
}

impl RouteIdentity {
    /// Probe the route toward `probe`.
    pub fn new(probe: SocketAddr) -> Self {
        Self { probe }
    }
}

impl Default for RouteIdentity {
    fn default() -> Self {
        Self::new(SocketAddr::from(([8, 8, 8, 8], 53)))
    }
}

impl HostIdentity for RouteIdentity {
    fn address(&self) -> Result<Ipv4Addr, DnsError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(self.probe)?;
        match socket.local_addr()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => {
                debug!(%ip, probe = %self.probe, "resolved host address");
                Ok(ip)
            }
            other => Err(DnsError::Identity(format!(
                "no IPv4 route toward {} (got {})",
                self.probe, other
            ))),
        }
    }
}
