//! Forward and reverse record registration.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::DnsError;
use crate::metrics::{self, RegistrationOp};
use crate::path::{record_key, reverse_key};
use crate::store::{KvStore, SetOptions};

/// Value stored at a record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordValue {
    /// IP address (forward) or domain name (reverse, CNAME).
    pub host: String,

    /// Record TTL in seconds; 0 means "use the server default".
    #[serde(rename = "TTL", alias = "ttl", default)]
    pub ttl: u32,

    /// SRV port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// SRV priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
}

impl RecordValue {
    /// Value with only `host` and `ttl` set.
    pub fn new(host: impl Into<String>, ttl: u32) -> Self {
        Self {
            host: host.into(),
            ttl,
            port: None,
            priority: None,
        }
    }

    /// Encode as stored in the record store.
    pub fn encode(&self) -> Result<String, DnsError> {
        Ok(serde_json::to_string(self).map_err(crate::error::StoreError::from)?)
    }

    /// Decode a stored value.
    pub fn decode(raw: &str) -> Result<Self, DnsError> {
        Ok(serde_json::from_str(raw).map_err(crate::error::StoreError::from)?)
    }
}

/// What to do with a failed removal during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPolicy {
    /// Return the first error to the caller.
    FailFast,
    /// Log the error and report success.
    BestEffort,
}

/// Writes record pairs into the store.
#[derive(Clone)]
pub struct Registrar {
    store: Arc<dyn KvStore>,
    local_domain: String,
    ttl: u32,
    key_ttl: Option<u64>,
}

impl Registrar {
    /// Registrar appending `local_domain` to host names and writing `ttl`.
    pub fn new(store: Arc<dyn KvStore>, local_domain: &str, ttl: u32) -> Self {
        Self {
            store,
            local_domain: local_domain.trim_matches('.').to_ascii_lowercase(),
            ttl,
            key_ttl: None,
        }
    }

    /// Ask the store to expire written keys after `seconds`. `None` keeps
    /// keys until they are deleted.
    pub fn with_key_ttl(mut self, seconds: Option<u64>) -> Self {
        self.key_ttl = seconds;
        self
    }

    /// Fully qualified name for `hostname`, lowercased.
    ///
    /// Queries reach the backend lowercased, so keys must be too.
    pub fn fqdn(&self, hostname: &str) -> String {
        format!("{}.{}", hostname.to_ascii_lowercase(), self.local_domain)
    }

    fn set_options(&self) -> SetOptions {
        SetOptions { ttl: self.key_ttl }
    }

    /// Write the forward record and then the reverse record.
    ///
    /// Stops at the first failed write.
    pub async fn register(&self, hostname: &str, ip: Ipv4Addr) -> Result<(), DnsError> {
        let fqdn = self.fqdn(hostname);
        let result = self.write_pair(&fqdn, ip).await;
        metrics::record_registration(RegistrationOp::Register, result.is_ok());
        if result.is_ok() {
            info!(name = %fqdn, %ip, "registered host record");
        }
        result
    }

    async fn write_pair(&self, fqdn: &str, ip: Ipv4Addr) -> Result<(), DnsError> {
        self.write_forward(fqdn, ip).await?;

        let reverse = RecordValue::new(fqdn, self.ttl).encode()?;
        self.store
            .set(&reverse_key(ip), &reverse, self.set_options())
            .await?;
        Ok(())
    }

    /// Write only the forward record, leaving the reverse record untouched.
    pub async fn register_forward(&self, hostname: &str, ip: Ipv4Addr) -> Result<(), DnsError> {
        let fqdn = self.fqdn(hostname);
        let result = self.write_forward(&fqdn, ip).await;
        metrics::record_registration(RegistrationOp::Register, result.is_ok());
        if result.is_ok() {
            info!(name = %fqdn, %ip, "registered alias record");
        }
        result
    }

    async fn write_forward(&self, fqdn: &str, ip: Ipv4Addr) -> Result<(), DnsError> {
        let forward = RecordValue::new(ip.to_string(), self.ttl).encode()?;
        self.store
            .set(&record_key(fqdn), &forward, self.set_options())
            .await?;
        Ok(())
    }

    /// Delete the forward record and then the reverse record.
    ///
    /// Stops at the first failed delete.
    pub async fn unregister(&self, hostname: &str, ip: Ipv4Addr) -> Result<(), DnsError> {
        let fqdn = self.fqdn(hostname);
        let result = async {
            self.store.delete(&record_key(&fqdn)).await?;
            self.store.delete(&reverse_key(ip)).await?;
            Ok::<(), DnsError>(())
        }
        .await;
        metrics::record_registration(RegistrationOp::Unregister, result.is_ok());
        if result.is_ok() {
            info!(name = %fqdn, %ip, "removed host record");
        }
        result
    }

    /// Delete only the forward record.
    pub async fn unregister_forward(&self, hostname: &str) -> Result<(), DnsError> {
        let fqdn = self.fqdn(hostname);
        let result = self
            .store
            .delete(&record_key(&fqdn))
            .await
            .map_err(DnsError::from);
        metrics::record_registration(RegistrationOp::Unregister, result.is_ok());
        result
    }

    /// Remove a record pair under `policy`.
    pub async fn teardown(
        &self,
        hostname: &str,
        ip: Option<Ipv4Addr>,
        policy: TeardownPolicy,
    ) -> Result<(), DnsError> {
        let result = match ip {
            Some(ip) => self.unregister(hostname, ip).await,
            None => self.unregister_forward(hostname).await,
        };

        match (result, policy) {
            (Err(e), TeardownPolicy::BestEffort) => {
                warn!(host = hostname, error = %e, "record teardown failed, ignoring");
                Ok(())
            }
            (result, _) => {
                debug!(host = hostname, ?policy, "record teardown finished");
                result
            }
        }
    }
}
