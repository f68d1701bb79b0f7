//! Hickory DNS authority answering from the record store.
//!
//! Query names are encoded with [`crate::path`] and looked up as single
//! store keys. The forward zone answers A/AAAA/CNAME/SRV from a record's
//! `host`; the `in-addr.arpa.` zone answers PTR.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA, CNAME, NS, PTR, SOA, SRV};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

use crate::metrics::{self, QueryResult, Timer};
use crate::path::record_key;
use crate::record::RecordValue;
use crate::store::KvStore;

/// Origin of the IPv4 reverse zone.
pub const REVERSE_ZONE: &str = "in-addr.arpa.";

/// Answer defaults shared by all store-backed zones.
#[derive(Debug, Clone, Copy)]
pub struct BackendConfig {
    /// TTL for records stored without one.
    pub ttl: u32,
    /// SRV priority for records stored without one.
    pub priority: u16,
    /// Zone minimum TTL.
    pub min_ttl: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ttl: 3600,
            priority: 10,
            min_ttl: 30,
        }
    }
}

/// Authority for one zone, backed by a [`KvStore`].
pub struct StoreAuthority {
    origin: LowerName,
    reverse: bool,
    store: Arc<dyn KvStore>,
    config: BackendConfig,
}

impl StoreAuthority {
    /// Authority for `origin` (e.g. "coreos.local" or [`REVERSE_ZONE`]).
    pub fn new(
        origin: &str,
        store: Arc<dyn KvStore>,
        config: BackendConfig,
    ) -> Result<Self, hickory_proto::ProtoError> {
        let name = fqdn(origin)?;
        let reverse = name
            .to_ascii()
            .to_ascii_lowercase()
            .ends_with(REVERSE_ZONE);

        Ok(Self {
            origin: name.into(),
            reverse,
            store,
            config,
        })
    }

    fn record_ttl(&self, value: &RecordValue) -> u32 {
        if value.ttl == 0 {
            self.config.ttl
        } else {
            value.ttl
        }
    }

    fn single(&self, name: Name, ttl: u32, rdata: RData) -> RecordSet {
        let rtype = rdata.record_type();
        let mut record_set = RecordSet::new(name.clone(), rtype, 0);
        let mut record = Record::from_rdata(name, ttl, rdata);
        record.set_dns_class(DNSClass::IN);
        record_set.insert(record, 0);
        record_set
    }

    fn nameserver(&self) -> Name {
        Name::from_ascii("ns.dns")
            .and_then(|ns| ns.append_domain(&Name::from(self.origin.clone())))
            .unwrap_or_else(|_| Name::root())
    }

    /// Build the SOA record for this zone.
    fn build_soa_record(&self) -> RecordSet {
        let origin = Name::from(self.origin.clone());
        let rname = Name::from_ascii("hostmaster")
            .and_then(|h| h.append_domain(&origin))
            .unwrap_or_else(|_| Name::root());
        let serial = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();

        let soa = SOA::new(
            self.nameserver(),
            rname,
            serial,
            28800,
            7200,
            604800,
            self.config.min_ttl,
        );
        self.single(origin, self.config.min_ttl, RData::SOA(soa))
    }

    /// Build an NS record for this zone.
    fn build_ns_record(&self) -> RecordSet {
        let origin = Name::from(self.origin.clone());
        self.single(origin, self.config.ttl, RData::NS(NS(self.nameserver())))
    }

    /// Translate a stored value into the answer for `rtype`, if it has one.
    fn answer(&self, name: Name, rtype: RecordType, value: &RecordValue) -> Option<RecordSet> {
        let ttl = self.record_ttl(value);
        let host_ip = value.host.parse::<IpAddr>().ok();

        let rdata = match (rtype, host_ip) {
            (RecordType::PTR, None) if self.reverse => RData::PTR(PTR(fqdn(&value.host).ok()?)),
            _ if self.reverse => return None,
            (RecordType::A, Some(IpAddr::V4(ip))) => RData::A(A::from(ip)),
            (RecordType::AAAA, Some(IpAddr::V6(ip))) => RData::AAAA(AAAA::from(ip)),
            (RecordType::A | RecordType::AAAA | RecordType::CNAME, None) => {
                RData::CNAME(CNAME(fqdn(&value.host).ok()?))
            }
            (RecordType::SRV, ip) => {
                let target = match ip {
                    Some(_) => name.clone(),
                    None => fqdn(&value.host).ok()?,
                };
                RData::SRV(SRV::new(
                    value.priority.unwrap_or(self.config.priority),
                    10,
                    value.port.unwrap_or(0),
                    target,
                ))
            }
            _ => return None,
        };

        Some(self.single(name, ttl, rdata))
    }
}

/// Parse `name` as a fully qualified name.
fn fqdn(name: &str) -> Result<Name, hickory_proto::ProtoError> {
    let mut name = Name::from_ascii(name)?;
    name.set_fqdn(true);
    Ok(name)
}

fn store_failure(message: String) -> LookupControlFlow<LookupRecords> {
    LookupControlFlow::Break(Err(LookupError::from(io::Error::new(
        io::ErrorKind::Other,
        message,
    ))))
}

#[async_trait]
impl Authority for StoreAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        let timer = Timer::start();
        let rtype_str = format!("{:?}", rtype);

        if name == &self.origin {
            let record_set = match rtype {
                RecordType::SOA => Some(self.build_soa_record()),
                RecordType::NS => Some(self.build_ns_record()),
                _ => None,
            };
            if let Some(record_set) = record_set {
                debug!(name = %name, rtype = ?rtype, "zone apex lookup");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                return LookupControlFlow::Break(Ok(LookupRecords::new(
                    lookup_options,
                    Arc::new(record_set),
                )));
            }
        }

        let name_str = name.to_string();
        let key = record_key(&name_str);
        trace!(name = %name_str, rtype = ?rtype, key = %key, "DNS lookup");

        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(name = %name_str, "lookup: no record stored");
                metrics::record_query(&rtype_str, QueryResult::NxDomain, timer.elapsed());
                return LookupControlFlow::Break(Err(LookupError::ResponseCode(
                    ResponseCode::NXDomain,
                )));
            }
            Err(e) => {
                warn!(name = %name_str, error = %e, "record store lookup failed");
                metrics::record_query(&rtype_str, QueryResult::StoreError, timer.elapsed());
                return store_failure(e.to_string());
            }
        };

        let value = match RecordValue::decode(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "undecodable record value");
                metrics::record_query(&rtype_str, QueryResult::StoreError, timer.elapsed());
                return store_failure(e.to_string());
            }
        };

        match self.answer(Name::from(name.clone()), rtype, &value) {
            Some(record_set) => {
                debug!(name = %name_str, rtype = ?rtype, host = %value.host, "lookup: returning record");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                LookupControlFlow::Break(Ok(LookupRecords::new(
                    lookup_options,
                    Arc::new(record_set),
                )))
            }
            None => {
                trace!(name = %name_str, rtype = ?rtype, "name exists without this type");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
            }
        }
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Records are managed through the store, not DNS UPDATE
        Err(ResponseCode::NotImp)
    }
}
