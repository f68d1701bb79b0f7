//! Shared test infrastructure: a recording store double and catalog helpers.

#![allow(dead_code)]

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{Catalog, MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use corectld_dns::config::DnsConfig;
use corectld_dns::error::StoreError;
use corectld_dns::identity::StaticIdentity;
use corectld_dns::server::DnsServer;
use corectld_dns::store::{KvStore, MemoryStore, SetOptions};

// --- Constants ---

pub const LOCAL_DOMAIN: &str = "coreos.local";
pub const HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);
pub const FORWARD_KEY: &str = "/skydns/local/coreos/corectld";
pub const REVERSE_KEY: &str = "/skydns/arpa/in-addr/10/0/2/2";
pub const ALIAS_KEY: &str = "/skydns/local/coreos/dns/ns/corectld";

// --- RecordingStore ---

/// A store operation as seen by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Set(String),
    Delete(String),
}

/// Memory store that logs every mutation and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Arc<Mutex<Vec<Call>>>,
    fail_set_call: Option<usize>,
    fail_delete_key: Option<String>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th set (1-based).
    pub fn failing_set(n: usize) -> Self {
        Self {
            fail_set_call: Some(n),
            ..Self::default()
        }
    }

    /// Fail every delete of `key`.
    pub fn failing_delete(key: &str) -> Self {
        Self {
            fail_delete_key: Some(key.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Set(_)))
            .count()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl KvStore for RecordingStore {
    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<(), StoreError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Set(key.to_string()));
            calls.iter().filter(|c| matches!(c, Call::Set(_))).count()
        };
        if self.fail_set_call == Some(n) {
            return Err(StoreError::Unavailable(format!("injected failure on set #{}", n)));
        }
        self.inner.set(key, value, opts).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(key.to_string()));
        if self.fail_delete_key.as_deref() == Some(key) {
            return Err(StoreError::Unavailable(format!("injected failure deleting {}", key)));
        }
        self.inner.delete(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }
}

/// Server over `store` with a fixed host address and a silent status sink.
pub fn test_server(store: &RecordingStore) -> DnsServer {
    let config = DnsConfig {
        restart_delay_ms: 50,
        ..DnsConfig::default()
    };
    DnsServer::new(
        config,
        Arc::new(store.clone()),
        Arc::new(StaticIdentity(HOST_IP)),
    )
    .with_status_sink(|| Box::new(io::sink()))
}

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

// --- Query construction ---

fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);

    let bytes = msg.to_vec().unwrap();
    let mut decoder = BinDecoder::new(&bytes);
    let request = MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest");
    let src: SocketAddr = "10.0.2.15:40000".parse().unwrap();
    Request::new(request, src, Protocol::Udp)
}

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(catalog: &Catalog, name: &str, record_type: RecordType) -> Message {
    let request = build_request(name, record_type, 4242);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// A addresses in the answer section.
pub fn answer_ipv4s(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// PTR targets in the answer section.
pub fn answer_ptrs(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::PTR(ptr) => Some(ptr.0.to_ascii()),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}
