//! corectld DNS - a supervised DNS responder for guest VMs.
//!
//! Guests resolve the host through a small DNS server whose records live in
//! an external key-value store (etcd). This crate owns the lifecycle of that
//! server: it registers the host's own name, keeps the serving task alive
//! across failures, and removes its records again on shutdown.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         corectld-dns                         │
//! │                                                              │
//! │  DnsServer ──start──▶ Registrar ──set/delete──▶ KvStore      │
//! │      │                                           ▲           │
//! │      │ spawn                                     │ get       │
//! │      ▼                                           │           │
//! │  supervisor::until ──run──▶ DnsEngine ──▶ StoreAuthority     │
//! │   (restart loop)            (hickory)    ForwardAuthority ──▶ upstream
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record layout
//!
//! ```text
//! corectld.coreos.local  ->  /skydns/local/coreos/corectld   {"host":"10.0.2.2","TTL":20}
//! 10.0.2.2 (PTR)         ->  /skydns/arpa/in-addr/10/0/2/2   {"host":"corectld.coreos.local","TTL":20}
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use corectld_dns::{DnsConfig, DnsServer, MemoryStore, StaticIdentity};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = DnsServer::new(
//!         DnsConfig::default(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(StaticIdentity("10.0.2.2".parse().unwrap())),
//!     );
//!
//!     server.start("coreos.local", "127.0.0.1:5354", &[]).await.unwrap();
//!     tokio::signal::ctrl_c().await.unwrap();
//!     server.stop().await;
//! }
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod path;
pub mod record;
pub mod server;
pub mod store;
pub mod supervisor;
pub mod telemetry;

// Re-export main types
pub use config::{Config, DnsConfig, StoreConfig, StoreKind, TelemetryConfig};
pub use engine::{DnsEngine, Runner};
pub use error::{DnsError, StoreError};
pub use identity::{HostIdentity, RouteIdentity, StaticIdentity};
pub use record::{RecordValue, Registrar, TeardownPolicy};
pub use server::DnsServer;
pub use store::{EtcdStore, KvStore, MemoryStore};
