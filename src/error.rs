//! Error types for corectld-dns.

use thiserror::Error;

/// Errors raised by the record store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP transport error talking to etcd.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// etcd answered with a non-success status.
    #[error("store returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body as returned by the store.
        body: String,
    },

    /// Record value could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Store could not be reached or did not answer in time.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur in the DNS subsystem.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failed to parse address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Record store write or delete failed
    #[error("Record registration failed: {0}")]
    Registration(#[from] StoreError),

    /// Host address could not be determined
    #[error("Host identity unavailable: {0}")]
    Identity(String),
}
