//! Metrics instrumentation for corectld-dns.
//!
//! All metrics are prefixed with `corectld_dns.`

use metrics::{counter, histogram};
use std::time::Instant;

/// Record a DNS query answered from the record store.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::NxDomain => "nxdomain",
        QueryResult::StoreError => "store_error",
    };

    counter!("corectld_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("corectld_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records successfully.
    Success,
    /// Name not present in the store.
    NxDomain,
    /// Store lookup failed.
    StoreError,
}

/// Record store mutation kinds.
#[derive(Debug, Clone, Copy)]
pub enum RegistrationOp {
    /// Record written.
    Register,
    /// Record deleted.
    Unregister,
}

/// Record a registrar operation.
pub fn record_registration(op: RegistrationOp, ok: bool) {
    let op_str = match op {
        RegistrationOp::Register => "register",
        RegistrationOp::Unregister => "unregister",
    };
    let result_str = if ok { "success" } else { "error" };

    counter!("corectld_dns.registration.count", "op" => op_str, "result" => result_str)
        .increment(1);
}

/// Record one finished attempt of a supervised task.
pub fn record_supervised_exit(name: &str, ok: bool) {
    let outcome = if ok { "clean" } else { "error" };
    counter!("corectld_dns.supervisor.exit.count", "task" => name.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
