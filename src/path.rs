//! Mapping between DNS names and record store keys.
//!
//! Records live under a fixed namespace with the name's labels reversed,
//! one label per path segment:
//!
//! ```text
//! corectld.coreos.local  ->  /skydns/local/coreos/corectld
//! 10.0.2.2 (reverse)     ->  /skydns/arpa/in-addr/10/0/2/2
//! ```
//!
//! Labels are not escaped, so a label containing `/` produces a key that
//! does not round-trip.

use std::net::Ipv4Addr;

/// Store namespace all records are written under.
pub const NAMESPACE: &str = "skydns";

/// Path segments under [`NAMESPACE`] holding IPv4 reverse records.
pub const REVERSE_PREFIX: &str = "arpa/in-addr";

/// Reverse a dot-separated domain into a slash-separated path.
///
/// A trailing root dot is ignored: `a.b.c.` and `a.b.c` both map to `c/b/a`.
pub fn domain_to_path(domain: &str) -> String {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    domain
        .rsplit('.')
        .collect::<Vec<_>>()
        .join("/")
        .replace('.', "/")
}

/// Inverse of [`domain_to_path`].
pub fn path_to_domain(path: &str) -> String {
    path.trim_matches('/')
        .rsplit('/')
        .collect::<Vec<_>>()
        .join(".")
}

/// Store key of the forward record for `fqdn`.
pub fn record_key(fqdn: &str) -> String {
    format!("/{}/{}", NAMESPACE, domain_to_path(fqdn))
}

/// Store key of the reverse record for `ip`.
///
/// The octets are written in address order; the reverse-zone query name
/// `d.c.b.a.in-addr.arpa.` encodes to the same key.
pub fn reverse_key(ip: Ipv4Addr) -> String {
    format!(
        "/{}/{}/{}",
        NAMESPACE,
        REVERSE_PREFIX,
        ip.to_string().replace('.', "/")
    )
}
