//! Client IP extraction from proxy headers
//!
//! Headers are scanned in a fixed priority order and the first usable
//! value wins. Nothing here verifies that a proxy is trusted; a client
//! can spoof these headers.

use axum::http::HeaderMap;
use std::net::IpAddr;

/// Headers consulted before falling back to the socket address, highest priority first
const IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "remote_addr"];

/// Resolve the client IP for a request
///
/// For each header only the leftmost comma-separated entry is considered
/// (the originating client in a proxy chain). Blank values, `unknown`,
/// and anything that is not a dotted-quad or full eight-group IPv6
/// literal are skipped. If no header qualifies, `remote_addr` is used.
pub fn resolve_client_ip(headers: &HeaderMap, remote_addr: IpAddr) -> String {
    IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.split(',').next().unwrap_or_default().trim())
        .find(|candidate| is_valid_ip_literal(candidate))
        .map(str::to_string)
        .unwrap_or_else(|| remote_addr.to_string())
}

fn is_valid_ip_literal(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.eq_ignore_ascii_case("unknown") {
        return false;
    }

    is_ipv4_literal(candidate) || is_ipv6_literal(candidate)
}

// Shape check only: 999.999.999.999 passes and is rejected later by the
// region lookup.
fn is_ipv4_literal(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

fn is_ipv6_literal(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate.split(':').collect();
    groups.len() == 8
        && groups
            .iter()
            .all(|g| (1..=4).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_hexdigit()))
}
