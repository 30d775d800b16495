use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Address prefixes treated as local or private. Deliberately coarse:
/// `172.` covers the whole /8, not just 172.16.0.0/12.
const PRIVATE_PREFIXES: &[&str] = &["10.", "172.", "192.", "127.", "0."];

/// Pick the client address from the first `X-Forwarded-For` value, falling
/// back to the socket peer. The value is not validated as an IP.
pub fn client_ip_from(forwarded: Option<&str>, remote_addr: &str) -> String {
    match forwarded.and_then(|value| value.split(',').next()) {
        Some(first) => first.trim().to_string(),
        None => remote_addr.to_string(),
    }
}

/// Extract client IP from `X-Forwarded-For` header, falling back to the peer address.
pub fn extract_client_ip(headers: &HeaderMap, remote: &SocketAddr) -> String {
    let forwarded = headers
        .get_all("x-forwarded-for")
        .iter()
        .next()
        .and_then(|v| v.to_str().ok());
    client_ip_from(forwarded, &remote.ip().to_string())
}

pub fn is_public_ip(ip: &str) -> bool {
    !PRIVATE_PREFIXES.iter().any(|prefix| ip.starts_with(prefix))
}
