//! SSRF protection for outbound webhook deliveries.
//!
//! Blocks deliveries to private/reserved network addresses so a tenant
//! cannot point its webhook target at internal infrastructure.

use std::net::IpAddr;

const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
];

/// Static check on a hostname string; DNS resolution is re-checked at delivery time.
#[must_use]
pub fn is_blocked_host(host: &str) -> bool {
    let lower = host.to_lowercase();

    if BLOCKED_HOSTNAMES.contains(&lower.as_str()) {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return is_private_ip(&ip);
    }

    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return is_private_ip(&ip);
    }

    false
}

#[must_use]
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64
                || v4.octets()[0] == 198 && (v4.octets()[1] & 0xFE) == 18
                || v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0
                || v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 2
                || v4.octets()[0] == 198 && v4.octets()[1] == 51 && v4.octets()[2] == 100
                || v4.octets()[0] == 203 && v4.octets()[1] == 0 && v4.octets()[2] == 113
                || v4.octets()[0] >= 224
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xFE00) == 0xFC00
                || (v6.segments()[0] & 0xFFC0) == 0xFE80
                || is_v4_mapped_private(v6)
        }
    }
}

fn is_v4_mapped_private(v6: &std::net::Ipv6Addr) -> bool {
    if let Some(v4) = v6.to_ipv4_mapped() {
        is_private_ip(&IpAddr::V4(v4))
    } else {
        false
    }
}

/// Resolved, DNS-rebinding-resistant target for a single delivery attempt.
pub struct VerifiedUrl {
    pub host: String,
    pub addr: std::net::SocketAddr,
}

/// Resolve a webhook URL's host and verify none of its addresses are private.
pub async fn verify_resolved_ip(url: &str) -> Result<VerifiedUrl, String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| "URL has no host".to_string())?
        .to_string();
    let port = parsed.port_or_known_default().unwrap_or(443);

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(format!("URL contains private IP address: {ip}"));
        }
        return Ok(VerifiedUrl {
            host: host.clone(),
            addr: std::net::SocketAddr::new(ip, port),
        });
    }

    let addr_str = format!("{host}:{port}");
    let addrs: Vec<std::net::SocketAddr> = tokio::net::lookup_host(&addr_str)
        .await
        .map_err(|e| format!("DNS resolution failed for {host}: {e}"))?
        .collect();

    if addrs.is_empty() {
        return Err(format!("DNS resolution returned no addresses for {host}"));
    }

    for addr in &addrs {
        if is_private_ip(&addr.ip()) {
            return Err(format!(
                "DNS for {host} resolved to private address {}",
                addr.ip()
            ));
        }
    }

    Ok(VerifiedUrl {
        host,
        addr: addrs[0],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_localhost() {
        assert!(is_blocked_host("localhost"));
        assert!(is_blocked_host("LOCALHOST"));
    }

    #[test]
    fn blocks_loopback_ipv4() {
        assert!(is_blocked_host("127.0.0.1"));
    }

    #[test]
    fn blocks_private_ipv4() {
        assert!(is_blocked_host("10.0.0.1"));
        assert!(is_blocked_host("172.16.0.1"));
        assert!(is_blocked_host("192.168.1.1"));
    }

    #[test]
    fn blocks_link_local_and_metadata() {
        assert!(is_blocked_host("169.254.1.1"));
        assert!(is_blocked_host("169.254.169.254"));
    }

    #[test]
    fn blocks_ipv6_loopback() {
        assert!(is_blocked_host("::1"));
        assert!(is_blocked_host("[::1]"));
    }

    #[test]
    fn allows_public_addresses() {
        assert!(!is_blocked_host("8.8.8.8"));
        assert!(!is_blocked_host("example.com"));
    }

    #[test]
    fn blocks_cgn_range() {
        assert!(is_blocked_host("100.64.0.1"));
    }
}
