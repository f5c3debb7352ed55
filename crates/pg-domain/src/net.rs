//! Minimal CIDR containment check over `std::net::IpAddr`.
//!
//! No CIDR crate appears anywhere in the example pack's manifests; the one
//! pack repo that parses client IPs (`mcp-gateway`) does so with
//! `std::net` alone, so this core follows suit rather than adding a
//! dependency for a single containment check.

use std::net::IpAddr;

/// Returns `true` if `ip` falls within `cidr` (`"a.b.c.d/n"` or a bare
/// address, treated as a /32 or /128). Returns `false` on a malformed
/// `cidr` string rather than erroring — callers treat that as "no match".
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let (addr_part, prefix_part) = match cidr.split_once('/') {
        Some((a, p)) => (a, Some(p)),
        None => (cidr, None),
    };

    let network: IpAddr = match addr_part.trim().parse() {
        Ok(a) => a,
        Err(_) => return false,
    };

    match (ip, network) {
        (IpAddr::V4(ip4), IpAddr::V4(net4)) => {
            let prefix = match prefix_part {
                Some(p) => match p.parse::<u32>() {
                    Ok(v) if v <= 32 => v,
                    _ => return false,
                },
                None => 32,
            };
            let mask = if prefix == 0 {
                0u32
            } else {
                u32::MAX << (32 - prefix)
            };
            (u32::from(*ip4) & mask) == (u32::from(net4) & mask)
        }
        (IpAddr::V6(ip6), IpAddr::V6(net6)) => {
            let prefix = match prefix_part {
                Some(p) => match p.parse::<u32>() {
                    Ok(v) if v <= 128 => v,
                    _ => return false,
                },
                None => 128,
            };
            let mask = if prefix == 0 {
                0u128
            } else {
                u128::MAX << (128 - prefix)
            };
            (u128::from(*ip6) & mask) == (u128::from(net6) & mask)
        }
        _ => false,
    }
}

/// Returns `true` if `ip` matches any entry in `allowlist`.
pub fn ip_allowed(ip: &IpAddr, allowlist: &[String]) -> bool {
    allowlist.iter().any(|cidr| ip_in_cidr(ip, cidr))
}
