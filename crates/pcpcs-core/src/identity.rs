// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local host identity: hostname, platform label, and primary LAN address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Identifies this host to peers in discovery announcements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    pub platform: &'static str,
    pub local_ip: Ipv4Addr,
}

impl HostIdentity {
    /// Resolves the local identity once. Expensive enough (hostname lookup, a throwaway
    /// UDP socket) that callers should construct one and hold onto it for the process
    /// lifetime rather than calling this per announcement.
    pub fn resolve() -> Self {
        Self {
            hostname: local_hostname(),
            platform: platform_label(),
            local_ip: local_ipv4().unwrap_or(Ipv4Addr::LOCALHOST),
        }
    }
}

fn platform_label() -> &'static str {
    if cfg!(target_os = "linux") {
        "Linux"
    } else if cfg!(target_os = "macos") {
        "Darwin"
    } else if cfg!(target_os = "windows") {
        "Windows"
    } else {
        std::env::consts::OS
    }
}

fn local_hostname() -> String {
    hostname_from_env().unwrap_or_else(|| "unknown-host".to_string())
}

#[cfg(unix)]
fn hostname_from_env() -> Option<String> {
    let mut buf = vec![0u8; 256];
    // SAFETY: buf is valid for gethostname's full length, and we trim at the first NUL below.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    buf.truncate(end);
    String::from_utf8(buf).ok()
}

#[cfg(not(unix))]
fn hostname_from_env() -> Option<String> {
    std::env::var("COMPUTERNAME").ok().or_else(|| std::env::var("HOSTNAME").ok())
}

/// Finds the address peers on the LAN would use to reach this host.
///
/// Connects (without sending any data) a UDP socket to a well-known public address and
/// reads back the address the kernel would route through - the "connect-without-send"
/// idiom, which asks the routing table for an answer instead of guessing from interface
/// names. Falls back to scanning local interfaces for the first non-loopback IPv4 address
/// when the host has no route out (air-gapped segments, containers with no default route).
fn local_ipv4() -> Option<Ipv4Addr> {
    route_probe_ip().or_else(first_interface_ip)
}

fn route_probe_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    let target: SocketAddr = (Ipv4Addr::new(8, 8, 8, 8), 80).into();
    socket.connect(target).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    }
}

fn first_interface_ip() -> Option<Ipv4Addr> {
    local_ip_address::list_afinet_netifas()
        .ok()?
        .into_iter()
        .find_map(|(_name, addr)| match addr {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_never_panics() {
        let id = HostIdentity::resolve();
        assert!(!id.hostname.is_empty());
        assert!(!id.platform.is_empty());
    }

    #[test]
    fn platform_label_is_stable() {
        assert_eq!(platform_label(), platform_label());
    }
}
