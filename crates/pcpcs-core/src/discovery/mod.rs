// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP broadcast peer discovery.
//!
//! Three long-lived threads cooperate over a shared [`PeerTable`]:
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  broadcast loop  --- every 3s ---> UDP broadcast :52525      |
//! |  listen loop     <--- announcements --- UDP :52525           |
//! |  liveness loop   --- every 5s, evict peers silent > 30s ---- |
//! +-------------------------------------------------------------+
//! ```
//!
//! Peers announce themselves by hostname/address rather than any persistent identifier,
//! so the table is rebuilt from scratch on every announcement rather than merged field by
//! field - simpler, and correct for a fixed-size LAN peer set.

use parking_lot::Mutex;
use socket2::{Domain, Socket, Type};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{BROADCAST_INTERVAL, DISCOVERY_PORT, LIVENESS_TICK, PEER_STALE_AFTER, PING_TIMEOUT};
use crate::identity::HostIdentity;
use crate::protocol::DiscoveryMessage;

/// A peer announcement, as last seen on the wire, plus its last-known liveness.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub hostname: String,
    pub platform: String,
    pub addr: Ipv4Addr,
    pub last_ping_ms: Option<f64>,
    pub reachable: bool,
}

struct PeerEntry {
    peer: Peer,
    last_seen: Instant,
}

/// Thread-safe table of currently-live peers, written only by the discovery loops and
/// read via [`PeerTable::snapshot`].
#[derive(Default)]
pub struct PeerTable {
    entries: Mutex<HashMap<Ipv4Addr, PeerEntry>>,
}

impl PeerTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn upsert(&self, mut peer: Peer) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&peer.addr) {
            // A discovery/response datagram only carries identity, not liveness; keep
            // whatever the liveness loop last measured for this address.
            peer.last_ping_ms = existing.peer.last_ping_ms;
            peer.reachable = existing.peer.reachable;
        }
        entries.insert(
            peer.addr,
            PeerEntry {
                peer,
                last_seen: Instant::now(),
            },
        );
    }

    fn contains(&self, addr: Ipv4Addr) -> bool {
        self.entries.lock().contains_key(&addr)
    }

    fn record_liveness(&self, addr: Ipv4Addr, reachable: bool, rtt_ms: Option<f64>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&addr) {
            entry.peer.reachable = reachable;
            entry.peer.last_ping_ms = rtt_ms;
        }
    }

    fn evict_stale(&self) {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.last_seen.elapsed() < PEER_STALE_AFTER);
    }

    /// A consistent, point-in-time copy of the live peer set.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.entries
            .lock()
            .values()
            .map(|entry| entry.peer.clone())
            .collect()
    }
}

/// Owns the discovery socket and the three background threads. Dropping it (or calling
/// [`DiscoveryService::stop`]) signals the threads to exit; they notice on their next
/// wakeup rather than being interrupted mid-syscall.
pub struct DiscoveryService {
    peers: Arc<PeerTable>,
    running: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl DiscoveryService {
    /// Binds the discovery socket and spawns the broadcast, listen and liveness loops.
    pub fn start(identity: HostIdentity) -> std::io::Result<Self> {
        let peers = PeerTable::new();
        let running = Arc::new(AtomicBool::new(true));

        let listen_socket = bind_discovery_socket()?;
        let broadcast_socket = new_broadcast_socket()?;

        let broadcast_handle = {
            let running = running.clone();
            let socket = broadcast_socket;
            let identity = identity.clone();
            thread::Builder::new()
                .name("pcpcs-discovery-broadcast".into())
                .spawn(move || broadcast_loop(socket, identity, running))?
        };

        let listen_handle = {
            let running = running.clone();
            let peers = peers.clone();
            let identity = identity.clone();
            thread::Builder::new()
                .name("pcpcs-discovery-listen".into())
                .spawn(move || listen_loop(listen_socket, peers, identity, running))?
        };

        let liveness_handle = {
            let running = running.clone();
            let peers = peers.clone();
            thread::Builder::new()
                .name("pcpcs-discovery-liveness".into())
                .spawn(move || liveness_loop(peers, running))?
        };

        Ok(Self {
            peers,
            running,
            handles: vec![broadcast_handle, listen_handle, liveness_handle],
        })
    }

    /// Signals all three loops to stop and waits for them to exit.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// The current set of live peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.snapshot()
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn bind_discovery_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT);
    socket.bind(&addr.into())?;
    log::debug!("discovery socket bound to {addr}");
    Ok(socket.into())
}

fn new_broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.set_broadcast(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
    Ok(socket.into())
}

fn announcement_payload(identity: &HostIdentity) -> Vec<u8> {
    let msg = DiscoveryMessage::Discovery {
        hostname: identity.hostname.clone(),
        platform: identity.platform.to_string(),
        ip: identity.local_ip.to_string(),
    };
    serde_json::to_vec(&msg).expect("DiscoveryMessage always serializes")
}

fn response_payload(identity: &HostIdentity) -> Vec<u8> {
    let msg = DiscoveryMessage::Response {
        hostname: identity.hostname.clone(),
        platform: identity.platform.to_string(),
        ip: identity.local_ip.to_string(),
    };
    serde_json::to_vec(&msg).expect("DiscoveryMessage always serializes")
}

fn parse_announcement(payload: &[u8]) -> Option<(String, String, bool)> {
    match serde_json::from_slice::<DiscoveryMessage>(payload).ok()? {
        DiscoveryMessage::Discovery { hostname, platform, .. } => Some((hostname, platform, true)),
        DiscoveryMessage::Response { hostname, platform, .. } => Some((hostname, platform, false)),
    }
}

/// Computes the directed broadcast address for the interface `local_ip` is bound to.
///
/// `local_ip_address` doesn't expose interface netmasks, so this assumes the common LAN
/// case of a /24 and sets the last octet to 255 rather than guessing at a narrower mask.
/// Falls back to the limited broadcast address when `local_ip` isn't a real interface
/// address (e.g. [`HostIdentity::resolve`] couldn't find a route and fell back to
/// loopback), since a directed broadcast computed from `127.0.0.1` would reach nothing.
fn directed_broadcast_addr(local_ip: Ipv4Addr) -> Ipv4Addr {
    if local_ip.is_loopback() {
        return Ipv4Addr::BROADCAST;
    }
    let octets = local_ip.octets();
    Ipv4Addr::new(octets[0], octets[1], octets[2], 255)
}

fn broadcast_loop(socket: UdpSocket, identity: HostIdentity, running: Arc<AtomicBool>) {
    let dest = SocketAddr::from((directed_broadcast_addr(identity.local_ip), DISCOVERY_PORT));
    let payload = announcement_payload(&identity);
    while running.load(Ordering::Relaxed) {
        if let Err(e) = socket.send_to(&payload, dest) {
            log::warn!("discovery broadcast failed: {e}");
        }
        thread::sleep(BROADCAST_INTERVAL);
    }
}

fn listen_loop(socket: UdpSocket, peers: Arc<PeerTable>, identity: HostIdentity, running: Arc<AtomicBool>) {
    socket
        .set_read_timeout(Some(Duration::from_millis(500)))
        .expect("setting a read timeout on a bound UDP socket cannot fail");

    let mut buf = [0u8; 512];
    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((0, SocketAddr::V4(from))) => {
                // Zero-byte liveness probe: echo it straight back to the prober's port.
                if let Err(e) = socket.send_to(b"", from) {
                    log::warn!("liveness echo to {from} failed: {e}");
                }
            }
            Ok((n, SocketAddr::V4(from))) => {
                let sender_ip = *from.ip();
                if sender_ip == identity.local_ip {
                    continue; // self-announcement, ignore
                }
                if let Some((hostname, platform, was_discovery)) = parse_announcement(&buf[..n]) {
                    let previously_unseen = !peers.contains(sender_ip);
                    log::debug!("discovered peer {hostname} ({platform}) at {sender_ip}");
                    peers.upsert(Peer {
                        hostname,
                        platform,
                        addr: sender_ip,
                        last_ping_ms: None,
                        reachable: false,
                    });
                    if was_discovery && previously_unseen {
                        let reply = response_payload(&identity);
                        if let Err(e) = socket.send_to(&reply, SocketAddr::from((sender_ip, DISCOVERY_PORT))) {
                            log::warn!("discovery response to {sender_ip} failed: {e}");
                        }
                    }
                }
            }
            Ok((_, SocketAddr::V6(_))) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => log::warn!("discovery listen failed: {e}"),
        }
    }
}

fn liveness_loop(peers: Arc<PeerTable>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        thread::sleep(LIVENESS_TICK);
        for peer in peers.snapshot() {
            let (reachable, rtt_ms) = probe_liveness(peer.addr);
            peers.record_liveness(peer.addr, reachable, rtt_ms);
        }
        peers.evict_stale();
    }
}

/// Sends a zero-byte unicast probe to `addr` and waits up to [`PING_TIMEOUT`] for any
/// reply, substituting for the privileged ICMP echo a CLI tool would normally issue.
/// Returns `(reachable, round_trip_ms)`.
pub fn probe_liveness(addr: Ipv4Addr) -> (bool, Option<f64>) {
    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)) {
        Ok(s) => s,
        Err(_) => return (false, None),
    };
    if socket.set_read_timeout(Some(PING_TIMEOUT)).is_err() {
        return (false, None);
    }
    let sent_at = Instant::now();
    if socket.send_to(b"", (addr, DISCOVERY_PORT)).is_err() {
        return (false, None);
    }
    let mut buf = [0u8; 1];
    match socket.recv_from(&mut buf) {
        Ok(_) => (true, Some(sent_at.elapsed().as_secs_f64() * 1000.0)),
        Err(_) => (false, None),
    }
}
