// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # pcpcs-core
//!
//! Peer-to-peer LAN discovery, text messaging, and file/folder transfer for trusted
//! local networks - no central server, no authentication, one broadcast port and one
//! TCP port per host.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pcpcs_core::discovery::DiscoveryService;
//! use pcpcs_core::events::NullEvents;
//! use pcpcs_core::identity::HostIdentity;
//! use pcpcs_core::receive_area;
//! use pcpcs_core::server::PcpcsServer;
//!
//! fn main() -> pcpcs_core::Result<()> {
//!     let identity = HostIdentity::resolve();
//!     let discovery = DiscoveryService::start(identity)?;
//!
//!     let server = PcpcsServer::bind(receive_area::receive_dir()?, std::sync::Arc::new(NullEvents))?;
//!     server.run(); // blocks, accepting connections until the process exits
//!
//!     discovery.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                          Application Layer                          |
//! |   PcpcsClient (send) | PcpcsServer (receive) | TransferEvents sink   |
//! +---------------------------------------------------------------------+
//! |                          Discovery Layer                            |
//! |   UDP broadcast announce/listen, peer table, liveness sweep         |
//! +---------------------------------------------------------------------+
//! |                          Transport Layer                            |
//! |   Length-prefixed TCP framing | reply tokens | sendfile zero-copy   |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`identity`] | Local hostname/platform/LAN-address resolution |
//! | [`discovery`] | UDP broadcast peer discovery and liveness tracking |
//! | [`transport`] | Length-prefixed framing, reply tokens, zero-copy send |
//! | [`hash`] | Quick content fingerprint for skip-if-unchanged transfers |
//! | [`events`] | `TransferEvents` progress/completion callback trait |
//! | [`receive_area`] | Fixed destination directory and collision-safe naming |
//! | [`server`] | Transfer server: accepts and dispatches incoming transfers |
//! | [`client`] | Transfer client: sends text, files, folders |
//! | [`config`] | Wire-level constants (ports, timeouts, chunk sizes) |
//! | [`error`] | Shared error type |

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod hash;
pub mod identity;
pub mod protocol;
pub mod receive_area;
pub mod server;
pub mod transport;

pub use error::{PcpcsError, Result};
pub use events::TransferEvents;
pub use identity::HostIdentity;
