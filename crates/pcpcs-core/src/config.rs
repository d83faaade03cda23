// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire-level constants - single source of truth for ports, timeouts and buffer sizes.
//!
//! Every numeric value here is load-bearing protocol state shared between peers on the
//! same LAN segment; changing one changes interoperability with older binaries, not just
//! local behavior. Keep all of them here rather than inlined at call sites.

use std::time::Duration;

/// UDP port peers broadcast discovery announcements on and listen for them.
pub const DISCOVERY_PORT: u16 = 52525;

/// TCP port the transfer server accepts connections on.
pub const TRANSFER_PORT: u16 = 52526;

/// First of the contiguous range of side ports used for parallel file chunk connections.
pub const PARALLEL_PORT_START: u16 = 52530;

/// Number of side ports reserved for parallel transfer (also the max chunk worker count).
pub const PARALLEL_CONNECTIONS: usize = 8;

/// How often a peer re-broadcasts its presence.
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(3);

/// How often the liveness loop sweeps the peer table for stale entries.
pub const LIVENESS_TICK: Duration = Duration::from_secs(5);

/// A peer not heard from within this window is evicted from the table.
pub const PEER_STALE_AFTER: Duration = Duration::from_secs(30);

/// Deadline for the liveness probe's unicast reply.
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Generic control-message read buffer size.
pub const BUFFER_SIZE: usize = 8192;

/// Chunk size used by the single-connection file sender/receiver loop.
pub const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// SO_SNDBUF / SO_RCVBUF applied to every transfer socket.
pub const SOCKET_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Files at or above this size become eligible for parallel (multi-connection) transfer.
pub const PARALLEL_MIN_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Per-chunk-worker read/write granularity during parallel transfer.
pub const PARALLEL_CHUNK_SIZE: usize = 256 * 1024;

/// Read/write granularity for the zero-copy `sendfile` fallback path.
pub const SEND_CHUNK_SIZE: usize = 256 * 1024;

/// Fixed width of the post-v1 control reply token (`ACK_____`, `SKIP____`, `ERROR___`).
pub const RESP_LENGTH: usize = 8;

/// Legacy two-byte reply used only for TEXT/FILE acknowledgements, kept for interop.
pub const LEGACY_OK: &[u8] = b"OK";

/// Window bytes hashed from the start and end of a file for the quick fingerprint.
pub const QUICK_HASH_WINDOW: u64 = 64 * 1024;

/// Deadline for establishing the control connection for a text message.
pub const TEXT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for establishing the control connection for a single-file transfer.
pub const FILE_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for establishing the control connection for a folder transfer handshake.
pub const FOLDER_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for establishing a parallel-transfer side-port connection.
pub const SIDE_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-side deadline for reading the leading frame off a freshly accepted connection,
/// before the transfer kind (and its own timeout) is known.
pub const SERVER_INITIAL_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on how long a single-file transfer may run before it's abandoned.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(300);

/// Overall ceiling for folder transfers, scaled by the caller per file count in practice.
pub const FOLDER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Fixed receive-area directory name created under the user's home directory.
pub const RECEIVE_DIR_NAME: &str = "PCPCS_Received";
