// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Callback sink the server and client report transfer activity through.
//!
//! Mirrors the shape of an interactive GUI's callback surface without tying this crate
//! to any particular UI toolkit: a daemon can implement `TransferEvents` over `tracing`,
//! a GUI over its own event loop, and tests over a recording no-op.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

/// Where a single file within a folder transfer currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderFileStatus {
    /// The sender is streaming this file's bytes.
    Sending,
    /// The receiver is writing this file's bytes.
    Receiving,
    /// The file finished transferring and passed its hash check.
    Completed,
    /// The receiver already had an identical copy; no bytes were sent.
    Skipped,
}

impl fmt::Display for FolderFileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sending => "sending",
            Self::Receiving => "receiving",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        })
    }
}

/// Receives progress and completion notifications for transfers in either direction.
///
/// All methods have default no-op bodies so implementors only override what they need.
pub trait TransferEvents: Send + Sync {
    /// A free-form status line, e.g. "connected to 192.168.1.42".
    fn on_status(&self, _message: &str) {}

    /// A transfer (file, folder, or parallel file) is beginning; reported once before
    /// the first `on_progress` call.
    fn on_transfer_start(&self, _file_name: &str, _bytes_total: u64) {}

    /// Bytes transferred so far for a single file, out of its total size.
    fn on_progress(&self, _file_name: &str, _bytes_done: u64, _bytes_total: u64) {}

    /// Per-file and aggregate progress within a folder transfer.
    #[allow(clippy::too_many_arguments)]
    fn on_folder_progress(
        &self,
        _index: u32,
        _total: u32,
        _rel_path: &str,
        _file_pct: f64,
        _overall_pct: f64,
        _status: FolderFileStatus,
    ) {
    }

    /// A transfer finished, successfully or not; `message` is human-readable detail.
    fn on_complete(&self, _success: bool, _message: &str) {}

    /// A text message arrived from a peer.
    fn on_text_received(&self, _sender_ip: Ipv4Addr, _sender: &str, _platform: &str, _text: &str) {}

    /// A single file finished writing to the receive area.
    fn on_file_received(
        &self,
        _sender_ip: Ipv4Addr,
        _sender: &str,
        _platform: &str,
        _path: &Path,
        _size: u64,
    ) {
    }

    /// A folder finished writing to the receive area.
    #[allow(clippy::too_many_arguments)]
    fn on_folder_received(
        &self,
        _sender_ip: Ipv4Addr,
        _sender: &str,
        _platform: &str,
        _path: &Path,
        _total_files: u32,
        _total_size: u64,
    ) {
    }
}

/// A `TransferEvents` implementation that discards every notification, for callers that
/// only care about the return value of a transfer call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl TransferEvents for NullEvents {}
