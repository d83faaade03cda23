// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridges `pcpcs_core::events::TransferEvents` onto `tracing`, so the headless daemon
//! reports transfer activity the same way the rest of the process logs.

use std::net::Ipv4Addr;
use std::path::Path;
use tracing::{debug, info, warn};

use pcpcs_core::events::{FolderFileStatus, TransferEvents};

/// A `TransferEvents` implementation that logs every notification via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl TransferEvents for TracingEvents {
    fn on_status(&self, message: &str) {
        info!("{message}");
    }

    fn on_transfer_start(&self, file_name: &str, bytes_total: u64) {
        info!(file_name, bytes_total, "transfer starting");
    }

    fn on_progress(&self, file_name: &str, bytes_done: u64, bytes_total: u64) {
        debug!(file_name, bytes_done, bytes_total, "transfer progress");
    }

    fn on_folder_progress(
        &self,
        index: u32,
        total: u32,
        rel_path: &str,
        file_pct: f64,
        overall_pct: f64,
        status: FolderFileStatus,
    ) {
        debug!(index, total, rel_path, file_pct, overall_pct, %status, "folder entry progress");
    }

    fn on_complete(&self, success: bool, message: &str) {
        if success {
            info!("{message}");
        } else {
            warn!("{message}");
        }
    }

    fn on_text_received(&self, sender_ip: Ipv4Addr, sender: &str, platform: &str, text: &str) {
        info!(%sender_ip, sender, platform, "text received: {text}");
    }

    fn on_file_received(&self, sender_ip: Ipv4Addr, sender: &str, platform: &str, path: &Path, size: u64) {
        info!(%sender_ip, sender, platform, size, "file received: {}", path.display());
    }

    fn on_folder_received(
        &self,
        sender_ip: Ipv4Addr,
        sender: &str,
        platform: &str,
        path: &Path,
        total_files: u32,
        total_size: u64,
    ) {
        info!(
            %sender_ip, sender, platform, total_files, total_size,
            "folder received: {}", path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_events_accepts_all_calls_without_a_subscriber() {
        let events = TracingEvents;
        let ip = Ipv4Addr::new(192, 168, 1, 7);
        events.on_status("hi");
        events.on_transfer_start("f.bin", 100);
        events.on_progress("f.bin", 50, 100);
        events.on_folder_progress(1, 2, "a.txt", 100.0, 50.0, FolderFileStatus::Completed);
        events.on_complete(true, "done");
        events.on_complete(false, "failed");
        events.on_text_received(ip, "peer", "Linux", "hello");
        events.on_file_received(ip, "peer", "Linux", Path::new("/tmp/f.bin"), 100);
        events.on_folder_received(ip, "peer", "Linux", Path::new("/tmp/folder"), 2, 200);
    }
}
