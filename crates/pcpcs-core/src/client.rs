// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transfer client: sends text messages, single files, and folders to a peer's
//! transfer port.
//!
//! Large files dispatch automatically to the parallel-chunk path; folders send a
//! quick-hash per entry so the receiver can skip files it already has.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crate::config::{
    DATA_TIMEOUT, FILE_CONNECT_TIMEOUT, FOLDER_CONNECT_TIMEOUT, PARALLEL_CHUNK_SIZE,
    PARALLEL_CONNECTIONS, PARALLEL_MIN_FILE_SIZE, SEND_CHUNK_SIZE, SIDE_CONNECT_TIMEOUT,
    TEXT_CONNECT_TIMEOUT, TRANSFER_PORT,
};
use crate::error::{PcpcsError, Result};
use crate::events::TransferEvents;
use crate::hash::quick_hash;
use crate::identity::HostIdentity;
use crate::protocol::{ChunkDescriptor, Header};
use crate::transport::{read_legacy_ok, send_file_range, tune_socket, ReplyToken};

/// Sends text messages, files, and folders to peers discovered on the LAN.
pub struct PcpcsClient {
    identity: HostIdentity,
    events: Arc<dyn TransferEvents>,
    cancel: Arc<AtomicBool>,
}

impl PcpcsClient {
    pub fn new(identity: HostIdentity, events: Arc<dyn TransferEvents>) -> Self {
        Self { identity, events, cancel: Arc::new(AtomicBool::new(false)) }
    }

    /// Requests that any in-flight `send_folder` call stop after its current file.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Sends a UTF-8 text message to `peer_ip`'s transfer port.
    pub fn send_text(&self, peer_ip: Ipv4Addr, text: &str) -> Result<()> {
        self.send_text_to(SocketAddr::from((peer_ip, TRANSFER_PORT)), text)
    }

    /// Sends a UTF-8 text message to an explicit `target` address.
    pub fn send_text_to(&self, target: SocketAddr, text: &str) -> Result<()> {
        let result = self.send_text_inner(target, text);
        self.report(&result, "text sent");
        result
    }

    fn send_text_inner(&self, target: SocketAddr, text: &str) -> Result<()> {
        let mut stream = TcpStream::connect_timeout(&target, TEXT_CONNECT_TIMEOUT)?;
        tune_socket(&stream)?;
        let body = text.as_bytes();
        Header::Text {
            sender: self.identity.hostname.clone(),
            platform: self.identity.platform.to_string(),
            length: body.len() as u64,
        }
        .write(&mut stream)?;
        stream.write_all(body)?;
        stream.set_read_timeout(Some(TEXT_CONNECT_TIMEOUT))?;
        read_legacy_ok(&mut stream)?;
        Ok(())
    }

    /// Sends a single file, automatically using the parallel-chunk path at or above
    /// [`PARALLEL_MIN_FILE_SIZE`].
    pub fn send_file(&self, peer_ip: Ipv4Addr, path: &Path) -> Result<()> {
        self.send_file_to(SocketAddr::from((peer_ip, TRANSFER_PORT)), path)
    }

    /// Sends a single file to an explicit `target` address.
    pub fn send_file_to(&self, target: SocketAddr, path: &Path) -> Result<()> {
        let filesize = std::fs::metadata(path)?.len();
        if filesize >= PARALLEL_MIN_FILE_SIZE {
            return self.send_file_parallel_to(target, path);
        }

        let result = self.send_file_single_inner(target, path, filesize);
        self.report(&result, "file sent");
        result
    }

    fn send_file_single_inner(&self, target: SocketAddr, path: &Path, filesize: u64) -> Result<()> {
        let filename = basename(path);
        let mut stream = TcpStream::connect_timeout(&target, FILE_CONNECT_TIMEOUT)?;
        tune_socket(&stream)?;
        Header::File {
            sender: self.identity.hostname.clone(),
            platform: self.identity.platform.to_string(),
            filename: filename.clone(),
            filesize,
        }
        .write(&mut stream)?;

        self.events.on_transfer_start(&filename, filesize);
        let file = File::open(path)?;
        let events = self.events.clone();
        send_file_range(&file, &stream, filesize, |done| {
            events.on_progress(&filename, done, filesize);
            Ok(())
        })?;

        stream.set_read_timeout(Some(DATA_TIMEOUT))?;
        read_legacy_ok(&mut stream)?;
        Ok(())
    }

    /// Sends a single file using the multi-connection parallel-chunk path regardless of
    /// size. `send_file_to` calls this automatically for large files.
    pub fn send_file_parallel_to(&self, target: SocketAddr, path: &Path) -> Result<()> {
        let result = self.send_file_parallel_inner(target, path);
        self.report(&result, "file sent (parallel)");
        result
    }

    fn send_file_parallel_inner(&self, target: SocketAddr, path: &Path) -> Result<()> {
        let peer_ip = match target.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => return Err(PcpcsError::Protocol("parallel transfer requires an IPv4 peer".into())),
        };
        let filesize = std::fs::metadata(path)?.len();
        let filename = basename(path);
        let chunks = plan_chunks(filesize);

        let mut control = TcpStream::connect_timeout(&target, FILE_CONNECT_TIMEOUT)?;
        tune_socket(&control)?;
        Header::ParallelFile {
            sender: self.identity.hostname.clone(),
            platform: self.identity.platform.to_string(),
            filename: filename.clone(),
            filesize,
            num_chunks: chunks.len() as u32,
            chunks: chunks.clone(),
        }
        .write(&mut control)?;

        control.set_read_timeout(Some(SIDE_CONNECT_TIMEOUT))?;
        match ReplyToken::read(&mut control)? {
            ReplyToken::Ack => {}
            other => return Err(PcpcsError::Protocol(format!("parallel file not accepted: {other:?}"))),
        }

        self.events.on_transfer_start(&filename, filesize);

        let progress: Arc<Mutex<HashMap<u32, u64>>> =
            Arc::new(Mutex::new(chunks.iter().map(|c| (c.chunk_id, 0u64)).collect()));
        let sampler_done = Arc::new(AtomicBool::new(false));

        let sampler = {
            let progress = progress.clone();
            let sampler_done = sampler_done.clone();
            let events = self.events.clone();
            let filename = filename.clone();
            thread::spawn(move || {
                while !sampler_done.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(100));
                    let total: u64 = progress.lock().values().sum();
                    events.on_progress(&filename, total, filesize);
                }
            })
        };

        let path = path.to_path_buf();
        let handles: Vec<_> = chunks
            .iter()
            .copied()
            .map(|chunk| {
                let path = path.clone();
                let progress = progress.clone();
                let cancel = self.cancel.clone();
                thread::Builder::new()
                    .name(format!("pcpcs-send-chunk-{}", chunk.chunk_id))
                    .spawn(move || send_chunk(peer_ip, &path, &chunk, &progress, &cancel))
                    .expect("spawning a chunk sender thread")
            })
            .collect();

        let first_error = handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(PcpcsError::Protocol("chunk sender panicked".into()))))
            .find_map(std::result::Result::err);

        sampler_done.store(true, Ordering::Relaxed);
        let _ = sampler.join();

        if let Some(err) = first_error {
            return Err(err);
        }

        Header::ParallelDone { filename, filesize }.write(&mut control)?;
        control.set_read_timeout(Some(DATA_TIMEOUT))?;
        match ReplyToken::read(&mut control)? {
            ReplyToken::Ack => Ok(()),
            other => Err(PcpcsError::Protocol(format!("parallel file not confirmed: {other:?}"))),
        }
    }

    /// Sends every file under `folder`, skipping entries whose quick hash the receiver
    /// already has. `resume_from` seeds the skip set with relative paths a prior,
    /// interrupted run already completed; returns the full set of relative paths that
    /// completed (sent or skipped) this call, for the caller to persist as the next
    /// run's `resume_from`.
    pub fn send_folder(
        &self,
        peer_ip: Ipv4Addr,
        folder: &Path,
        resume_from: Option<&HashSet<String>>,
    ) -> Result<HashSet<String>> {
        self.send_folder_to(SocketAddr::from((peer_ip, TRANSFER_PORT)), folder, resume_from)
    }

    /// Sends a folder to an explicit `target` address; see [`PcpcsClient::send_folder`].
    pub fn send_folder_to(
        &self,
        target: SocketAddr,
        folder: &Path,
        resume_from: Option<&HashSet<String>>,
    ) -> Result<HashSet<String>> {
        self.cancel.store(false, Ordering::Relaxed);
        let result = self.send_folder_inner(target, folder, resume_from);
        match &result {
            Ok(completed) => {
                self.events.on_complete(true, &format!("folder sent ({} files)", completed.len()));
            }
            Err(e) => self.events.on_complete(false, &e.to_string()),
        }
        result
    }

    fn send_folder_inner(
        &self,
        target: SocketAddr,
        folder: &Path,
        resume_from: Option<&HashSet<String>>,
    ) -> Result<HashSet<String>> {
        if !folder.is_dir() {
            return Err(PcpcsError::Protocol(format!("not a folder: {}", folder.display())));
        }

        let entries = walk_folder(folder)?;
        if entries.is_empty() {
            return Err(PcpcsError::Protocol(format!("folder is empty: {}", folder.display())));
        }

        let folder_name = basename(folder);
        let total_files = entries.len() as u32;
        let total_size: u64 = entries.iter().map(|e| e.size).sum();
        let mut completed: HashSet<String> = resume_from.cloned().unwrap_or_default();

        let mut stream = TcpStream::connect_timeout(&target, FOLDER_CONNECT_TIMEOUT)?;
        tune_socket(&stream)?;
        Header::FolderStart {
            sender: self.identity.hostname.clone(),
            platform: self.identity.platform.to_string(),
            folder_name,
            total_files,
            total_size,
        }
        .write(&mut stream)?;

        stream.set_read_timeout(Some(FOLDER_CONNECT_TIMEOUT))?;
        match ReplyToken::read(&mut stream)? {
            ReplyToken::Ack => {}
            other => return Err(PcpcsError::Protocol(format!("folder transfer not accepted: {other:?}"))),
        }

        self.events.on_transfer_start(folder.to_string_lossy().as_ref(), total_size);
        stream.set_read_timeout(Some(DATA_TIMEOUT))?;

        let mut sent_size = 0u64;
        for (index, entry) in entries.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(PcpcsError::Cancelled);
            }
            if resume_from.is_some_and(|done| done.contains(&entry.rel_path)) {
                sent_size += entry.size;
                continue;
            }

            let hash = quick_hash(&entry.path).unwrap_or_default();
            Header::FolderFile {
                rel_path: entry.rel_path.clone(),
                size: entry.size,
                hash,
                index: index as u32 + 1,
                total: total_files,
            }
            .write(&mut stream)?;

            match ReplyToken::read(&mut stream)? {
                ReplyToken::Skip => {
                    sent_size += entry.size;
                    completed.insert(entry.rel_path.clone());
                    continue;
                }
                ReplyToken::Ack => {}
                other => return Err(PcpcsError::Protocol(format!("folder entry not accepted: {other:?}"))),
            }

            let file = File::open(&entry.path)?;
            let rel_path = entry.rel_path.clone();
            let events = self.events.clone();
            let base_sent = sent_size;
            let cancel = self.cancel.clone();
            send_file_range(&file, &stream, entry.size, |done| {
                if cancel.load(Ordering::Relaxed) {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "transfer cancelled"));
                }
                events.on_progress(&rel_path, base_sent + done, total_size);
                Ok(())
            })
            .map_err(|e| {
                if e.kind() == io::ErrorKind::Interrupted {
                    PcpcsError::Cancelled
                } else {
                    PcpcsError::Io(e)
                }
            })?;

            match ReplyToken::read(&mut stream)? {
                ReplyToken::Ack => {}
                other => return Err(PcpcsError::Protocol(format!("folder entry not confirmed: {other:?}"))),
            }

            sent_size += entry.size;
            completed.insert(entry.rel_path.clone());
        }

        Header::FolderEnd { folder_name: basename(folder), total_sent: completed.len() as u32 }.write(&mut stream)?;
        match ReplyToken::read(&mut stream)? {
            ReplyToken::Ack => Ok(completed),
            other => Err(PcpcsError::Protocol(format!("folder transfer not confirmed: {other:?}"))),
        }
    }

    fn report(&self, result: &Result<()>, summary: &str) {
        match result {
            Ok(()) => self.events.on_complete(true, summary),
            Err(e) => self.events.on_complete(false, &e.to_string()),
        }
    }
}

fn plan_chunks(filesize: u64) -> Vec<ChunkDescriptor> {
    let num_chunks = ((filesize / PARALLEL_CHUNK_SIZE as u64).max(1) as usize).min(PARALLEL_CONNECTIONS) as u32;
    let chunk_size = filesize / u64::from(num_chunks);
    (0..num_chunks)
        .map(|i| {
            let offset = u64::from(i) * chunk_size;
            let size = if i == num_chunks - 1 { filesize - offset } else { chunk_size };
            ChunkDescriptor {
                chunk_id: i,
                offset,
                size,
                port: crate::config::PARALLEL_PORT_START + i as u16,
            }
        })
        .collect()
}

fn send_chunk(
    peer_ip: Ipv4Addr,
    path: &Path,
    chunk: &ChunkDescriptor,
    progress: &Arc<Mutex<HashMap<u32, u64>>>,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    let target = SocketAddr::from((peer_ip, chunk.port));
    let mut stream = TcpStream::connect_timeout(&target, SIDE_CONNECT_TIMEOUT)?;
    tune_socket(&stream)?;
    stream.set_read_timeout(Some(DATA_TIMEOUT))?;

    Header::ParallelChunk { chunk_id: chunk.chunk_id, offset: chunk.offset, size: chunk.size }.write(&mut stream)?;
    match ReplyToken::read(&mut stream)? {
        ReplyToken::Ack => {}
        other => return Err(PcpcsError::Protocol(format!("chunk {} not accepted: {other:?}", chunk.chunk_id))),
    }

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(chunk.offset))?;
    let mut buf = vec![0u8; SEND_CHUNK_SIZE];
    let mut sent = 0u64;
    while sent < chunk.size {
        if cancel.load(Ordering::Relaxed) {
            return Err(PcpcsError::Cancelled);
        }
        let want = (chunk.size - sent).min(SEND_CHUNK_SIZE as u64) as usize;
        file.read_exact(&mut buf[..want])?;
        stream.write_all(&buf[..want])?;
        sent += want as u64;
        progress.lock().insert(chunk.chunk_id, sent);
    }

    match ReplyToken::read(&mut stream)? {
        ReplyToken::Ack => Ok(()),
        other => Err(PcpcsError::Protocol(format!("chunk {} not confirmed: {other:?}", chunk.chunk_id))),
    }
}

struct FolderEntry {
    path: std::path::PathBuf,
    rel_path: String,
    size: u64,
}

fn walk_folder(root: &Path) -> Result<Vec<FolderEntry>> {
    let mut entries = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let size = entry.metadata()?.len();
                let rel_path = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                entries.push(FolderEntry { path, rel_path, size });
            }
        }
    }
    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string())
}

/// Elapsed-time/bytes-sent ETA estimator shared by progress callbacks that want a
/// "time remaining" figure rather than just a byte count - sampled at the ~100ms cadence
/// the parallel and folder progress loops already poll at.
pub struct EtaEstimator {
    started: Instant,
}

impl EtaEstimator {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }

    /// Seconds remaining at the current average throughput, or `None` before any
    /// progress has been made.
    pub fn remaining_secs(&self, bytes_done: u64, bytes_total: u64) -> Option<f64> {
        if bytes_done == 0 || bytes_done >= bytes_total {
            return None;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = bytes_done as f64 / elapsed;
        if rate <= 0.0 {
            return None;
        }
        Some((bytes_total - bytes_done) as f64 / rate)
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::new()
    }
}
