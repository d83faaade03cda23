// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transfer server: accepts TCP connections on [`crate::config::TRANSFER_PORT`] and
//! dispatches each to a handler for text, single-file, folder, or parallel-file transfer.
//!
//! Every accepted connection is served by its own thread; the protocol is strictly
//! blocking request/response, so there's no reactor state to share across connections.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{
    DATA_TIMEOUT, FILE_CHUNK_SIZE, FOLDER_TIMEOUT, PARALLEL_CHUNK_SIZE, SERVER_INITIAL_READ_TIMEOUT,
    SIDE_CONNECT_TIMEOUT, TRANSFER_PORT,
};
use crate::error::{PcpcsError, Result};
use crate::events::{FolderFileStatus, TransferEvents};
use crate::hash::quick_hash;
use crate::protocol::{ChunkDescriptor, Header};
use crate::receive_area::{unique_destination, unique_dir_destination};
use crate::transport::{tune_socket, write_legacy_ok, ReplyToken};

/// Listens on the transfer port and serves inbound text/file/folder/parallel-file
/// sessions, spawning one handler thread per accepted connection.
pub struct PcpcsServer {
    listener: TcpListener,
    receive_dir: PathBuf,
    events: Arc<dyn TransferEvents>,
    running: Arc<AtomicBool>,
}

impl PcpcsServer {
    /// Binds [`TRANSFER_PORT`] on every interface, serving into `receive_dir`.
    pub fn bind(receive_dir: PathBuf, events: Arc<dyn TransferEvents>) -> Result<Self> {
        Self::bind_addr(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, TRANSFER_PORT),
            receive_dir,
            events,
        )
    }

    /// Binds a specific address, for daemons that expose a bind-address config option
    /// and for tests that want an ephemeral port.
    pub fn bind_addr(addr: SocketAddrV4, receive_dir: PathBuf, events: Arc<dyn TransferEvents>) -> Result<Self> {
        fs::create_dir_all(&receive_dir)?;
        let listener = TcpListener::bind(addr).map_err(|e| {
            log::error!("transfer server bind failed on {addr}: {e}");
            PcpcsError::Bind(format!("{addr}: {e}"))
        })?;
        listener.set_nonblocking(true)?;
        log::debug!("transfer server bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            receive_dir,
            events,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// The address this server is actually listening on (useful after binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until [`PcpcsServer::stop`] is called, spawning one handler
    /// thread per connection. Blocks the calling thread.
    pub fn run(&self) {
        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let sender_ip = match addr.ip() {
                        IpAddr::V4(v4) => v4,
                        IpAddr::V6(_) => continue, // discovery and wire format are IPv4-only
                    };
                    let events = self.events.clone();
                    let receive_dir = self.receive_dir.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("pcpcs-conn-{sender_ip}"))
                        .spawn(move || {
                            if let Err(e) = handle_connection(stream, sender_ip, &events, &receive_dir) {
                                log::warn!("connection from {sender_ip} failed: {e}");
                            }
                        });
                    if let Err(e) = spawned {
                        log::warn!("could not spawn handler thread for {sender_ip}: {e}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(200));
                }
                Err(e) => log::warn!("accept failed: {e}"),
            }
        }
    }

    /// Signals [`PcpcsServer::run`] to return after its current accept poll.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn handle_connection(
    mut stream: TcpStream,
    sender_ip: Ipv4Addr,
    events: &Arc<dyn TransferEvents>,
    receive_dir: &Path,
) -> Result<()> {
    tune_socket(&stream)?;
    stream.set_read_timeout(Some(SERVER_INITIAL_READ_TIMEOUT))?;
    let header = Header::read(&mut stream)?;

    match header {
        Header::Text { sender, platform, length } => {
            handle_text(&mut stream, sender_ip, &sender, &platform, length, events)
        }
        Header::File { sender, platform, filename, filesize } => {
            stream.set_read_timeout(Some(DATA_TIMEOUT))?;
            handle_file(&mut stream, sender_ip, &sender, &platform, &filename, filesize, events, receive_dir)
        }
        Header::ParallelFile { sender, platform, filename, filesize, num_chunks, chunks } => {
            stream.set_read_timeout(Some(FOLDER_TIMEOUT))?;
            handle_parallel_file(
                &mut stream, sender_ip, &sender, &platform, &filename, filesize, num_chunks, chunks, events,
                receive_dir,
            )
        }
        Header::FolderStart { sender, platform, folder_name, total_files, total_size } => {
            stream.set_read_timeout(Some(FOLDER_TIMEOUT))?;
            handle_folder(
                &mut stream, sender_ip, &sender, &platform, &folder_name, total_files, total_size, events,
                receive_dir,
            )
        }
        other => {
            log::warn!("unexpected leading frame from {sender_ip}: {other:?}");
            Err(PcpcsError::Protocol(format!("unexpected leading frame: {other:?}")))
        }
    }
}

fn handle_text(
    stream: &mut TcpStream,
    sender_ip: Ipv4Addr,
    sender: &str,
    platform: &str,
    length: u64,
    events: &Arc<dyn TransferEvents>,
) -> Result<()> {
    let mut body = vec![0u8; length as usize];
    stream.read_exact(&mut body)?;
    let text = String::from_utf8(body)
        .map_err(|_| PcpcsError::Protocol("text body is not valid UTF-8".into()))?;

    log::info!("text message from {sender} ({sender_ip}, {length} bytes)");
    write_legacy_ok(stream)?;
    events.on_text_received(sender_ip, sender, platform, &text);
    events.on_complete(true, &format!("text received from {sender}"));
    Ok(())
}

fn handle_file(
    stream: &mut TcpStream,
    sender_ip: Ipv4Addr,
    sender: &str,
    platform: &str,
    filename: &str,
    filesize: u64,
    events: &Arc<dyn TransferEvents>,
    receive_dir: &Path,
) -> Result<()> {
    let safe_name = basename(filename);
    let dest = unique_destination(receive_dir, &safe_name)?;
    log::info!("receiving file {safe_name} ({filesize} bytes) from {sender} ({sender_ip})");
    events.on_transfer_start(&safe_name, filesize);

    let result = receive_exact_to_file(stream, &dest, filesize, |done| {
        events.on_progress(&safe_name, done, filesize);
    });

    match result {
        Ok(()) => {
            write_legacy_ok(stream)?;
            events.on_file_received(sender_ip, sender, platform, &dest, filesize);
            events.on_complete(true, &format!("{safe_name} received"));
            log::info!("file received: {}", dest.display());
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&dest);
            log::warn!("file receive of {safe_name} failed, removed partial write: {e}");
            events.on_complete(false, &e.to_string());
            Err(e)
        }
    }
}

fn handle_parallel_file(
    stream: &mut TcpStream,
    sender_ip: Ipv4Addr,
    sender: &str,
    platform: &str,
    filename: &str,
    filesize: u64,
    _num_chunks: u32,
    chunks: Vec<ChunkDescriptor>,
    events: &Arc<dyn TransferEvents>,
    receive_dir: &Path,
) -> Result<()> {
    let safe_name = basename(filename);
    let dest = unique_destination(receive_dir, &safe_name)?;
    log::info!(
        "receiving parallel file {safe_name} ({filesize} bytes, {} chunks) from {sender} ({sender_ip})",
        chunks.len()
    );

    {
        let file = File::create(&dest)?;
        file.set_len(filesize)?;
    }

    // Every side port must be listening before the ACK goes out: a client that dials a
    // chunk port immediately after seeing ACK must never lose the race to connect().
    let mut listeners = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, chunk.port);
        match TcpListener::bind(addr) {
            Ok(listener) => listeners.push(listener),
            Err(e) => {
                log::error!("failed to bind parallel side port {}: {e}", chunk.port);
                let _ = ReplyToken::Error.write(stream);
                let _ = fs::remove_file(&dest);
                return Err(PcpcsError::Bind(format!("side port {}: {e}", chunk.port)));
            }
        }
    }

    ReplyToken::Ack.write(stream)?;
    events.on_transfer_start(&safe_name, filesize);

    let progress: Arc<Mutex<HashMap<u32, u64>>> =
        Arc::new(Mutex::new(chunks.iter().map(|c| (c.chunk_id, 0u64)).collect()));
    let sampler_done = Arc::new(AtomicBool::new(false));

    let sampler = {
        let progress = progress.clone();
        let sampler_done = sampler_done.clone();
        let events = events.clone();
        let safe_name = safe_name.clone();
        thread::spawn(move || {
            while !sampler_done.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
                let total: u64 = progress.lock().values().sum();
                events.on_progress(&safe_name, total, filesize);
            }
        })
    };

    let handles: Vec<_> = listeners
        .into_iter()
        .zip(chunks.iter().copied())
        .map(|(listener, chunk)| {
            let dest = dest.clone();
            let progress = progress.clone();
            thread::Builder::new()
                .name(format!("pcpcs-chunk-{}", chunk.chunk_id))
                .spawn(move || receive_chunk(listener, &dest, &chunk, &progress))
                .expect("spawning a chunk worker thread")
        })
        .collect();

    let first_error = handles
        .into_iter()
        .map(|h| h.join().unwrap_or_else(|_| Err(PcpcsError::Protocol("chunk worker panicked".into()))))
        .find_map(std::result::Result::err);

    sampler_done.store(true, Ordering::Relaxed);
    let _ = sampler.join();

    if let Some(err) = first_error {
        log::warn!("parallel file receive of {safe_name} failed: {err}");
        let _ = ReplyToken::Error.write(stream);
        let _ = fs::remove_file(&dest);
        events.on_complete(false, &err.to_string());
        return Err(err);
    }

    match Header::read(stream)? {
        Header::ParallelDone { .. } => {
            ReplyToken::Ack.write(stream)?;
            events.on_file_received(sender_ip, sender, platform, &dest, filesize);
            events.on_complete(true, &format!("{safe_name} received"));
            log::info!("parallel file received: {}", dest.display());
            Ok(())
        }
        other => {
            let _ = ReplyToken::Error.write(stream);
            let _ = fs::remove_file(&dest);
            let err = PcpcsError::Protocol(format!("expected PARALLEL_DONE, got {other:?}"));
            events.on_complete(false, &err.to_string());
            Err(err)
        }
    }
}

/// Waits for the client to dial a side port, bounded by [`SIDE_CONNECT_TIMEOUT`] so a
/// client that ACKs a parallel transfer but never connects one of its chunk ports
/// (crash, partition, a blocked port) can't leak this worker thread forever.
///
/// Mirrors [`PcpcsServer::run`]'s own nonblocking-accept-and-poll idiom rather than a
/// blocking `accept()`, since `std::net::TcpListener` has no accept-with-deadline API.
fn accept_chunk_connection(listener: &TcpListener, chunk: &ChunkDescriptor) -> Result<(TcpStream, SocketAddr)> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + SIDE_CONNECT_TIMEOUT;
    loop {
        match listener.accept() {
            Ok(pair) => return Ok(pair),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(PcpcsError::Timeout(format!(
                        "no connection on side port for chunk {} within {SIDE_CONNECT_TIMEOUT:?}",
                        chunk.chunk_id
                    )));
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn receive_chunk(
    listener: TcpListener,
    dest: &Path,
    chunk: &ChunkDescriptor,
    progress: &Arc<Mutex<HashMap<u32, u64>>>,
) -> Result<()> {
    let (mut conn, peer_addr) = accept_chunk_connection(&listener, chunk)?;
    tune_socket(&conn)?;
    conn.set_read_timeout(Some(DATA_TIMEOUT))?;
    log::debug!("chunk {} connected from {peer_addr}", chunk.chunk_id);

    match Header::read(&mut conn)? {
        Header::ParallelChunk { chunk_id, offset, size }
            if chunk_id == chunk.chunk_id && offset == chunk.offset && size == chunk.size => {}
        other => {
            return Err(PcpcsError::Protocol(format!(
                "chunk {} got a mismatched header: {other:?}",
                chunk.chunk_id
            )));
        }
    }

    ReplyToken::Ack.write(&mut conn)?;

    let file = OpenOptions::new().write(true).open(dest)?;
    let mut buf = vec![0u8; PARALLEL_CHUNK_SIZE];
    let mut received = 0u64;
    while received < chunk.size {
        let want = (chunk.size - received).min(PARALLEL_CHUNK_SIZE as u64) as usize;
        conn.read_exact(&mut buf[..want])?;
        write_at(&file, &buf[..want], chunk.offset + received)?;
        received += want as u64;
        progress.lock().insert(chunk.chunk_id, received);
    }

    ReplyToken::Ack.write(&mut conn)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_folder(
    stream: &mut TcpStream,
    sender_ip: Ipv4Addr,
    sender: &str,
    platform: &str,
    folder_name: &str,
    _total_files: u32,
    total_size: u64,
    events: &Arc<dyn TransferEvents>,
    receive_dir: &Path,
) -> Result<()> {
    let safe_name = basename(folder_name);
    let folder_path = unique_dir_destination(receive_dir, &safe_name)?;
    fs::create_dir_all(&folder_path)?;
    log::info!("receiving folder {safe_name} from {sender} ({sender_ip}), {total_size} bytes total");

    ReplyToken::Ack.write(stream)?;
    events.on_transfer_start(&safe_name, total_size);

    let mut received_size = 0u64;
    let mut received_files = 0u32;

    loop {
        let header = match Header::read(stream) {
            Ok(h) => h,
            Err(e) => {
                let _ = ReplyToken::Error.write(stream);
                return Err(e.into());
            }
        };

        match header {
            Header::FolderFile { rel_path, size, hash, index, total } => {
                let safe_rel = sanitize_rel_path(&rel_path);
                let dest = folder_path.join(&safe_rel);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                let rel_display = safe_rel.to_string_lossy().into_owned();

                if !hash.is_empty() && dest.exists() {
                    if let Ok(existing) = quick_hash(&dest) {
                        if existing == hash {
                            ReplyToken::Skip.write(stream)?;
                            received_size += size;
                            received_files += 1;
                            let overall = overall_pct(received_size, total_size);
                            events.on_folder_progress(
                                index, total, &rel_display, 100.0, overall, FolderFileStatus::Skipped,
                            );
                            log::debug!("folder file skipped ({index}/{total}): {rel_display}");
                            continue;
                        }
                    }
                }

                ReplyToken::Ack.write(stream)?;
                let base_received = received_size;
                let result = receive_exact_to_file(stream, &dest, size, |done| {
                    let file_pct = if size == 0 { 100.0 } else { (done as f64 / size as f64) * 100.0 };
                    let overall = overall_pct(base_received + done, total_size);
                    events.on_folder_progress(
                        index, total, &rel_display, file_pct, overall, FolderFileStatus::Receiving,
                    );
                });

                if let Err(e) = result {
                    let _ = fs::remove_file(&dest);
                    let _ = ReplyToken::Error.write(stream);
                    events.on_complete(false, &e.to_string());
                    return Err(e);
                }

                if !hash.is_empty() {
                    let actual = quick_hash(&dest)?;
                    if actual != hash {
                        let _ = fs::remove_file(&dest);
                        let _ = ReplyToken::Error.write(stream);
                        let err = PcpcsError::HashMismatch { expected: hash, actual };
                        events.on_complete(false, &err.to_string());
                        return Err(err);
                    }
                }

                ReplyToken::Ack.write(stream)?;
                received_size += size;
                received_files += 1;
                let overall = overall_pct(received_size, total_size);
                events.on_folder_progress(
                    index, total, &rel_display, 100.0, overall, FolderFileStatus::Completed,
                );
                log::debug!("folder file received ({index}/{total}): {rel_display}");
            }
            Header::FolderEnd { total_sent, .. } => {
                ReplyToken::Ack.write(stream)?;
                log::info!("folder received: {} ({total_sent} files)", folder_path.display());
                events.on_folder_received(sender_ip, sender, platform, &folder_path, received_files, received_size);
                events.on_complete(true, &format!("{safe_name} received ({received_files} files)"));
                return Ok(());
            }
            other => {
                let _ = ReplyToken::Error.write(stream);
                let err = PcpcsError::Protocol(format!("unexpected frame mid-folder: {other:?}"));
                events.on_complete(false, &err.to_string());
                return Err(err);
            }
        }
    }
}

fn receive_exact_to_file(
    stream: &mut TcpStream,
    dest: &Path,
    size: u64,
    mut on_progress: impl FnMut(u64),
) -> Result<()> {
    let mut file = File::create(dest)?;
    let mut buf = vec![0u8; FILE_CHUNK_SIZE];
    let mut received = 0u64;
    while received < size {
        let want = (size - received).min(FILE_CHUNK_SIZE as u64) as usize;
        stream.read_exact(&mut buf[..want])?;
        file.write_all(&buf[..want])?;
        received += want as u64;
        on_progress(received);
    }
    Ok(())
}

fn overall_pct(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64) * 100.0
    }
}

/// Strips any directory components from a sender-provided name, keeping only the final
/// path segment - a sender cannot make us write outside the receive area via `filename`.
fn basename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unnamed".to_string())
}

/// Rejects absolute paths and `..` components in a folder entry's relative path, falling
/// back to its basename rather than let a malicious peer write outside the folder root.
fn sanitize_rel_path(rel_path: &str) -> PathBuf {
    let path = Path::new(rel_path);
    let escapes = path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir));
    if escapes {
        return PathBuf::from(basename(rel_path));
    }
    path.components().filter(|c| matches!(c, Component::Normal(_))).collect()
}

#[cfg(unix)]
fn pwrite_once(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn pwrite_once(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn pwrite_once(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::io::{Seek, SeekFrom};
    let mut cloned = file.try_clone()?;
    cloned.seek(SeekFrom::Start(offset))?;
    cloned.write(buf)
}

/// Writes `buf` at `offset` without disturbing the file's shared cursor, retrying short
/// writes - the primitive that lets disjoint chunk workers share one destination file.
fn write_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
    let mut written = 0usize;
    while written < buf.len() {
        let n = pwrite_once(file, &buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(PcpcsError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "positional write returned 0 bytes",
            )));
        }
        written += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_strips_directories() {
        assert_eq!(basename("../../etc/passwd"), "passwd");
        assert_eq!(basename("report.pdf"), "report.pdf");
    }

    #[test]
    fn basename_rejects_empty_result() {
        assert_eq!(basename(".."), "unnamed");
    }

    #[test]
    fn sanitize_rel_path_keeps_normal_nesting() {
        assert_eq!(sanitize_rel_path("photos/2024/a.jpg"), PathBuf::from("photos/2024/a.jpg"));
    }

    #[test]
    fn sanitize_rel_path_rejects_parent_traversal() {
        let sanitized = sanitize_rel_path("../../etc/passwd");
        assert_eq!(sanitized, PathBuf::from("passwd"));
    }

    #[test]
    fn sanitize_rel_path_rejects_absolute() {
        let sanitized = sanitize_rel_path("/etc/passwd");
        assert_eq!(sanitized, PathBuf::from("passwd"));
    }

    #[test]
    fn write_at_places_bytes_at_offset() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let file = OpenOptions::new().write(true).open(tmp.path()).unwrap();
        file.set_len(16).unwrap();
        write_at(&file, b"abcd", 4).unwrap();
        write_at(&file, b"wxyz", 0).unwrap();
        let content = fs::read(tmp.path()).unwrap();
        assert_eq!(&content[0..4], b"wxyz");
        assert_eq!(&content[4..8], b"abcd");
    }

    #[test]
    fn bind_addr_reports_its_local_addr() {
        let dir = tempfile::tempdir().unwrap();
        let server = PcpcsServer::bind_addr(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            dir.path().to_path_buf(),
            Arc::new(crate::events::NullEvents),
        )
        .unwrap();
        assert!(server.local_addr().unwrap().port() > 0);
    }
}
