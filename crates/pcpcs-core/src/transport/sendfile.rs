// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Zero-copy file transmission via the `sendfile(2)` syscall, with a buffered
//! read/write fallback for platforms that don't have it.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::config::SEND_CHUNK_SIZE;

/// `sendfile`'s `count` argument is capped well under 2 GiB on Linux; batch larger
/// files into chunks of this size rather than relying on the kernel to do it for us.
/// Kept equal to [`SEND_CHUNK_SIZE`] (rather than the kernel's much larger ceiling) so a
/// caller checking for cancellation from `on_progress` observes it at roughly the same
/// cadence as the buffered fallback path and the parallel-chunk sender, instead of only
/// between batches that could span most of a large file.
const SENDFILE_BATCH_MAX: usize = SEND_CHUNK_SIZE;

/// Sends `len` bytes of `file` starting at its current position, on `stream`, calling
/// `on_progress` with the cumulative byte count after each batch. `on_progress` may
/// return an error (e.g. to signal cancellation) to abort the send early; the error is
/// propagated to the caller as-is.
///
/// Uses `sendfile(2)` on unix to avoid copying file contents through userspace; falls
/// back to a buffered read/write loop everywhere else (or if `sendfile` itself fails
/// partway, since some filesystems/transports don't support it).
pub fn send_file_range(
    file: &File,
    stream: &TcpStream,
    len: u64,
    mut on_progress: impl FnMut(u64) -> io::Result<()>,
) -> io::Result<()> {
    #[cfg(unix)]
    {
        match send_file_range_unix(file, stream, len, &mut on_progress) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Unsupported => {}
            Err(e) => return Err(e),
        }
    }
    send_file_range_buffered(file, stream, len, &mut on_progress)
}

#[cfg(unix)]
fn send_file_range_unix(
    file: &File,
    stream: &TcpStream,
    len: u64,
    on_progress: &mut dyn FnMut(u64) -> io::Result<()>,
) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let in_fd = file.as_raw_fd();
    let out_fd = stream.as_raw_fd();
    let mut remaining = len as usize;
    let mut sent_total = 0u64;

    while remaining > 0 {
        let batch = remaining.min(SENDFILE_BATCH_MAX);
        let sent = unsafe { libc::sendfile(out_fd, in_fd, std::ptr::null_mut(), batch) };
        if sent < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::ENOSYS) | Some(libc::EINVAL) => {
                    Err(io::Error::new(io::ErrorKind::Unsupported, err))
                }
                Some(libc::EAGAIN) | Some(libc::EINTR) => continue,
                _ => Err(err),
            };
        }
        if sent == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "sendfile returned 0 before all bytes were sent",
            ));
        }
        remaining -= sent as usize;
        sent_total += sent as u64;
        on_progress(sent_total)?;
    }
    Ok(())
}

fn send_file_range_buffered(
    file: &File,
    mut stream: &TcpStream,
    len: u64,
    on_progress: &mut dyn FnMut(u64) -> io::Result<()>,
) -> io::Result<()> {
    let mut reader = file.try_clone()?;
    let mut remaining = len;
    let mut sent_total = 0u64;
    let mut buf = vec![0u8; SEND_CHUNK_SIZE];

    while remaining > 0 {
        let want = remaining.min(SEND_CHUNK_SIZE as u64) as usize;
        reader.read_exact(&mut buf[..want])?;
        stream.write_all(&buf[..want])?;
        remaining -= want as u64;
        sent_total += want as u64;
        on_progress(sent_total)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write as _};
    use std::net::TcpListener;

    #[test]
    fn sends_exact_byte_count() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let payload = vec![9u8; 300_000];
        tmp.write_all(&payload).unwrap();
        tmp.flush().unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).unwrap();
            received
        });

        let mut file = File::open(tmp.path()).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let mut last_reported = 0u64;
        send_file_range(&file, &stream, payload.len() as u64, |done| {
            last_reported = done;
            Ok(())
        })
        .unwrap();
        assert_eq!(last_reported, payload.len() as u64);
        drop(stream);

        let received = handle.join().unwrap();
        assert_eq!(received, payload);
    }
}
