// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Quick content fingerprint used to skip re-sending files the peer already has.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::config::QUICK_HASH_WINDOW;

/// Hashes `ascii(filesize) || first 64KiB || last 64KiB` (tail omitted when the file is
/// no larger than the window itself, to avoid double-hashing small files).
///
/// This is deliberately not a full-file hash: it exists so a sender can decide in one
/// seek-bounded pass whether the receiver already has an identical file, without reading
/// gigabytes of data for a skip decision.
pub fn quick_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut hasher = Md5::new();
    hasher.update(size.to_string().as_bytes());

    let head_len = QUICK_HASH_WINDOW.min(size) as usize;
    let mut head = vec![0u8; head_len];
    file.read_exact(&mut head)?;
    hasher.update(&head);

    if size > QUICK_HASH_WINDOW {
        let tail_len = QUICK_HASH_WINDOW.min(size) as usize;
        file.seek(SeekFrom::End(-(tail_len as i64)))?;
        let mut tail = vec![0u8; tail_len];
        file.read_exact(&mut tail)?;
        hasher.update(&tail);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn small_file_hashes_without_tail_window() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        let hash = quick_hash(tmp.path()).unwrap();
        assert_eq!(hash.len(), 32);
    }

    #[test]
    fn identical_content_hashes_match() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        let payload = vec![7u8; 200 * 1024];
        a.write_all(&payload).unwrap();
        b.write_all(&payload).unwrap();
        assert_eq!(quick_hash(a.path()).unwrap(), quick_hash(b.path()).unwrap());
    }

    #[test]
    fn differing_tail_changes_hash() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        let mut payload = vec![1u8; 200 * 1024];
        a.write_all(&payload).unwrap();
        *payload.last_mut().unwrap() = 2;
        b.write_all(&payload).unwrap();
        assert_ne!(quick_hash(a.path()).unwrap(), quick_hash(b.path()).unwrap());
    }
}
