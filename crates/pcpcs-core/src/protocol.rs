// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The structured header carried inside every frame.
//!
//! Every TCP exchange on the transfer port and its side ports starts with one of these,
//! tagged by `type` and serialized as JSON - the wire format spec.md describes as
//! "UTF-8 structured text", made concrete.

use serde::{Deserialize, Serialize};

use crate::transport::{read_frame, write_frame};

/// A single chunk descriptor inside a `PARALLEL_FILE` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub chunk_id: u32,
    pub offset: u64,
    pub size: u64,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Header {
    #[serde(rename = "TEXT")]
    Text {
        sender: String,
        platform: String,
        length: u64,
    },
    #[serde(rename = "FILE")]
    File {
        sender: String,
        platform: String,
        filename: String,
        filesize: u64,
    },
    #[serde(rename = "PARALLEL_FILE")]
    ParallelFile {
        sender: String,
        platform: String,
        filename: String,
        filesize: u64,
        num_chunks: u32,
        chunks: Vec<ChunkDescriptor>,
    },
    #[serde(rename = "PARALLEL_CHUNK")]
    ParallelChunk {
        chunk_id: u32,
        offset: u64,
        size: u64,
    },
    #[serde(rename = "PARALLEL_DONE")]
    ParallelDone { filename: String, filesize: u64 },
    #[serde(rename = "FOLDER_START")]
    FolderStart {
        sender: String,
        platform: String,
        folder_name: String,
        total_files: u32,
        total_size: u64,
    },
    #[serde(rename = "FOLDER_FILE")]
    FolderFile {
        rel_path: String,
        size: u64,
        hash: String,
        index: u32,
        total: u32,
    },
    #[serde(rename = "FOLDER_END")]
    FolderEnd { folder_name: String, total_sent: u32 },
}

impl Header {
    pub fn write<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let encoded = serde_json::to_vec(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        write_frame(writer, &encoded)
    }

    pub fn read<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        let payload = read_frame(reader)?;
        serde_json::from_slice(&payload)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// A UDP discovery datagram, also JSON-encoded (see spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiscoveryMessage {
    #[serde(rename = "PCPCS_DISCOVERY")]
    Discovery {
        hostname: String,
        platform: String,
        ip: String,
    },
    #[serde(rename = "PCPCS_RESPONSE")]
    Response {
        hostname: String,
        platform: String,
        ip: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn text_header_roundtrips() {
        let header = Header::Text {
            sender: "alice".into(),
            platform: "Linux".into(),
            length: 5,
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(Header::read(&mut cursor).unwrap(), header);
    }

    #[test]
    fn parallel_file_header_roundtrips_with_chunks() {
        let header = Header::ParallelFile {
            sender: "alice".into(),
            platform: "Linux".into(),
            filename: "movie.mkv".into(),
            filesize: 64 * 1024 * 1024,
            num_chunks: 8,
            chunks: (0..8)
                .map(|i| ChunkDescriptor {
                    chunk_id: i,
                    offset: i as u64 * 8 * 1024 * 1024,
                    size: 8 * 1024 * 1024,
                    port: 52530 + i as u16,
                })
                .collect(),
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(Header::read(&mut cursor).unwrap(), header);
    }

    #[test]
    fn discovery_message_tag_roundtrips() {
        let msg = DiscoveryMessage::Discovery {
            hostname: "host-a".into(),
            platform: "Linux".into(),
            ip: "192.168.1.10".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: DiscoveryMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, msg);
    }
}
