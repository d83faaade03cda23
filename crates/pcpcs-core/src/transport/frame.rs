// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing over TCP, plus the control-reply tokens sent on top of it.
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | UTF-8 header/body |
//! +----------------+-------------------+
//! ```
//!
//! The protocol is strictly blocking request/response, so unlike a reactor-driven codec
//! this reads a frame to completion in one call rather than maintaining partial-read state
//! across non-blocking poll cycles.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::config::{RESP_LENGTH, SOCKET_BUFFER_SIZE};

/// Frame header size (4 bytes for length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Reads one length-prefixed frame to completion.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Writes one length-prefixed frame.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// Fixed-width control reply sent after every post-v1 operation (FOLDER, PARALLEL_FILE,
/// folder-entry acknowledgements). TEXT and FILE keep the legacy 2-byte `OK` reply for
/// interop with older peers - the asymmetry is intentional, not an oversight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyToken {
    Ack,
    Skip,
    Error,
}

impl ReplyToken {
    fn as_wire(self) -> &'static [u8; RESP_LENGTH] {
        match self {
            Self::Ack => b"ACK_____",
            Self::Skip => b"SKIP____",
            Self::Error => b"ERROR___",
        }
    }

    pub fn write<W: Write>(self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.as_wire())
    }

    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; RESP_LENGTH];
        reader.read_exact(&mut buf)?;
        match &buf {
            b"ACK_____" => Ok(Self::Ack),
            b"SKIP____" => Ok(Self::Skip),
            b"ERROR___" => Ok(Self::Error),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unrecognized reply token: {:?}", other),
            )),
        }
    }
}

/// Writes the legacy two-byte `OK` acknowledgement used by TEXT and FILE replies.
pub fn write_legacy_ok<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(b"OK")
}

/// Reads and validates the legacy two-byte `OK` acknowledgement.
pub fn read_legacy_ok<R: Read>(reader: &mut R) -> io::Result<()> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    if &buf == b"OK" {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "expected legacy OK reply",
        ))
    }
}

/// Applies the socket tuning every transfer connection uses: 2 MiB send/receive buffers
/// and `TCP_NODELAY`, so small control frames aren't held up by Nagle's algorithm.
pub fn tune_socket(stream: &TcpStream) -> io::Result<()> {
    // socket2::Socket::from() takes ownership of the fd; hand it a dup via try_clone()
    // so dropping the Socket at the end of this function doesn't close `stream`.
    let socket = socket2::Socket::from(stream.try_clone()?);
    socket.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    socket.set_nodelay(true)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_roundtrips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello, world!").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"hello, world!");
    }

    #[test]
    fn empty_frame_roundtrips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn reply_token_roundtrips() {
        for token in [ReplyToken::Ack, ReplyToken::Skip, ReplyToken::Error] {
            let mut buf = Vec::new();
            token.write(&mut buf).unwrap();
            assert_eq!(buf.len(), RESP_LENGTH);
            let mut cursor = Cursor::new(buf);
            assert_eq!(ReplyToken::read(&mut cursor).unwrap(), token);
        }
    }

    #[test]
    fn legacy_ok_roundtrips() {
        let mut buf = Vec::new();
        write_legacy_ok(&mut buf).unwrap();
        assert_eq!(buf, b"OK");
        let mut cursor = Cursor::new(buf);
        assert!(read_legacy_ok(&mut cursor).is_ok());
    }

    #[test]
    fn unrecognized_token_is_rejected() {
        let mut cursor = Cursor::new(b"NOTATOKN".to_vec());
        assert!(ReplyToken::read(&mut cursor).is_err());
    }
}
