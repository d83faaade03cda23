// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared by discovery, transport and transfer.

use std::fmt;

/// Errors produced by discovery, framing, and file/folder transfer.
#[derive(Debug)]
pub enum PcpcsError {
    /// Wraps an underlying I/O failure (bind, accept, read, write).
    Io(std::io::Error),
    /// The peer sent a frame that doesn't parse as a known message type.
    Protocol(String),
    /// A quick-hash or full transfer hash didn't match what the sender promised.
    HashMismatch { expected: String, actual: String },
    /// A blocking operation didn't complete before its deadline.
    Timeout(String),
    /// Binding the discovery or transfer socket failed.
    Bind(String),
    /// The local transfer was cancelled by the caller.
    Cancelled,
    /// The destination path already exists and collision resolution was exhausted.
    DestinationExhausted(String),
}

impl fmt::Display for PcpcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Protocol(s) => write!(f, "protocol error: {s}"),
            Self::HashMismatch { expected, actual } => {
                write!(f, "hash mismatch: expected {expected}, got {actual}")
            }
            Self::Timeout(s) => write!(f, "timed out: {s}"),
            Self::Bind(s) => write!(f, "bind failed: {s}"),
            Self::Cancelled => write!(f, "transfer cancelled"),
            Self::DestinationExhausted(s) => {
                write!(f, "could not find a free destination name for {s}")
            }
        }
    }
}

impl std::error::Error for PcpcsError {}

impl From<std::io::Error> for PcpcsError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, PcpcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_human_readable() {
        let err = PcpcsError::HashMismatch {
            expected: "abc".into(),
            actual: "def".into(),
        };
        assert_eq!(err.to_string(), "hash mismatch: expected abc, got def");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PcpcsError = io_err.into();
        assert!(matches!(err, PcpcsError::Io(_)));
    }
}
