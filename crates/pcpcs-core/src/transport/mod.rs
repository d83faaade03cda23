// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire transport: length-prefix framing and zero-copy file transmission.
//!
//! # Modules
//!
//! - `frame` - length-prefixed TCP framing, control reply tokens, socket tuning
//! - `sendfile` - zero-copy file transmission with a buffered fallback

pub mod frame;
pub mod sendfile;

pub use frame::{read_frame, read_legacy_ok, tune_socket, write_frame, write_legacy_ok, ReplyToken};
pub use sendfile::send_file_range;
