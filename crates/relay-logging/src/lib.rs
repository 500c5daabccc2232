//! # relay-logging
//!
//! Append-only message-log sink: one text line per chat event, written by a
//! background task fed over a channel. The sink is strictly write-only and
//! strictly best-effort: the relay never reads the file back, and a failed
//! write is reported to the operator console and otherwise ignored.

#![deny(unsafe_code)]

pub mod entry;
pub mod sink;

pub use entry::{LogCategory, LogEntry};
pub use sink::MessageLog;
