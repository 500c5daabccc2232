//! # relay-core
//!
//! Foundation types for the presence-and-messaging relay.
//!
//! This crate provides the shared vocabulary that the server crates depend on:
//!
//! - **Branded IDs**: `Username`, `UsernameKey`, `GroupId`, `MessageId`,
//!   `ConnectionId` as newtypes for type safety
//! - **Wire events**: `ClientEvent` (inbound) and `ServerEvent` (outbound)
//!   tagged JSON enums
//! - **Errors**: `RelayError` hierarchy via `thiserror`, with the
//!   human-readable messages that go back to clients
//! - **Constants**: protocol timing knobs (retry spacing, staleness window)

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod ids;

pub use errors::RelayError;
pub use events::{ClientEvent, GroupSummary, ServerEvent};
pub use ids::{ConnectionId, GroupId, MessageId, Username, UsernameKey};
