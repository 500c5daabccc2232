//! Protocol timing and delivery constants.

/// Total delivery attempts for a private message (first try included).
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Spacing between private-delivery attempts, in milliseconds.
pub const DELIVERY_RETRY_SPACING_MS: u64 = 1_000;

/// Delay before the sender receives the `message_delivered` signal after a
/// successful private delivery, in milliseconds.
pub const DELIVERED_SIGNAL_DELAY_MS: u64 = 500;

/// A session with no heartbeat for this long is considered stale.
pub const STALE_AFTER_SECS: u64 = 60;

/// Interval between presence-supervisor sweeps.
pub const SWEEP_INTERVAL_SECS: u64 = 30;
