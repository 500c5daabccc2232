//! Branded ID newtypes for type safety.
//!
//! Every entity in the relay has a distinct ID type implemented as a newtype
//! wrapper around `String`. This prevents accidentally passing a group ID
//! where a username is expected.
//!
//! Generated IDs (`GroupId`, `MessageId`, `ConnectionId`) are UUID v7
//! (time-ordered) via [`uuid::Uuid::now_v7`]. `Username` wraps whatever the
//! client registered; [`UsernameKey`] is its canonical form used for the
//! case-insensitive uniqueness index.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn generate() -> Self {
                Self(new_v7())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Display name a client registered under, as they typed it.
    Username
}

branded_id! {
    /// Canonical (trimmed, lowercased) form of a username.
    ///
    /// Used as the key of the live-session secondary index so that
    /// uniqueness checks are case-insensitive without scanning.
    UsernameKey
}

branded_id! {
    /// Unique identifier for a chat group.
    GroupId
}

branded_id! {
    /// Unique identifier for a single message.
    MessageId
}

branded_id! {
    /// Unique identifier for one client connection.
    ConnectionId
}

impl Username {
    /// Canonical index key for this username.
    #[must_use]
    pub fn key(&self) -> UsernameKey {
        UsernameKey::from(self.0.trim().to_lowercase())
    }

    /// Whether the name is empty after trimming.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
