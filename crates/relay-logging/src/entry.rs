//! Log entry types and line formatting.

use std::fmt;

/// Which kind of traffic a log line records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogCategory {
    /// A message delivered to a group.
    Group,
    /// A message delivered to one recipient.
    Private,
    /// A state change (registration, join/leave, disconnect).
    System,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Group => "group",
            Self::Private => "private",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

/// One line of the message log, captured at the moment the event happened.
#[derive(Clone, Debug)]
pub struct LogEntry {
    /// ISO-8601 time the entry was recorded.
    pub timestamp: String,
    /// Traffic category.
    pub category: LogCategory,
    /// Who caused the event (a username, or `server`).
    pub actor: String,
    /// Recipient or group; `None` falls back to `all` in the line.
    pub target: Option<String>,
    /// Message body or state-change description.
    pub content: String,
}

impl LogEntry {
    /// Capture an entry timestamped now.
    #[must_use]
    pub fn now(category: LogCategory, actor: &str, target: Option<&str>, content: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            category,
            actor: actor.to_owned(),
            target: target.map(str::to_owned),
            content: content.to_owned(),
        }
    }

    /// Render the line as it appears in the log file, newline included.
    #[must_use]
    pub fn format_line(&self) -> String {
        let target = self.target.as_deref().unwrap_or("all");
        format!(
            "{} [{}] {} -> {}: {}\n",
            self.timestamp, self.category, self.actor, target, self.content
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
