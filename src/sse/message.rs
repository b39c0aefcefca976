//! Server-sent event wire format.

use std::fmt::Write;

/// One server-sent event.
///
/// Rendered as `id:`, `event:`, `retry:` lines (each only when present) followed
/// by a single `data:` line and a blank line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStreamMessage {
    pub id: Option<String>,
    pub event: Option<String>,
    /// Reconnection delay in milliseconds.
    pub retry: Option<u64>,
    pub data: String,
}

impl EventStreamMessage {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_retry(mut self, retry: u64) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Wire representation of this message.
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 16);
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            let _ = writeln!(out, "id: {id}");
        }
        if let Some(event) = self.event.as_deref().filter(|e| !e.is_empty()) {
            let _ = writeln!(out, "event: {event}");
        }
        if let Some(retry) = self.retry {
            let _ = writeln!(out, "retry: {retry}");
        }
        let _ = write!(out, "data: {}\n\n", self.data);
        out
    }
}

impl From<&str> for EventStreamMessage {
    fn from(data: &str) -> Self {
        Self::new(data)
    }
}

impl From<String> for EventStreamMessage {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

/// Concatenated wire form of several messages.
pub fn format_messages<'a, I>(messages: I) -> String
where
    I: IntoIterator<Item = &'a EventStreamMessage>,
{
    messages.into_iter().map(EventStreamMessage::format).collect()
}
