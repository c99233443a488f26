//! Append-only message log shared between the turn controller and the
//! transcript renderer.
//!
//! Messages are immutable once appended and live for the duration of the
//! widget session. Only the turn controller (voice turns) and the
//! synchronous text-submit path write to the log; the renderer reads
//! snapshots at any time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One exchanged message. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

struct LogInner {
    next_id: u64,
    messages: Vec<Message>,
}

/// Cheaply cloneable handle to the append-only message log.
#[derive(Clone)]
pub struct TranscriptLog {
    inner: Arc<Mutex<LogInner>>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                next_id: 1,
                messages: Vec::new(),
            })),
        }
    }

    /// Appends a message and returns the stored copy (with its assigned id).
    pub fn append(&self, sender: Sender, text: impl Into<String>) -> Message {
        let mut inner = self.inner.lock().expect("transcript log poisoned");
        let message = Message {
            id: inner.next_id,
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        };
        inner.next_id += 1;
        inner.messages.push(message.clone());
        message
    }

    /// Ordered snapshot of every message exchanged so far.
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner
            .lock()
            .expect("transcript log poisoned")
            .messages
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("transcript log poisoned").messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new()
    }
}
