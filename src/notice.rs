//! Purpose: Define one-shot user-facing notices and the queue that delivers them.
//! Exports: `Notice`, `NoticeKind`, `NoticeQueue`, `NOTICE_CAPACITY`, `notice_json`.
//! Role: Carries the outcome of a mutating request to the next page view.
//! Invariants: Notices are non-fatal and each one is delivered exactly once.
//! Invariants: JSON schema is stable once published; fields are additive-only.
//! Invariants: The queue holds at most `NOTICE_CAPACITY` entries; the oldest are dropped first.
//! Notes: There is one queue per process, not per session; any client's next page view
//! Notes: drains notices produced by any other client.
use std::collections::VecDeque;

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const NOTICE_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoticeKind {
    Success,
    Error,
}

impl NoticeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub time: String,
    pub action: String,
    pub message: String,
    pub details: Map<String, Value>,
}

impl Notice {
    pub fn new(kind: NoticeKind, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            time: time_now().unwrap_or_default(),
            action: action.into(),
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn success(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Success, action, message)
    }

    pub fn error(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Error, action, message)
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

fn time_now() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind.as_str()));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("action".to_string(), json!(notice.action));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));
    Value::Object(inner)
}

/// Pending notices waiting for the next page view.
#[derive(Debug, Default)]
pub struct NoticeQueue {
    pending: VecDeque<Notice>,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notice: Notice) {
        while self.pending.len() >= NOTICE_CAPACITY {
            self.pending.pop_front();
        }
        self.pending.push_back(notice);
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain(&mut self) -> Vec<Notice> {
        self.pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
