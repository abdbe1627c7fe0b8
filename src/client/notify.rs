//! User feedback hooks
//!
//! Toast-style notices and haptic feedback are side effects the sync layer
//! emits without knowing how they are rendered. The defaults write to the
//! log; `NoticeLog` keeps a bounded history for inspection.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A short message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: description.into(),
            at: Utc::now(),
        }
    }
}

/// Sink for user notices
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Fire-and-forget haptic feedback
pub trait Haptics: Send + Sync {
    fn light(&self);
    fn success(&self);
}

/// Writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => {
                tracing::error!(title = %notice.title, "{}", notice.description)
            }
            NoticeLevel::Info | NoticeLevel::Success => {
                tracing::info!(title = %notice.title, "{}", notice.description)
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHaptics;

impl Haptics for NoopHaptics {
    fn light(&self) {}
    fn success(&self) {}
}

const NOTICE_HISTORY: usize = 50;

/// Keeps the most recent notices
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: Mutex<VecDeque<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(notices) => notices.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn last(&self) -> Option<Notice> {
        self.notices().pop()
    }

    pub fn count(&self, level: NoticeLevel) -> usize {
        self.notices().iter().filter(|n| n.level == level).count()
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        TracingNotifier.notify(notice.clone());
        let mut notices = match self.notices.lock() {
            Ok(notices) => notices,
            Err(poisoned) => poisoned.into_inner(),
        };
        if notices.len() == NOTICE_HISTORY {
            notices.pop_front();
        }
        notices.push_back(notice);
    }
}
