use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

const HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
    Warning,
    Info,
    Loading,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
            NoticeKind::Warning => "warning",
            NoticeKind::Info => "info",
            NoticeKind::Loading => "loading",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub posted_at: DateTime<Utc>,
}

/// Non-blocking user notices. One notice is shown at a time; a short history
/// is kept for diagnostics.
#[derive(Clone, Default)]
pub struct NoticeBoard {
    current: Arc<Mutex<Option<Notice>>>,
    history: Arc<Mutex<VecDeque<Notice>>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, kind: NoticeKind, message: impl Into<String>) {
        let notice = Notice {
            kind,
            message: message.into(),
            posted_at: Utc::now(),
        };
        debug!(kind = kind.as_str(), message = %notice.message, "notice posted");

        {
            let mut history = self.history.lock();
            if history.len() >= HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(notice.clone());
        }
        *self.current.lock() = Some(notice);
    }

    pub fn current(&self) -> Option<Notice> {
        self.current.lock().clone()
    }

    pub fn dismiss(&self) {
        self.current.lock().take();
    }

    pub fn history(&self) -> Vec<Notice> {
        self.history.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_notice_replaces_previous() {
        let board = NoticeBoard::new();
        board.post(NoticeKind::Loading, "Загрузка жалоб...");
        board.post(NoticeKind::Success, "Жалобы успешно загружены");

        let current = board.current().unwrap();
        assert_eq!(current.kind, NoticeKind::Success);
        assert_eq!(board.history().len(), 2);

        board.dismiss();
        assert!(board.current().is_none());
        assert_eq!(board.history().len(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let board = NoticeBoard::new();
        for i in 0..(HISTORY_LIMIT + 5) {
            board.post(NoticeKind::Info, format!("notice {i}"));
        }
        let history = board.history();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].message, "notice 5");
    }
}
