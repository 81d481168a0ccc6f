// =============================================================================
// Notice Log: non-fatal operational messages for the presentation layer
// =============================================================================
//
// Rate-limited advisories, per-asset failures, and degraded-mode reads land
// here so the UI can show "using cached data" style banners. Capped ring
// buffer; oldest entries are evicted first.
// =============================================================================

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

/// Maximum number of notices retained.
const MAX_NOTICES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeKind {
    RateLimited,
    Degraded,
    AssetFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

#[derive(Debug, Default)]
pub struct NoticeLog {
    entries: RwLock<VecDeque<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, kind: NoticeKind, asset_id: Option<&str>, message: impl Into<String>) {
        let notice = Notice {
            kind,
            asset_id: asset_id.map(str::to_string),
            message: message.into(),
            at: Utc::now().to_rfc3339(),
        };
        let mut entries = self.entries.write();
        entries.push_back(notice);
        while entries.len() > MAX_NOTICES {
            entries.pop_front();
        }
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<Notice> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.entries.read().iter().filter(|n| n.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest() {
        let log = NoticeLog::new();
        for i in 0..(MAX_NOTICES + 5) {
            log.push(NoticeKind::Degraded, None, format!("n{i}"));
        }
        let recent = log.recent();
        assert_eq!(recent.len(), MAX_NOTICES);
        assert_eq!(recent[0].message, "n5");
    }

    #[test]
    fn count_by_kind() {
        let log = NoticeLog::new();
        log.push(NoticeKind::RateLimited, Some("btc"), "429");
        log.push(NoticeKind::AssetFailed, Some("eth"), "boom");
        assert_eq!(log.count(NoticeKind::RateLimited), 1);
        assert_eq!(log.recent()[0].asset_id.as_deref(), Some("btc"));
    }
}
