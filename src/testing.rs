//! Fixtures shared by the unit and integration test suites.
//!
//! Nothing here is used by production code paths; it is public so the
//! `tests/` directory can reuse the same builders.

use crate::error::Result;
use crate::notify::NotificationTransport;
use crate::store::{NewTask, Priority, Task};
use std::sync::Mutex;

/// Build an in-memory task with the given id and due date, incomplete,
/// medium priority, owned by `alice`.
///
/// # Panics
///
/// Panics if `due` is not a `YYYY-MM-DD` date literal.
#[must_use]
pub fn task_fixture(id: i64, due: &str) -> Task {
    Task {
        id,
        group_id: 1,
        name: format!("task-{id}"),
        description: String::new(),
        notification_days: 0,
        due_date: due.parse().expect("valid date literal"),
        completed: false,
        notified: false,
        created_by: "alice".to_string(),
        recurrence_pattern: None,
        recurrence_end_date: None,
        telegram_notify: true,
        priority: Priority::Medium,
        estimated_duration: None,
        actual_duration: None,
        completion_date: None,
        last_notification_date: None,
    }
}

/// Build a minimal [`NewTask`] for the given group, name, and due date.
///
/// # Panics
///
/// Panics if `due` is not a `YYYY-MM-DD` date literal.
#[must_use]
pub fn new_task(group_id: i64, name: &str, due: &str) -> NewTask {
    NewTask {
        group_id,
        name: name.to_string(),
        description: String::new(),
        notification_days: 0,
        due_date: due.parse().expect("valid date literal"),
        telegram_notify: true,
        priority: Priority::Medium,
        estimated_duration: None,
        recurrence_pattern: None,
        recurrence_end_date: None,
        created_by: "alice".to_string(),
        prerequisites: Vec::new(),
    }
}

/// A transport that records every message instead of delivering it.
/// Set `fail` to make every send return an I/O error.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    /// `(chat_id, message)` pairs in send order.
    pub sent: Mutex<Vec<(String, String)>>,
    /// When true, every send fails.
    pub fail: bool,
}

impl NotificationTransport for RecordingTransport {
    fn send(&self, chat_id: &str, message: &str) -> Result<()> {
        if self.fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "transport down",
            )
            .into());
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((chat_id.to_string(), message.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_store() -> (tempfile::TempDir, crate::store::SqliteStore) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let store =
        crate::store::SqliteStore::new(dir.path().join("ontrack.db")).expect("open test store");
    (dir, store)
}
