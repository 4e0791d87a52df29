//! Reminder and overdue-escalation scanning.
//!
//! A scan inspects one user's tasks against the engine clock and fires
//! two kinds of events:
//!
//! - a one-time *reminder* when a task's due date arrives (at most once
//!   over the task's lifetime, tracked by the `notified` flag);
//! - a daily *overdue escalation* for each incomplete task past its due
//!   date with Telegram enabled (at most once per calendar day, tracked
//!   by the task's `last_notification_date`).
//!
//! All flag updates happen in one transaction *before* any delivery is
//! attempted, so a crashed or failing transport can never cause duplicate
//! notifications. Delivery failures are appended as JSONL next to the
//! database and never propagate.

use crate::error::{Error, Result};
use crate::store::SqliteStore;
use chrono::NaiveDate;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Delivery failure log file, written next to the database.
const FAILURE_LOG_FILE: &str = "notify-failures.jsonl";

/// Delivery channel for notification messages.
///
/// The engine only ever hands a transport a chat id and a rendered
/// message; Telegram, stdout, and test recorders all fit behind this.
pub trait NotificationTransport {
    /// Deliver one message to one chat.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails. Scan treats this as non-fatal.
    fn send(&self, chat_id: &str, message: &str) -> Result<()>;
}

/// What kind of notification fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// One-time "due date reached" reminder.
    Reminder,
    /// Daily escalation for an overdue task.
    Overdue,
}

/// A notification produced by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// User the notification belongs to.
    pub username: String,
    /// Kind of event.
    pub kind: NotificationKind,
    /// Task that triggered it.
    pub task_id: i64,
    /// Task name, for the rendered message.
    pub task_name: String,
    /// The task's due date.
    pub due_date: NaiveDate,
}

impl NotificationEvent {
    /// Render the message delivered for this event.
    #[must_use]
    pub fn message(&self) -> String {
        match self.kind {
            NotificationKind::Reminder => {
                format!("Reminder: '{}' is due on {}.", self.task_name, self.due_date)
            }
            NotificationKind::Overdue => {
                format!("Overdue: '{}' was due on {} and is still open.", self.task_name, self.due_date)
            }
        }
    }
}

/// Run a notification scan for one user.
///
/// Collects due reminders and overdue escalations, marks them as fired
/// and stamps the user's watermark in a single transaction, then attempts
/// delivery. Returns every event that fired, delivered or not.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the user does not exist, or a database
/// error (in which case no flags were changed). Transport failures do not
/// error; they are logged to `notify-failures.jsonl` beside the database.
pub fn scan(
    store: &SqliteStore,
    transport: &dyn NotificationTransport,
    username: &str,
    today: NaiveDate,
) -> Result<Vec<NotificationEvent>> {
    let mut conn = store.open()?;
    let tx = conn.transaction()?;

    let chat_id: Option<String> = tx
        .query_row(
            "SELECT telegram_chat_id FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound(format!("user '{username}'")),
            other => other.into(),
        })?;

    let mut events = Vec::new();

    // Reminders: due date reached, never reminded before.
    {
        let mut stmt = tx.prepare(
            "SELECT task_id, task_name, due_date FROM tasks
             WHERE created_by = ?1 AND completed = 0 AND notified = 0 AND due_date <= ?2
             ORDER BY due_date, task_id",
        )?;
        let rows: Vec<(i64, String, NaiveDate)> = stmt
            .query_map(params![username, today], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .flatten()
            .collect();
        for (task_id, task_name, due_date) in rows {
            tx.execute("UPDATE tasks SET notified = 1 WHERE task_id = ?1", params![task_id])?;
            events.push(NotificationEvent {
                username: username.to_string(),
                kind: NotificationKind::Reminder,
                task_id,
                task_name,
                due_date,
            });
        }
    }

    // Escalations: strictly past due, Telegram enabled, not yet fired today.
    {
        let mut stmt = tx.prepare(
            "SELECT task_id, task_name, due_date FROM tasks
             WHERE created_by = ?1 AND completed = 0 AND telegram_notify = 1
               AND due_date < ?2
               AND (last_notification_date IS NULL OR last_notification_date != ?2)
             ORDER BY due_date, task_id",
        )?;
        let rows: Vec<(i64, String, NaiveDate)> = stmt
            .query_map(params![username, today], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .flatten()
            .collect();
        for (task_id, task_name, due_date) in rows {
            tx.execute(
                "UPDATE tasks SET last_notification_date = ?1 WHERE task_id = ?2",
                params![today, task_id],
            )?;
            events.push(NotificationEvent {
                username: username.to_string(),
                kind: NotificationKind::Overdue,
                task_id,
                task_name,
                due_date,
            });
        }
    }

    tx.execute(
        "UPDATE users SET last_notification_date = ?1 WHERE username = ?2",
        params![today, username],
    )?;
    tx.commit()?;

    // Flags are committed; delivery is strictly best-effort from here.
    if let Some(chat_id) = chat_id {
        for event in &events {
            if let Err(e) = transport.send(&chat_id, &event.message()) {
                log_failure(store.db_path(), "send", &format!("task {}: {e}", event.task_id));
            }
        }
    }

    Ok(events)
}

/// Run a scan, swallowing any error.
///
/// Intended for periodic background invocation where one failed scan
/// should not take anything down. Errors are appended to the failure log
/// and an empty event list is returned.
pub fn scan_best_effort(
    store: &SqliteStore,
    transport: &dyn NotificationTransport,
    username: &str,
    today: NaiveDate,
) -> Vec<NotificationEvent> {
    match scan(store, transport, username, today) {
        Ok(events) => events,
        Err(e) => {
            log_failure(store.db_path(), "scan", &e.to_string());
            Vec::new()
        }
    }
}

/// Path of the failure log for a given database path.
#[must_use]
pub fn failure_log_path(db_path: &Path) -> PathBuf {
    db_path.with_file_name(FAILURE_LOG_FILE)
}

/// Append a failure entry as one JSONL line. Errors are silently
/// ignored; logging must never break a scan.
fn log_failure(db_path: &Path, stage: &str, detail: &str) {
    let entry = serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "stage": stage,
        "detail": detail,
    });

    let Ok(mut file) =
        OpenOptions::new().create(true).append(true).open(failure_log_path(db_path))
    else {
        return;
    };
    let _ = writeln!(file, "{entry}");
}
