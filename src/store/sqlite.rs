//! `SQLite`-backed entity store.
//!
//! All multi-statement mutations run inside a single `rusqlite`
//! transaction; dropping the transaction on an error path rolls back, so
//! failed operations leave no partial state.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::graph;
use crate::store::models::{
    Group, HistoryEntry, Priority, StatusChange, Task, TaskLink, TrackStatus, User, ViewMode,
    LINK_TYPE_PREREQUISITE,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};

/// Fields for creating a new user account.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Unique username (case-insensitive).
    pub username: String,
    /// Credential, compared by plain equality.
    pub password: String,
    /// Display name.
    pub full_name: String,
    /// Contact email.
    pub email: String,
    /// Postal address.
    pub address: String,
    /// Self-described gender.
    pub gender: String,
    /// Phone or other contact detail.
    pub contact: String,
    /// Telegram chat for overdue escalations.
    pub telegram_chat_id: Option<String>,
}

/// Profile fields that can be updated on a user.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// New display name (if Some).
    pub full_name: Option<String>,
    /// New email (if Some).
    pub email: Option<String>,
    /// New address (if Some).
    pub address: Option<String>,
    /// New gender (if Some).
    pub gender: Option<String>,
    /// New contact detail (if Some).
    pub contact: Option<String>,
    /// New telegram chat id (if Some).
    pub telegram_chat_id: Option<String>,
}

impl ProfileUpdate {
    /// Check if any fields are set for update.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.gender.is_none()
            && self.contact.is_none()
            && self.telegram_chat_id.is_none()
    }
}

/// Fields for creating a new group.
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    /// Display name (required).
    pub name: String,
    /// Owning username.
    pub created_by: String,
    /// Hex color tag.
    pub color: String,
    /// Free-text remarks.
    pub remarks: String,
    /// Whether this group is a template.
    pub is_template: bool,
    /// Optional category tag.
    pub category: Option<String>,
    /// Optional nominal start date.
    pub start_date: Option<NaiveDate>,
    /// Optional nominal end date.
    pub end_date: Option<NaiveDate>,
}

/// Group fields that can be updated.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    /// New display name (if Some).
    pub name: Option<String>,
    /// New color tag (if Some).
    pub color: Option<String>,
    /// New remarks (if Some).
    pub remarks: Option<String>,
    /// New template flag (if Some).
    pub is_template: Option<bool>,
}

/// Fields for creating a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Owning group.
    pub group_id: i64,
    /// Task name (required).
    pub name: String,
    /// Longer description.
    pub description: String,
    /// Days before the due date at which to remind.
    pub notification_days: i64,
    /// Date the task is due.
    pub due_date: NaiveDate,
    /// Whether overdue escalations go to Telegram.
    pub telegram_notify: bool,
    /// Priority level.
    pub priority: Priority,
    /// Estimated duration in days.
    pub estimated_duration: Option<i64>,
    /// Recurrence pattern (declared only).
    pub recurrence_pattern: Option<String>,
    /// Recurrence end date.
    pub recurrence_end_date: Option<NaiveDate>,
    /// Creating username.
    pub created_by: String,
    /// Task ids this task depends on; each must be due on or before
    /// `due_date`.
    pub prerequisites: Vec<i64>,
}

/// Task fields that can be updated.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    /// New name (if Some).
    pub name: Option<String>,
    /// New description (if Some).
    pub description: Option<String>,
    /// New due date (if Some). Shifts direct dependents by the same delta.
    pub due_date: Option<NaiveDate>,
    /// New notification lead time (if Some).
    pub notification_days: Option<i64>,
    /// New completion flag (if Some). Appends a history entry on change.
    pub completed: Option<bool>,
    /// New telegram flag (if Some).
    pub telegram_notify: Option<bool>,
    /// New priority (if Some).
    pub priority: Option<Priority>,
    /// Replacement prerequisite set (if Some). The whole set is validated
    /// against the (possibly new) due date before any write.
    pub prerequisites: Option<Vec<i64>>,
}

/// Result of asking to complete a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The task was marked complete.
    Completed,
    /// The task was already complete and has been reopened.
    Reopened,
    /// Nothing was changed: these direct prerequisites are incomplete.
    /// Call [`SqliteStore::confirm_completion`] to complete them all, or
    /// drop the request.
    NeedsConfirmation(Vec<Task>),
}

/// `SQLite`-based entity store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create a store at the given database path, initializing the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let store = Self { db_path: db_path.as_ref().to_path_buf() };
        store.init_schema()?;
        Ok(store)
    }

    /// Get the database path.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a connection to the database.
    pub(crate) fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        Ok(conn)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS users (
                username TEXT COLLATE NOCASE PRIMARY KEY,
                password TEXT NOT NULL,
                full_name TEXT NOT NULL DEFAULT '',
                email TEXT NOT NULL DEFAULT '',
                address TEXT NOT NULL DEFAULT '',
                gender TEXT NOT NULL DEFAULT '',
                contact TEXT NOT NULL DEFAULT '',
                telegram_chat_id TEXT,
                view_preference TEXT NOT NULL DEFAULT 'calendar'
                    CHECK (view_preference IN ('calendar', 'list')),
                last_notification_date TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS groups (
                group_id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_name TEXT NOT NULL,
                created_by TEXT NOT NULL REFERENCES users(username),
                color TEXT NOT NULL DEFAULT '#8E44AD',
                remarks TEXT NOT NULL DEFAULT '',
                is_template INTEGER NOT NULL DEFAULT 0,
                category TEXT,
                start_date TEXT,
                end_date TEXT
            );

            CREATE TABLE IF NOT EXISTS tasks (
                task_id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL REFERENCES groups(group_id),
                task_name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                notification_days INTEGER NOT NULL DEFAULT 0,
                due_date TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                notified INTEGER NOT NULL DEFAULT 0,
                created_by TEXT NOT NULL REFERENCES users(username),
                recurrence_pattern TEXT,
                recurrence_end_date TEXT,
                telegram_notify INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 2 CHECK (priority >= 1 AND priority <= 3),
                estimated_duration INTEGER,
                actual_duration INTEGER,
                completion_date TEXT,
                last_notification_date TEXT
            );

            -- Directed prerequisite edges: task_id depends on pre_task_id
            CREATE TABLE IF NOT EXISTS task_links (
                task_id INTEGER NOT NULL REFERENCES tasks(task_id),
                pre_task_id INTEGER NOT NULL REFERENCES tasks(task_id),
                link_type TEXT NOT NULL DEFAULT 'prerequisite',
                delay_days INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (task_id, pre_task_id),
                CHECK (task_id != pre_task_id)
            );

            -- Append-only completion transition log
            CREATE TABLE IF NOT EXISTS task_history (
                history_id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL,
                status_change TEXT NOT NULL
                    CHECK (status_change IN ('completed', 'reopened')),
                changed_at TEXT NOT NULL,
                changed_by TEXT NOT NULL,
                notes TEXT
            );

            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_group ON tasks(group_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_creator_due ON tasks(created_by, due_date);
            CREATE INDEX IF NOT EXISTS idx_task_links_pre ON task_links(pre_task_id);
            CREATE INDEX IF NOT EXISTS idx_task_history_task ON task_history(task_id);
            ",
        )?;

        Ok(())
    }

    fn parse_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let view: String = row.get(8)?;
        Ok(User {
            username: row.get(0)?,
            password: row.get(1)?,
            full_name: row.get(2)?,
            email: row.get(3)?,
            address: row.get(4)?,
            gender: row.get(5)?,
            contact: row.get(6)?,
            telegram_chat_id: row.get(7)?,
            view_mode: ViewMode::from_str(&view).unwrap_or_default(),
            last_notification_date: row.get(9)?,
        })
    }

    fn parse_group(row: &rusqlite::Row) -> rusqlite::Result<Group> {
        Ok(Group {
            id: row.get(0)?,
            name: row.get(1)?,
            created_by: row.get(2)?,
            color: row.get(3)?,
            remarks: row.get(4)?,
            is_template: row.get(5)?,
            category: row.get(6)?,
            start_date: row.get(7)?,
            end_date: row.get(8)?,
        })
    }

    pub(crate) fn parse_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let priority: i64 = row.get(12)?;
        Ok(Task {
            id: row.get(0)?,
            group_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            notification_days: row.get(4)?,
            due_date: row.get(5)?,
            completed: row.get(6)?,
            notified: row.get(7)?,
            created_by: row.get(8)?,
            recurrence_pattern: row.get(9)?,
            recurrence_end_date: row.get(10)?,
            telegram_notify: row.get(11)?,
            priority: Priority::from_i64(priority).unwrap_or_default(),
            estimated_duration: row.get(13)?,
            actual_duration: row.get(14)?,
            completion_date: row.get(15)?,
            last_notification_date: row.get(16)?,
        })
    }

    fn parse_history(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let change: String = row.get(2)?;
        Ok(HistoryEntry {
            id: row.get(0)?,
            task_id: row.get(1)?,
            change: StatusChange::from_str(&change).unwrap_or(StatusChange::Completed),
            changed_at: row.get(3)?,
            changed_by: row.get(4)?,
            notes: row.get(5)?,
        })
    }

    const USER_COLUMNS: &'static str = "username, password, full_name, email, address, gender, \
         contact, telegram_chat_id, view_preference, last_notification_date";

    pub(crate) const TASK_COLUMNS: &'static str =
        "task_id, group_id, task_name, description, notification_days, due_date, completed, \
         notified, created_by, recurrence_pattern, recurrence_end_date, telegram_notify, \
         priority, estimated_duration, actual_duration, completion_date, last_notification_date";

    const GROUP_COLUMNS: &'static str = "group_id, group_name, created_by, color, remarks, \
         is_template, category, start_date, end_date";

    // ---- users ----

    /// Register a new user account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the username or password is empty,
    /// [`Error::DuplicateUser`] if the username is taken (comparison is
    /// case-insensitive), or a database error.
    pub fn register_user(&self, new: &NewUser) -> Result<User> {
        // Stored without surrounding whitespace so " alice " and "alice"
        // are the same account.
        let username = new.username.trim();
        let mut problems = Vec::new();
        if username.is_empty() {
            problems.push("Username is required".to_string());
        }
        if new.password.is_empty() {
            problems.push("Password is required".to_string());
        }
        if !problems.is_empty() {
            return Err(Error::Validation(problems));
        }

        let conn = self.open()?;
        let inserted = conn.execute(
            "INSERT INTO users (username, password, full_name, email, address, gender, contact,
                                telegram_chat_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                username,
                new.password,
                new.full_name,
                new.email,
                new.address,
                new.gender,
                new.contact,
                new.telegram_chat_id,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(Error::DuplicateUser(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let user = conn.query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", Self::USER_COLUMNS),
            params![username],
            Self::parse_user,
        )?;
        Ok(user)
    }

    /// Get a user by username (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", Self::USER_COLUMNS),
                params![username],
                Self::parse_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Check a username/password pair. Plain equality; not a security model.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn verify_login(&self, username: &str, password: &str) -> Result<bool> {
        let conn = self.open()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT password FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.is_some_and(|p| p == password))
    }

    /// Update a user's profile fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_profile(&self, username: &str, update: &ProfileUpdate) -> Result<Option<User>> {
        if update.is_empty() {
            return self.get_user(username);
        }

        let conn = self.open()?;
        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref full_name) = update.full_name {
            sets.push("full_name = ?");
            values.push(Box::new(full_name.clone()));
        }
        if let Some(ref email) = update.email {
            sets.push("email = ?");
            values.push(Box::new(email.clone()));
        }
        if let Some(ref address) = update.address {
            sets.push("address = ?");
            values.push(Box::new(address.clone()));
        }
        if let Some(ref gender) = update.gender {
            sets.push("gender = ?");
            values.push(Box::new(gender.clone()));
        }
        if let Some(ref contact) = update.contact {
            sets.push("contact = ?");
            values.push(Box::new(contact.clone()));
        }
        if let Some(ref chat_id) = update.telegram_chat_id {
            sets.push("telegram_chat_id = ?");
            values.push(Box::new(chat_id.clone()));
        }

        values.push(Box::new(username.to_string()));
        let sql = format!("UPDATE users SET {} WHERE username = ?", sets.join(", "));
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(AsRef::as_ref).collect();
        conn.execute(&sql, params.as_slice())?;

        self.get_user(username)
    }

    /// Set a user's dashboard view preference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the user does not exist, or a
    /// database error.
    pub fn set_view_mode(&self, username: &str, mode: ViewMode) -> Result<()> {
        let conn = self.open()?;
        let rows = conn.execute(
            "UPDATE users SET view_preference = ?1 WHERE username = ?2",
            params![mode.as_str(), username],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("user '{username}'")));
        }
        Ok(())
    }

    // ---- groups ----

    /// Create a new group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the name is empty, or a database
    /// error.
    pub fn create_group(&self, new: &NewGroup) -> Result<Group> {
        if new.name.trim().is_empty() {
            return Err(Error::Validation(vec!["Group name is required".to_string()]));
        }

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO groups (group_name, created_by, color, remarks, is_template, category,
                                 start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.name,
                new.created_by,
                new.color,
                new.remarks,
                new.is_template,
                new.category,
                new.start_date,
                new.end_date,
            ],
        )?;
        let id = conn.last_insert_rowid();

        let group = conn.query_row(
            &format!("SELECT {} FROM groups WHERE group_id = ?1", Self::GROUP_COLUMNS),
            params![id],
            Self::parse_group,
        )?;
        Ok(group)
    }

    /// Get a group by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_group(&self, id: i64) -> Result<Option<Group>> {
        let conn = self.open()?;
        let group = conn
            .query_row(
                &format!("SELECT {} FROM groups WHERE group_id = ?1", Self::GROUP_COLUMNS),
                params![id],
                Self::parse_group,
            )
            .optional()?;
        Ok(group)
    }

    /// List groups owned by a user, templates included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_groups(&self, owner: &str) -> Result<Vec<Group>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM groups WHERE created_by = ?1 ORDER BY group_id",
            Self::GROUP_COLUMNS
        ))?;
        let groups = stmt.query_map(params![owner], Self::parse_group)?.flatten().collect();
        Ok(groups)
    }

    /// List all template groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_templates(&self) -> Result<Vec<Group>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM groups WHERE is_template = 1 ORDER BY group_name",
            Self::GROUP_COLUMNS
        ))?;
        let groups = stmt.query_map([], Self::parse_group)?.flatten().collect();
        Ok(groups)
    }

    /// Update a group's display fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_group(&self, id: i64, update: &GroupUpdate) -> Result<Option<Group>> {
        let conn = self.open()?;
        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref name) = update.name {
            if name.trim().is_empty() {
                return Err(Error::Validation(vec!["Group name is required".to_string()]));
            }
            sets.push("group_name = ?");
            values.push(Box::new(name.clone()));
        }
        if let Some(ref color) = update.color {
            sets.push("color = ?");
            values.push(Box::new(color.clone()));
        }
        if let Some(ref remarks) = update.remarks {
            sets.push("remarks = ?");
            values.push(Box::new(remarks.clone()));
        }
        if let Some(is_template) = update.is_template {
            sets.push("is_template = ?");
            values.push(Box::new(is_template));
        }

        if !sets.is_empty() {
            values.push(Box::new(id));
            let sql = format!("UPDATE groups SET {} WHERE group_id = ?", sets.join(", "));
            let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(AsRef::as_ref).collect();
            conn.execute(&sql, params.as_slice())?;
        }

        self.get_group(id)
    }

    /// Delete a group, cascading to its tasks and their prerequisite edges.
    /// History entries are append-only and are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; on error nothing
    /// is deleted.
    pub fn delete_group(&self, id: i64) -> Result<bool> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM task_links
             WHERE task_id IN (SELECT task_id FROM tasks WHERE group_id = ?1)
                OR pre_task_id IN (SELECT task_id FROM tasks WHERE group_id = ?1)",
            params![id],
        )?;
        tx.execute("DELETE FROM tasks WHERE group_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM groups WHERE group_id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    /// Count completed and total tasks in a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn group_progress(&self, id: i64) -> Result<(u32, u32)> {
        let conn = self.open()?;
        let (completed, total): (u32, u32) = conn.query_row(
            "SELECT COALESCE(SUM(completed), 0), COUNT(*) FROM tasks WHERE group_id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((completed, total))
    }

    // ---- tasks ----

    /// Validate a prerequisite selection against a due date.
    ///
    /// Missing prerequisites become validation messages; date-ordering
    /// problems become schedule violations. All problems are collected
    /// before anything is reported.
    fn check_prerequisites(
        tx: &Transaction,
        due_date: NaiveDate,
        prerequisites: &[i64],
        mut field_errors: Vec<String>,
    ) -> Result<()> {
        let mut found = Vec::new();
        for &pre_id in prerequisites {
            let task = tx
                .query_row(
                    &format!("SELECT {} FROM tasks WHERE task_id = ?1", Self::TASK_COLUMNS),
                    params![pre_id],
                    Self::parse_task,
                )
                .optional()?;
            match task {
                Some(task) => found.push(task),
                None => field_errors.push(format!("Prerequisite task {pre_id} not found")),
            }
        }

        let violations = graph::check_schedule(due_date, &found);
        if !field_errors.is_empty() {
            field_errors.extend(violations.iter().map(ToString::to_string));
            return Err(Error::Validation(field_errors));
        }
        if !violations.is_empty() {
            return Err(Error::Schedule(violations));
        }
        Ok(())
    }

    fn fetch_task(tx: &Transaction, id: i64) -> Result<Option<Task>> {
        let task = tx
            .query_row(
                &format!("SELECT {} FROM tasks WHERE task_id = ?1", Self::TASK_COLUMNS),
                params![id],
                Self::parse_task,
            )
            .optional()?;
        Ok(task)
    }

    fn append_history(
        tx: &Transaction,
        task_id: i64,
        change: StatusChange,
        today: NaiveDate,
        actor: &str,
    ) -> Result<()> {
        tx.execute(
            "INSERT INTO task_history (task_id, status_change, changed_at, changed_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![task_id, change.as_str(), today, actor],
        )?;
        Ok(())
    }

    /// Create a task, linking its prerequisites, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty name or missing
    /// prerequisite (all problems collected), [`Error::Schedule`] if any
    /// selected prerequisite is due after the task, [`Error::NotFound`] if
    /// the group does not exist, or a database error. Nothing is written
    /// unless every check passes.
    pub fn create_task(&self, new: &NewTask) -> Result<Task> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let group_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM groups WHERE group_id = ?1)",
            params![new.group_id],
            |row| row.get(0),
        )?;
        if !group_exists {
            return Err(Error::NotFound(format!("group {}", new.group_id)));
        }

        let mut field_errors = Vec::new();
        if new.name.trim().is_empty() {
            field_errors.push("Task name is required".to_string());
        }
        Self::check_prerequisites(&tx, new.due_date, &new.prerequisites, field_errors)?;

        tx.execute(
            "INSERT INTO tasks (group_id, task_name, description, notification_days, due_date,
                                created_by, recurrence_pattern, recurrence_end_date,
                                telegram_notify, priority, estimated_duration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new.group_id,
                new.name,
                new.description,
                new.notification_days,
                new.due_date,
                new.created_by,
                new.recurrence_pattern,
                new.recurrence_end_date,
                new.telegram_notify,
                new.priority.as_i64(),
                new.estimated_duration,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for &pre_id in &new.prerequisites {
            tx.execute(
                "INSERT INTO task_links (task_id, pre_task_id, link_type) VALUES (?1, ?2, ?3)",
                params![id, pre_id, LINK_TYPE_PREREQUISITE],
            )?;
        }

        let task = Self::fetch_task(&tx, id)?.ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        tx.commit()?;
        Ok(task)
    }

    /// Get a task by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.open()?;
        let task = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE task_id = ?1", Self::TASK_COLUMNS),
                params![id],
                Self::parse_task,
            )
            .optional()?;
        Ok(task)
    }

    /// List a group's tasks, incomplete first, then by due date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_group_tasks(&self, group_id: i64) -> Result<Vec<Task>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE group_id = ?1 ORDER BY completed, due_date, task_id",
            Self::TASK_COLUMNS
        ))?;
        let tasks = stmt.query_map(params![group_id], Self::parse_task)?.flatten().collect();
        Ok(tasks)
    }

    /// List every task a user created, ordered by due date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_user_tasks(&self, username: &str) -> Result<Vec<Task>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE created_by = ?1 ORDER BY due_date, task_id",
            Self::TASK_COLUMNS
        ))?;
        let tasks = stmt.query_map(params![username], Self::parse_task)?.flatten().collect();
        Ok(tasks)
    }

    /// List a user's tasks due on or after a date, soonest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upcoming_tasks(&self, username: &str, from: NaiveDate, limit: u32) -> Result<Vec<Task>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE created_by = ?1 AND due_date >= ?2
             ORDER BY due_date ASC, task_id LIMIT ?3",
            Self::TASK_COLUMNS
        ))?;
        let tasks =
            stmt.query_map(params![username, from, limit], Self::parse_task)?.flatten().collect();
        Ok(tasks)
    }

    /// List a user's tasks due on an exact day.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn tasks_due_on(&self, username: &str, day: NaiveDate) -> Result<Vec<Task>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE created_by = ?1 AND due_date = ?2 ORDER BY task_id",
            Self::TASK_COLUMNS
        ))?;
        let tasks = stmt.query_map(params![username, day], Self::parse_task)?.flatten().collect();
        Ok(tasks)
    }

    /// List a user's incomplete tasks with a due date before `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn overdue_tasks(&self, username: &str, today: NaiveDate) -> Result<Vec<Task>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE created_by = ?1 AND completed = 0 AND due_date < ?2
             ORDER BY due_date, task_id",
            Self::TASK_COLUMNS
        ))?;
        let tasks = stmt.query_map(params![username, today], Self::parse_task)?.flatten().collect();
        Ok(tasks)
    }

    /// List the direct prerequisites of a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prerequisites_of(&self, task_id: i64) -> Result<Vec<Task>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT t.{} FROM tasks t
             JOIN task_links tl ON t.task_id = tl.pre_task_id
             WHERE tl.task_id = ?1 ORDER BY t.due_date, t.task_id",
            Self::TASK_COLUMNS
        ))?;
        let tasks = stmt.query_map(params![task_id], Self::parse_task)?.flatten().collect();
        Ok(tasks)
    }

    /// List the tasks that directly depend on a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dependents_of(&self, task_id: i64) -> Result<Vec<Task>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT t.{} FROM tasks t
             JOIN task_links tl ON t.task_id = tl.task_id
             WHERE tl.pre_task_id = ?1 ORDER BY t.due_date, t.task_id",
            Self::TASK_COLUMNS
        ))?;
        let tasks = stmt.query_map(params![task_id], Self::parse_task)?.flatten().collect();
        Ok(tasks)
    }

    /// List the prerequisite edges within a group (both endpoints inside).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn group_links(&self, group_id: i64) -> Result<Vec<TaskLink>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT tl.task_id, tl.pre_task_id, tl.link_type, tl.delay_days
             FROM task_links tl
             JOIN tasks a ON tl.task_id = a.task_id
             JOIN tasks b ON tl.pre_task_id = b.task_id
             WHERE a.group_id = ?1 AND b.group_id = ?1
             ORDER BY tl.task_id, tl.pre_task_id",
        )?;
        let links = stmt
            .query_map(params![group_id], |row| {
                Ok(TaskLink {
                    task_id: row.get(0)?,
                    pre_task_id: row.get(1)?,
                    link_type: row.get(2)?,
                    delay_days: row.get(3)?,
                })
            })?
            .flatten()
            .collect();
        Ok(links)
    }

    /// Update a task in one transaction, validating the whole new state
    /// first.
    ///
    /// If the due date moves by Δ days, every direct dependent's due date
    /// shifts by the same Δ (single level, not transitive). If the
    /// completion flag changes, a history entry is appended and the
    /// completion date set or cleared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the task does not exist,
    /// [`Error::Validation`] / [`Error::Schedule`] with all collected
    /// problems (no partial write), or a database error.
    pub fn update_task(
        &self,
        id: i64,
        update: &TaskUpdate,
        actor: &str,
        today: NaiveDate,
    ) -> Result<Task> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let current =
            Self::fetch_task(&tx, id)?.ok_or_else(|| Error::NotFound(format!("task {id}")))?;

        let new_due = update.due_date.unwrap_or(current.due_date);

        let mut field_errors = Vec::new();
        if let Some(ref name) = update.name {
            if name.trim().is_empty() {
                field_errors.push("Task name is required".to_string());
            }
        }

        // Validate against the replacement set if given, else the current one.
        let prereq_ids: Vec<i64> = match update.prerequisites {
            Some(ref ids) => ids.clone(),
            None => {
                let mut stmt =
                    tx.prepare("SELECT pre_task_id FROM task_links WHERE task_id = ?1")?;
                let ids = stmt.query_map(params![id], |row| row.get(0))?.flatten().collect();
                ids
            }
        };
        Self::check_prerequisites(&tx, new_due, &prereq_ids, field_errors)?;

        // Capture direct dependents before touching anything; replacing this
        // task's own prerequisite edges does not change who depends on it.
        let dependents: Vec<(i64, NaiveDate)> = {
            let mut stmt = tx.prepare(
                "SELECT t.task_id, t.due_date FROM tasks t
                 JOIN task_links tl ON t.task_id = tl.task_id
                 WHERE tl.pre_task_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .flatten()
                .collect();
            rows
        };

        let name = update.name.clone().unwrap_or(current.name);
        let description = update.description.clone().unwrap_or(current.description);
        let notification_days = update.notification_days.unwrap_or(current.notification_days);
        let telegram_notify = update.telegram_notify.unwrap_or(current.telegram_notify);
        let priority = update.priority.unwrap_or(current.priority);
        let completed = update.completed.unwrap_or(current.completed);
        let completion_date = if completed == current.completed {
            current.completion_date
        } else if completed {
            Some(today)
        } else {
            None
        };

        tx.execute(
            "UPDATE tasks SET task_name = ?1, description = ?2, due_date = ?3,
                              notification_days = ?4, telegram_notify = ?5, priority = ?6,
                              completed = ?7, completion_date = ?8
             WHERE task_id = ?9",
            params![
                name,
                description,
                new_due,
                notification_days,
                telegram_notify,
                priority.as_i64(),
                completed,
                completion_date,
                id,
            ],
        )?;

        if completed != current.completed {
            let change =
                if completed { StatusChange::Completed } else { StatusChange::Reopened };
            Self::append_history(&tx, id, change, today, actor)?;
        }

        if let Some(ref ids) = update.prerequisites {
            tx.execute("DELETE FROM task_links WHERE task_id = ?1", params![id])?;
            for &pre_id in ids {
                tx.execute(
                    "INSERT INTO task_links (task_id, pre_task_id, link_type)
                     VALUES (?1, ?2, ?3)",
                    params![id, pre_id, LINK_TYPE_PREREQUISITE],
                )?;
            }
        }

        let delta = graph::cascade_delta(current.due_date, new_due);
        if delta != 0 {
            for (dep_id, dep_due) in dependents {
                let shifted = dep_due + chrono::Duration::days(delta);
                tx.execute(
                    "UPDATE tasks SET due_date = ?1 WHERE task_id = ?2",
                    params![shifted, dep_id],
                )?;
            }
        }

        let task = Self::fetch_task(&tx, id)?.ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        tx.commit()?;
        Ok(task)
    }

    /// Delete a task and every edge touching it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockedByDependents`] (naming every dependent) if
    /// other tasks list this one as a prerequisite, [`Error::NotFound`] if
    /// it does not exist, or a database error.
    pub fn delete_task(&self, id: i64) -> Result<()> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let task =
            Self::fetch_task(&tx, id)?.ok_or_else(|| Error::NotFound(format!("task {id}")))?;

        let dependents: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT t.task_name FROM tasks t
                 JOIN task_links tl ON t.task_id = tl.task_id
                 WHERE tl.pre_task_id = ?1 ORDER BY t.task_id",
            )?;
            let names = stmt.query_map(params![id], |row| row.get(0))?.flatten().collect();
            names
        };
        if !dependents.is_empty() {
            return Err(Error::BlockedByDependents { task: task.name, dependents });
        }

        tx.execute(
            "DELETE FROM task_links WHERE task_id = ?1 OR pre_task_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM tasks WHERE task_id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Cumulative schedule slip along the prerequisite chain, in days.
    ///
    /// Sums `delay_days` per edge along each chain and takes the largest
    /// chain total. Returns 0 for a task with no prerequisites. Reporting
    /// metric only; not consulted by status derivation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn total_delay(&self, task_id: i64) -> Result<i64> {
        let conn = self.open()?;
        let delay = conn.query_row(
            "WITH RECURSIVE dep_chain(task_id, delay) AS (
                 SELECT tl.pre_task_id, tl.delay_days
                 FROM task_links tl
                 WHERE tl.task_id = ?1
                 UNION ALL
                 SELECT tl2.pre_task_id, dc.delay + tl2.delay_days
                 FROM dep_chain dc
                 JOIN task_links tl2 ON dc.task_id = tl2.task_id
             )
             SELECT COALESCE(MAX(delay), 0) FROM dep_chain",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(delay)
    }

    /// Record the schedule slip carried by one prerequisite edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the edge does not exist, or a
    /// database error.
    pub fn set_link_delay(&self, task_id: i64, pre_task_id: i64, delay_days: i64) -> Result<()> {
        let conn = self.open()?;
        let rows = conn.execute(
            "UPDATE task_links SET delay_days = ?1 WHERE task_id = ?2 AND pre_task_id = ?3",
            params![delay_days, task_id, pre_task_id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("link {task_id} -> {pre_task_id}")));
        }
        Ok(())
    }

    // ---- completion workflow ----

    /// Ask to toggle a task's completion state.
    ///
    /// A completed task is reopened immediately. An incomplete task with
    /// incomplete direct prerequisites is *not* changed; the caller gets
    /// them back in [`CompletionOutcome::NeedsConfirmation`] and must call
    /// [`Self::confirm_completion`] to proceed. Otherwise the task is
    /// completed. Every transition appends one history entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the task does not exist, or a
    /// database error.
    pub fn request_completion(
        &self,
        task_id: i64,
        actor: &str,
        today: NaiveDate,
    ) -> Result<CompletionOutcome> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let task = Self::fetch_task(&tx, task_id)?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;

        if task.completed {
            tx.execute(
                "UPDATE tasks SET completed = 0, completion_date = NULL WHERE task_id = ?1",
                params![task_id],
            )?;
            Self::append_history(&tx, task_id, StatusChange::Reopened, today, actor)?;
            tx.commit()?;
            return Ok(CompletionOutcome::Reopened);
        }

        let incomplete: Vec<Task> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT t.{} FROM tasks t
                 JOIN task_links tl ON t.task_id = tl.pre_task_id
                 WHERE tl.task_id = ?1 AND t.completed = 0
                 ORDER BY t.due_date, t.task_id",
                Self::TASK_COLUMNS
            ))?;
            let tasks = stmt.query_map(params![task_id], Self::parse_task)?.flatten().collect();
            tasks
        };
        if !incomplete.is_empty() {
            // No mutation until the caller confirms.
            return Ok(CompletionOutcome::NeedsConfirmation(incomplete));
        }

        tx.execute(
            "UPDATE tasks SET completed = 1, completion_date = ?1 WHERE task_id = ?2",
            params![today, task_id],
        )?;
        Self::append_history(&tx, task_id, StatusChange::Completed, today, actor)?;
        tx.commit()?;
        Ok(CompletionOutcome::Completed)
    }

    /// Complete a task together with all of its incomplete direct
    /// prerequisites, atomically.
    ///
    /// One history entry is appended per task transitioned. Returns the
    /// ids of every task marked complete, prerequisites first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the task does not exist, or a
    /// database error (in which case nothing is changed).
    pub fn confirm_completion(
        &self,
        task_id: i64,
        actor: &str,
        today: NaiveDate,
    ) -> Result<Vec<i64>> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let task = Self::fetch_task(&tx, task_id)?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;

        let mut to_complete: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT t.task_id FROM tasks t
                 JOIN task_links tl ON t.task_id = tl.pre_task_id
                 WHERE tl.task_id = ?1 AND t.completed = 0
                 ORDER BY t.due_date, t.task_id",
            )?;
            let ids = stmt.query_map(params![task_id], |row| row.get(0))?.flatten().collect();
            ids
        };
        if !task.completed {
            to_complete.push(task_id);
        }

        for &id in &to_complete {
            tx.execute(
                "UPDATE tasks SET completed = 1, completion_date = ?1 WHERE task_id = ?2",
                params![today, id],
            )?;
            Self::append_history(&tx, id, StatusChange::Completed, today, actor)?;
        }

        tx.commit()?;
        Ok(to_complete)
    }

    /// Read a task's completion history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn task_history(&self, task_id: i64) -> Result<Vec<HistoryEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT history_id, task_id, status_change, changed_at, changed_by, notes
             FROM task_history WHERE task_id = ?1 ORDER BY history_id",
        )?;
        let entries = stmt.query_map(params![task_id], Self::parse_history)?.flatten().collect();
        Ok(entries)
    }

    // ---- derived status ----

    /// Derive a task's status for the given date.
    ///
    /// A dangling id derives [`TrackStatus::Inactive`] rather than an
    /// error, so badge rendering never fails on a stale reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn task_status(&self, task_id: i64, today: NaiveDate) -> Result<TrackStatus> {
        let Some(task) = self.get_task(task_id)? else {
            return Ok(TrackStatus::Inactive);
        };
        let prerequisites = self.prerequisites_of(task_id)?;
        Ok(graph::task_status(&task, &prerequisites, today))
    }

    /// Derive a group's status for the given date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn group_status(&self, group_id: i64, today: NaiveDate) -> Result<TrackStatus> {
        let tasks = self.list_group_tasks(group_id)?;
        Ok(graph::group_status(&tasks, today))
    }

    // ---- clock override ----

    /// Read the engine clock: fixed if an override is stored, else system.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clock(&self) -> Result<Clock> {
        let conn = self.open()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'mock_today'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored
            .and_then(|s| s.parse::<NaiveDate>().ok())
            .map_or(Clock::System, Clock::Fixed))
    }

    /// Persist or clear the mock clock override.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_clock(&self, clock: Clock) -> Result<()> {
        let conn = self.open()?;
        match clock.override_date() {
            Some(date) => {
                conn.execute(
                    "INSERT OR REPLACE INTO metadata (key, value) VALUES ('mock_today', ?1)",
                    params![date.to_string()],
                )?;
            }
            None => {
                conn.execute("DELETE FROM metadata WHERE key = 'mock_today'", [])?;
            }
        }
        Ok(())
    }

    /// Read a user's notification watermark.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn user_last_notified(&self, username: &str) -> Result<Option<NaiveDate>> {
        let conn = self.open()?;
        let date = conn
            .query_row(
                "SELECT last_notification_date FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{new_task, test_store};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_register_and_login() {
        let (_dir, store) = test_store();

        let user = store
            .register_user(&NewUser {
                username: "Alice".into(),
                password: "s3cret".into(),
                full_name: "Alice A".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(user.username, "Alice");
        assert_eq!(user.view_mode, ViewMode::Calendar);

        assert!(store.verify_login("Alice", "s3cret").unwrap());
        // Case-insensitive lookup, exact password check.
        assert!(store.verify_login("ALICE", "s3cret").unwrap());
        assert!(!store.verify_login("Alice", "wrong").unwrap());
        assert!(!store.verify_login("nobody", "s3cret").unwrap());
    }

    #[test]
    fn test_register_duplicate_username_case_insensitive() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();

        let err = store
            .register_user(&NewUser {
                username: "ALICE".into(),
                password: "y".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateUser(_)));
    }

    #[test]
    fn test_register_trims_username_before_insert() {
        let (_dir, store) = test_store();
        let user = store
            .register_user(&NewUser {
                username: " alice ".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(user.username, "alice");
        assert!(store.get_user("alice").unwrap().is_some());

        // The padded spelling claimed the plain name.
        let err = store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "y".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateUser(name) if name == "alice"));
    }

    #[test]
    fn test_register_collects_all_validation_errors() {
        let (_dir, store) = test_store();
        let err = store.register_user(&NewUser::default()).unwrap_err();
        match err {
            Error::Validation(problems) => assert_eq!(problems.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_profile_update_and_view_mode() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();

        let updated = store
            .update_profile(
                "alice",
                &ProfileUpdate { email: Some("a@example.com".into()), ..Default::default() },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.email, "a@example.com");

        store.set_view_mode("alice", ViewMode::List).unwrap();
        assert_eq!(store.get_user("alice").unwrap().unwrap().view_mode, ViewMode::List);

        assert!(matches!(
            store.set_view_mode("nobody", ViewMode::List),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_group_crud_and_progress() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();

        let group = store
            .create_group(&NewGroup {
                name: "Garden".into(),
                created_by: "alice".into(),
                color: "#2196F3".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(!group.is_template);

        let t1 = store.create_task(&new_task(group.id, "Order seeds", "2026-03-01")).unwrap();
        store.create_task(&new_task(group.id, "Plant", "2026-04-01")).unwrap();

        assert_eq!(store.group_progress(group.id).unwrap(), (0, 2));
        store.request_completion(t1.id, "alice", date("2026-02-01")).unwrap();
        assert_eq!(store.group_progress(group.id).unwrap(), (1, 2));

        let renamed = store
            .update_group(group.id, &GroupUpdate { name: Some("Back garden".into()), ..Default::default() })
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Back garden");

        assert!(matches!(
            store.create_group(&NewGroup { created_by: "alice".into(), ..Default::default() }),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_delete_group_cascades_tasks_and_links() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let a = store.create_task(&new_task(group.id, "A", "2026-01-01")).unwrap();
        let mut b = new_task(group.id, "B", "2026-02-01");
        b.prerequisites = vec![a.id];
        let b = store.create_task(&b).unwrap();

        assert!(store.delete_group(group.id).unwrap());
        assert!(store.get_group(group.id).unwrap().is_none());
        assert!(store.get_task(a.id).unwrap().is_none());
        assert!(store.get_task(b.id).unwrap().is_none());
        assert!(store.prerequisites_of(b.id).unwrap().is_empty());

        // Deleting again reports nothing deleted.
        assert!(!store.delete_group(group.id).unwrap());
    }

    #[test]
    fn test_create_task_rejects_late_prerequisite_without_writes() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let late = store.create_task(&new_task(group.id, "Late", "2026-02-01")).unwrap();

        let mut bad = new_task(group.id, "Early", "2026-01-15");
        bad.prerequisites = vec![late.id];
        let err = store.create_task(&bad).unwrap_err();
        match err {
            Error::Schedule(violations) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].prerequisite_id, late.id);
            }
            other => panic!("expected schedule violation, got {other}"),
        }

        // Nothing was written.
        assert_eq!(store.list_group_tasks(group.id).unwrap().len(), 1);
    }

    #[test]
    fn test_create_task_collects_missing_prereq_and_empty_name() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();

        let mut bad = new_task(group.id, "  ", "2026-01-15");
        bad.prerequisites = vec![999, 1000];
        let err = store.create_task(&bad).unwrap_err();
        match err {
            Error::Validation(problems) => {
                assert_eq!(problems.len(), 3);
                assert!(problems[0].contains("Task name"));
                assert!(problems[1].contains("999"));
                assert!(problems[2].contains("1000"));
            }
            other => panic!("expected validation error, got {other}"),
        }
        assert!(store.list_group_tasks(group.id).unwrap().is_empty());
    }

    #[test]
    fn test_create_task_folds_schedule_problems_into_field_errors() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let late = store.create_task(&new_task(group.id, "Late", "2026-02-01")).unwrap();

        // An empty name alongside a too-late prerequisite: one error
        // carrying both messages, not a schedule error.
        let mut bad = new_task(group.id, "  ", "2026-01-15");
        bad.prerequisites = vec![late.id];
        let err = store.create_task(&bad).unwrap_err();
        match err {
            Error::Validation(problems) => {
                assert_eq!(problems.len(), 2);
                assert!(problems[0].contains("Task name"));
                assert!(problems[1].contains("'Late'"));
                assert!(problems[1].contains("2026-02-01"));
            }
            other => panic!("expected validation error, got {other}"),
        }
        assert_eq!(store.list_group_tasks(group.id).unwrap().len(), 1);
    }

    #[test]
    fn test_update_task_cascades_due_date_to_direct_dependents_only() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();

        // a <- b <- c chain
        let a = store.create_task(&new_task(group.id, "A", "2026-01-01")).unwrap();
        let mut b = new_task(group.id, "B", "2026-02-01");
        b.prerequisites = vec![a.id];
        let b = store.create_task(&b).unwrap();
        let mut c = new_task(group.id, "C", "2026-03-01");
        c.prerequisites = vec![b.id];
        let c = store.create_task(&c).unwrap();

        store
            .update_task(
                a.id,
                &TaskUpdate { due_date: Some(date("2026-01-11")), ..Default::default() },
                "alice",
                date("2026-01-01"),
            )
            .unwrap();

        // Direct dependent shifted by +10 days; grandchild untouched.
        assert_eq!(store.get_task(b.id).unwrap().unwrap().due_date, date("2026-02-11"));
        assert_eq!(store.get_task(c.id).unwrap().unwrap().due_date, date("2026-03-01"));
    }

    #[test]
    fn test_update_task_rejects_schedule_violation_before_writing() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let a = store.create_task(&new_task(group.id, "A", "2026-01-01")).unwrap();
        let mut b = new_task(group.id, "B", "2026-02-01");
        b.prerequisites = vec![a.id];
        let b = store.create_task(&b).unwrap();

        // Pulling B's due date before A's must fail against the existing edge.
        let err = store
            .update_task(
                b.id,
                &TaskUpdate { due_date: Some(date("2025-12-01")), ..Default::default() },
                "alice",
                date("2026-01-01"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Schedule(_)));
        assert_eq!(store.get_task(b.id).unwrap().unwrap().due_date, date("2026-02-01"));
    }

    #[test]
    fn test_update_task_completion_records_history() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let task = store.create_task(&new_task(group.id, "A", "2026-01-01")).unwrap();

        let done = store
            .update_task(
                task.id,
                &TaskUpdate { completed: Some(true), ..Default::default() },
                "alice",
                date("2026-01-02"),
            )
            .unwrap();
        assert!(done.completed);
        assert_eq!(done.completion_date, Some(date("2026-01-02")));

        let reopened = store
            .update_task(
                task.id,
                &TaskUpdate { completed: Some(false), ..Default::default() },
                "alice",
                date("2026-01-03"),
            )
            .unwrap();
        assert!(!reopened.completed);
        assert_eq!(reopened.completion_date, None);

        let history = store.task_history(task.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].change, StatusChange::Completed);
        assert_eq!(history[1].change, StatusChange::Reopened);
        assert_eq!(history[1].changed_by, "alice");
    }

    #[test]
    fn test_delete_task_blocked_by_dependents() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let a = store.create_task(&new_task(group.id, "A", "2026-01-01")).unwrap();
        let mut b = new_task(group.id, "B", "2026-02-01");
        b.prerequisites = vec![a.id];
        let b = store.create_task(&b).unwrap();

        let err = store.delete_task(a.id).unwrap_err();
        match err {
            Error::BlockedByDependents { task, dependents } => {
                assert_eq!(task, "A");
                assert_eq!(dependents, vec!["B".to_string()]);
            }
            other => panic!("expected blocked-by-dependents, got {other}"),
        }
        // Both tasks and the edge survive.
        assert!(store.get_task(a.id).unwrap().is_some());
        assert_eq!(store.prerequisites_of(b.id).unwrap().len(), 1);

        // Deleting the leaf works and removes its edges.
        store.delete_task(b.id).unwrap();
        assert!(store.get_task(b.id).unwrap().is_none());
        assert!(store.dependents_of(a.id).unwrap().is_empty());
        store.delete_task(a.id).unwrap();
    }

    #[test]
    fn test_completion_requires_confirmation_and_is_atomic() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let a = store.create_task(&new_task(group.id, "A", "2026-01-01")).unwrap();
        let b = store.create_task(&new_task(group.id, "B", "2026-01-15")).unwrap();
        let mut c = new_task(group.id, "C", "2026-02-01");
        c.prerequisites = vec![a.id, b.id];
        let c = store.create_task(&c).unwrap();

        let today = date("2026-01-01");
        let outcome = store.request_completion(c.id, "alice", today).unwrap();
        match outcome {
            CompletionOutcome::NeedsConfirmation(prereqs) => {
                assert_eq!(prereqs.len(), 2);
            }
            other => panic!("expected confirmation request, got {other:?}"),
        }
        // Un-confirmed attempt mutated nothing.
        assert!(!store.get_task(c.id).unwrap().unwrap().completed);
        assert!(!store.get_task(a.id).unwrap().unwrap().completed);
        assert!(store.task_history(c.id).unwrap().is_empty());

        let completed = store.confirm_completion(c.id, "alice", today).unwrap();
        assert_eq!(completed, vec![a.id, b.id, c.id]);
        for id in [a.id, b.id, c.id] {
            let task = store.get_task(id).unwrap().unwrap();
            assert!(task.completed);
            assert_eq!(task.completion_date, Some(today));
            assert_eq!(store.task_history(id).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_request_completion_reopens_completed_task() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let task = store.create_task(&new_task(group.id, "A", "2026-01-01")).unwrap();
        let today = date("2026-01-01");

        assert_eq!(
            store.request_completion(task.id, "alice", today).unwrap(),
            CompletionOutcome::Completed
        );
        assert_eq!(
            store.request_completion(task.id, "alice", today).unwrap(),
            CompletionOutcome::Reopened
        );
        let reopened = store.get_task(task.id).unwrap().unwrap();
        assert!(!reopened.completed);
        assert_eq!(reopened.completion_date, None);
        assert_eq!(store.task_history(task.id).unwrap().len(), 2);
    }

    #[test]
    fn test_request_completion_missing_task() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.request_completion(42, "alice", date("2026-01-01")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_task_status_wrappers() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let a = store.create_task(&new_task(group.id, "A", "2026-01-10")).unwrap();
        let mut b = new_task(group.id, "B", "2026-02-01");
        b.prerequisites = vec![a.id];
        let b = store.create_task(&b).unwrap();

        let today = date("2026-01-05");
        assert_eq!(store.task_status(a.id, today).unwrap(), TrackStatus::Ontrack);
        assert_eq!(store.task_status(b.id, today).unwrap(), TrackStatus::Offtrack);
        assert_eq!(store.task_status(9999, today).unwrap(), TrackStatus::Inactive);
        assert_eq!(store.group_status(group.id, today).unwrap(), TrackStatus::Ontrack);

        store.confirm_completion(b.id, "alice", today).unwrap();
        assert_eq!(store.task_status(b.id, today).unwrap(), TrackStatus::Completed);
        assert_eq!(store.group_status(group.id, today).unwrap(), TrackStatus::Completed);
        assert_eq!(store.group_status(9999, today).unwrap(), TrackStatus::Inactive);
    }

    #[test]
    fn test_total_delay_sums_edges_along_longest_chain() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        let a = store.create_task(&new_task(group.id, "A", "2026-01-01")).unwrap();
        let mut b = new_task(group.id, "B", "2026-02-01");
        b.prerequisites = vec![a.id];
        let b = store.create_task(&b).unwrap();
        let mut c = new_task(group.id, "C", "2026-03-01");
        c.prerequisites = vec![b.id, a.id];
        let c = store.create_task(&c).unwrap();

        assert_eq!(store.total_delay(c.id).unwrap(), 0);

        store.set_link_delay(b.id, a.id, 3).unwrap();
        store.set_link_delay(c.id, b.id, 2).unwrap();
        store.set_link_delay(c.id, a.id, 1).unwrap();

        // Chains from C: via B then A = 2 + 3 = 5, direct to A = 1.
        assert_eq!(store.total_delay(c.id).unwrap(), 5);
        assert_eq!(store.total_delay(a.id).unwrap(), 0);
    }

    #[test]
    fn test_upcoming_due_on_and_overdue_listings() {
        let (_dir, store) = test_store();
        store
            .register_user(&NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();
        let group = store
            .create_group(&NewGroup {
                name: "G".into(),
                created_by: "alice".into(),
                ..Default::default()
            })
            .unwrap();
        store.create_task(&new_task(group.id, "Past", "2026-01-01")).unwrap();
        store.create_task(&new_task(group.id, "Today", "2026-02-01")).unwrap();
        store.create_task(&new_task(group.id, "Soon", "2026-02-10")).unwrap();
        store.create_task(&new_task(group.id, "Later", "2026-05-01")).unwrap();

        let today = date("2026-02-01");
        let upcoming = store.upcoming_tasks("alice", today, 2).unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].name, "Today");
        assert_eq!(upcoming[1].name, "Soon");

        let due_today = store.tasks_due_on("alice", today).unwrap();
        assert_eq!(due_today.len(), 1);
        assert_eq!(due_today[0].name, "Today");

        let overdue = store.overdue_tasks("alice", today).unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].name, "Past");
    }

    #[test]
    fn test_clock_override_round_trip() {
        let (_dir, store) = test_store();
        assert_eq!(store.clock().unwrap(), Clock::System);

        store.set_clock(Clock::fixed(date("2026-06-01"))).unwrap();
        assert_eq!(store.clock().unwrap(), Clock::fixed(date("2026-06-01")));

        store.set_clock(Clock::System).unwrap();
        assert_eq!(store.clock().unwrap(), Clock::System);
    }
}
