//! Persistent storage for users, groups, tasks, and their dependency
//! edges, backed by `SQLite`.

mod models;
mod sqlite;

pub use models::{
    Group, HistoryEntry, InvalidPriority, InvalidStatusChange, InvalidViewMode, Priority,
    StatusChange, Task, TaskLink, TrackStatus, User, ViewMode, LINK_TYPE_PREREQUISITE,
};
pub use sqlite::{
    CompletionOutcome, GroupUpdate, NewGroup, NewTask, NewUser, ProfileUpdate, SqliteStore,
    TaskUpdate,
};
