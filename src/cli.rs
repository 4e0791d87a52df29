//! Command-line interface.
//!
//! All logic lives here and returns its output as a string, so the
//! binary stays a thin wrapper and everything is testable without
//! spawning a process.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::notify::{self, NotificationTransport};
use crate::presets;
use crate::store::{
    CompletionOutcome, NewGroup, NewTask, NewUser, Priority, ProfileUpdate, SqliteStore,
    TaskUpdate,
};
use crate::templates::{instantiate, InstantiateRequest};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Personal task tracker with prerequisite-aware scheduling.
#[derive(Debug, Parser)]
#[command(name = "ontrack", version, about)]
pub struct Cli {
    /// Database path (defaults to the configured or platform location).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Acting username for mutations and scans.
    #[arg(long, global = true, default_value = "admin")]
    pub user: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Initialize the database and seed the built-in templates.
    Init,
    /// Register a new user account.
    Register {
        /// Username (case-insensitive, must be unique).
        username: String,
        /// Password.
        password: String,
        /// Telegram chat id for overdue escalations.
        #[arg(long)]
        telegram_chat_id: Option<String>,
    },
    /// Check a username/password pair.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// Update the acting user's profile.
    Profile {
        /// New display name.
        #[arg(long)]
        full_name: Option<String>,
        /// New email.
        #[arg(long)]
        email: Option<String>,
        /// New Telegram chat id.
        #[arg(long)]
        telegram_chat_id: Option<String>,
        /// Dashboard view preference: calendar or list.
        #[arg(long)]
        view: Option<String>,
    },
    /// Create a group.
    AddGroup {
        /// Group name.
        name: String,
        /// Hex color tag.
        #[arg(long, default_value = "#8E44AD")]
        color: String,
    },
    /// List the acting user's groups with status and progress.
    Groups,
    /// List a group's tasks with their status.
    Tasks {
        /// Group id.
        group_id: i64,
    },
    /// Create a task in a group.
    AddTask {
        /// Group id.
        group_id: i64,
        /// Task name.
        name: String,
        /// Due date (YYYY-MM-DD).
        due: NaiveDate,
        /// Prerequisite task ids (repeatable).
        #[arg(long = "prereq")]
        prerequisites: Vec<i64>,
        /// Priority 1-3 (1 = high).
        #[arg(long, default_value_t = 2)]
        priority: i64,
        /// Days of notice before the due date.
        #[arg(long, default_value_t = 0)]
        notify_days: i64,
    },
    /// Toggle a task's completion state.
    Done {
        /// Task id.
        task_id: i64,
        /// Also complete any incomplete prerequisites.
        #[arg(long)]
        yes: bool,
    },
    /// Move a task's due date, shifting direct dependents with it.
    Reschedule {
        /// Task id.
        task_id: i64,
        /// New due date (YYYY-MM-DD).
        due: NaiveDate,
    },
    /// Delete a task (refused while other tasks depend on it).
    DeleteTask {
        /// Task id.
        task_id: i64,
    },
    /// Show a task's status, prerequisites, delay, and history.
    Show {
        /// Task id.
        task_id: i64,
    },
    /// List the available templates.
    Templates,
    /// Instantiate a template into a new group.
    Instantiate {
        /// Template group id.
        template_id: i64,
        /// Name for the new group.
        name: String,
        /// Date the earliest task should land on (YYYY-MM-DD).
        start: NaiveDate,
        /// Create the copied tasks with overdue escalations disabled.
        #[arg(long)]
        no_notify: bool,
    },
    /// List the acting user's next upcoming tasks.
    Upcoming {
        /// How many to show (defaults to the configured limit).
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Run a notification scan for the acting user.
    Scan,
    /// Print the acting user's calendar events as JSON.
    Calendar,
    /// Show or change the engine clock.
    Clock {
        #[command(subcommand)]
        command: ClockCommand,
    },
}

/// Engine clock subcommands.
#[derive(Debug, Subcommand)]
pub enum ClockCommand {
    /// Show the current engine date.
    Show,
    /// Pin the engine clock to a date.
    Set {
        /// Date to pin (YYYY-MM-DD).
        date: NaiveDate,
    },
    /// Advance the engine clock by some days (pins it first if needed).
    Advance {
        /// Days to advance by.
        #[arg(default_value_t = 1)]
        days: i64,
    },
    /// Return to the system clock.
    Clear,
}

/// Transport that prints messages to stdout instead of delivering them.
struct StdoutTransport;

impl NotificationTransport for StdoutTransport {
    fn send(&self, chat_id: &str, message: &str) -> Result<()> {
        println!("[{chat_id}] {message}");
        Ok(())
    }
}

/// Execute a parsed command and return its output.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the operation fails.
pub fn run(cli: &Cli) -> Result<String> {
    let config = Config::load()?.unwrap_or_default();
    let db_path = match cli.db {
        Some(ref path) => path.clone(),
        None => config.database_path(),
    };
    let store = SqliteStore::new(&db_path)?;
    let today = store.clock()?.today();
    let mut out = String::new();

    match &cli.command {
        Command::Init => {
            let created = presets::ensure_presets(&store)?;
            let _ = writeln!(out, "Database ready at {}", db_path.display());
            let _ = writeln!(out, "Seeded {created} template(s)");
        }
        Command::Register { username, password, telegram_chat_id } => {
            let user = store.register_user(&NewUser {
                username: username.clone(),
                password: password.clone(),
                telegram_chat_id: telegram_chat_id.clone(),
                ..Default::default()
            })?;
            let _ = writeln!(out, "Registered '{}'", user.username);
        }
        Command::Login { username, password } => {
            if store.verify_login(username, password)? {
                let _ = writeln!(out, "Welcome, {username}");
            } else {
                let _ = writeln!(out, "Invalid username or password");
            }
        }
        Command::Profile { full_name, email, telegram_chat_id, view } => {
            if let Some(view) = view {
                let mode = crate::store::ViewMode::from_str(view)
                    .map_err(|e| crate::error::Error::Validation(vec![e.to_string()]))?;
                store.set_view_mode(&cli.user, mode)?;
            }
            let updated = store
                .update_profile(
                    &cli.user,
                    &ProfileUpdate {
                        full_name: full_name.clone(),
                        email: email.clone(),
                        telegram_chat_id: telegram_chat_id.clone(),
                        ..Default::default()
                    },
                )?
                .ok_or_else(|| crate::error::Error::NotFound(format!("user '{}'", cli.user)))?;
            let _ = writeln!(out, "Profile updated for '{}'", updated.username);
        }
        Command::AddGroup { name, color } => {
            let group = store.create_group(&NewGroup {
                name: name.clone(),
                created_by: cli.user.clone(),
                color: color.clone(),
                ..Default::default()
            })?;
            let _ = writeln!(out, "Created group {} '{}'", group.id, group.name);
        }
        Command::Groups => {
            for group in store.list_groups(&cli.user)? {
                let status = store.group_status(group.id, today)?;
                let (done, total) = store.group_progress(group.id)?;
                let _ = writeln!(out, "{:>4}  {:<9} {done}/{total}  {}", group.id, status, group.name);
            }
        }
        Command::Tasks { group_id } => {
            for task in store.list_group_tasks(*group_id)? {
                let status = store.task_status(task.id, today)?;
                let _ = writeln!(out, "{:>4}  {:<9} due {}  {}", task.id, status, task.due_date, task.name);
            }
        }
        Command::AddTask { group_id, name, due, prerequisites, priority, notify_days } => {
            let task = store.create_task(&NewTask {
                group_id: *group_id,
                name: name.clone(),
                description: String::new(),
                notification_days: *notify_days,
                due_date: *due,
                telegram_notify: true,
                priority: Priority::from_i64(*priority)
                    .map_err(|e| crate::error::Error::Validation(vec![e.to_string()]))?,
                estimated_duration: None,
                recurrence_pattern: None,
                recurrence_end_date: None,
                created_by: cli.user.clone(),
                prerequisites: prerequisites.clone(),
            })?;
            let _ = writeln!(out, "Created task {} '{}' due {}", task.id, task.name, task.due_date);
        }
        Command::Done { task_id, yes } => {
            if *yes {
                let completed = store.confirm_completion(*task_id, &cli.user, today)?;
                let _ = writeln!(out, "Completed {} task(s)", completed.len());
            } else {
                match store.request_completion(*task_id, &cli.user, today)? {
                    CompletionOutcome::Completed => {
                        let _ = writeln!(out, "Task {task_id} completed");
                    }
                    CompletionOutcome::Reopened => {
                        let _ = writeln!(out, "Task {task_id} reopened");
                    }
                    CompletionOutcome::NeedsConfirmation(prereqs) => {
                        let _ = writeln!(out, "Task {task_id} has incomplete prerequisites:");
                        for p in prereqs {
                            let _ = writeln!(out, "  {:>4}  due {}  {}", p.id, p.due_date, p.name);
                        }
                        let _ = writeln!(out, "Re-run with --yes to complete them all");
                    }
                }
            }
        }
        Command::Reschedule { task_id, due } => {
            let task = store.update_task(
                *task_id,
                &TaskUpdate { due_date: Some(*due), ..Default::default() },
                &cli.user,
                today,
            )?;
            let _ = writeln!(out, "Task {} now due {}", task.id, task.due_date);
        }
        Command::DeleteTask { task_id } => {
            store.delete_task(*task_id)?;
            let _ = writeln!(out, "Deleted task {task_id}");
        }
        Command::Show { task_id } => {
            let status = store.task_status(*task_id, today)?;
            let _ = writeln!(out, "Status: {status} ({})", status.badge_color());
            if let Some(task) = store.get_task(*task_id)? {
                let _ = writeln!(out, "Due: {}", task.due_date);
                let delay = store.total_delay(*task_id)?;
                if delay > 0 {
                    let _ = writeln!(out, "Accumulated delay: {delay} day(s)");
                }
                for p in store.prerequisites_of(*task_id)? {
                    let mark = if p.completed { "x" } else { " " };
                    let _ = writeln!(out, "  requires [{mark}] {:>4}  {}", p.id, p.name);
                }
                for entry in store.task_history(*task_id)? {
                    let _ = writeln!(
                        out,
                        "  {} {} by {}",
                        entry.changed_at,
                        entry.change.as_str(),
                        entry.changed_by
                    );
                }
            }
        }
        Command::Templates => {
            for group in store.list_templates()? {
                let count = store.list_group_tasks(group.id)?.len();
                let _ = writeln!(out, "{:>4}  {} ({count} tasks)", group.id, group.name);
            }
        }
        Command::Instantiate { template_id, name, start, no_notify } => {
            let group = instantiate(
                &store,
                &InstantiateRequest {
                    template_id: *template_id,
                    name: name.clone(),
                    created_by: cli.user.clone(),
                    start_date: *start,
                    notifications_enabled: !no_notify,
                },
            )?;
            let _ = writeln!(out, "Created group {} '{}'", group.id, group.name);
        }
        Command::Upcoming { limit } => {
            let limit = limit.unwrap_or(config.upcoming_limit);
            for task in store.upcoming_tasks(&cli.user, today, limit)? {
                let status = store.task_status(task.id, today)?;
                let _ = writeln!(out, "{:>4}  {:<9} due {}  {}", task.id, status, task.due_date, task.name);
            }
        }
        Command::Scan => {
            let events = notify::scan(&store, &StdoutTransport, &cli.user, today)?;
            for event in &events {
                let _ = writeln!(out, "{}", event.message());
            }
            let _ = writeln!(out, "{} notification(s)", events.len());
        }
        Command::Calendar => {
            let events = crate::calendar::events_for_user(&store, &cli.user)?;
            let _ = writeln!(out, "{}", serde_json::to_string_pretty(&events)?);
        }
        Command::Clock { command } => match command {
            ClockCommand::Show => {
                let clock = store.clock()?;
                let pinned = if clock.override_date().is_some() { " (pinned)" } else { "" };
                let _ = writeln!(out, "{}{pinned}", clock.today());
            }
            ClockCommand::Set { date } => {
                store.set_clock(Clock::fixed(*date))?;
                let _ = writeln!(out, "Clock pinned to {date}");
            }
            ClockCommand::Advance { days } => {
                let clock = store.clock()?.advanced_by(*days);
                store.set_clock(clock)?;
                let _ = writeln!(out, "Clock now {}", clock.today());
            }
            ClockCommand::Clear => {
                store.set_clock(Clock::System)?;
                let _ = writeln!(out, "Clock follows system time");
            }
        },
    }

    Ok(out)
}
