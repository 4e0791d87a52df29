//! Template instantiation.
//!
//! A template is an ordinary group flagged `is_template`, holding a task
//! pattern with relative spacing encoded in absolute dates. Instantiating
//! one copies the group and its tasks into a fresh group owned by the
//! caller, shifting every date so the *earliest* task due date lands on
//! the requested start date. Prerequisite edges between copied tasks are
//! recreated between the copies, keeping their link type and delay.
//!
//! The whole copy is one transaction: a failure partway leaves nothing.

use crate::error::{Error, Result};
use crate::store::{Group, SqliteStore, Task};
use chrono::NaiveDate;
use rusqlite::params;
use std::collections::HashMap;

/// Parameters for instantiating a template group.
#[derive(Debug, Clone)]
pub struct InstantiateRequest {
    /// The group to copy from (normally a template, but any group works).
    pub template_id: i64,
    /// Name for the new group.
    pub name: String,
    /// Owner of the new group and its tasks.
    pub created_by: String,
    /// Date the earliest copied task should be due on.
    pub start_date: NaiveDate,
    /// Whether the copied tasks should send overdue escalations. Applied
    /// to every copy; the template tasks' own flags are ignored.
    pub notifications_enabled: bool,
}

/// Instantiate a template into a new group for a user.
///
/// Copied tasks start incomplete and un-notified regardless of the
/// template's state, and carry the request's notification flag rather
/// than the template tasks' own. Returns the new group.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the template group does not exist,
/// [`Error::Validation`] if the new name is empty or the template has no
/// tasks (the date offset would be undefined), or a database error. On
/// any error nothing is created.
pub fn instantiate(store: &SqliteStore, req: &InstantiateRequest) -> Result<Group> {
    if req.name.trim().is_empty() {
        return Err(Error::Validation(vec!["Group name is required".to_string()]));
    }

    let mut conn = store.open()?;
    let tx = conn.transaction()?;

    let template: (String, String, Option<String>, Option<NaiveDate>, Option<NaiveDate>) = tx
        .query_row(
            "SELECT color, remarks, category, start_date, end_date
             FROM groups WHERE group_id = ?1",
            params![req.template_id],
            |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::NotFound(format!("group {}", req.template_id))
            }
            other => other.into(),
        })?;
    let (color, remarks, category, tpl_start, tpl_end) = template;

    let tasks: Vec<Task> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {} FROM tasks WHERE group_id = ?1 ORDER BY due_date, task_id",
            SqliteStore::TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map(params![req.template_id], SqliteStore::parse_task)?
            .flatten()
            .collect();
        tasks
    };
    let Some(earliest) = tasks.iter().map(|t| t.due_date).min() else {
        return Err(Error::Validation(vec!["Template has no tasks".to_string()]));
    };
    let offset = req.start_date - earliest;

    tx.execute(
        "INSERT INTO groups (group_name, created_by, color, remarks, is_template, category,
                             start_date, end_date)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)",
        params![
            req.name,
            req.created_by,
            color,
            remarks,
            category,
            tpl_start.map(|d| d + offset).or(Some(req.start_date)),
            tpl_end.map(|d| d + offset),
        ],
    )?;
    let new_group_id = tx.last_insert_rowid();

    let mut id_map: HashMap<i64, i64> = HashMap::new();
    for task in &tasks {
        tx.execute(
            "INSERT INTO tasks (group_id, task_name, description, notification_days, due_date,
                                completed, notified, created_by, recurrence_pattern,
                                recurrence_end_date, telegram_notify, priority,
                                estimated_duration)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new_group_id,
                task.name,
                task.description,
                task.notification_days,
                task.due_date + offset,
                req.created_by,
                task.recurrence_pattern,
                task.recurrence_end_date.map(|d| d + offset),
                req.notifications_enabled,
                task.priority.as_i64(),
                task.estimated_duration,
            ],
        )?;
        id_map.insert(task.id, tx.last_insert_rowid());
    }

    // Recreate edges whose endpoints both live inside the template.
    let links: Vec<(i64, i64, String, i64)> = {
        let mut stmt = tx.prepare(
            "SELECT tl.task_id, tl.pre_task_id, tl.link_type, tl.delay_days
             FROM task_links tl
             JOIN tasks a ON tl.task_id = a.task_id
             JOIN tasks b ON tl.pre_task_id = b.task_id
             WHERE a.group_id = ?1 AND b.group_id = ?1",
        )?;
        let links = stmt
            .query_map(params![req.template_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .flatten()
            .collect();
        links
    };
    for (task_id, pre_task_id, link_type, delay_days) in links {
        if let (Some(&new_task), Some(&new_pre)) = (id_map.get(&task_id), id_map.get(&pre_task_id))
        {
            tx.execute(
                "INSERT INTO task_links (task_id, pre_task_id, link_type, delay_days)
                 VALUES (?1, ?2, ?3, ?4)",
                params![new_task, new_pre, link_type, delay_days],
            )?;
        }
    }

    tx.commit()?;
    store
        .get_group(new_group_id)?
        .ok_or_else(|| Error::NotFound(format!("group {new_group_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewGroup, NewUser};
    use crate::testing::{new_task, test_store};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn setup(store: &SqliteStore) -> i64 {
        for name in ["admin", "alice"] {
            store
                .register_user(&NewUser {
                    username: name.into(),
                    password: "x".into(),
                    ..Default::default()
                })
                .unwrap();
        }
        store
            .create_group(&NewGroup {
                name: "Rice paddy".into(),
                created_by: "admin".into(),
                color: "#4CAF50".into(),
                is_template: true,
                category: Some("agriculture".into()),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_instantiate_shifts_earliest_task_to_start_date() {
        let (_dir, store) = test_store();
        let template = setup(&store);

        let mut sow = new_task(template, "Sow", "2026-01-01");
        sow.created_by = "admin".into();
        let sow = store.create_task(&sow).unwrap();
        let mut harvest = new_task(template, "Harvest", "2026-05-20");
        harvest.created_by = "admin".into();
        harvest.prerequisites = vec![sow.id];
        store.create_task(&harvest).unwrap();

        let group = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template,
                name: "My paddy".into(),
                created_by: "alice".into(),
                start_date: date("2027-06-01"),
                notifications_enabled: true,
            },
        )
        .unwrap();

        assert_eq!(group.name, "My paddy");
        assert_eq!(group.created_by, "alice");
        assert!(!group.is_template);
        assert_eq!(group.category.as_deref(), Some("agriculture"));
        assert_eq!(group.start_date, Some(date("2027-06-01")));

        let tasks = store.list_group_tasks(group.id).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "Sow");
        assert_eq!(tasks[0].due_date, date("2027-06-01"));
        // Same spacing as the template: 139 days apart.
        assert_eq!(tasks[1].due_date, date("2027-10-18"));
        assert!(tasks.iter().all(|t| !t.completed && !t.notified));
        assert!(tasks.iter().all(|t| t.created_by == "alice"));
    }

    #[test]
    fn test_instantiate_recreates_edges_between_copies() {
        let (_dir, store) = test_store();
        let template = setup(&store);

        let mut a = new_task(template, "A", "2026-01-01");
        a.created_by = "admin".into();
        let a = store.create_task(&a).unwrap();
        let mut b = new_task(template, "B", "2026-02-01");
        b.created_by = "admin".into();
        b.prerequisites = vec![a.id];
        let b = store.create_task(&b).unwrap();
        store.set_link_delay(b.id, a.id, 4).unwrap();

        let group = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template,
                name: "Copy".into(),
                created_by: "alice".into(),
                start_date: date("2026-03-01"),
                notifications_enabled: true,
            },
        )
        .unwrap();

        let tasks = store.list_group_tasks(group.id).unwrap();
        let new_a = tasks.iter().find(|t| t.name == "A").unwrap();
        let new_b = tasks.iter().find(|t| t.name == "B").unwrap();

        let prereqs = store.prerequisites_of(new_b.id).unwrap();
        assert_eq!(prereqs.len(), 1);
        assert_eq!(prereqs[0].id, new_a.id);

        let links = store.group_links(group.id).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].delay_days, 4);
        assert_eq!(links[0].link_type, "prerequisite");

        // The template's own edge is untouched.
        assert_eq!(store.prerequisites_of(b.id).unwrap().len(), 1);
    }

    #[test]
    fn test_instantiate_completed_template_tasks_start_incomplete() {
        let (_dir, store) = test_store();
        let template = setup(&store);
        let mut t = new_task(template, "Done", "2026-01-01");
        t.created_by = "admin".into();
        let t = store.create_task(&t).unwrap();
        store.request_completion(t.id, "admin", date("2026-01-01")).unwrap();

        let group = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template,
                name: "Fresh".into(),
                created_by: "alice".into(),
                start_date: date("2026-02-01"),
                notifications_enabled: true,
            },
        )
        .unwrap();

        let tasks = store.list_group_tasks(group.id).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(!tasks[0].completed);
        assert_eq!(tasks[0].completion_date, None);
    }

    #[test]
    fn test_instantiate_applies_requested_notify_flag() {
        let (_dir, store) = test_store();
        let template = setup(&store);
        let mut loud = new_task(template, "Loud", "2026-01-01");
        loud.created_by = "admin".into();
        store.create_task(&loud).unwrap();
        let mut quiet = new_task(template, "Quiet", "2026-02-01");
        quiet.created_by = "admin".into();
        quiet.telegram_notify = false;
        store.create_task(&quiet).unwrap();

        let muted = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template,
                name: "Muted run".into(),
                created_by: "alice".into(),
                start_date: date("2026-03-01"),
                notifications_enabled: false,
            },
        )
        .unwrap();
        let tasks = store.list_group_tasks(muted.id).unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| !t.telegram_notify));

        // The flag is the request's, not the template's, in both directions.
        let noisy = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template,
                name: "Noisy run".into(),
                created_by: "alice".into(),
                start_date: date("2026-04-01"),
                notifications_enabled: true,
            },
        )
        .unwrap();
        assert!(store.list_group_tasks(noisy.id).unwrap().iter().all(|t| t.telegram_notify));
    }

    #[test]
    fn test_instantiate_backwards_offset() {
        let (_dir, store) = test_store();
        let template = setup(&store);
        let mut t = new_task(template, "T", "2026-06-01");
        t.created_by = "admin".into();
        store.create_task(&t).unwrap();

        let group = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template,
                name: "Earlier".into(),
                created_by: "alice".into(),
                start_date: date("2026-05-01"),
                notifications_enabled: true,
            },
        )
        .unwrap();

        let tasks = store.list_group_tasks(group.id).unwrap();
        assert_eq!(tasks[0].due_date, date("2026-05-01"));
    }

    #[test]
    fn test_instantiate_empty_template_rejected() {
        let (_dir, store) = test_store();
        let template = setup(&store);

        let err = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template,
                name: "Empty".into(),
                created_by: "alice".into(),
                start_date: date("2026-05-01"),
                notifications_enabled: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // No group was created.
        assert_eq!(store.list_groups("alice").unwrap().len(), 0);
    }

    #[test]
    fn test_instantiate_missing_template() {
        let (_dir, store) = test_store();
        setup(&store);
        let err = instantiate(
            &store,
            &InstantiateRequest {
                template_id: 999,
                name: "X".into(),
                created_by: "alice".into(),
                start_date: date("2026-05-01"),
                notifications_enabled: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_instantiate_empty_name_rejected() {
        let (_dir, store) = test_store();
        let template = setup(&store);
        let err = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template,
                name: "  ".into(),
                created_by: "alice".into(),
                start_date: date("2026-05-01"),
                notifications_enabled: true,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
