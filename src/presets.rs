//! Built-in template groups seeded into a fresh database.
//!
//! Each preset is a template group owned by `admin` whose tasks are dated
//! backwards from a fixed anchor so that instantiation (which shifts the
//! earliest task onto the requested start date) reproduces the intended
//! spacing. Seeding is idempotent: templates are matched by name and
//! never re-inserted or overwritten, so user edits survive restarts.

use crate::error::Result;
use crate::store::{Priority, SqliteStore, LINK_TYPE_PREREQUISITE};
use chrono::NaiveDate;
use rusqlite::params;
use std::collections::HashSet;

/// Anchor date the preset task dates count back from.
pub const PRESET_BASE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2026, 1, 1) {
    Some(d) => d,
    None => panic!("valid anchor date"),
};

const RECURRENCE_END: &str = "2027-12-31";

/// One task within a preset template.
struct PresetTask {
    name: &'static str,
    description: &'static str,
    /// Days before the anchor date this task is due; doubles as the
    /// notification lead time.
    days: i64,
    duration: i64,
    priority: Priority,
}

/// A built-in template definition. Tasks are chained: each depends on
/// the one before it.
struct PresetTemplate {
    name: &'static str,
    description: &'static str,
    color: &'static str,
    category: &'static str,
    recurrence: &'static str,
    tasks: &'static [PresetTask],
}

static PRESET_TEMPLATES: &[PresetTemplate] = &[
    PresetTemplate {
        name: "Student Unit Enrollment",
        description: "Template for managing unit enrollment tasks for each teaching period",
        color: "#4CAF50",
        category: "academic",
        recurrence: "quarterly",
        tasks: &[
            PresetTask {
                name: "Check unit prerequisites",
                description: "Review academic transcript and check prerequisites for intended units",
                days: 60,
                duration: 2,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Enroll in units",
                description: "Complete unit enrollment through student portal",
                days: 30,
                duration: 1,
                priority: Priority::High,
            },
            PresetTask {
                name: "Order required textbooks",
                description: "Purchase or order all required textbooks for enrolled units",
                days: 14,
                duration: 2,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Confirm enrollment",
                description: "Verify enrollment status and unit registration",
                days: 0,
                duration: 1,
                priority: Priority::High,
            },
        ],
    },
    PresetTemplate {
        name: "Garden Plant Management",
        description: "Annual garden planting and management schedule",
        color: "#2196F3",
        category: "agriculture",
        recurrence: "yearly",
        tasks: &[
            PresetTask {
                name: "Order seeds for new season",
                description: "Select and order seeds for the upcoming planting season",
                days: 60,
                duration: 3,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Prepare growing site",
                description: "Clear area, prepare soil, and set up irrigation",
                days: 30,
                duration: 5,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Plant seedlings",
                description: "Transfer seedlings to prepared growing site",
                days: 0,
                duration: 2,
                priority: Priority::High,
            },
        ],
    },
    PresetTemplate {
        name: "Unit Coordinator Tasks",
        description: "Teaching period preparation and management tasks",
        color: "#9C27B0",
        category: "academic",
        recurrence: "quarterly",
        tasks: &[
            PresetTask {
                name: "Set up LMS sites",
                description: "Create and configure Learning Management System sites for units",
                days: 60,
                duration: 3,
                priority: Priority::High,
            },
            PresetTask {
                name: "Update ULIGs",
                description: "Review and update Unit Learning Information Guides",
                days: 45,
                duration: 5,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Update lecture content",
                description: "Review and update lecture materials and slides",
                days: 30,
                duration: 10,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Write assignments",
                description: "Prepare assignment questions and marking rubrics",
                days: 30,
                duration: 5,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Set exams",
                description: "Create examination papers and solutions",
                days: 14,
                duration: 5,
                priority: Priority::High,
            },
        ],
    },
    PresetTemplate {
        name: "Breeding Program Management",
        description: "Annual livestock breeding program management",
        color: "#FF9800",
        category: "agriculture",
        recurrence: "yearly",
        tasks: &[
            PresetTask {
                name: "Select breeding stock",
                description: "Evaluate and select animals for breeding program",
                days: 90,
                duration: 5,
                priority: Priority::High,
            },
            PresetTask {
                name: "Group stock for breeding",
                description: "Organize selected animals into breeding groups",
                days: 60,
                duration: 3,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Plan mating schedule",
                description: "Create detailed mating timeline and assignments",
                days: 45,
                duration: 2,
                priority: Priority::Medium,
            },
            PresetTask {
                name: "Order husbandry supplies",
                description: "Purchase necessary breeding and veterinary supplies",
                days: 30,
                duration: 2,
                priority: Priority::Low,
            },
            PresetTask {
                name: "Allocate paddocks",
                description: "Assign and prepare paddocks for breeding groups",
                days: 14,
                duration: 3,
                priority: Priority::Medium,
            },
        ],
    },
];

/// Username that owns the built-in templates.
pub const PRESET_OWNER: &str = "admin";

/// Seed the built-in templates, creating the `admin` owner if needed.
///
/// Templates are matched by name: only missing ones are inserted, and
/// existing groups are left untouched. Each template's tasks are chained
/// into a linear prerequisite sequence. Returns how many templates were
/// inserted.
///
/// # Errors
///
/// Returns an error if a database operation fails; in that case nothing
/// is seeded.
pub fn ensure_presets(store: &SqliteStore) -> Result<u32> {
    let mut conn = store.open()?;
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT OR IGNORE INTO users (username, password, full_name) VALUES (?1, ?1, 'Administrator')",
        params![PRESET_OWNER],
    )?;

    let existing: HashSet<String> = {
        let mut stmt = tx.prepare("SELECT group_name FROM groups WHERE is_template = 1")?;
        let names = stmt.query_map([], |row| row.get(0))?.flatten().collect();
        names
    };

    let mut created = 0;
    for template in PRESET_TEMPLATES {
        if existing.contains(template.name) {
            continue;
        }

        tx.execute(
            "INSERT INTO groups (group_name, remarks, color, category, created_by, is_template)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![
                template.name,
                template.description,
                template.color,
                template.category,
                PRESET_OWNER,
            ],
        )?;
        let group_id = tx.last_insert_rowid();

        let mut prev_task_id: Option<i64> = None;
        for task in template.tasks {
            tx.execute(
                "INSERT INTO tasks (group_id, task_name, description, notification_days,
                                    due_date, recurrence_pattern, recurrence_end_date,
                                    priority, estimated_duration, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    group_id,
                    task.name,
                    task.description,
                    task.days,
                    PRESET_BASE_DATE - chrono::Duration::days(task.days),
                    template.recurrence,
                    RECURRENCE_END,
                    task.priority.as_i64(),
                    task.duration,
                    PRESET_OWNER,
                ],
            )?;
            let task_id = tx.last_insert_rowid();

            if let Some(prev) = prev_task_id {
                tx.execute(
                    "INSERT INTO task_links (task_id, pre_task_id, link_type) VALUES (?1, ?2, ?3)",
                    params![task_id, prev, LINK_TYPE_PREREQUISITE],
                )?;
            }
            prev_task_id = Some(task_id);
        }
        created += 1;
    }

    tx.commit()?;
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{instantiate, InstantiateRequest};
    use crate::testing::test_store;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_seeds_four_templates_owned_by_admin() {
        let (_dir, store) = test_store();
        assert_eq!(ensure_presets(&store).unwrap(), 4);

        let templates = store.list_templates().unwrap();
        assert_eq!(templates.len(), 4);
        assert!(templates.iter().all(|g| g.created_by == PRESET_OWNER && g.is_template));

        let mut names: Vec<&str> = templates.iter().map(|g| g.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec![
                "Breeding Program Management",
                "Garden Plant Management",
                "Student Unit Enrollment",
                "Unit Coordinator Tasks",
            ]
        );

        assert!(store.get_user(PRESET_OWNER).unwrap().is_some());
    }

    #[test]
    fn test_seeding_is_idempotent() {
        let (_dir, store) = test_store();
        assert_eq!(ensure_presets(&store).unwrap(), 4);
        assert_eq!(ensure_presets(&store).unwrap(), 0);
        assert_eq!(store.list_templates().unwrap().len(), 4);
    }

    #[test]
    fn test_enrollment_template_dates_and_chain() {
        let (_dir, store) = test_store();
        ensure_presets(&store).unwrap();

        let template = store
            .list_templates()
            .unwrap()
            .into_iter()
            .find(|g| g.name == "Student Unit Enrollment")
            .unwrap();
        let tasks = store.list_group_tasks(template.id).unwrap();
        assert_eq!(tasks.len(), 4);

        // Dated back from the anchor: 60, 30, 14, 0 days.
        assert_eq!(tasks[0].due_date, date("2025-11-02"));
        assert_eq!(tasks[1].due_date, date("2025-12-02"));
        assert_eq!(tasks[2].due_date, date("2025-12-18"));
        assert_eq!(tasks[3].due_date, date("2026-01-01"));
        assert_eq!(tasks[0].notification_days, 60);
        assert_eq!(tasks[0].recurrence_pattern.as_deref(), Some("quarterly"));

        // Linear chain: each task depends on the previous one.
        assert!(store.prerequisites_of(tasks[0].id).unwrap().is_empty());
        for pair in tasks.windows(2) {
            let prereqs = store.prerequisites_of(pair[1].id).unwrap();
            assert_eq!(prereqs.len(), 1);
            assert_eq!(prereqs[0].id, pair[0].id);
        }
    }

    #[test]
    fn test_preset_instantiation_preserves_spacing() {
        let (_dir, store) = test_store();
        ensure_presets(&store).unwrap();
        store
            .register_user(&crate::store::NewUser {
                username: "alice".into(),
                password: "x".into(),
                ..Default::default()
            })
            .unwrap();

        let template = store
            .list_templates()
            .unwrap()
            .into_iter()
            .find(|g| g.name == "Garden Plant Management")
            .unwrap();

        let group = instantiate(
            &store,
            &InstantiateRequest {
                template_id: template.id,
                name: "Spring garden".into(),
                created_by: "alice".into(),
                start_date: date("2026-08-01"),
                notifications_enabled: true,
            },
        )
        .unwrap();

        let tasks = store.list_group_tasks(group.id).unwrap();
        assert_eq!(tasks.len(), 3);
        // 60/30/0 day spacing relative to the earliest task.
        assert_eq!(tasks[0].due_date, date("2026-08-01"));
        assert_eq!(tasks[1].due_date, date("2026-08-31"));
        assert_eq!(tasks[2].due_date, date("2026-09-30"));
        // The chain carried over.
        assert_eq!(store.prerequisites_of(tasks[2].id).unwrap().len(), 1);
    }
}
