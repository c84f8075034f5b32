use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};
use crate::model::encoding::{epoch_millis, format_naive, from_epoch_millis, parse_naive};
use crate::model::{Task, TaskId, TaskPatch};

mod schema;
pub mod worker;

pub use worker::{DispatchEvent, StoreWorker};

fn select_tasks(filter: &str, order: &str) -> String {
    format!(
        "SELECT t.id,
                t.content,
                t.schedule,
                t.start,
                t.due,
                t.completed,
                t.locked,
                t.captured,
                json_group_array(g.name) FILTER (WHERE g.name IS NOT NULL)
         FROM tasks t
         LEFT JOIN task_tags tt ON tt.task_id = t.id
         LEFT JOIN tags g ON g.id = tt.tag_id
         {filter}
         GROUP BY t.id
         {order}"
    )
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    #[error("column {column} holds an unreadable timestamp: {value}")]
    InvalidTimestamp { column: &'static str, value: String },
    #[error("task tags are unreadable: {0}")]
    InvalidTags(String),
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn create_task(&self, content: &str, tags: &BTreeSet<String>) -> Result<Task> {
        let id = TaskId::generate();
        let captured = OffsetDateTime::now_utc();
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO tasks (id, content, completed, locked, captured)
             VALUES (?1, ?2, 0, 0, ?3)",
            params![id.as_str(), content, epoch_millis(captured)],
        )
        .context("inserting task")?;
        replace_tags(&tx, &id, tags)?;
        tx.commit()?;
        tracing::debug!(task = %id, "task created");
        self.fetch_task(&id)?
            .ok_or_else(|| StorageError::TaskNotFound(id).into())
    }

    pub fn fetch_task(&self, id: &TaskId) -> Result<Option<Task>> {
        self.with_connection(|conn| {
            let sql = select_tasks("WHERE t.id = ?1", "");
            let row = conn
                .query_row(&sql, [id.as_str()], TaskRow::from_row)
                .optional()
                .with_context(|| format!("fetching task {id}"))?;
            row.map(|row| row.into_task().map_err(anyhow::Error::from))
                .transpose()
        })
    }

    /// Every stored task, oldest capture first.
    pub fn fetch_tasks(&self) -> Result<Vec<Task>> {
        self.with_connection(|conn| {
            let sql = select_tasks("", "ORDER BY t.captured ASC, t.id ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], TaskRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("reading tasks")?;
            rows.into_iter()
                .map(|row| row.into_task().map_err(anyhow::Error::from))
                .collect()
        })
    }

    /// Writes the fields present in `patch` in one transaction. Tags are
    /// replaced wholesale.
    pub fn apply_patch(&self, id: &TaskId, patch: &TaskPatch) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM tasks WHERE id = ?1", [id.as_str()], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StorageError::TaskNotFound(id.clone()).into());
        }

        if let Some(content) = &patch.content {
            tx.execute(
                "UPDATE tasks SET content = ?2 WHERE id = ?1",
                params![id.as_str(), content],
            )?;
        }
        if let Some(completed) = patch.completed {
            tx.execute(
                "UPDATE tasks SET completed = ?2 WHERE id = ?1",
                params![id.as_str(), completed],
            )?;
        }
        if let Some(locked) = patch.locked {
            tx.execute(
                "UPDATE tasks SET locked = ?2 WHERE id = ?1",
                params![id.as_str(), locked],
            )?;
        }
        if let Some(schedule) = patch.schedule {
            tx.execute(
                "UPDATE tasks SET schedule = ?2 WHERE id = ?1",
                params![id.as_str(), schedule.map(epoch_millis)],
            )?;
        }
        if let Some(start) = patch.start {
            let text = start
                .map(format_naive)
                .transpose()
                .context("formatting start date")?;
            tx.execute(
                "UPDATE tasks SET start = ?2 WHERE id = ?1",
                params![id.as_str(), text],
            )?;
        }
        if let Some(due) = patch.due {
            tx.execute(
                "UPDATE tasks SET due = ?2 WHERE id = ?1",
                params![id.as_str(), due.map(epoch_millis)],
            )?;
        }
        if let Some(tags) = &patch.tags {
            replace_tags(&tx, id, tags)?;
        }
        tx.commit()?;
        tracing::debug!(task = %id, fields = ?patch.field_names(), "patch applied");
        Ok(())
    }

    pub fn remove_task(&self, id: &TaskId) -> Result<()> {
        self.with_connection(|conn| {
            let removed = conn
                .execute("DELETE FROM tasks WHERE id = ?1", [id.as_str()])
                .with_context(|| format!("removing task {id}"))?;
            if removed == 0 {
                return Err(StorageError::TaskNotFound(id.clone()).into());
            }
            Ok(())
        })
    }

    pub fn list_all_tags(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT g.name
                 FROM tags g
                 JOIN task_tags tt ON tt.tag_id = g.id
                 ORDER BY g.name COLLATE NOCASE",
            )?;
            let tags = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(tags)
        })
    }
}

struct TaskRow {
    id: String,
    content: String,
    schedule: Option<i64>,
    start: Option<String>,
    due: Option<i64>,
    completed: bool,
    locked: bool,
    captured: i64,
    tags: String,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            schedule: row.get(2)?,
            start: row.get(3)?,
            due: row.get(4)?,
            completed: row.get::<_, i64>(5)? != 0,
            locked: row.get::<_, i64>(6)? != 0,
            captured: row.get(7)?,
            tags: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task, StorageError> {
        let start = self
            .start
            .map(|text| {
                parse_naive(&text)
                    .map(|naive| naive.assume_utc())
                    .map_err(|_| StorageError::InvalidTimestamp {
                        column: "start",
                        value: text,
                    })
            })
            .transpose()?;
        Ok(Task {
            id: TaskId::from(self.id),
            content: self.content,
            tags: parse_tags(&self.tags)?,
            schedule: self.schedule.map(|ms| instant("schedule", ms)).transpose()?,
            start,
            due: self.due.map(|ms| instant("due", ms)).transpose()?,
            completed: self.completed,
            locked: self.locked,
            captured: instant("captured", self.captured)?,
        })
    }
}

fn instant(column: &'static str, millis: i64) -> Result<OffsetDateTime, StorageError> {
    from_epoch_millis(millis).map_err(|_| StorageError::InvalidTimestamp {
        column,
        value: millis.to_string(),
    })
}

/// Tags arrive as a JSON array so names may contain any character.
fn parse_tags(raw: &str) -> Result<BTreeSet<String>, StorageError> {
    serde_json::from_str(raw).map_err(|_| StorageError::InvalidTags(raw.to_string()))
}

fn replace_tags(conn: &Connection, id: &TaskId, tags: &BTreeSet<String>) -> Result<()> {
    conn.execute("DELETE FROM task_tags WHERE task_id = ?1", [id.as_str()])
        .context("clearing task tags")?;
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [tag])
            .context("inserting tag")?;
        conn.execute(
            "INSERT OR IGNORE INTO task_tags (task_id, tag_id)
             SELECT ?1, id FROM tags WHERE name = ?2",
            params![id.as_str(), tag],
        )
        .context("linking tag to task")?;
    }
    Ok(())
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    if !existed && storage.seed_examples {
        seed_initial_tasks(&conn)?;
    }
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

fn seed_initial_tasks(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM tasks LIMIT 1", [], |row| row.get(0))
        .optional()
        .context("checking for existing tasks")?;
    if existing.is_some() {
        return Ok(());
    }

    tracing::info!("seeding first-run tasks");
    let now = epoch_millis(OffsetDateTime::now_utc());
    let tasks: [(&str, &[&str]); 3] = [
        ("Click a task to show its action bar", &["welcome"]),
        ("Give this task a due date", &["welcome"]),
        ("Mark this task complete", &[]),
    ];

    for (offset, (content, tags)) in tasks.into_iter().enumerate() {
        let id = TaskId::generate();
        conn.execute(
            "INSERT INTO tasks (id, content, completed, locked, captured)
             VALUES (?1, ?2, 0, 0, ?3)",
            params![id.as_str(), content, now + offset as i64],
        )
        .context("inserting seed task")?;
        let tags: BTreeSet<String> = tags.iter().map(|tag| tag.to_string()).collect();
        replace_tags(conn, &id, &tags)?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;
    use time::macros::datetime;

    pub(crate) fn temp_paths(root: &TempDir) -> ConfigPaths {
        let config_dir = root.path().join("config");
        ConfigPaths::rooted(
            config_dir.clone(),
            config_dir.join("config.toml"),
            root.path().join("data"),
        )
    }

    fn storage_options(paths: &ConfigPaths, seed_examples: bool) -> StorageOptions {
        StorageOptions {
            database_path: paths.database_path.clone(),
            seed_examples,
            ..StorageOptions::default()
        }
    }

    pub(crate) fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        let storage = init(&paths, &storage_options(&paths, false))?;
        Ok((temp, storage))
    }

    fn tags(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn first_run_seeds_examples_once() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        let storage = init(&paths, &storage_options(&paths, true))?;
        assert_eq!(storage.fetch_tasks()?.len(), 3);
        assert_eq!(storage.list_all_tags()?, vec!["welcome".to_string()]);

        let reopened = init(&paths, &storage_options(&paths, true))?;
        assert_eq!(reopened.fetch_tasks()?.len(), 3);
        Ok(())
    }

    #[test]
    fn created_task_reads_back() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let task = storage.create_task("file taxes", &tags(&["home", "money"]))?;
        let fetched = storage.fetch_task(&task.id)?.expect("task present");
        assert_eq!(fetched.content, "file taxes");
        assert_eq!(fetched.tags, tags(&["home", "money"]));
        assert!(!fetched.completed);
        assert_eq!(fetched.schedule, None);
        Ok(())
    }

    #[test]
    fn patch_writes_only_present_fields() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let task = storage.create_task("renew passport", &tags(&["travel"]))?;

        storage.apply_patch(
            &task.id,
            &TaskPatch {
                due: Some(Some(datetime!(2024-01-01 00:00 UTC))),
                schedule: Some(Some(datetime!(2023-12-20 09:30 UTC))),
                locked: Some(true),
                ..TaskPatch::default()
            },
        )?;
        let fetched = storage.fetch_task(&task.id)?.expect("task present");
        assert_eq!(fetched.content, "renew passport");
        assert_eq!(fetched.tags, tags(&["travel"]));
        assert_eq!(fetched.due, Some(datetime!(2024-01-01 00:00 UTC)));
        assert_eq!(fetched.schedule, Some(datetime!(2023-12-20 09:30 UTC)));
        assert!(fetched.locked);

        storage.apply_patch(
            &task.id,
            &TaskPatch {
                due: Some(None),
                tags: Some(tags(&["admin"])),
                ..TaskPatch::default()
            },
        )?;
        let fetched = storage.fetch_task(&task.id)?.expect("task present");
        assert_eq!(fetched.due, None);
        assert_eq!(fetched.tags, tags(&["admin"]));
        assert_eq!(storage.list_all_tags()?, vec!["admin".to_string()]);
        Ok(())
    }

    #[test]
    fn start_is_stored_as_wall_clock_text() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let task = storage.create_task("plan trip", &BTreeSet::new())?;
        storage.apply_patch(
            &task.id,
            &TaskPatch {
                start: Some(Some(datetime!(2024-03-01 08:00))),
                ..TaskPatch::default()
            },
        )?;

        let raw: String = storage.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT start FROM tasks WHERE id = ?1",
                [task.id.as_str()],
                |row| row.get(0),
            )?)
        })?;
        assert_eq!(raw, "2024-03-01T08:00:00");
        let fetched = storage.fetch_task(&task.id)?.expect("task present");
        assert_eq!(fetched.start, Some(datetime!(2024-03-01 08:00 UTC)));
        Ok(())
    }

    #[test]
    fn patching_missing_task_reports_not_found() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let err = storage
            .apply_patch(
                &TaskId::from("ghost"),
                &TaskPatch {
                    completed: Some(true),
                    ..TaskPatch::default()
                },
            )
            .unwrap_err();
        assert_matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::TaskNotFound(id)) if id.as_str() == "ghost"
        );
        Ok(())
    }

    #[test]
    fn tags_with_separator_like_text_round_trip() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let odd = tags(&["a|:|b", "c,d", "quote\"s"]);
        let task = storage.create_task("odd tags", &odd)?;
        let fetched = storage.fetch_task(&task.id)?.expect("task present");
        assert_eq!(fetched.tags, odd);

        let bare = storage.create_task("no tags", &BTreeSet::new())?;
        assert!(storage.fetch_task(&bare.id)?.expect("task present").tags.is_empty());
        Ok(())
    }

    #[test]
    fn removing_task_drops_its_tags() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let task = storage.create_task("cancel gym", &tags(&["health"]))?;
        storage.remove_task(&task.id)?;
        assert!(storage.fetch_task(&task.id)?.is_none());
        assert!(storage.list_all_tags()?.is_empty());

        let err = storage.remove_task(&task.id).unwrap_err();
        assert_matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::TaskNotFound(_))
        );
        Ok(())
    }

    #[test]
    fn fetch_tasks_orders_by_capture() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let first = storage.create_task("one", &BTreeSet::new())?;
        let second = storage.create_task("two", &BTreeSet::new())?;
        storage.with_connection(|conn| {
            conn.execute(
                "UPDATE tasks SET captured = captured - 1000 WHERE id = ?1",
                [second.id.as_str()],
            )?;
            Ok(())
        })?;
        let ids: Vec<_> = storage.fetch_tasks()?.into_iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        Ok(())
    }
}
