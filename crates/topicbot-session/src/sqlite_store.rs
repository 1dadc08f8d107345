//! SQLite-backed topic binding store.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use topicbot_core::current_unix_timestamp_ms;

use crate::{SessionStore, TopicBinding};

/// Durable store keeping one row per topic. Every trait method runs a single
/// statement, which is what makes it atomic per topic id.
pub struct SqliteSessionStore {
    path: PathBuf,
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteSessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = open_binding_sqlite_connection(path)?;
        initialize_binding_sqlite_schema(&connection)?;
        tracing::debug!(path = %path.display(), "opened sqlite session store");
        Ok(Self {
            path: path.to_path_buf(),
            connection: Mutex::new(connection),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| anyhow!("sqlite session store mutex is poisoned"))
    }

    fn update_flag(&self, topic_id: &str, value: bool) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE topic_bindings
                 SET explicitly_initialized = ?2, last_active_unix_ms = ?3
                 WHERE topic_id = ?1",
                params![topic_id, value, now_as_sql()],
            )
            .with_context(|| format!("failed to update init flag for topic {topic_id}"))?;
        Ok(())
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, topic_id: &str) -> Result<Option<TopicBinding>> {
        let connection = self.lock()?;
        connection
            .query_row(
                "SELECT topic_id, session_id, explicitly_initialized, last_active_unix_ms
                 FROM topic_bindings WHERE topic_id = ?1",
                params![topic_id],
                |row| {
                    let last_active: i64 = row.get(3)?;
                    Ok(TopicBinding {
                        topic_id: row.get(0)?,
                        session_id: row.get(1)?,
                        explicitly_initialized: row.get(2)?,
                        last_active_unix_ms: u64::try_from(last_active).unwrap_or_default(),
                    })
                },
            )
            .optional()
            .with_context(|| format!("failed to read binding for topic {topic_id}"))
    }

    fn save(&self, topic_id: &str, session_id: &str) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO topic_bindings (topic_id, session_id, explicitly_initialized, last_active_unix_ms)
                 VALUES (?1, ?2, 0, ?3)
                 ON CONFLICT(topic_id) DO UPDATE SET
                    session_id = excluded.session_id,
                    last_active_unix_ms = excluded.last_active_unix_ms",
                params![topic_id, session_id, now_as_sql()],
            )
            .with_context(|| format!("failed to save binding for topic {topic_id}"))?;
        Ok(())
    }

    fn clear(&self, topic_id: &str) -> Result<()> {
        self.lock()?
            .execute(
                "DELETE FROM topic_bindings WHERE topic_id = ?1",
                params![topic_id],
            )
            .with_context(|| format!("failed to clear binding for topic {topic_id}"))?;
        Ok(())
    }

    fn is_explicitly_initialized(&self, topic_id: &str) -> Result<bool> {
        let flag = self
            .lock()?
            .query_row(
                "SELECT explicitly_initialized FROM topic_bindings WHERE topic_id = ?1",
                params![topic_id],
                |row| row.get::<_, bool>(0),
            )
            .optional()
            .with_context(|| format!("failed to read init flag for topic {topic_id}"))?;
        Ok(flag.unwrap_or(false))
    }

    fn set_explicitly_initialized(&self, topic_id: &str) -> Result<()> {
        self.update_flag(topic_id, true)
    }

    fn clear_explicitly_initialized(&self, topic_id: &str) -> Result<()> {
        self.update_flag(topic_id, false)
    }
}

fn now_as_sql() -> i64 {
    i64::try_from(current_unix_timestamp_ms()).unwrap_or(i64::MAX)
}

fn open_binding_sqlite_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create session store directory {}", parent.display())
            })?;
        }
    }
    let connection = Connection::open(path)
        .with_context(|| format!("failed to open sqlite session store {}", path.display()))?;
    connection.busy_timeout(Duration::from_secs(5))?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

fn initialize_binding_sqlite_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            r#"
        CREATE TABLE IF NOT EXISTS topic_bindings (
            topic_id TEXT PRIMARY KEY,
            session_id TEXT NULL,
            explicitly_initialized INTEGER NOT NULL DEFAULT 0,
            last_active_unix_ms INTEGER NOT NULL
        );
        "#,
        )
        .context("failed to initialize sqlite session schema")?;
    Ok(())
}
