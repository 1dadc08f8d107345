//! Per-topic session binding storage for the topicbot command gateway.
//!
//! A [`TopicBinding`] ties a chat topic to a backend session id. Bindings are
//! only reachable through the [`SessionStore`] trait, whose operations are each
//! atomic for a single topic id. Nothing spans a read-decide-write sequence, so
//! two commands racing on one topic may interleave.

use std::{fmt, path::Path, str::FromStr, sync::Arc};

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod memory_store;
mod sqlite_store;

pub use memory_store::InMemorySessionStore;
pub use sqlite_store::SqliteSessionStore;

/// Prefix carried by every backend session id.
pub const SESSION_ID_PREFIX: &str = "ses_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Session binding recorded for one chat topic.
pub struct TopicBinding {
    pub topic_id: String,
    pub session_id: Option<String>,
    pub explicitly_initialized: bool,
    pub last_active_unix_ms: u64,
}

/// Persistence contract for topic bindings.
///
/// `save` creates the binding on first use and otherwise replaces its session
/// id, leaving the explicit-initialization flag alone. The flag setters are
/// no-ops for topics without a binding.
pub trait SessionStore: Send + Sync {
    fn get(&self, topic_id: &str) -> Result<Option<TopicBinding>>;
    fn save(&self, topic_id: &str, session_id: &str) -> Result<()>;
    fn clear(&self, topic_id: &str) -> Result<()>;
    fn is_explicitly_initialized(&self, topic_id: &str) -> Result<bool>;
    fn set_explicitly_initialized(&self, topic_id: &str) -> Result<()>;
    fn clear_explicitly_initialized(&self, topic_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Enumerates supported `SessionStoreKind` backends.
pub enum SessionStoreKind {
    #[default]
    Memory,
    Sqlite,
}

impl SessionStoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for SessionStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStoreKind {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!(
                "unsupported session store '{other}' (expected memory or sqlite)"
            )),
        }
    }
}

/// Opens the configured store. `sqlite_path` is only read for the SQLite backend.
pub fn open_session_store(
    kind: SessionStoreKind,
    sqlite_path: &Path,
) -> Result<Arc<dyn SessionStore>> {
    tracing::debug!(backend = kind.as_str(), "opening session store");
    match kind {
        SessionStoreKind::Memory => Ok(Arc::new(InMemorySessionStore::default())),
        SessionStoreKind::Sqlite => Ok(Arc::new(SqliteSessionStore::open(sqlite_path)?)),
    }
}
