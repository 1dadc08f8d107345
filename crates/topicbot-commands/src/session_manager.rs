//! Topic session bookkeeping on top of a `SessionStore`, plus session and
//! project listings from the backend.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use topicbot_gateway::{CodingBackend, CommandInfo, GatewayError, ProjectInfo, SessionInfo};
use topicbot_session::{SessionStore, TopicBinding};

pub const DEFAULT_SESSION_LIST_LIMIT: usize = 5;
pub const MAX_SESSION_LIST_LIMIT: usize = 20;
pub const MAX_PROJECT_NAME_CHARS: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionQueryError {
    #[error("{0}")]
    Usage(String),
    #[error("project `{project}` not found")]
    ProjectNotFound {
        project: String,
        known: Vec<String>,
    },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSessions {
    pub project: ProjectInfo,
    /// Most recently updated first, at most `limit` entries.
    pub sessions: Vec<SessionInfo>,
    pub total: usize,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn CodingBackend>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, backend: Arc<dyn CodingBackend>) -> Self {
        Self { store, backend }
    }

    pub fn binding(&self, topic_id: &str) -> Result<Option<TopicBinding>> {
        let Some(topic_id) = topic_key(topic_id) else {
            return Ok(None);
        };
        self.store.get(topic_id)
    }

    pub fn is_initialized(&self, topic_id: &str) -> Result<bool> {
        Ok(self.get_session_id(topic_id)?.is_some())
    }

    pub fn get_session_id(&self, topic_id: &str) -> Result<Option<String>> {
        Ok(self
            .binding(topic_id)?
            .and_then(|binding| binding.session_id)
            .filter(|session_id| !session_id.is_empty()))
    }

    /// Binds `session_id` to the topic. Silently does nothing without a topic id.
    pub fn save_session(&self, topic_id: &str, session_id: &str) -> Result<()> {
        let Some(topic_id) = topic_key(topic_id) else {
            return Ok(());
        };
        tracing::debug!(topic_id, session_id, "binding session to topic");
        self.store.save(topic_id, session_id)
    }

    /// Drops the topic's binding. Silently does nothing without a topic id.
    pub fn clear_session(&self, topic_id: &str) -> Result<()> {
        let Some(topic_id) = topic_key(topic_id) else {
            return Ok(());
        };
        tracing::debug!(topic_id, "clearing topic binding");
        self.store.clear(topic_id)
    }

    pub fn is_explicitly_initialized(&self, topic_id: &str) -> Result<bool> {
        let Some(topic_id) = topic_key(topic_id) else {
            return Ok(false);
        };
        self.store.is_explicitly_initialized(topic_id)
    }

    pub fn set_explicitly_initialized(&self, topic_id: &str) -> Result<()> {
        let Some(topic_id) = topic_key(topic_id) else {
            return Ok(());
        };
        self.store.set_explicitly_initialized(topic_id)
    }

    pub fn clear_explicitly_initialized(&self, topic_id: &str) -> Result<()> {
        let Some(topic_id) = topic_key(topic_id) else {
            return Ok(());
        };
        self.store.clear_explicitly_initialized(topic_id)
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectInfo>, GatewayError> {
        self.backend.list_projects().await
    }

    pub async fn list_commands(&self) -> Result<Vec<CommandInfo>, GatewayError> {
        self.backend.list_commands().await
    }

    /// Most recently updated sessions across all projects.
    pub async fn list_recent_sessions(
        &self,
        limit: usize,
    ) -> Result<Vec<SessionInfo>, GatewayError> {
        let mut sessions = self.backend.list_sessions().await?;
        sort_most_recent_first(&mut sessions);
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Lists recent sessions for `project`, validating arguments before any
    /// backend call is made.
    pub async fn list_project_sessions(
        &self,
        project: &str,
        limit_arg: Option<&str>,
    ) -> Result<ProjectSessions, SessionQueryError> {
        let project = validate_project_name(project)?;
        let limit = parse_session_limit(limit_arg)?;

        let projects = self.backend.list_projects().await?;
        let Some(project_info) = projects.iter().find(|info| info.matches(project)).cloned()
        else {
            return Err(SessionQueryError::ProjectNotFound {
                project: project.to_string(),
                known: projects
                    .iter()
                    .map(|info| info.display_name().to_string())
                    .collect(),
            });
        };

        let mut sessions = self
            .backend
            .list_sessions()
            .await?
            .into_iter()
            .filter(|session| session_belongs_to(session, &project_info))
            .collect::<Vec<_>>();
        sort_most_recent_first(&mut sessions);
        let total = sessions.len();
        sessions.truncate(limit);
        Ok(ProjectSessions {
            project: project_info,
            sessions,
            total,
        })
    }
}

/// Store key for `topic_id`; blank ids name no topic.
fn topic_key(topic_id: &str) -> Option<&str> {
    Some(topic_id.trim()).filter(|topic_id| !topic_id.is_empty())
}

fn validate_project_name(raw: &str) -> Result<&str, SessionQueryError> {
    let project = raw.trim();
    if project.is_empty() {
        return Err(SessionQueryError::Usage(
            "Project name cannot be empty.".to_string(),
        ));
    }
    if project.chars().count() > MAX_PROJECT_NAME_CHARS {
        return Err(SessionQueryError::Usage(format!(
            "Project name is too long (max {MAX_PROJECT_NAME_CHARS} characters)."
        )));
    }
    Ok(project)
}

/// Missing or non-numeric limits fall back to the default; numbers outside
/// `1..=20` are rejected.
pub fn parse_session_limit(raw: Option<&str>) -> Result<usize, SessionQueryError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(DEFAULT_SESSION_LIST_LIMIT);
    };
    let Ok(parsed) = raw.parse::<i64>() else {
        return Ok(DEFAULT_SESSION_LIST_LIMIT);
    };
    if parsed < 1 || parsed > MAX_SESSION_LIST_LIMIT as i64 {
        return Err(SessionQueryError::Usage(format!(
            "Limit must be between 1 and {MAX_SESSION_LIST_LIMIT} (got {parsed})."
        )));
    }
    Ok(parsed as usize)
}

fn session_belongs_to(session: &SessionInfo, project: &ProjectInfo) -> bool {
    session.project_id.as_deref() == Some(project.id.as_str())
        || (!project.worktree.is_empty()
            && session.directory.as_deref() == Some(project.worktree.as_str()))
}

fn sort_most_recent_first(sessions: &mut [SessionInfo]) {
    sessions.sort_by(|left, right| right.time.updated.cmp(&left.time.updated));
}
