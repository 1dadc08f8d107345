//! Wire types exchanged with the backend HTTP API.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub healthy: bool,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    #[serde(default)]
    pub worktree: String,
}

impl ProjectInfo {
    /// Last path component of the worktree, or the id when the worktree is blank.
    pub fn display_name(&self) -> &str {
        self.worktree
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }

    /// True when `name` is this project's id, worktree path, or display name.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty()
            && (self.id == name
                || self.worktree == name
                || self.display_name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTime {
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "projectID")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub time: SessionTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedSession {
    pub(crate) id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct MessageResponse {
    #[serde(default)]
    pub(crate) parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessagePart {
    #[serde(rename = "type", default)]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) text: Option<String>,
}

impl MessageResponse {
    /// Text parts joined with newlines. Tool-use parts carry no display text.
    pub(crate) fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter(|part| part.kind == "text")
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Reply to one `send_message` call.
pub struct MessageReply {
    pub text: String,
    /// Undecoded response body, kept for session id extraction.
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Session the prompt ran in (created on demand when none was bound).
    pub session_id: String,
    pub output: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed(ExecutionResult),
    /// The deadline passed before the backend answered.
    Pending,
}
