//! State classification and whitelist checks for inbound commands.

use crate::topic_state::{CommandWhitelist, TopicState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub allowed: bool,
    pub guidance: Option<String>,
}

impl ValidationResult {
    fn allowed() -> Self {
        Self {
            allowed: true,
            guidance: None,
        }
    }

    fn rejected(guidance: String) -> Self {
        Self {
            allowed: false,
            guidance: Some(guidance),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopicCommandValidator {
    command_prefix: String,
    whitelist: CommandWhitelist,
}

impl TopicCommandValidator {
    pub fn new(command_prefix: impl Into<String>, whitelist: CommandWhitelist) -> Self {
        Self {
            command_prefix: command_prefix.into(),
            whitelist,
        }
    }

    pub fn classify(&self, topic_id: &str, has_bound_session: bool) -> TopicState {
        TopicState::classify(topic_id, has_bound_session)
    }

    pub fn validate(&self, command: &str, state: TopicState) -> ValidationResult {
        validate_command(command, state, &self.whitelist, &self.command_prefix)
    }

    pub fn whitelist(&self) -> &CommandWhitelist {
        &self.whitelist
    }
}

/// Checks `command` against `whitelist` for `state`, returning state-specific
/// guidance on rejection.
pub fn validate_command(
    command: &str,
    state: TopicState,
    whitelist: &CommandWhitelist,
    prefix: &str,
) -> ValidationResult {
    if whitelist.permits(state, command) {
        return ValidationResult::allowed();
    }
    tracing::debug!(command, state = state.as_str(), "command rejected by whitelist");
    ValidationResult::rejected(rejection_guidance(command, state, prefix))
}

fn rejection_guidance(command: &str, state: TopicState, prefix: &str) -> String {
    match state {
        TopicState::NonTopic => [
            format!("⚠️ `{prefix} {command}` must be used inside a topic."),
            String::new(),
            "Available here:".to_string(),
            format!("- `{prefix} connect` to check the backend connection"),
            format!("- `{prefix} help` to show usage"),
            format!("- `{prefix} projects` to list projects"),
            String::new(),
            "Create a topic to start working with a session.".to_string(),
        ]
        .join("\n"),
        TopicState::Uninitialized => [
            format!("⚠️ `{prefix} {command}` needs a session bound to this topic."),
            String::new(),
            format!("- `{prefix} sessions <project>` to list sessions"),
            format!("- `{prefix} session continue <session_id>` to continue one"),
        ]
        .join("\n"),
        TopicState::Initialized => {
            format!("⚠️ `{prefix} {command}` is not available in this topic.")
        }
    }
}
