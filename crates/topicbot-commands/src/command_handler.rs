//! Top-level command orchestration: state gates, whitelist, and dispatch.

use std::sync::Arc;

use topicbot_gateway::{CodingBackend, ProjectInfo, SessionInfo};
use topicbot_session::{SessionStore, SESSION_ID_PREFIX};

use crate::{
    command_text::{
        command_usage, connect_guide, initialization_guide, initialization_required,
        parse_command_text, unknown_subcommand,
    },
    config::CommandGatewayConfig,
    reply_channel::ReplyChannel,
    session_manager::{
        ProjectSessions, SessionManager, SessionQueryError, DEFAULT_SESSION_LIST_LIMIT,
    },
    task_executor::{TaskError, TaskExecutor, TaskOutcome},
    topic_state::TopicState,
    topic_validator::TopicCommandValidator,
};

/// Subcommands an uninitialized topic may run without the initialization guide.
pub const INITIALIZATION_SAFE_COMMANDS: &[&str] = &[
    "help", "connect", "projects", "p", "sessions", "s", "session", "sc", "reset",
];
/// Subcommands accepted outside any topic.
pub const NON_TOPIC_COMMANDS: &[&str] = &["connect", "help", "projects", "reset"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Text(String),
    /// Caller renders the static help from [`command_usage`].
    ShowHelp,
    /// Output follows through the reply channel.
    Deferred,
}

impl CommandReply {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::ShowHelp | Self::Deferred => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Topic facts resolved before the gates run.
pub struct TopicContext {
    pub topic_id: String,
    pub explicitly_initialized: bool,
    pub bound_session_id: Option<String>,
}

pub struct CommandHandler {
    config: CommandGatewayConfig,
    validator: TopicCommandValidator,
    backend: Arc<dyn CodingBackend>,
    sessions: SessionManager,
    executor: TaskExecutor,
}

impl CommandHandler {
    pub fn new(
        config: CommandGatewayConfig,
        store: Arc<dyn SessionStore>,
        backend: Arc<dyn CodingBackend>,
        replies: Arc<dyn ReplyChannel>,
    ) -> Self {
        let validator =
            TopicCommandValidator::new(config.command_prefix.clone(), config.whitelist.clone());
        let sessions = SessionManager::new(store, Arc::clone(&backend));
        let executor = TaskExecutor::new(
            sessions.clone(),
            Arc::clone(&backend),
            replies,
            config.sync_timeout,
            config.slow_notice_after,
        );
        Self {
            config,
            validator,
            backend,
            sessions,
            executor,
        }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn usage(&self) -> String {
        command_usage(&self.config.command_prefix)
    }

    /// Handles a raw chat message; `None` when it is not addressed to us.
    pub async fn handle_text(&self, topic_id: &str, text: &str) -> Option<CommandReply> {
        let parsed = parse_command_text(text, &self.config.command_prefix)?;
        Some(self.handle(topic_id, &parsed.subcommand, &parsed.args).await)
    }

    /// Handles one subcommand for `topic_id` after reading its binding.
    pub async fn handle(&self, topic_id: &str, subcommand: &str, args: &[String]) -> CommandReply {
        let topic_id = topic_id.trim();
        let binding = match self.sessions.binding(topic_id) {
            Ok(binding) => binding,
            Err(error) => {
                tracing::warn!(topic_id, %error, "failed to read topic binding");
                return CommandReply::Text(format!("❌ Session store error: {error:#}"));
            }
        };
        let context = TopicContext {
            topic_id: topic_id.to_string(),
            explicitly_initialized: binding
                .as_ref()
                .map(|binding| binding.explicitly_initialized)
                .unwrap_or(false),
            bound_session_id: binding
                .and_then(|binding| binding.session_id)
                .filter(|session_id| !session_id.is_empty()),
        };
        self.handle_with_context(&context, subcommand, args).await
    }

    /// Runs the gate sequence for an already-resolved topic context.
    pub async fn handle_with_context(
        &self,
        context: &TopicContext,
        subcommand: &str,
        args: &[String],
    ) -> CommandReply {
        let normalized;
        let context = if context.topic_id.trim().len() == context.topic_id.len() {
            context
        } else {
            normalized = TopicContext {
                topic_id: context.topic_id.trim().to_string(),
                ..context.clone()
            };
            &normalized
        };
        let subcommand = subcommand.trim().to_ascii_lowercase();
        let prefix = self.config.command_prefix.as_str();
        let state = self
            .validator
            .classify(&context.topic_id, context.bound_session_id.is_some());
        tracing::debug!(
            topic_id = %context.topic_id,
            subcommand = %subcommand,
            state = state.as_str(),
            "handling command"
        );

        if state == TopicState::Uninitialized
            && subcommand != "chat"
            && !INITIALIZATION_SAFE_COMMANDS.contains(&subcommand.as_str())
        {
            return CommandReply::Text(initialization_guide(prefix));
        }
        if state == TopicState::NonTopic && !NON_TOPIC_COMMANDS.contains(&subcommand.as_str()) {
            return CommandReply::Text(connect_guide(prefix));
        }
        if subcommand == "chat" && !context.explicitly_initialized {
            return CommandReply::Text(initialization_required(prefix));
        }
        let validation = self.validator.validate(&subcommand, state);
        if !validation.allowed {
            return CommandReply::Text(validation.guidance.unwrap_or_default());
        }

        match subcommand.as_str() {
            "help" => CommandReply::ShowHelp,
            "connect" => CommandReply::Text(self.handle_connect().await),
            "new" => self.handle_new(context, args).await,
            "chat" => self.handle_chat(context, args).await,
            "sessions" | "s" => CommandReply::Text(self.handle_sessions(args).await),
            "session" => self.handle_session(context, args).await,
            "sc" => self.handle_session_continue(context, args).await,
            "projects" | "p" => CommandReply::Text(self.handle_projects().await),
            "commands" => CommandReply::Text(self.handle_commands().await),
            "reset" => CommandReply::Text(self.handle_reset(context)),
            other => CommandReply::Text(unknown_subcommand(other, prefix)),
        }
    }

    async fn handle_connect(&self) -> String {
        let health = match self.backend.health().await {
            Ok(health) => health,
            Err(error) => return error.to_string(),
        };
        let mut lines = Vec::new();
        let version = health
            .version
            .as_deref()
            .map(|version| format!(" (version {version})"))
            .unwrap_or_default();
        if health.healthy {
            lines.push(format!("✅ Connected to the backend{version}."));
        } else {
            lines.push(format!(
                "⚠️ The backend is reachable but reports unhealthy{version}."
            ));
        }
        lines.push(String::new());
        match self.sessions.list_projects().await {
            Ok(projects) => lines.push(render_projects(&projects)),
            Err(error) => lines.push(format!("Could not list projects: {error}")),
        }
        lines.join("\n")
    }

    async fn handle_new(&self, context: &TopicContext, args: &[String]) -> CommandReply {
        let prompt = args.join(" ");
        if prompt.trim().is_empty() {
            return CommandReply::Text(format!(
                "Usage: {} new <prompt>",
                self.config.command_prefix
            ));
        }
        render_task(
            self.executor
                .new_session(&context.topic_id, prompt.trim())
                .await,
        )
    }

    async fn handle_chat(&self, context: &TopicContext, args: &[String]) -> CommandReply {
        let prompt = args.join(" ");
        if prompt.trim().is_empty() && !context.topic_id.is_empty() {
            return CommandReply::Text(render_session_status(context));
        }
        render_task(
            self.executor
                .auto_session(&context.topic_id, prompt.trim())
                .await,
        )
    }

    async fn handle_sessions(&self, args: &[String]) -> String {
        let Some(project) = args.first() else {
            return format!(
                "Usage: {} sessions <project> [limit]\nLimit must be between 1 and 20 (default {DEFAULT_SESSION_LIST_LIMIT}).",
                self.config.command_prefix
            );
        };
        match self
            .sessions
            .list_project_sessions(project, args.get(1).map(String::as_str))
            .await
        {
            Ok(listing) => render_project_sessions(&listing, &self.config.command_prefix),
            Err(SessionQueryError::Usage(message)) => format!(
                "❌ {message}\nUsage: {} sessions <project> [limit]",
                self.config.command_prefix
            ),
            Err(SessionQueryError::ProjectNotFound { project, known }) => {
                let mut text = format!("❌ Project `{project}` not found.");
                if !known.is_empty() {
                    text.push_str(&format!("\nKnown projects: {}", known.join(", ")));
                }
                text
            }
            Err(SessionQueryError::Gateway(error)) => error.to_string(),
        }
    }

    async fn handle_session(&self, context: &TopicContext, args: &[String]) -> CommandReply {
        let usage = format!(
            "Usage: {} session status|list|continue <session_id>",
            self.config.command_prefix
        );
        let Some(action) = args.first().map(|action| action.to_ascii_lowercase()) else {
            return CommandReply::Text(usage);
        };
        match action.as_str() {
            "status" => CommandReply::Text(render_session_status(context)),
            "list" => CommandReply::Text(
                match self
                    .sessions
                    .list_recent_sessions(DEFAULT_SESSION_LIST_LIMIT)
                    .await
                {
                    Ok(sessions) => render_recent_sessions(&sessions),
                    Err(error) => error.to_string(),
                },
            ),
            "continue" => self.handle_session_continue(context, &args[1..]).await,
            _ => CommandReply::Text(usage),
        }
    }

    async fn handle_session_continue(
        &self,
        context: &TopicContext,
        args: &[String],
    ) -> CommandReply {
        let prefix = &self.config.command_prefix;
        let Some(session_id) = args.first().map(|id| id.trim()) else {
            return CommandReply::Text(format!(
                "Usage: {prefix} session continue <session_id> [prompt]\n   or: {prefix} sc <session_id> [prompt]"
            ));
        };
        if !session_id.starts_with(SESSION_ID_PREFIX) || session_id.len() == SESSION_ID_PREFIX.len()
        {
            return CommandReply::Text(format!(
                "❌ `{session_id}` is not a session id (expected `{SESSION_ID_PREFIX}...`).\nUsage: {prefix} sc <session_id> [prompt]"
            ));
        }
        if context.topic_id.is_empty() {
            return CommandReply::Text(connect_guide(prefix));
        }
        let bound = self
            .executor
            .bind_specific_session(&context.topic_id, session_id, None)
            .await;
        if bound.is_err() {
            return render_task(bound);
        }
        if let Err(error) = self.sessions.set_explicitly_initialized(&context.topic_id) {
            tracing::warn!(topic_id = %context.topic_id, %error, "failed to mark topic initialized");
        }
        let prompt = args[1..].join(" ");
        if prompt.trim().is_empty() {
            return render_task(bound);
        }
        render_task(
            self.executor
                .run_task(&context.topic_id, prompt.trim(), Some(session_id))
                .await,
        )
    }

    async fn handle_projects(&self) -> String {
        match self.sessions.list_projects().await {
            Ok(projects) => render_projects(&projects),
            Err(error) => error.to_string(),
        }
    }

    async fn handle_commands(&self) -> String {
        match self.sessions.list_commands().await {
            Ok(commands) if commands.is_empty() => "No backend commands available.".to_string(),
            Ok(commands) => {
                let mut lines = vec![format!("🧰 Backend commands ({}):", commands.len())];
                for command in commands {
                    match command.description.as_deref().map(str::trim) {
                        Some(description) if !description.is_empty() => {
                            lines.push(format!("- /{}: {description}", command.name))
                        }
                        _ => lines.push(format!("- /{}", command.name)),
                    }
                }
                lines.join("\n")
            }
            Err(error) => error.to_string(),
        }
    }

    fn handle_reset(&self, context: &TopicContext) -> String {
        if context.topic_id.is_empty() {
            return format!(
                "❌ `{} reset` only works inside a topic.",
                self.config.command_prefix
            );
        }
        let cleared = self
            .sessions
            .clear_explicitly_initialized(&context.topic_id)
            .and_then(|_| self.sessions.clear_session(&context.topic_id));
        match cleared {
            Ok(()) => format!(
                "🔄 Session binding cleared for this topic.\nUse `{} session continue <session_id>` to bind another.",
                self.config.command_prefix
            ),
            Err(error) => format!("❌ Session store error: {error:#}"),
        }
    }
}

fn render_task(outcome: Result<TaskOutcome, TaskError>) -> CommandReply {
    match outcome {
        Ok(TaskOutcome::Completed(text)) => CommandReply::Text(text),
        Ok(TaskOutcome::Deferred) => CommandReply::Deferred,
        Err(TaskError::Gateway(error)) => CommandReply::Text(error.to_string()),
        Err(TaskError::Store(error)) => {
            CommandReply::Text(format!("❌ Session store error: {error:#}"))
        }
    }
}

fn render_session_status(context: &TopicContext) -> String {
    match context.bound_session_id.as_deref() {
        Some(session_id) => format!(
            "📌 Current session: {session_id}\nExplicitly initialized: {}",
            if context.explicitly_initialized {
                "yes"
            } else {
                "no"
            }
        ),
        None => "No session is bound to this topic.".to_string(),
    }
}

fn render_projects(projects: &[ProjectInfo]) -> String {
    if projects.is_empty() {
        return "No projects found.".to_string();
    }
    let mut lines = vec![format!("📁 Projects ({}):", projects.len())];
    for project in projects {
        lines.push(format!(
            "- {} (`{}`) {}",
            project.display_name(),
            project.id,
            project.worktree
        ));
    }
    lines.join("\n")
}

fn render_session_line(index: usize, session: &SessionInfo) -> String {
    let title = if session.title.trim().is_empty() {
        "(untitled)"
    } else {
        session.title.trim()
    };
    format!("{}. {title}\n   {}", index + 1, session.id)
}

fn render_project_sessions(listing: &ProjectSessions, prefix: &str) -> String {
    let name = listing.project.display_name();
    if listing.sessions.is_empty() {
        return format!("No sessions found for project `{name}`.");
    }
    let mut lines = vec![format!(
        "📂 Recent sessions for `{name}` ({} of {}):",
        listing.sessions.len(),
        listing.total
    )];
    lines.extend(
        listing
            .sessions
            .iter()
            .enumerate()
            .map(|(index, session)| render_session_line(index, session)),
    );
    lines.push(String::new());
    lines.push(format!(
        "Bind one with `{prefix} session continue <session_id>`."
    ));
    lines.join("\n")
}

fn render_recent_sessions(sessions: &[SessionInfo]) -> String {
    if sessions.is_empty() {
        return "No sessions found.".to_string();
    }
    let mut lines = vec![format!("🗂️ Recent sessions ({}):", sessions.len())];
    lines.extend(
        sessions
            .iter()
            .enumerate()
            .map(|(index, session)| render_session_line(index, session)),
    );
    lines.join("\n")
}
