//! Command-text parsing and the fixed guidance texts shown to chat users.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased subcommand keyword.
    pub subcommand: String,
    /// Remaining whitespace-separated tokens, case preserved.
    pub args: Vec<String>,
}

/// Parses `<prefix> <subcommand> [args...]`. Returns `None` when `text` is not
/// addressed to the gateway. A bare prefix reads as `help`.
pub fn parse_command_text(text: &str, prefix: &str) -> Option<ParsedCommand> {
    let mut tokens = text.split_whitespace();
    let first = tokens.next()?;
    if !first.eq_ignore_ascii_case(prefix.trim()) {
        return None;
    }
    let subcommand = tokens
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "help".to_string());
    Some(ParsedCommand {
        subcommand,
        args: tokens.map(str::to_string).collect(),
    })
}

pub fn command_usage(prefix: &str) -> String {
    [
        format!("Supported `{prefix}` commands:"),
        format!("- `{prefix} help` show this help"),
        format!("- `{prefix} connect` check the backend and list projects"),
        format!("- `{prefix} new <prompt>` start a new session with a prompt"),
        format!("- `{prefix} chat [prompt]` continue the bound session"),
        format!("- `{prefix} sessions|s <project> [limit]` list recent sessions (limit 1-20, default 5)"),
        format!("- `{prefix} session status|list|continue <id>` inspect or bind sessions"),
        format!("- `{prefix} sc <id> [prompt]` bind a session (alias of `session continue`)"),
        format!("- `{prefix} projects|p` list projects"),
        format!("- `{prefix} commands` list backend commands"),
        format!("- `{prefix} reset` clear this topic's session binding"),
    ]
    .join("\n")
}

pub(crate) fn initialization_guide(prefix: &str) -> String {
    [
        "⚠️ This topic is not initialized yet.".to_string(),
        String::new(),
        "Bind a session first:".to_string(),
        format!("1. `{prefix} projects` to list projects"),
        format!("2. `{prefix} sessions <project>` to list that project's sessions"),
        format!("3. `{prefix} session continue <session_id>` to bind one to this topic"),
    ]
    .join("\n")
}

pub(crate) fn connect_guide(prefix: &str) -> String {
    [
        "⚠️ This command only works inside a topic.".to_string(),
        String::new(),
        format!("Start with `{prefix} connect` to check the backend connection,"),
        "then create a topic and bind a session there.".to_string(),
        format!("`{prefix} help` lists every command."),
    ]
    .join("\n")
}

pub(crate) fn initialization_required(prefix: &str) -> String {
    [
        "⚠️ Initialization required: this topic is not initialized for chat.".to_string(),
        String::new(),
        format!("Bind a session with `{prefix} session continue <session_id>` or `{prefix} sc <session_id>`,"),
        format!("or start one with `{prefix} new <prompt>`."),
    ]
    .join("\n")
}

pub(crate) fn unknown_subcommand(subcommand: &str, prefix: &str) -> String {
    format!("❓ Unknown subcommand `{subcommand}`.\n\n{}", command_usage(prefix))
}
