//! Topic phases and the per-phase command whitelist.

use std::collections::{BTreeMap, BTreeSet};

/// Every subcommand keyword the gateway understands, aliases included.
pub const KNOWN_COMMANDS: &[&str] = &[
    "help", "connect", "new", "chat", "sessions", "s", "session", "sc", "projects", "p",
    "commands", "reset",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Phase of the conversation a command arrives in. Derived per command, never stored.
pub enum TopicState {
    /// No topic context.
    NonTopic,
    /// Inside a topic with no bound session.
    Uninitialized,
    /// Inside a topic with a bound session.
    Initialized,
}

impl TopicState {
    pub const ALL: [TopicState; 3] = [Self::NonTopic, Self::Uninitialized, Self::Initialized];

    pub fn classify(topic_id: &str, has_bound_session: bool) -> Self {
        if topic_id.trim().is_empty() {
            Self::NonTopic
        } else if has_bound_session {
            Self::Initialized
        } else {
            Self::Uninitialized
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NonTopic => "non_topic",
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Allowed subcommands per topic state.
///
/// An empty set for a state means every command is allowed there; a non-empty
/// set allows only its members.
pub struct CommandWhitelist {
    allowed: BTreeMap<TopicState, BTreeSet<String>>,
}

impl CommandWhitelist {
    /// No restriction in any state.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Restriction set the gateway ships with.
    pub fn topic_defaults() -> Self {
        Self::allow_all()
            .with_allowed(
                TopicState::NonTopic,
                ["help", "connect", "projects", "p", "reset"],
            )
            .with_allowed(
                TopicState::Uninitialized,
                [
                    "help", "connect", "projects", "p", "sessions", "s", "session", "sc", "reset",
                    "chat",
                ],
            )
    }

    /// Allows every known command except `excluded`, in every state.
    ///
    /// Excluding all of [`KNOWN_COMMANDS`] leaves empty sets, which read as
    /// "no restriction".
    pub fn all_except<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let excluded = excluded
            .into_iter()
            .map(|command| normalize_command(command.as_ref()))
            .collect::<BTreeSet<_>>();
        let remaining = KNOWN_COMMANDS
            .iter()
            .map(|command| command.to_string())
            .filter(|command| !excluded.contains(command))
            .collect::<BTreeSet<_>>();
        let mut whitelist = Self::allow_all();
        for state in TopicState::ALL {
            whitelist.allowed.insert(state, remaining.clone());
        }
        whitelist
    }

    /// Replaces the allowed set for `state`. An empty iterator lifts the restriction.
    pub fn with_allowed<I, S>(mut self, state: TopicState, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let commands = commands
            .into_iter()
            .map(|command| normalize_command(command.as_ref()))
            .filter(|command| !command.is_empty())
            .collect::<BTreeSet<_>>();
        if commands.is_empty() {
            self.allowed.remove(&state);
        } else {
            self.allowed.insert(state, commands);
        }
        self
    }

    pub fn allowed(&self, state: TopicState) -> Vec<&str> {
        self.allowed
            .get(&state)
            .map(|commands| commands.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_unrestricted(&self, state: TopicState) -> bool {
        self.allowed
            .get(&state)
            .map(BTreeSet::is_empty)
            .unwrap_or(true)
    }

    pub fn permits(&self, state: TopicState, command: &str) -> bool {
        match self.allowed.get(&state) {
            Some(commands) if !commands.is_empty() => {
                commands.contains(&normalize_command(command))
            }
            _ => true,
        }
    }
}

fn normalize_command(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
