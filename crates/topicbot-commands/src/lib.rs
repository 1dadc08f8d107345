//! Topic-bound command handling for the coding-assistant chat gateway.
//!
//! Inbound command text flows through [`CommandHandler`], which classifies the
//! topic state, applies the per-state gates and whitelist, then dispatches to
//! [`SessionManager`] for binding bookkeeping or [`TaskExecutor`] for remote
//! execution. Replies come back as [`CommandReply`]; results of long tasks are
//! pushed later through a [`ReplyChannel`].

pub mod command_handler;
pub mod command_text;
pub mod config;
pub mod reply_channel;
pub mod response_formatter;
pub mod session_manager;
pub mod task_executor;
pub mod topic_state;
pub mod topic_validator;

pub use command_handler::{
    CommandHandler, CommandReply, TopicContext, INITIALIZATION_SAFE_COMMANDS, NON_TOPIC_COMMANDS,
};
pub use command_text::{command_usage, parse_command_text, ParsedCommand};
pub use config::{
    CommandGatewayConfig, DEFAULT_COMMAND_PREFIX, DEFAULT_SLOW_NOTICE_MS, DEFAULT_SYNC_TIMEOUT_MS,
};
pub use reply_channel::ReplyChannel;
pub use response_formatter::{extract_reply_session_id, extract_session_id, format_output};
pub use session_manager::{ProjectSessions, SessionManager, SessionQueryError};
pub use task_executor::{
    TaskError, TaskExecutor, TaskOutcome, STILL_WORKING_NOTICE, TASK_RUNNING_NOTICE,
};
pub use topic_state::{CommandWhitelist, TopicState, KNOWN_COMMANDS};
pub use topic_validator::{validate_command, TopicCommandValidator, ValidationResult};
