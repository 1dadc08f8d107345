use std::{path::PathBuf, time::Duration};

use clap::Parser;
use topicbot_commands::{CommandGatewayConfig, CommandWhitelist, DEFAULT_COMMAND_PREFIX};
use topicbot_gateway::{GatewayClientConfig, RetryPolicy};
use topicbot_session::SessionStoreKind;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_command_prefix(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err("command prefix must be a single non-empty token".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "topicbot",
    about = "Topic-bound chat command gateway for a remote coding-assistant backend",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "backend-url",
        env = "TOPICBOT_BACKEND_URL",
        default_value = "http://127.0.0.1:4096",
        help = "Base URL of the coding-assistant backend HTTP API"
    )]
    pub(crate) backend_url: String,

    #[arg(
        long = "backend-username",
        env = "TOPICBOT_BACKEND_USERNAME",
        default_value = "opencode",
        help = "Username sent with basic auth when --backend-password is set"
    )]
    pub(crate) backend_username: String,

    #[arg(
        long = "backend-password",
        env = "TOPICBOT_BACKEND_PASSWORD",
        hide_env_values = true,
        help = "Optional backend password; enables HTTP basic auth on every request"
    )]
    pub(crate) backend_password: Option<String>,

    #[arg(
        long = "command-prefix",
        env = "TOPICBOT_COMMAND_PREFIX",
        default_value = DEFAULT_COMMAND_PREFIX,
        value_parser = parse_command_prefix,
        help = "Leading token that addresses a chat message to the gateway"
    )]
    pub(crate) command_prefix: String,

    #[arg(
        long = "request-timeout-ms",
        env = "TOPICBOT_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request HTTP timeout for non-execution backend calls"
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "TOPICBOT_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Total attempts per backend operation on transient failures"
    )]
    pub(crate) retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "TOPICBOT_RETRY_BASE_DELAY_MS",
        default_value_t = 1_000,
        help = "Base delay for exponential retry backoff"
    )]
    pub(crate) retry_base_delay_ms: u64,

    #[arg(
        long = "retry-max-delay-ms",
        env = "TOPICBOT_RETRY_MAX_DELAY_MS",
        default_value_t = 8_000,
        help = "Upper bound for a single retry delay"
    )]
    pub(crate) retry_max_delay_ms: u64,

    #[arg(
        long = "sync-timeout-ms",
        env = "TOPICBOT_SYNC_TIMEOUT_MS",
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "How long a task may run before it continues in the background"
    )]
    pub(crate) sync_timeout_ms: u64,

    #[arg(
        long = "slow-notice-ms",
        env = "TOPICBOT_SLOW_NOTICE_MS",
        default_value_t = 2_000,
        help = "Tasks finishing later than this get a \"still working\" notice"
    )]
    pub(crate) slow_notice_ms: u64,

    #[arg(
        long = "session-store",
        env = "TOPICBOT_SESSION_STORE",
        default_value = "memory",
        help = "Topic binding store backend: memory or sqlite"
    )]
    pub(crate) session_store: SessionStoreKind,

    #[arg(
        long = "session-db",
        env = "TOPICBOT_SESSION_DB",
        default_value = ".topicbot/sessions.sqlite",
        help = "SQLite database path used when --session-store=sqlite"
    )]
    pub(crate) session_db: PathBuf,

    #[arg(
        long = "allow-all-commands",
        env = "TOPICBOT_ALLOW_ALL_COMMANDS",
        default_value_t = false,
        help = "Disable the per-state command whitelist (state gates still apply)"
    )]
    pub(crate) allow_all_commands: bool,
}

impl Cli {
    pub(crate) fn gateway_client_config(&self) -> GatewayClientConfig {
        GatewayClientConfig {
            base_url: self.backend_url.trim().to_string(),
            username: self.backend_username.clone(),
            password: self
                .backend_password
                .clone()
                .filter(|password| !password.is_empty()),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
            },
        }
    }

    pub(crate) fn command_gateway_config(&self) -> CommandGatewayConfig {
        CommandGatewayConfig {
            command_prefix: self.command_prefix.clone(),
            sync_timeout: Duration::from_millis(self.sync_timeout_ms),
            slow_notice_after: Duration::from_millis(self.slow_notice_ms),
            whitelist: if self.allow_all_commands {
                CommandWhitelist::allow_all()
            } else {
                CommandWhitelist::topic_defaults()
            },
        }
    }
}
