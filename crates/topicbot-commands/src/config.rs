use std::time::Duration;

use crate::topic_state::CommandWhitelist;

pub const DEFAULT_COMMAND_PREFIX: &str = "/oc";
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SLOW_NOTICE_MS: u64 = 2_000;

#[derive(Debug, Clone)]
/// Runtime configuration for command handling.
pub struct CommandGatewayConfig {
    pub command_prefix: String,
    /// How long a task may run before it continues in the background.
    pub sync_timeout: Duration,
    /// Tasks finishing later than this still get a "still working" notice.
    pub slow_notice_after: Duration,
    pub whitelist: CommandWhitelist,
}

impl Default for CommandGatewayConfig {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            sync_timeout: Duration::from_millis(DEFAULT_SYNC_TIMEOUT_MS),
            slow_notice_after: Duration::from_millis(DEFAULT_SLOW_NOTICE_MS),
            whitelist: CommandWhitelist::topic_defaults(),
        }
    }
}
