//! HTTP access to the remote coding-assistant backend.
//!
//! [`RetryingGatewayClient`] wraps every backend call in bounded exponential
//! backoff and reports failures as [`GatewayError`]. Command handling talks to
//! the backend through the [`CodingBackend`] trait so tests can swap in fakes.

use std::time::Duration;

use async_trait::async_trait;

mod client;
mod error;
mod retry;
mod types;
#[cfg(test)]
mod tests;

pub use client::{GatewayClientConfig, RetryingGatewayClient, RETRY_ATTEMPT_HEADER};
pub use error::{GatewayError, BACKEND_TIMEOUT_MESSAGE, BACKEND_UNREACHABLE_MESSAGE};
pub use retry::{retry_with_backoff, AttemptFailure, RetryPolicy};
pub use types::{
    CommandInfo, ExecutionOutcome, ExecutionResult, HealthStatus, MessageReply, ProjectInfo,
    SessionInfo, SessionTime,
};

#[async_trait]
/// Operations the command gateway needs from the coding-assistant backend.
pub trait CodingBackend: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, GatewayError>;
    async fn create_session(&self, parent_id: Option<&str>) -> Result<String, GatewayError>;
    /// Sends one prompt. `timeout` of `None` waits without limit.
    async fn send_message(
        &self,
        session_id: &str,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<MessageReply, GatewayError>;
    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, GatewayError>;
    async fn list_projects(&self) -> Result<Vec<ProjectInfo>, GatewayError>;
    async fn list_commands(&self) -> Result<Vec<CommandInfo>, GatewayError>;

    /// Runs `prompt` in `session_id`, creating a fresh session when none is given.
    ///
    /// With a `deadline`, a run that has not finished in time resolves to
    /// [`ExecutionOutcome::Pending`]. The in-flight request is dropped locally;
    /// the backend is not told to stop.
    async fn execute(
        &self,
        prompt: &str,
        session_id: Option<&str>,
        deadline: Option<Duration>,
    ) -> Result<ExecutionOutcome, GatewayError> {
        let run = async {
            let session_id = match session_id {
                Some(existing) => existing.to_string(),
                None => self.create_session(None).await?,
            };
            let reply = self.send_message(&session_id, prompt, None).await?;
            Ok::<_, GatewayError>(ExecutionResult {
                session_id,
                output: reply.text,
                raw: reply.raw,
            })
        };
        match deadline {
            Some(limit) if !limit.is_zero() => match tokio::time::timeout(limit, run).await {
                Ok(result) => result.map(ExecutionOutcome::Completed),
                Err(_) => {
                    tracing::debug!(
                        deadline_ms = limit.as_millis() as u64,
                        "backend execution still running at deadline"
                    );
                    Ok(ExecutionOutcome::Pending)
                }
            },
            _ => run.await.map(ExecutionOutcome::Completed),
        }
    }
}
