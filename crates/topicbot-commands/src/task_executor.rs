//! Runs prompts against the backend with a bounded synchronous wait and an
//! asynchronous continuation for long tasks.
//!
//! When the synchronous attempt misses its deadline the executor abandons it
//! and issues the same prompt again without a deadline. The two calls share no
//! correlation id, so a backend that keeps running the abandoned call may
//! execute the prompt twice.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;
use tokio::{task::JoinHandle, time::Instant};
use topicbot_gateway::{CodingBackend, ExecutionOutcome, ExecutionResult, GatewayError};

use crate::{
    reply_channel::ReplyChannel,
    response_formatter::{extract_reply_session_id, format_output},
    session_manager::SessionManager,
};

pub const TASK_RUNNING_NOTICE: &str =
    "⏳ The task is still running. The result will be posted here when it finishes.";
pub const STILL_WORKING_NOTICE: &str = "⏳ Still working on it...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Formatted result ready to send as the reply.
    Completed(String),
    /// Result will arrive later through the reply channel.
    Deferred,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
struct TaskRequest {
    topic_id: String,
    prompt: String,
    session_id: Option<String>,
    mark_explicit: bool,
}

#[derive(Clone)]
pub struct TaskExecutor {
    sessions: SessionManager,
    backend: Arc<dyn CodingBackend>,
    replies: Arc<dyn ReplyChannel>,
    sync_timeout: Duration,
    slow_notice_after: Duration,
    background: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskExecutor {
    pub fn new(
        sessions: SessionManager,
        backend: Arc<dyn CodingBackend>,
        replies: Arc<dyn ReplyChannel>,
        sync_timeout: Duration,
        slow_notice_after: Duration,
    ) -> Self {
        Self {
            sessions,
            backend,
            replies,
            sync_timeout,
            slow_notice_after,
            background: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Runs `prompt` in `session_id` (or a fresh session) for `topic_id`.
    pub async fn run_task(
        &self,
        topic_id: &str,
        prompt: &str,
        session_id: Option<&str>,
    ) -> Result<TaskOutcome, TaskError> {
        self.run(TaskRequest {
            topic_id: topic_id.to_string(),
            prompt: prompt.to_string(),
            session_id: session_id.map(str::to_string),
            mark_explicit: false,
        })
        .await
    }

    /// Drops any binding for the topic and runs `prompt` in a brand-new session.
    pub async fn new_session(
        &self,
        topic_id: &str,
        prompt: &str,
    ) -> Result<TaskOutcome, TaskError> {
        if let Err(error) = self.sessions.clear_session(topic_id) {
            tracing::warn!(topic_id, %error, "failed to clear topic binding before new session");
        }
        self.run(TaskRequest {
            topic_id: topic_id.to_string(),
            prompt: prompt.to_string(),
            session_id: None,
            mark_explicit: true,
        })
        .await
    }

    /// Runs `prompt` in the topic's bound session, starting one when none is bound.
    pub async fn auto_session(
        &self,
        topic_id: &str,
        prompt: &str,
    ) -> Result<TaskOutcome, TaskError> {
        let session_id = match self.sessions.get_session_id(topic_id) {
            Ok(session_id) => session_id,
            Err(error) => {
                tracing::warn!(topic_id, %error, "failed to read topic binding");
                None
            }
        };
        self.run_task(topic_id, prompt, session_id.as_deref()).await
    }

    /// Binds `session_id` to the topic right away; the caller marks explicit
    /// initialization. Without a prompt only a confirmation is returned.
    pub async fn bind_specific_session(
        &self,
        topic_id: &str,
        session_id: &str,
        prompt: Option<&str>,
    ) -> Result<TaskOutcome, TaskError> {
        self.sessions.save_session(topic_id, session_id)?;
        let Some(prompt) = prompt.map(str::trim).filter(|prompt| !prompt.is_empty()) else {
            return Ok(TaskOutcome::Completed(format!(
                "✅ Session bound: {session_id}\nUse `chat <prompt>` to keep working in it."
            )));
        };
        self.run_task(topic_id, prompt, Some(session_id)).await
    }

    /// Waits for every spawned continuation to finish.
    pub async fn wait_for_background_tasks(&self) {
        loop {
            let pending = match self.background.lock() {
                Ok(mut handles) => std::mem::take(&mut *handles),
                Err(_) => return,
            };
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(error) = handle.await {
                    tracing::warn!(%error, "background task ended abnormally");
                }
            }
        }
    }

    async fn run(&self, request: TaskRequest) -> Result<TaskOutcome, TaskError> {
        let started = Instant::now();
        let outcome = self
            .backend
            .execute(
                &request.prompt,
                request.session_id.as_deref(),
                Some(self.sync_timeout),
            )
            .await?;

        match outcome {
            ExecutionOutcome::Pending => {
                tracing::info!(
                    topic_id = %request.topic_id,
                    sync_timeout_ms = self.sync_timeout.as_millis() as u64,
                    "task exceeded sync window; continuing in background"
                );
                self.notify(&request.topic_id, TASK_RUNNING_NOTICE).await;
                self.spawn_continuation(request);
                Ok(TaskOutcome::Deferred)
            }
            ExecutionOutcome::Completed(result) => {
                let elapsed = started.elapsed();
                if elapsed > self.slow_notice_after {
                    self.notify(&request.topic_id, STILL_WORKING_NOTICE).await;
                }
                tracing::debug!(
                    topic_id = %request.topic_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "task completed within sync window"
                );
                Ok(TaskOutcome::Completed(self.finish(&request, result)))
            }
        }
    }

    fn spawn_continuation(&self, request: TaskRequest) {
        let executor = self.clone();
        let handle = tokio::spawn(async move {
            let reply = match executor
                .backend
                .execute(&request.prompt, request.session_id.as_deref(), None)
                .await
            {
                Ok(ExecutionOutcome::Completed(result)) => executor.finish(&request, result),
                Ok(ExecutionOutcome::Pending) => return,
                Err(error) => {
                    tracing::warn!(topic_id = %request.topic_id, %error, "background task failed");
                    error.to_string()
                }
            };
            executor.notify(&request.topic_id, &reply).await;
        });
        match self.background.lock() {
            Ok(mut handles) => {
                handles.retain(|handle| !handle.is_finished());
                handles.push(handle);
            }
            Err(_) => tracing::warn!("background task registry mutex is poisoned"),
        }
    }

    fn finish(&self, request: &TaskRequest, result: ExecutionResult) -> String {
        let session_id = extract_reply_session_id(&result.raw).unwrap_or(result.session_id);
        if let Err(error) = self.persist_session(request, &session_id) {
            tracing::warn!(topic_id = %request.topic_id, %error, "failed to persist session binding");
        }
        format_output(&result.output, Some(&session_id))
    }

    fn persist_session(&self, request: &TaskRequest, session_id: &str) -> anyhow::Result<()> {
        self.sessions.save_session(&request.topic_id, session_id)?;
        if request.mark_explicit {
            self.sessions.set_explicitly_initialized(&request.topic_id)?;
        }
        Ok(())
    }

    async fn notify(&self, topic_id: &str, text: &str) {
        if let Err(error) = self.replies.send(topic_id, text).await {
            tracing::warn!(topic_id, %error, "failed to deliver reply");
        }
    }
}
