//! Line-oriented console driver: `<topic_id>\t<text>` in, `[<topic_id>] <text>` out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use topicbot_commands::{CommandHandler, CommandReply, ReplyChannel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConsoleInput {
    /// Empty when the line did not name a topic.
    pub(crate) topic_id: String,
    pub(crate) text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ConsoleSummary {
    pub(crate) lines: usize,
    pub(crate) replies: usize,
    pub(crate) ignored: usize,
    pub(crate) deferred: usize,
}

/// Splits one console line. Lines without a tab carry no topic; blank lines yield `None`.
pub(crate) fn parse_console_line(line: &str) -> Option<ConsoleInput> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (topic_id, text) = line.split_once('\t').unwrap_or(("", line));
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(ConsoleInput {
        topic_id: topic_id.trim().to_string(),
        text: text.to_string(),
    })
}

pub(crate) fn render_console_reply(topic_id: &str, text: &str) -> String {
    format!("[{topic_id}] {text}\n")
}

/// Reply surface shared by synchronous replies and background notifications.
pub(crate) struct ConsoleReplyChannel {
    output: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl ConsoleReplyChannel {
    pub(crate) fn new(output: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            output: Mutex::new(Box::new(output)),
        }
    }

    pub(crate) fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    async fn write_reply(&self, topic_id: &str, text: &str) -> Result<()> {
        let rendered = render_console_reply(topic_id, text);
        let mut output = self.output.lock().await;
        output
            .write_all(rendered.as_bytes())
            .await
            .context("failed to write console reply")?;
        output.flush().await.context("failed to flush console reply")
    }
}

#[async_trait]
impl ReplyChannel for ConsoleReplyChannel {
    async fn send(&self, topic_id: &str, text: &str) -> Result<()> {
        self.write_reply(topic_id, text).await
    }
}

/// Feeds `input` through `handler` until EOF or Ctrl-C, then waits for
/// background continuations so their results still reach the console.
pub(crate) async fn run_console_loop<R>(
    handler: &CommandHandler,
    replies: &ConsoleReplyChannel,
    input: R,
) -> Result<ConsoleSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut summary = ConsoleSummary::default();
    loop {
        let next = tokio::select! {
            line = lines.next_line() => line.context("failed to read console input")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received; stopping console loop");
                None
            }
        };
        let Some(line) = next else {
            break;
        };
        let Some(input) = parse_console_line(&line) else {
            continue;
        };
        summary.lines += 1;
        match handler.handle_text(&input.topic_id, &input.text).await {
            None => summary.ignored += 1,
            Some(CommandReply::Text(text)) => {
                summary.replies += 1;
                replies.write_reply(&input.topic_id, &text).await?;
            }
            Some(CommandReply::ShowHelp) => {
                summary.replies += 1;
                replies.write_reply(&input.topic_id, &handler.usage()).await?;
            }
            Some(CommandReply::Deferred) => summary.deferred += 1,
        }
    }
    handler.executor().wait_for_background_tasks().await;
    Ok(summary)
}
