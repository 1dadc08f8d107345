use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
/// Out-of-band delivery of replies to a topic, used for interim notices and
/// results of tasks that outlive the inbound command.
pub trait ReplyChannel: Send + Sync {
    async fn send(&self, topic_id: &str, text: &str) -> Result<()>;
}
