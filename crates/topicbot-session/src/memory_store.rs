use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use topicbot_core::current_unix_timestamp_ms;

use crate::{SessionStore, TopicBinding};

#[derive(Debug, Default)]
/// Process-local store; bindings are lost on restart.
pub struct InMemorySessionStore {
    bindings: Mutex<HashMap<String, TopicBinding>>,
}

impl InMemorySessionStore {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, TopicBinding>>> {
        self.bindings
            .lock()
            .map_err(|_| anyhow!("session store mutex is poisoned"))
    }

    fn update_flag(&self, topic_id: &str, value: bool) -> Result<()> {
        let mut bindings = self.lock()?;
        if let Some(binding) = bindings.get_mut(topic_id) {
            binding.explicitly_initialized = value;
            binding.last_active_unix_ms = current_unix_timestamp_ms();
        }
        Ok(())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, topic_id: &str) -> Result<Option<TopicBinding>> {
        Ok(self.lock()?.get(topic_id).cloned())
    }

    fn save(&self, topic_id: &str, session_id: &str) -> Result<()> {
        let now = current_unix_timestamp_ms();
        let mut bindings = self.lock()?;
        let binding = bindings
            .entry(topic_id.to_string())
            .or_insert_with(|| TopicBinding {
                topic_id: topic_id.to_string(),
                session_id: None,
                explicitly_initialized: false,
                last_active_unix_ms: now,
            });
        binding.session_id = Some(session_id.to_string());
        binding.last_active_unix_ms = now;
        Ok(())
    }

    fn clear(&self, topic_id: &str) -> Result<()> {
        self.lock()?.remove(topic_id);
        Ok(())
    }

    fn is_explicitly_initialized(&self, topic_id: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .get(topic_id)
            .map(|binding| binding.explicitly_initialized)
            .unwrap_or(false))
    }

    fn set_explicitly_initialized(&self, topic_id: &str) -> Result<()> {
        self.update_flag(topic_id, true)
    }

    fn clear_explicitly_initialized(&self, topic_id: &str) -> Result<()> {
        self.update_flag(topic_id, false)
    }
}
