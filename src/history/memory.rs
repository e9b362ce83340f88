use async_trait::async_trait;
use chrono::{ DateTime, Duration, Utc };
use log::debug;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::history::{ HistoryError, HistoryStore };
use crate::models::chat::{ ChatMessage, Conversation, Role };

pub const DEFAULT_MAX_CONVERSATIONS: usize = 100;

pub fn default_ttl() -> Duration {
    Duration::hours(24)
}

/// Process-local conversation registry.
///
/// Eviction only runs when a conversation is created: entries idle for longer
/// than `ttl` go first, then the least recently updated ones until the map is
/// back at `max_conversations`.
pub struct MemoryHistoryStore {
    conversations: Mutex<HashMap<String, Conversation>>,
    max_conversations: usize,
    ttl: Duration,
}

impl Default for MemoryHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONVERSATIONS, default_ttl())
    }
}

impl MemoryHistoryStore {
    pub fn new(max_conversations: usize, ttl: Duration) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            max_conversations,
            ttl,
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }

    pub(crate) async fn create_conversation_at(&self, now: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let mut conversations = self.conversations.lock().await;
        conversations.insert(id.clone(), Conversation::new(id.clone(), now));
        self.evict(&mut conversations, now);
        id
    }

    pub(crate) async fn add_message_at(
        &self,
        conversation_id: &str,
        message: ChatMessage,
        now: DateTime<Utc>
    ) -> Result<(), HistoryError> {
        let mut conversations = self.conversations.lock().await;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| HistoryError::NotFound(conversation_id.to_string()))?;
        conversation.messages.push(message);
        conversation.updated_at = now;
        Ok(())
    }

    fn evict(&self, conversations: &mut HashMap<String, Conversation>, now: DateTime<Utc>) {
        let before = conversations.len();
        conversations.retain(|_, c| now - c.updated_at <= self.ttl);

        if conversations.len() > self.max_conversations {
            let mut by_age: Vec<(DateTime<Utc>, String)> = conversations
                .values()
                .map(|c| (c.updated_at, c.id.clone()))
                .collect();
            by_age.sort();
            let excess = conversations.len() - self.max_conversations;
            for (_, id) in by_age.into_iter().take(excess) {
                conversations.remove(&id);
            }
        }

        let removed = before - conversations.len();
        if removed > 0 {
            debug!("Evicted {} conversation(s), {} remaining", removed, conversations.len());
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn create_conversation(&self) -> String {
        self.create_conversation_at(Utc::now()).await
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        message: ChatMessage
    ) -> Result<(), HistoryError> {
        self.add_message_at(conversation_id, message, Utc::now()).await
    }

    async fn get_messages(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.conversations
            .lock().await
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    async fn get_conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations.lock().await.get(conversation_id).cloned()
    }

    async fn replace_last_assistant_content(
        &self,
        conversation_id: &str,
        content: &str
    ) -> Result<bool, HistoryError> {
        let mut conversations = self.conversations.lock().await;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| HistoryError::NotFound(conversation_id.to_string()))?;
        match conversation.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content = content.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
