mod memory;

pub use memory::MemoryHistoryStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation };

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Conversation not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Registers an empty conversation and runs the eviction sweep.
    async fn create_conversation(&self) -> String;

    async fn add_message(
        &self,
        conversation_id: &str,
        message: ChatMessage
    ) -> Result<(), HistoryError>;

    /// Messages in append order; empty when the id is unknown.
    async fn get_messages(&self, conversation_id: &str) -> Vec<ChatMessage>;

    async fn get_conversation(&self, conversation_id: &str) -> Option<Conversation>;

    /// Rewrites the trailing message when it is an assistant turn.
    /// Returns whether a rewrite happened.
    async fn replace_last_assistant_content(
        &self,
        conversation_id: &str,
        content: &str
    ) -> Result<bool, HistoryError>;
}

pub fn create_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    if args.history_max_conversations == 0 {
        return Err("History capacity must be at least 1".into());
    }
    let ttl = i64::try_from(args.history_ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| format!("History TTL of {}s is out of range", args.history_ttl_secs))?;
    let store = MemoryHistoryStore::new(args.history_max_conversations, ttl);
    Ok(Arc::new(store))
}

pub fn initialize_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    info!(
        "Chat history kept in memory: capacity={} ttl={}s",
        args.history_max_conversations,
        args.history_ttl_secs
    );
    create_history_store(args)
}

/// Serialises turns as `User: ...` / `Assistant: ...` blocks separated by a blank line.
pub fn format_history_for_prompt(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|msg| format!("{}: {}", msg.role.display_name(), msg.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn zero_capacity_is_rejected() {
        let args = Args::parse_from(["deck-agent", "--history-max-conversations", "0"]);
        assert!(create_history_store(&args).is_err());
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        for ttl in [u64::MAX.to_string(), (i64::MAX as u64).to_string()] {
            let args = Args::parse_from(["deck-agent", "--history-ttl-secs", ttl.as_str()]);
            let err = create_history_store(&args).err().unwrap();
            assert!(err.to_string().contains("out of range"), "ttl {}", ttl);
        }
    }

    #[test]
    fn default_args_build_a_store() {
        let args = Args::parse_from(["deck-agent"]);
        assert!(create_history_store(&args).is_ok());
    }

    #[test]
    fn formats_turns_in_order() {
        let messages = vec![
            ChatMessage::user("make a deck"),
            ChatMessage::assistant("sure"),
            ChatMessage::user("thanks")
        ];
        assert_eq!(
            format_history_for_prompt(&messages),
            "User: make a deck\n\nAssistant: sure\n\nUser: thanks"
        );
    }

    #[test]
    fn empty_history_formats_to_empty_string() {
        assert_eq!(format_history_for_prompt(&[]), "");
    }
}
