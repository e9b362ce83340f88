pub mod chat;

use crate::cli::Args;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_model: None,
            base_url: None,
            temperature: None,
        }
    }
}

impl LlmConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            api_key: args.api_key(),
            completion_model: Some(args.chat_model.clone()).filter(|m| !m.trim().is_empty()),
            base_url: Some(args.chat_base_url.clone()).filter(|u| !u.trim().is_empty()),
            temperature: Some(args.chat_temperature),
        }
    }
}
