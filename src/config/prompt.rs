use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;

pub const PRESENTATION_START: &str = "PRESENTATION_START";
pub const PRESENTATION_END: &str = "PRESENTATION_END";

const DEFAULT_FALLBACK_REPLY: &str =
    "I apologize, but I'm having trouble processing your request right now. Please try again.";

const DEFAULT_EMPTY_FILE_REPLY: &str =
    "I was unable to process the uploaded file. Please try again.";

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a presentation assistant specialized in creating rich, visually appealing slide decks using Marpit Markdown.

Your capabilities include:
- Analyzing uploaded PDF files and extracting key insights
- Creating structured, professional presentations
- Using tables and visual hierarchy effectively
- Generating comprehensive slide content

When users ask for presentations:
1. Provide a brief explanation of what you're creating (1-2 sentences)
2. Generate a complete presentation using Marpit features

PRESENTATION FORMATTING: Structure your response as:

Provide a brief explanation of what you're creating (1-2 sentences)

PRESENTATION_START
---
theme: default
paginate: true
---

# [Presentation Title]

**Author:** {author}
**Date:** {date}

---

## Key Insights

- **Critical Point:** Detailed explanation with impact
- **Supporting Evidence:** Data-backed observation
- **Strategic Implication:** What this means for the business

---

## Executive Summary

| Metric | Current | Target |
|--------|---------|--------|
| Performance | 85% | 90% |
| Growth | +12% | +15% |

---

## Next Steps

1. **Phase 1:** Implementation timeline
2. **Phase 2:** Monitoring and adjustment
3. **Phase 3:** Scale and optimize

PRESENTATION_END

When creating presentations, ensure proper structure with exactly 4-6 slides to avoid empty slides. Focus on concise, well-formatted content that fits within slide boundaries."#;

#[derive(Debug)]
pub enum PromptError {
    IoError(std::io::Error),
    JsonError(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
            PromptError::Invalid(msg) => write!(f, "Invalid prompt configuration: {}", msg),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
    #[serde(default = "default_empty_file_reply")]
    pub empty_file_reply: String,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_fallback_reply() -> String {
    DEFAULT_FALLBACK_REPLY.to_string()
}

fn default_empty_file_reply() -> String {
    DEFAULT_EMPTY_FILE_REPLY.to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            fallback_reply: default_fallback_reply(),
            empty_file_reply: default_empty_file_reply(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.system_prompt.trim().is_empty() {
            return Err(PromptError::Invalid("system_prompt is empty".to_string()));
        }
        if self.fallback_reply.trim().is_empty() {
            return Err(PromptError::Invalid("fallback_reply is empty".to_string()));
        }
        Ok(())
    }

    /// System instruction with `{author}` and `{date}` filled in.
    pub fn system_instruction(&self, author: &str, date: &str) -> String {
        self.system_prompt.replace("{author}", author).replace("{date}", date)
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(Arc::new(config))
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config = load_prompts_from_str(&file_content)?;
    info!("Loaded prompt configuration from {}", path.as_ref().display());
    Ok(config)
}

pub fn load_prompts_or_default(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => {
            info!("Using built-in prompt configuration");
            Ok(Arc::new(PromptConfig::default()))
        }
    }
}

/// Serialised conversation appended to the system instruction.
pub fn build_prompt(system_instruction: &str, conversation_text: &str) -> String {
    format!("{}\n\nConversation:\n{}", system_instruction, conversation_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_prompt_teaches_the_marker_protocol() {
        let config = PromptConfig::default();
        assert!(config.system_prompt.contains(PRESENTATION_START));
        assert!(config.system_prompt.contains(PRESENTATION_END));
    }

    #[test]
    fn system_instruction_fills_placeholders() {
        let config = load_prompts_from_str(r#"{"system_prompt": "by {author} on {date}"}"#).unwrap();
        assert_eq!(config.system_instruction("Ada", "2026-10-15"), "by Ada on 2026-10-15");
        assert_eq!(config.fallback_reply, DEFAULT_FALLBACK_REPLY);
    }

    #[test]
    fn blank_system_prompt_is_rejected() {
        let err = load_prompts_from_str(r#"{"system_prompt": "   "}"#).unwrap_err();
        assert!(matches!(err, PromptError::Invalid(_)));
    }

    #[test]
    fn loads_prompt_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"fallback_reply": "try later"}}"#).unwrap();
        let config = load_prompts(file.path()).unwrap();
        assert_eq!(config.fallback_reply, "try later");
        assert_eq!(config.empty_file_reply, DEFAULT_EMPTY_FILE_REPLY);
    }

    #[test]
    fn missing_prompt_file_is_an_io_error() {
        let err = load_prompts("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PromptError::IoError(_)));
    }

    #[test]
    fn prompt_layout_puts_conversation_after_instruction() {
        assert_eq!(build_prompt("SYS", "User: hi"), "SYS\n\nConversation:\nUser: hi");
    }
}
