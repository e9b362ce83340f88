use serde::{ Serialize, Deserialize };

use crate::models::chat::{ ChatMessage, FileAttachment, Role };
use crate::models::presentation::{ PresentationMetadata, RenderedPresentation };

/// One turn as sent by the browser; timestamps are assigned server-side.
#[derive(Clone, Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<FileAttachment>,
}

impl From<IncomingMessage> for ChatMessage {
    fn from(msg: IncomingMessage) -> Self {
        ChatMessage::new(msg.role, msg.content).with_attachments(msg.attachments)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: Option<String>,
    pub messages: Option<Vec<IncomingMessage>>,
    #[serde(default)]
    pub attachments: Vec<FileAttachment>,
    #[serde(default)]
    pub stream: bool,
    pub conversation_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub message: String,
    pub success: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "content")] Content {
        content: String,
    },
    #[serde(rename = "end")]
    End,
    #[serde(rename = "error")] Error {
        error: String,
    },
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub content: String,
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GeneratedPresentation {
    #[serde(flatten)]
    pub rendered: RenderedPresentation,
    pub metadata: PresentationMetadata,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GenerateResponse {
    pub success: bool,
    pub presentation: GeneratedPresentation,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UploadResponse {
    pub success: bool,
    pub file: FileAttachment,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConvertPdfRequest {
    #[serde(default)]
    pub markdown: String,
    pub filename: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCreated {
    pub conversation_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessages {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), details: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_events_use_type_tag() {
        let content = serde_json::to_string(&StreamEvent::Content { content: "hi".into() }).unwrap();
        assert_eq!(content, r#"{"type":"content","content":"hi"}"#);
        assert_eq!(serde_json::to_string(&StreamEvent::End).unwrap(), r#"{"type":"end"}"#);
        let error = serde_json::to_string(&StreamEvent::Error { error: "boom".into() }).unwrap();
        assert_eq!(error, r#"{"type":"error","error":"boom"}"#);
    }

    #[test]
    fn chat_request_accepts_history_with_attachments() {
        let body = r#"{
            "messages": [
                {"role": "user", "content": "summarise this", "attachments": [
                    {"id": "1", "name": "a.pdf", "type": "application/pdf", "size": 10,
                     "path": "/tmp/a.pdf", "mimeType": "application/pdf"}
                ]}
            ],
            "stream": true
        }"#;
        let req: ChatRequest = serde_json::from_str(body).unwrap();
        assert!(req.stream);
        let messages = req.messages.unwrap();
        assert_eq!(messages[0].attachments[0].path.as_deref(), Some("/tmp/a.pdf"));
        assert!(req.message.is_none());
    }
}
