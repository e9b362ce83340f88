pub mod gemini;

use async_trait::async_trait;
use futures::{ Stream, StreamExt, Future };
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::LlmConfig;
use self::gemini::GeminiChatClient;
use crate::models::chat::FileAttachment;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use log::{ debug, warn };
use reqwest;

pub type BoxError = Box<dyn StdError + Send + Sync>;

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// One piece of a single-turn request: prompt text, a reference to a file the
/// provider already holds, or inline base64 bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    FileData {
        mime_type: String,
        file_uri: String,
    },
    InlineData {
        mime_type: String,
        data: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub parts: Vec<ContentPart>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self { parts: vec![ContentPart::Text(prompt.into())] }
    }

    pub fn has_files(&self) -> bool {
        self.parts.iter().any(|p| !matches!(p, ContentPart::Text(_)))
    }
}

/// Handle returned by the provider's file service.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        request: &GenerationRequest
    ) -> Result<CompletionResponse, BoxError>;

    /// Fragments arrive in provider order; the stream ends when the provider does.
    async fn complete_stream(
        &self,
        request: &GenerationRequest
    ) -> Result<FragmentStream, BoxError>;

    async fn upload_file(&self, attachment: &FileAttachment) -> Result<UploadedFile, BoxError>;

    fn get_model(&self) -> String;
}

pub fn create_streaming_response<T, F, Fut>(
    response_fn: F
) -> Pin<Box<dyn Stream<Item = T> + Send>>
where
    T: Send + 'static,
    F: FnOnce(mpsc::Sender<T>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, BoxError> {
    let client: Arc<dyn ChatClient> = Arc::new(GeminiChatClient::from_config(config)?);
    Ok(client)
}

pub type LineParser = fn(&str) -> Result<Option<String>, BoxError>;

/// POSTs `payload` and feeds every complete response line through
/// `line_parser`, forwarding the fragments it returns. A parser error is
/// forwarded as the last item.
///
/// Lines are reassembled across network chunks before parsing.
pub async fn http_stream_generate(
    client: reqwest::Client,
    url: String,
    payload: impl serde::Serialize + Send + 'static,
    line_parser: LineParser,
) -> Result<FragmentStream, BoxError> {
    let resp = client.post(&url).json(&payload).send().await?;
    let resp = error_for_status_with_body(resp).await?;

    Ok(
        create_streaming_response(move |tx| async move {
            let mut bytes = resp.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        pending.extend_from_slice(&buf);
                        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = pending.drain(..=pos).collect();
                            let line = String::from_utf8_lossy(&line);
                            if !forward_line(&tx, line_parser, line.trim_end()).await {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(Box::new(e) as BoxError)).await;
                        return;
                    }
                }
            }

            if !pending.is_empty() {
                let line = String::from_utf8_lossy(&pending);
                forward_line(&tx, line_parser, line.trim_end()).await;
            }
        })
    )
}

/// Returns `false` when reading should stop.
async fn forward_line(
    tx: &mpsc::Sender<Result<String, BoxError>>,
    line_parser: LineParser,
    line: &str
) -> bool {
    match line_parser(line) {
        Ok(None) => true,
        Ok(Some(tok)) => {
            if tx.send(Ok(tok)).await.is_err() {
                debug!("Fragment receiver dropped, stopping upstream read");
                return false;
            }
            true
        }
        Err(e) => {
            warn!("Provider reported an error mid-stream: {}", e);
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// Like `error_for_status`, but keeps the provider's error body in the message.
pub async fn error_for_status_with_body(
    resp: reqwest::Response
) -> Result<reqwest::Response, BoxError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(format!("Provider returned HTTP {}: {}", status, body.trim()).into())
}
