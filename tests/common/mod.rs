//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use deck_agent::agent::PresentationAgent;
use deck_agent::config::prompt::PromptConfig;
use deck_agent::export::PdfConverter;
use deck_agent::files::FileStore;
use deck_agent::history::{ HistoryStore, MemoryHistoryStore };
use deck_agent::llm::chat::{
    BoxError,
    ChatClient,
    CompletionResponse,
    FragmentStream,
    GenerationRequest,
    UploadedFile,
};
use deck_agent::models::chat::FileAttachment;
use deck_agent::presentation::MarpitRenderer;
use deck_agent::server::{ build_router, AppState };
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tempfile::TempDir;

pub const MAX_UPLOAD: u64 = 10 * 1024 * 1024;

/// Replies with a fixed text, or a fixed fragment list when streaming.
#[derive(Default)]
pub struct ScriptedClient {
    pub reply: String,
    pub fragments: Vec<String>,
    pub fail: bool,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedClient {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fragments: vec![reply.to_string()],
            ..Default::default()
        }
    }

    pub fn streaming(fragments: &[&str]) -> Self {
        Self {
            reply: fragments.concat(),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<CompletionResponse, BoxError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err("model unavailable".into());
        }
        Ok(CompletionResponse { response: self.reply.clone() })
    }

    async fn complete_stream(&self, request: &GenerationRequest) -> Result<FragmentStream, BoxError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err("model unavailable".into());
        }
        let items: Vec<Result<String, BoxError>> = self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn upload_file(&self, attachment: &FileAttachment) -> Result<UploadedFile, BoxError> {
        Ok(UploadedFile {
            name: format!("files/{}", attachment.id),
            uri: format!("https://files.example/{}", attachment.id),
            mime_type: attachment.effective_mime_type().to_string(),
        })
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub history: Arc<dyn HistoryStore>,
    pub dir: TempDir,
}

/// Router over an in-memory store and a scratch directory. `client: None`
/// mimics a deployment without a model credential.
pub fn test_app(client: Option<Arc<ScriptedClient>>) -> TestApp {
    test_app_with_converter(client, "definitely-not-a-real-converter-binary")
}

pub fn test_app_with_converter(client: Option<Arc<ScriptedClient>>, converter: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::default());
    let files = FileStore::new(dir.path().join("uploads"), MAX_UPLOAD);

    let agent = client.map(|client| {
        PresentationAgent::with_client(
            client,
            Arc::new(PromptConfig::default()),
            history.clone(),
            files.clone(),
            "Deck Agent"
        )
    });

    let state = AppState {
        agent,
        history_store: history.clone(),
        renderer: Arc::new(MarpitRenderer::new()),
        files,
        pdf: PdfConverter::new(converter, dir.path().join("temp"), Duration::from_secs(5)),
        default_author: "Deck Agent".to_string(),
    };

    let server = TestServer::new(build_router(state)).unwrap();
    TestApp { server, history, dir }
}

/// `data:` payloads of an SSE body, parsed as JSON.
pub fn sse_events(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|payload| serde_json::from_str(payload.trim()).unwrap())
        .collect()
}
