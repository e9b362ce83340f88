use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig };
use crate::files::FileStore;
use crate::history::{ format_history_for_prompt, HistoryError, HistoryStore };
use crate::llm::LlmConfig;
use crate::llm::chat::{
    create_streaming_response,
    new_client as new_chat_client,
    BoxError,
    ChatClient,
    ContentPart,
    GenerationRequest,
};
use crate::llm::chat::gemini::inline_payload;
use crate::models::chat::{ ChatMessage, FileAttachment, Role };
use crate::presentation::extract_presentation;

use async_trait::async_trait;
use chrono::Utc;
use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type ReplyStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Where generated text goes: collected into one reply, or forwarded as it
/// arrives.
#[async_trait]
trait FragmentSink: Send {
    /// Incremental sinks drive the provider's streaming call.
    fn is_incremental(&self) -> bool;

    /// Returns `false` once nobody is listening any more.
    async fn push(&mut self, fragment: String) -> bool;
}

#[derive(Default)]
struct CollectSink {
    text: String,
}

#[async_trait]
impl FragmentSink for CollectSink {
    fn is_incremental(&self) -> bool {
        false
    }

    async fn push(&mut self, fragment: String) -> bool {
        self.text.push_str(&fragment);
        true
    }
}

struct ChannelSink {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl FragmentSink for ChannelSink {
    fn is_incremental(&self) -> bool {
        true
    }

    async fn push(&mut self, fragment: String) -> bool {
        self.tx.send(fragment).await.is_ok()
    }
}

#[derive(Clone)]
pub struct PresentationAgent {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
    history_store: Arc<dyn HistoryStore>,
    files: FileStore,
    default_author: String,
}

impl PresentationAgent {
    /// `files` bounds which stored paths an attachment may point at.
    pub fn new(
        args: &Args,
        history_store: Arc<dyn HistoryStore>,
        files: FileStore
    ) -> Result<Self, BoxError> {
        let chat_config = LlmConfig::from_args(args);
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Model={}, BaseURL={}",
            chat_client.get_model(),
            chat_config.base_url.as_deref().unwrap_or("adapter default")
        );

        let prompt_config = prompt::load_prompts_or_default(args.prompts_path.as_deref())?;

        Ok(
            Self::with_client(
                chat_client,
                prompt_config,
                history_store,
                files,
                args.default_author.clone()
            )
        )
    }

    pub fn with_client(
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        history_store: Arc<dyn HistoryStore>,
        files: FileStore,
        default_author: impl Into<String>
    ) -> Self {
        Self {
            chat_client,
            prompt_config,
            history_store,
            files,
            default_author: default_author.into(),
        }
    }

    pub fn history_store(&self) -> &Arc<dyn HistoryStore> {
        &self.history_store
    }

    /// One whole reply for `history`. Provider failures become the fallback
    /// reply instead of an error.
    pub async fn respond(&self, history: &[ChatMessage]) -> String {
        let mut sink = CollectSink::default();
        match self.generate(history, &mut sink).await {
            Ok(()) => sink.text,
            Err(e) => {
                error!("Error in model call: {}", e);
                self.prompt_config.fallback_reply.clone()
            }
        }
    }

    /// Fragments in arrival order. A provider failure ends the stream with the
    /// fallback reply as its last fragment.
    pub fn respond_stream(&self, history: Vec<ChatMessage>) -> ReplyStream {
        let agent = self.clone();
        create_streaming_response(move |tx| async move {
            let mut sink = ChannelSink { tx };
            if let Err(e) = agent.generate(&history, &mut sink).await {
                error!("Error in streaming model call: {}", e);
                sink.push(agent.prompt_config.fallback_reply.clone()).await;
            }
        })
    }

    async fn generate(
        &self,
        history: &[ChatMessage],
        sink: &mut dyn FragmentSink
    ) -> Result<(), BoxError> {
        let request = self.build_request(history).await;

        if sink.is_incremental() {
            let mut fragments = self.chat_client.complete_stream(&request).await?;
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                if fragment.is_empty() {
                    continue;
                }
                if !sink.push(fragment).await {
                    debug!("Reply receiver dropped, abandoning upstream stream");
                    break;
                }
            }
            return Ok(());
        }

        let response = self.chat_client.complete(&request).await?;
        let reply = if response.response.trim().is_empty() && request.has_files() {
            warn!("Model returned an empty reply for a request with files");
            self.prompt_config.empty_file_reply.clone()
        } else {
            response.response
        };
        sink.push(reply).await;
        Ok(())
    }

    /// Files on the latest user turn go first, then the prompt text.
    async fn build_request(&self, history: &[ChatMessage]) -> GenerationRequest {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let system = self.prompt_config.system_instruction(&self.default_author, &date);
        let prompt_text = prompt::build_prompt(&system, &format_history_for_prompt(history));

        let mut parts = Vec::new();
        for attachment in latest_user_attachments(history) {
            if let Some(part) = self.attachment_part(attachment).await {
                parts.push(part);
            }
        }
        if !parts.is_empty() {
            info!("Generating with {} file part(s)", parts.len());
        }
        parts.push(ContentPart::Text(prompt_text));

        GenerationRequest { parts }
    }

    async fn attachment_part(&self, attachment: &FileAttachment) -> Option<ContentPart> {
        if let Some(path) = attachment.path.as_deref() {
            let Some(resolved) = self.files.resolve(path).await else {
                warn!("Refusing attachment '{}': '{}' is not a stored upload", attachment.name, path);
                return Some(ContentPart::Text(unprocessed_placeholder(attachment)));
            };
            let mut stored = attachment.clone();
            stored.path = Some(resolved.to_string_lossy().into_owned());

            return Some(match self.chat_client.upload_file(&stored).await {
                Ok(uploaded) =>
                    ContentPart::FileData {
                        mime_type: uploaded.mime_type,
                        file_uri: uploaded.uri,
                    },
                Err(e) => {
                    warn!("Error uploading '{}' to the model service: {}", attachment.name, e);
                    ContentPart::Text(unprocessed_placeholder(attachment))
                }
            });
        }

        if let Some(content) = attachment.content.as_deref().filter(|c| !c.trim().is_empty()) {
            return Some(match inline_payload(content) {
                Ok(data) =>
                    ContentPart::InlineData {
                        mime_type: attachment.effective_mime_type().to_string(),
                        data,
                    },
                Err(e) => {
                    warn!("Inline content of '{}' is not base64: {}", attachment.name, e);
                    ContentPart::Text(unprocessed_placeholder(attachment))
                }
            });
        }

        debug!("Skipping attachment '{}' with neither path nor content", attachment.name);
        None
    }

    pub async fn start_conversation(&self) -> String {
        let id = self.history_store.create_conversation().await;
        info!("Started conversation {}", id);
        id
    }

    /// Appends `message` to the stored conversation and returns its full
    /// history, ready for generation.
    pub async fn record_user_turn(
        &self,
        conversation_id: &str,
        message: ChatMessage
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        self.history_store.add_message(conversation_id, message).await?;
        Ok(self.history_store.get_messages(conversation_id).await)
    }

    /// Stores the assistant reply. When it carries a presentation block, the
    /// stored copy keeps only the explanation.
    pub async fn record_reply(&self, conversation_id: &str, reply: &str) -> Result<(), HistoryError> {
        self.history_store.add_message(conversation_id, ChatMessage::assistant(reply)).await?;

        let extraction = extract_presentation(reply);
        if extraction.has_presentation() {
            debug!("Reply in {} carries a presentation, keeping the explanation only", conversation_id);
            self.history_store.replace_last_assistant_content(
                conversation_id,
                &extraction.explanation
            ).await?;
        }
        Ok(())
    }

    /// Non-streaming turn against a stored conversation.
    pub async fn process_message(
        &self,
        conversation_id: &str,
        message: ChatMessage
    ) -> Result<String, HistoryError> {
        let history = self.record_user_turn(conversation_id, message).await?;
        let reply = self.respond(&history).await;
        self.record_reply(conversation_id, &reply).await?;
        Ok(reply)
    }
}

fn latest_user_attachments(history: &[ChatMessage]) -> &[FileAttachment] {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.attachments.as_slice())
        .unwrap_or(&[])
}

fn unprocessed_placeholder(attachment: &FileAttachment) -> String {
    format!(
        "[File: {} ({}, {} bytes) - could not process]",
        attachment.name,
        attachment.file_type,
        attachment.size
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::llm::chat::{ CompletionResponse, FragmentStream, UploadedFile };
    use std::sync::Mutex;

    const START: &str = crate::config::prompt::PRESENTATION_START;
    const END: &str = crate::config::prompt::PRESENTATION_END;

    #[derive(Default)]
    struct FakeClient {
        reply: String,
        fragments: Vec<String>,
        fail_completion: bool,
        fail_stream_after: Option<usize>,
        fail_upload_for: Vec<String>,
        requests: Mutex<Vec<GenerationRequest>>,
        uploaded_paths: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn replying(reply: &str) -> Self {
            Self { reply: reply.to_string(), ..Default::default() }
        }

        fn last_request(&self) -> GenerationRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChatClient for FakeClient {
        async fn complete(&self, request: &GenerationRequest) -> Result<CompletionResponse, BoxError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_completion {
                return Err("upstream unavailable".into());
            }
            Ok(CompletionResponse { response: self.reply.clone() })
        }

        async fn complete_stream(&self, request: &GenerationRequest) -> Result<FragmentStream, BoxError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_completion {
                return Err("upstream unavailable".into());
            }
            let mut items: Vec<Result<String, BoxError>> = self.fragments
                .iter()
                .cloned()
                .map(Ok)
                .collect();
            if let Some(n) = self.fail_stream_after {
                items.truncate(n);
                items.push(Err("connection reset".into()));
            }
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn upload_file(&self, attachment: &FileAttachment) -> Result<UploadedFile, BoxError> {
            self.uploaded_paths.lock().unwrap().push(attachment.path.clone().unwrap_or_default());
            if self.fail_upload_for.contains(&attachment.name) {
                return Err("upload rejected".into());
            }
            Ok(UploadedFile {
                name: format!("files/{}", attachment.id),
                uri: format!("https://files.example/{}", attachment.id),
                mime_type: attachment.effective_mime_type().to_string(),
            })
        }

        fn get_model(&self) -> String {
            "fake-model".to_string()
        }
    }

    fn agent_with(client: Arc<FakeClient>) -> PresentationAgent {
        let files = FileStore::new(std::env::temp_dir().join("deck-agent-no-uploads"), 1024);
        agent_with_files(client, files)
    }

    fn agent_with_files(client: Arc<FakeClient>, files: FileStore) -> PresentationAgent {
        PresentationAgent::with_client(
            client,
            Arc::new(PromptConfig::default()),
            Arc::new(MemoryHistoryStore::default()),
            files,
            "Deck Agent"
        )
    }

    /// Saves an 8-byte PDF through `files`, with the id set to `name`.
    async fn stored_pdf(files: &FileStore, name: &str) -> FileAttachment {
        let mut file = files.save(name, "application/pdf", b"%PDF-1.4").await.unwrap();
        file.id = name.to_string();
        file
    }

    fn pdf(name: &str, path: Option<&str>, content: Option<&str>) -> FileAttachment {
        FileAttachment {
            id: name.to_string(),
            name: name.to_string(),
            file_type: "application/pdf".to_string(),
            size: 42,
            path: path.map(str::to_string),
            mime_type: Some("application/pdf".to_string()),
            content: content.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn respond_sends_system_prompt_and_conversation() {
        let client = Arc::new(FakeClient::replying("Sure."));
        let agent = agent_with(client.clone());
        let history = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello"), ChatMessage::user("Deck please")];

        assert_eq!(agent.respond(&history).await, "Sure.");

        let request = client.last_request();
        assert!(!request.has_files());
        let ContentPart::Text(text) = &request.parts[0] else {
            panic!("expected text part");
        };
        assert!(text.contains("**Author:** Deck Agent"));
        assert!(text.ends_with("Conversation:\nUser: Hi\n\nAssistant: Hello\n\nUser: Deck please"));
    }

    #[tokio::test]
    async fn respond_turns_errors_into_fallback_reply() {
        let client = Arc::new(FakeClient { fail_completion: true, ..Default::default() });
        let agent = agent_with(client);
        let reply = agent.respond(&[ChatMessage::user("Hi")]).await;
        assert_eq!(reply, PromptConfig::default().fallback_reply);
    }

    #[tokio::test]
    async fn attachments_on_latest_user_turn_are_uploaded_first() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileStore::new(dir.path(), 1024);
        let client = Arc::new(FakeClient { reply: "ok".into(), fail_upload_for: vec!["bad.pdf".into()], ..Default::default() });
        let agent = agent_with_files(client.clone(), files.clone());
        let older = ChatMessage::user("old").with_attachments(vec![stored_pdf(&files, "old.pdf").await]);
        let latest = ChatMessage::user("summarise").with_attachments(
            vec![
                stored_pdf(&files, "good.pdf").await,
                stored_pdf(&files, "bad.pdf").await,
                pdf("inline.pdf", None, Some("JVBERi0xLjQ=")),
                pdf("empty.pdf", None, None)
            ]
        );

        agent.respond(&[older, ChatMessage::assistant("noted"), latest]).await;

        let parts = client.last_request().parts;
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], ContentPart::FileData {
            mime_type: "application/pdf".into(),
            file_uri: "https://files.example/good.pdf".into(),
        });
        assert_eq!(parts[1], ContentPart::Text("[File: bad.pdf (application/pdf, 8 bytes) - could not process]".into()));
        assert_eq!(parts[2], ContentPart::InlineData {
            mime_type: "application/pdf".into(),
            data: "JVBERi0xLjQ=".into(),
        });
        assert!(matches!(parts[3], ContentPart::Text(_)));
        assert_eq!(client.uploaded_paths.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn paths_outside_the_upload_directory_are_never_read() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileStore::new(dir.path().join("uploads"), 1024);
        let stored = stored_pdf(&files, "kept.pdf").await;
        let secret = dir.path().join("secret.env");
        std::fs::write(&secret, "API_KEY=hunter2").unwrap();

        let client = Arc::new(FakeClient::replying("ok"));
        let agent = agent_with_files(client.clone(), files);
        let message = ChatMessage::user("read these").with_attachments(
            vec![
                pdf("passwd", Some("/etc/passwd"), None),
                pdf("secret.env", Some(secret.to_str().unwrap()), None),
                stored.clone()
            ]
        );

        agent.respond(&[message]).await;

        let parts = client.last_request().parts;
        assert_eq!(parts[0], ContentPart::Text("[File: passwd (application/pdf, 42 bytes) - could not process]".into()));
        assert_eq!(parts[1], ContentPart::Text("[File: secret.env (application/pdf, 42 bytes) - could not process]".into()));
        assert!(matches!(parts[2], ContentPart::FileData { .. }));

        let uploaded = client.uploaded_paths.lock().unwrap().clone();
        let canonical = std::fs::canonicalize(stored.path.unwrap()).unwrap();
        assert_eq!(uploaded, vec![canonical.to_string_lossy().into_owned()]);
    }

    #[tokio::test]
    async fn inline_content_that_is_not_base64_gets_placeholder() {
        let client = Arc::new(FakeClient::replying("ok"));
        let agent = agent_with(client.clone());
        let message = ChatMessage::user("read").with_attachments(vec![pdf("notes.pdf", None, Some("plain words"))]);

        agent.respond(&[message]).await;

        assert_eq!(
            client.last_request().parts[0],
            ContentPart::Text("[File: notes.pdf (application/pdf, 42 bytes) - could not process]".into())
        );
    }

    #[tokio::test]
    async fn empty_reply_with_files_uses_empty_file_reply() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileStore::new(dir.path(), 1024);
        let client = Arc::new(FakeClient::replying("  "));
        let agent = agent_with_files(client, files.clone());
        let message = ChatMessage::user("read").with_attachments(vec![stored_pdf(&files, "a.pdf").await]);
        assert_eq!(agent.respond(&[message]).await, PromptConfig::default().empty_file_reply);
    }

    #[tokio::test]
    async fn stream_forwards_fragments_in_order() {
        let client = Arc::new(FakeClient { fragments: vec!["Hel".into(), "".into(), "lo".into()], ..Default::default() });
        let agent = agent_with(client);
        let fragments: Vec<String> = agent.respond_stream(vec![ChatMessage::user("Hi")]).collect().await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn stream_error_ends_with_fallback_fragment() {
        let client = Arc::new(FakeClient {
            fragments: vec!["a".into(), "b".into(), "c".into()],
            fail_stream_after: Some(2),
            ..Default::default()
        });
        let agent = agent_with(client);
        let fragments: Vec<String> = agent.respond_stream(vec![ChatMessage::user("Hi")]).collect().await;
        assert_eq!(fragments, vec!["a".to_string(), "b".to_string(), PromptConfig::default().fallback_reply]);
    }

    #[tokio::test]
    async fn process_message_stores_explanation_only() {
        let reply = format!("Here is your deck.\n{}\n## Intro\n- one\n{}", START, END);
        let client = Arc::new(FakeClient::replying(&reply));
        let agent = agent_with(client);
        let id = agent.start_conversation().await;

        let returned = agent.process_message(&id, ChatMessage::user("Make a deck")).await.unwrap();
        assert_eq!(returned, reply);

        let stored = agent.history_store().get_messages(&id).await;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].content, "Make a deck");
        assert_eq!(stored[1].role, Role::Assistant);
        assert_eq!(stored[1].content, "Here is your deck.");
    }

    #[tokio::test]
    async fn process_message_uses_stored_history() {
        let client = Arc::new(FakeClient::replying("plain answer"));
        let agent = agent_with(client.clone());
        let id = agent.start_conversation().await;
        agent.process_message(&id, ChatMessage::user("first")).await.unwrap();
        agent.process_message(&id, ChatMessage::user("second")).await.unwrap();

        let ContentPart::Text(text) = &client.last_request().parts[0] else {
            panic!("expected text part");
        };
        assert!(text.contains("User: first\n\nAssistant: plain answer\n\nUser: second"));
        assert_eq!(agent.history_store().get_messages(&id).await[3].content, "plain answer");
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let agent = agent_with(Arc::new(FakeClient::replying("x")));
        let err = agent.process_message("missing", ChatMessage::user("hi")).await.unwrap_err();
        assert_eq!(err, HistoryError::NotFound("missing".into()));
    }
}
