use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{ Deserialize, Serialize };
use log::{ info, debug };
use reqwest::Client as HttpClient;
use url::Url;

use super::{
    BoxError,
    ChatClient,
    CompletionResponse,
    ContentPart,
    FragmentStream,
    GenerationRequest,
    UploadedFile,
    error_for_status_with_body,
    http_stream_generate,
};
use crate::llm::LlmConfig;
use crate::models::chat::FileAttachment;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";
const API_VERSION: &str = "v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<GeminiFileData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiFileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

impl From<&ContentPart> for GeminiPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => GeminiPart { text: Some(text.clone()), ..Default::default() },
            ContentPart::FileData { mime_type, file_uri } =>
                GeminiPart {
                    file_data: Some(GeminiFileData {
                        mime_type: mime_type.clone(),
                        file_uri: file_uri.clone(),
                    }),
                    ..Default::default()
                },
            ContentPart::InlineData { mime_type, data } =>
                GeminiPart {
                    inline_data: Some(GeminiInlineData {
                        mime_type: mime_type.clone(),
                        data: data.clone(),
                    }),
                    ..Default::default()
                },
        }
    }
}

#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    error: Option<GoogleError>,
}

/// Error object Gemini may send in place of candidates, even on HTTP 200.
#[derive(Deserialize)]
struct GoogleError {
    code: Option<i64>,
    message: Option<String>,
    status: Option<String>,
}

impl GoogleError {
    fn into_box_error(self) -> BoxError {
        format!(
            "Gemini reported an error: {} {} {}",
            self.code.map(|c| c.to_string()).unwrap_or_default(),
            self.status.unwrap_or_default(),
            self.message.unwrap_or_default()
        )
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .into()
    }
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
}

impl GoogleChunk {
    /// Text of the first candidate, or the embedded provider error.
    fn into_text(self) -> Result<String, BoxError> {
        match self.error {
            Some(err) => Err(err.into_box_error()),
            None => Ok(self.text()),
        }
    }

    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Serialize)]
struct UploadStartRequest {
    file: UploadStartFile,
}

#[derive(Serialize)]
struct UploadStartFile {
    display_name: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: GoogleFile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleFile {
    name: String,
    uri: String,
    mime_type: Option<String>,
}

/// Parses one `alt=sse` line (`data: {...}`) into its text fragment. An
/// `error` payload fails the stream.
fn parse_gemini_sse_line(line: &str) -> Result<Option<String>, BoxError> {
    let Some(payload) = line.trim().strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };
    if payload.is_empty() {
        return Ok(None);
    }
    let Ok(chunk) = serde_json::from_str::<GoogleChunk>(payload) else {
        debug!("Skipping unparseable SSE payload");
        return Ok(None);
    };
    let text = chunk.into_text()?;
    Ok(Some(text).filter(|t| !t.is_empty()))
}

pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        temperature: Option<f32>
    ) -> Result<Self, BoxError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Url::parse(&base_url).map_err(|e| format!("Invalid Gemini base URL '{}': {}", base_url, e))?;

        Ok(Self {
            http: HttpClient::new(),
            api_key,
            model: chat_model,
            base_url,
            temperature,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Google API key is required for GeminiChatClient".to_string())?;
        Self::new(
            api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.temperature
        )
    }

    fn endpoint(&self, path: &str, extra: &[(&str, &str)]) -> Result<Url, BoxError> {
        let mut params: Vec<(&str, &str)> = extra.to_vec();
        params.push(("key", self.api_key.as_str()));
        let url = Url::parse_with_params(&format!("{}/{}", self.base_url, path), &params)?;
        Ok(url)
    }

    fn model_endpoint(&self, method: &str, extra: &[(&str, &str)]) -> Result<Url, BoxError> {
        self.endpoint(&format!("{}/models/{}:{}", API_VERSION, self.model, method), extra)
    }

    fn build_payload(&self, request: &GenerationRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: request.parts.iter().map(GeminiPart::from).collect(),
            }],
            generation_config: self.temperature.map(|temperature| GenerationConfig { temperature }),
        }
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(
        &self,
        request: &GenerationRequest
    ) -> Result<CompletionResponse, BoxError> {
        info!(
            "GeminiChatClient::complete() → model={} parts={}",
            self.model,
            request.parts.len()
        );
        let url = self.model_endpoint("generateContent", &[])?;
        let resp = self.http.post(url).json(&self.build_payload(request)).send().await?;
        let resp = error_for_status_with_body(resp).await?;
        let chunk: GoogleChunk = resp.json().await?;
        Ok(CompletionResponse { response: chunk.into_text()? })
    }

    async fn complete_stream(
        &self,
        request: &GenerationRequest
    ) -> Result<FragmentStream, BoxError> {
        info!(
            "GeminiChatClient::complete_stream() → model={} parts={}",
            self.model,
            request.parts.len()
        );
        let url = self.model_endpoint("streamGenerateContent", &[("alt", "sse")])?;
        http_stream_generate(
            self.http.clone(),
            url.to_string(),
            self.build_payload(request),
            parse_gemini_sse_line
        ).await
    }

    async fn upload_file(&self, attachment: &FileAttachment) -> Result<UploadedFile, BoxError> {
        let path = attachment.path
            .as_deref()
            .ok_or_else(|| format!("Attachment '{}' has no storage path", attachment.name))?;
        let bytes = tokio::fs
            ::read(path).await
            .map_err(|e| format!("Failed to read attachment '{}': {}", path, e))?;
        let mime_type = attachment.effective_mime_type().to_string();
        info!("Uploading '{}' ({} bytes, {}) to Gemini", attachment.name, bytes.len(), mime_type);

        let start_url = self.endpoint(&format!("upload/{}/files", API_VERSION), &[])?;
        let start = self.http
            .post(start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type.clone())
            .json(
                &(UploadStartRequest {
                    file: UploadStartFile { display_name: attachment.name.clone() },
                })
            )
            .send().await?;
        let start = error_for_status_with_body(start).await?;
        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or("Gemini did not return an upload URL")?;
        debug!("Resumable upload session opened for '{}'", attachment.name);

        let finish = self.http
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send().await?;
        let finish = error_for_status_with_body(finish).await?;
        let uploaded: UploadResponse = finish.json().await?;
        info!("File uploaded successfully: {}", uploaded.file.name);

        Ok(UploadedFile {
            name: uploaded.file.name,
            uri: uploaded.file.uri,
            mime_type: uploaded.file.mime_type.unwrap_or(mime_type),
        })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}

/// Inline attachment content is base64 on the wire; anything else is
/// rejected rather than re-encoded.
pub fn inline_payload(content: &str) -> Result<String, base64::DecodeError> {
    let trimmed = content.trim();
    BASE64.decode(trimmed)?;
    Ok(trimmed.to_string())
}
