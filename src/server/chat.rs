use axum::{
    extract::{ Path, State },
    http::{ header, StatusCode },
    response::{ sse::{ Event, Sse }, IntoResponse, Response },
    Json,
};
use futures::StreamExt;
use log::{ debug, info };

use super::AppState;
use super::api::ApiError;
use crate::agent::{ PresentationAgent, ReplyStream };
use crate::llm::chat::create_streaming_response;
use crate::models::api::{
    ChatRequest,
    ChatResponse,
    ConversationCreated,
    ConversationMessages,
    StreamEvent,
};
use crate::models::chat::ChatMessage;

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Result<Response, ApiError> {
    let has_message = req.message.as_deref().is_some_and(|m| !m.is_empty());
    let has_history = req.messages.as_ref().is_some_and(|m| !m.is_empty());
    if !has_message && !has_history {
        return Err(ApiError::bad_request("Message or messages array is required"));
    }

    let agent = state.agent
        .as_ref()
        .ok_or_else(|| ApiError::internal("Google API key not configured"))?;

    let stream = req.stream;
    let conversation_id = req.conversation_id.clone();
    let history = match &conversation_id {
        Some(id) => agent.record_user_turn(id, user_turn(req)).await?,
        None => request_history(req),
    };
    info!("Chat request: {} message(s), stream={}", history.len(), stream);

    if stream {
        let fragments = agent.respond_stream(history);
        return Ok(sse_response(fragments, agent.clone(), conversation_id));
    }

    let reply = agent.respond(&history).await;
    if let Some(id) = &conversation_id {
        agent.record_reply(id, &reply).await?;
    }
    Ok(Json(ChatResponse { message: reply, success: true }).into_response())
}

/// The turn appended to a stored conversation: `message` when present,
/// otherwise the last entry of `messages`.
fn user_turn(req: ChatRequest) -> ChatMessage {
    match req.message.filter(|m| !m.is_empty()) {
        Some(message) => ChatMessage::user(message).with_attachments(req.attachments),
        None =>
            req.messages
                .and_then(|mut messages| messages.pop())
                .map(ChatMessage::from)
                .unwrap_or_else(|| ChatMessage::user("")),
    }
}

/// Client-supplied history wins over the single `message` field.
fn request_history(req: ChatRequest) -> Vec<ChatMessage> {
    match req.messages.filter(|m| !m.is_empty()) {
        Some(messages) => messages.into_iter().map(ChatMessage::from).collect(),
        None => vec![ChatMessage::user(req.message.unwrap_or_default()).with_attachments(req.attachments)],
    }
}

/// `content` events for each fragment, then `end`. When the turn belongs to a
/// stored conversation the full reply is recorded first; a conversation that
/// vanished meanwhile ends the stream with `error` instead.
fn sse_response(
    fragments: ReplyStream,
    agent: PresentationAgent,
    conversation_id: Option<String>
) -> Response {
    let events = create_streaming_response(move |tx| async move {
        let mut fragments = fragments;
        let mut full_reply = String::new();

        while let Some(fragment) = fragments.next().await {
            full_reply.push_str(&fragment);
            if tx.send(StreamEvent::Content { content: fragment }).await.is_err() {
                debug!("SSE client went away");
                return;
            }
        }

        let last = match conversation_id {
            Some(id) =>
                match agent.record_reply(&id, &full_reply).await {
                    Ok(()) => StreamEvent::End,
                    Err(e) => StreamEvent::Error { error: e.to_string() },
                }
            None => StreamEvent::End,
        };
        let _ = tx.send(last).await;
    });

    let body = Sse::new(events.map(|event| Event::default().json_data(event)));
    ([(header::CACHE_CONTROL, "no-cache")], body).into_response()
}

pub async fn create_conversation(State(state): State<AppState>) -> impl IntoResponse {
    let conversation_id = state.history_store.create_conversation().await;
    (StatusCode::CREATED, Json(ConversationCreated { conversation_id }))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>
) -> Result<Json<ConversationMessages>, ApiError> {
    let conversation = state.history_store
        .get_conversation(&conversation_id).await
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;
    Ok(Json(ConversationMessages { conversation_id: conversation.id, messages: conversation.messages }))
}
