use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{ IntoResponse, Response },
    Json,
};
use log::{ error, info };

use super::AppState;
use super::api::ApiError;
use crate::models::api::{ ConvertPdfRequest, GenerateRequest, GenerateResponse, GeneratedPresentation };
use crate::presentation::{ build_presentation, PresentationError };

pub async fn generate_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>
) -> Result<Json<GenerateResponse>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("Content is required"));
    }

    let (rendered, metadata) = build_presentation(
        &req.content,
        req.title.as_deref(),
        req.author.as_deref(),
        &state.default_author,
        state.renderer.as_ref()
    ).map_err(|e| match e {
        PresentationError::NoStructure => ApiError::bad_request(e.to_string()),
        PresentationError::Render(_) => {
            error!("Error generating presentation: {}", e);
            ApiError::internal("Failed to generate presentation").with_details(e.to_string())
        }
    })?;
    info!("Generated presentation '{}' with {} slide(s)", metadata.title, metadata.slide_count);

    Ok(
        Json(GenerateResponse {
            success: true,
            presentation: GeneratedPresentation { rendered, metadata },
        })
    )
}

pub async fn convert_pdf_handler(
    State(state): State<AppState>,
    Json(req): Json<ConvertPdfRequest>
) -> Result<Response, ApiError> {
    if req.markdown.is_empty() {
        return Err(ApiError::bad_request("Markdown content is required"));
    }

    let document = state.pdf
        .convert(&req.markdown, req.filename.as_deref()).await
        .map_err(|e| {
            error!("PDF conversion error: {}", e);
            ApiError::internal(e.friendly_message())
        })?;

    let length = document.bytes.len();
    Ok(
        (
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", document.filename),
                ),
                (header::CONTENT_LENGTH, length.to_string()),
            ],
            Body::from(document.bytes),
        ).into_response()
    )
}
