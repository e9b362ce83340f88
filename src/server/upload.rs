use axum::{ extract::{ Multipart, State }, Json };
use log::{ error, warn };

use super::AppState;
use super::api::ApiError;
use crate::files::UploadError;
use crate::models::api::UploadResponse;

pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart
) -> Result<Json<UploadResponse>, ApiError> {
    while
        let Some(field) = multipart
            .next_field().await
            .map_err(|e| ApiError::bad_request("Invalid multipart body").with_details(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or("").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            warn!("Failed to read upload '{}': {}", name, e);
            ApiError::new(e.status(), "Failed to read uploaded file").with_details(e.body_text())
        })?;

        let file = state.files.save(&name, &content_type, &bytes).await.map_err(upload_error)?;
        return Ok(Json(UploadResponse { success: true, file }));
    }

    Err(upload_error(UploadError::MissingFile))
}

fn upload_error(err: UploadError) -> ApiError {
    if err.is_client_error() {
        ApiError::bad_request(err.to_string())
    } else {
        error!("Error in file upload: {}", err);
        ApiError::internal("Internal server error").with_details(err.to_string())
    }
}
