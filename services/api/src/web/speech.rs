//! services/api/src/web/speech.rs

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::error::{error_response, port_error, ErrorBody, HandlerError};
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: String,
}

/// Base64-encoded PCM and the mime type describing it.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpeechResponse {
    pub audio_data: String,
    pub mime_type: String,
}

/// Read a piece of text aloud.
#[utoipa::path(
    post,
    path = "/synthesize-speech",
    request_body = SpeechRequest,
    responses(
        (status = 200, description = "Synthesized audio", body = SpeechResponse),
        (status = 400, description = "No text given", body = ErrorBody),
        (status = 500, description = "Speech synthesis failed", body = ErrorBody)
    )
)]
pub async fn synthesize_speech_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeechRequest>,
) -> Result<Json<SpeechResponse>, HandlerError> {
    if req.text.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Text is required for speech synthesis.",
        ));
    }

    let speech = state.speech.synthesize(&req.text).await.map_err(|e| {
        error!("Speech synthesis failed: {:?}", e);
        port_error(&e, "Failed to synthesize speech.")
    })?;

    Ok(Json(SpeechResponse {
        audio_data: speech.audio_data,
        mime_type: speech.mime_type,
    }))
}
