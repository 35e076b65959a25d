//! services/api/src/web/annotations.rs
//!
//! The annotation store endpoints. Every call is scoped to the signed-in user.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use bookchat_core::domain::{Annotation, NewAnnotation};
use bookchat_core::ports::PortError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{error_response, port_error, ErrorBody, HandlerError};
use crate::web::rest::MessageResponse;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub timestamp: DateTime<Utc>,
}

impl From<Annotation> for AnnotationDto {
    fn from(a: Annotation) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            book_id: a.book_id,
            text: a.text,
            start_offset: a.start_offset,
            end_offset: a.end_offset,
            timestamp: a.timestamp,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotationRequest {
    pub book_id: Uuid,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// List the user's highlights in a book, newest first.
#[utoipa::path(
    get,
    path = "/api/annotations/{bookId}",
    params(("bookId" = Uuid, Path, description = "The annotated book.")),
    responses(
        (status = 200, description = "Annotations, newest first", body = [AnnotationDto]),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    )
)]
pub async fn list_annotations_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<Vec<AnnotationDto>>, HandlerError> {
    let annotations = state
        .db
        .list_annotations(user_id, book_id)
        .await
        .map_err(|e| {
            error!("Failed to fetch annotations: {:?}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch annotations")
        })?;

    Ok(Json(annotations.into_iter().map(AnnotationDto::from).collect()))
}

/// Store a new highlight.
#[utoipa::path(
    post,
    path = "/api/annotations",
    request_body = CreateAnnotationRequest,
    responses(
        (status = 201, description = "Annotation created", body = AnnotationDto),
        (status = 400, description = "Empty text or inverted offsets", body = ErrorBody),
        (status = 404, description = "Book not found", body = ErrorBody)
    )
)]
pub async fn create_annotation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateAnnotationRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    if req.text.trim().is_empty() || req.start_offset >= req.end_offset {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Annotation text and a non-empty offset range are required.",
        ));
    }

    state
        .db
        .get_book_for_user(user_id, req.book_id)
        .await
        .map_err(|e| port_error(&e, "Book not found"))?;

    let annotation = state
        .db
        .create_annotation(
            user_id,
            NewAnnotation {
                book_id: req.book_id,
                text: req.text,
                start_offset: req.start_offset,
                end_offset: req.end_offset,
            },
        )
        .await
        .map_err(|e| {
            error!("Failed to save annotation: {:?}", e);
            port_error(&e, "Failed to save annotation")
        })?;

    info!(annotation_id = %annotation.id, book_id = %annotation.book_id, "Saved annotation");
    Ok((StatusCode::CREATED, Json(AnnotationDto::from(annotation))))
}

/// Delete one of the user's highlights.
#[utoipa::path(
    delete,
    path = "/api/annotations/{annotationId}",
    params(("annotationId" = Uuid, Path, description = "The annotation to delete.")),
    responses(
        (status = 200, description = "Annotation deleted", body = MessageResponse),
        (status = 404, description = "Annotation not found", body = ErrorBody)
    )
)]
pub async fn delete_annotation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(annotation_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, HandlerError> {
    state
        .db
        .delete_annotation(user_id, annotation_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "Annotation not found"),
            other => {
                error!("Failed to delete annotation: {:?}", other);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete annotation")
            }
        })?;

    Ok(Json(MessageResponse::new("Annotation deleted successfully")))
}
