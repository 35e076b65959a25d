//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the book library endpoints and the master
//! definition for the OpenAPI specification.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use bookchat_core::ports::PortError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::adapters::chat_llm::{excerpt, GREETING_EXCERPT_CHARS};
use crate::adapters::extract::{extract_text, title_from_file_name, Extracted};
use crate::error::{error_response, port_error, ErrorBody, HandlerError};
use crate::web::state::AppState;
use crate::web::{annotations, auth, chat, speech};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::check_auth_handler,
        upload_book_handler,
        user_books_handler,
        delete_book_handler,
        get_book_content_handler,
        chat::chat_handler,
        chat::chat_history_handler,
        speech::synthesize_speech_handler,
        annotations::list_annotations_handler,
        annotations::create_annotation_handler,
        annotations::delete_annotation_handler,
    ),
    components(
        schemas(
            ErrorBody,
            MessageResponse,
            UploadBookResponse,
            BookSummaryDto,
            UserBooksResponse,
            DeleteBookRequest,
            BookContentResponse,
            auth::CredentialsRequest,
            auth::AuthResponse,
            auth::AuthStatusResponse,
            chat::ChatRequestBody,
            chat::HistoryTurn,
            chat::HistoryPart,
            chat::ChatResponse,
            chat::ChatMessageDto,
            chat::ChatHistoryResponse,
            speech::SpeechRequest,
            speech::SpeechResponse,
            annotations::AnnotationDto,
            annotations::CreateAnnotationRequest,
        )
    ),
    tags(
        (name = "Book Chat API", description = "Upload books, discuss them with an AI assistant, listen to replies and highlight passages.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadBookResponse {
    pub message: String,
    pub book_id: Uuid,
    pub redirect_to: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookSummaryDto {
    pub id: Uuid,
    pub title: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct UserBooksResponse {
    pub books: Vec<BookSummaryDto>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBookRequest {
    pub book_id: Uuid,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookContentResponse {
    pub book_title: String,
    pub book_text: String,
    pub initial_greeting: String,
}

fn chat_app_url(book_id: Uuid) -> String {
    format!("/chat-app?bookId={}", book_id)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload a book.
///
/// Accepts a multipart/form-data request whose `book` part holds the file.
/// Plain text is analysed and greeted; other formats are stored without content.
#[utoipa::path(
    post,
    path = "/upload-book",
    request_body(content_type = "multipart/form-data", description = "The book file, in a part named `book`."),
    responses(
        (status = 200, description = "Book stored", body = UploadBookResponse),
        (status = 400, description = "No file, unreadable text or library full", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn upload_book_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let limit = state.config.max_books_per_user;
    let count = state.db.count_books_for_user(user_id).await.map_err(|e| {
        error!("Failed to count books: {:?}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload book.")
    })?;
    if count >= limit {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!(
                "You have reached the limit of {} books. Please delete an existing book to upload a new one.",
                limit
            ),
        ));
    }

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("Failed to read multipart data: {}", e))
    })? {
        if field.name() != Some("book") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("untitled.txt").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            error_response(StatusCode::BAD_REQUEST, format!("Failed to read file bytes: {}", e))
        })?;
        upload = Some((file_name, content_type, data));
        break;
    }
    let (file_name, content_type, data) =
        upload.ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "No files were uploaded."))?;

    let title = title_from_file_name(&file_name);
    let extracted = extract_text(content_type.as_deref(), &file_name, &data)
        .map_err(|e| port_error(&e, e.to_string()))?;

    let text = match extracted {
        Extracted::Text(text) => text,
        Extracted::Unsupported => {
            let book = state.db.create_book(user_id, &title, "").await.map_err(|e| {
                error!("Failed to store book: {:?}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store book.")
            })?;
            info!(book_id = %book.id, %title, "Stored book in an unsupported format");
            return Ok(Json(UploadBookResponse {
                message: format!(
                    "File \"{}\" uploaded, but its format is unsupported for analysis. Please upload a .txt file.",
                    title
                ),
                book_id: book.id,
                redirect_to: chat_app_url(book.id),
            }));
        }
    };

    let book = state.db.create_book(user_id, &title, &text).await.map_err(|e| {
        error!("Failed to store book: {:?}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store book.")
    })?;
    info!(book_id = %book.id, %title, chars = text.chars().count(), "Stored book");

    // Without a greeting the reader falls back to a generic one.
    match state
        .chat
        .generate_greeting(&title, &excerpt(&text, GREETING_EXCERPT_CHARS))
        .await
    {
        Ok(greeting) => {
            if let Err(e) = state.db.set_initial_greeting(book.id, &greeting).await {
                warn!(book_id = %book.id, "Failed to save greeting: {}", e);
            }
        }
        Err(e) => warn!(book_id = %book.id, "Failed to generate greeting: {}", e),
    }

    Ok(Json(UploadBookResponse {
        message: "Book uploaded and analyzed successfully!".to_string(),
        book_id: book.id,
        redirect_to: chat_app_url(book.id),
    }))
}

/// List the user's books, newest first.
#[utoipa::path(
    get,
    path = "/user-books",
    responses(
        (status = 200, description = "The user's library", body = UserBooksResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    )
)]
pub async fn user_books_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<UserBooksResponse>, HandlerError> {
    let books = state.db.list_books_for_user(user_id).await.map_err(|e| {
        error!("Failed to fetch user books: {:?}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch user books.")
    })?;

    Ok(Json(UserBooksResponse {
        books: books
            .into_iter()
            .map(|b| BookSummaryDto {
                id: b.id,
                title: b.title,
                uploaded_at: b.uploaded_at,
            })
            .collect(),
    }))
}

/// Delete a book together with its annotations and chat history.
#[utoipa::path(
    post,
    path = "/delete-book",
    request_body = DeleteBookRequest,
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 404, description = "Book not found", body = ErrorBody)
    )
)]
pub async fn delete_book_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<DeleteBookRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    state
        .db
        .delete_book(user_id, req.book_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => error_response(
                StatusCode::NOT_FOUND,
                "Book not found or you do not have permission to delete it.",
            ),
            other => {
                error!("Failed to delete book: {:?}", other);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete book.")
            }
        })?;

    info!(book_id = %req.book_id, "Deleted book");
    Ok(Json(MessageResponse::new("Book deleted successfully.")))
}

/// Fetch a book's title, text and opening greeting.
#[utoipa::path(
    get,
    path = "/get-book-content/{bookId}",
    params(("bookId" = Uuid, Path, description = "The book to open.")),
    responses(
        (status = 200, description = "Book content", body = BookContentResponse),
        (status = 404, description = "Book not found", body = ErrorBody)
    )
)]
pub async fn get_book_content_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<BookContentResponse>, HandlerError> {
    let book = state
        .db
        .get_book_for_user(user_id, book_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => {
                error_response(StatusCode::NOT_FOUND, "Book not found or unauthorized access")
            }
            other => {
                error!("Failed to load book content: {:?}", other);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load book content.")
            }
        })?;

    let content = book.into_content();
    Ok(Json(BookContentResponse {
        book_title: content.book_title,
        book_text: content.book_text,
        initial_greeting: content.initial_greeting,
    }))
}
