//! services/api/src/web/chat.rs
//!
//! Book discussion endpoints: answering a message and replaying stored turns.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use bookchat_core::domain::{Book, ChatRequest, ConversationTurn, Sender};
use bookchat_core::ports::PortError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::adapters::chat_llm::{excerpt, CHAT_EXCERPT_CHARS};
use crate::error::{error_response, ErrorBody, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct HistoryPart {
    #[serde(default)]
    pub text: String,
}

/// One prior turn as the browser keeps it: `role` is `user` or `model`.
#[derive(Deserialize, ToSchema)]
pub struct HistoryTurn {
    pub role: String,
    #[serde(default)]
    pub parts: Vec<HistoryPart>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    pub user_message: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
    #[serde(default)]
    pub highlighted_text: Option<String>,
    #[serde(default)]
    pub book_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub ai_response: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatMessageDto {
    pub id: Uuid,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub chat_history: Vec<ChatMessageDto>,
}

fn conversation_turns(history: Vec<HistoryTurn>) -> Result<Vec<ConversationTurn>, HandlerError> {
    history
        .into_iter()
        .map(|turn| {
            let sender = turn
                .role
                .parse::<Sender>()
                .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;
            let text = turn
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<Vec<_>>()
                .join("\n");
            Ok(ConversationTurn { sender, text })
        })
        .collect()
}

async fn owned_book(state: &AppState, user_id: Uuid, book_id: Uuid) -> Result<Book, HandlerError> {
    state
        .db
        .get_book_for_user(user_id, book_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => error_response(
                StatusCode::NOT_FOUND,
                "Selected book not found or you do not have permission to access it.",
            ),
            other => {
                error!("Failed to load book: {:?}", other);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load book.")
            }
        })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Answer a message about one of the user's books.
///
/// Both the user's message and the reply are stored in the book's chat history.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequestBody,
    responses(
        (status = 200, description = "The assistant's reply", body = ChatResponse),
        (status = 400, description = "No book selected or empty message", body = ErrorBody),
        (status = 404, description = "Book not found", body = ErrorBody),
        (status = 500, description = "The model could not answer", body = ErrorBody)
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ChatRequestBody>,
) -> Result<Json<ChatResponse>, HandlerError> {
    let book_id = req.book_id.ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "No book selected for chat. Please select a book from your library.",
        )
    })?;
    let user_message = req.user_message.trim().to_string();
    if user_message.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "Message is required."));
    }
    let history = conversation_turns(req.conversation_history)?;
    let book = owned_book(&state, user_id, book_id).await?;

    state
        .db
        .save_chat_message(user_id, book_id, Sender::User, &user_message)
        .await
        .map_err(|e| {
            error!("Failed to save user message: {:?}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save message.")
        })?;

    let request = ChatRequest {
        book_excerpt: excerpt(&book.content, CHAT_EXCERPT_CHARS),
        book_title: book.title,
        highlighted_text: req
            .highlighted_text
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()),
        history,
        user_message,
    };

    let ai_response = state.chat.reply(request).await.map_err(|e| {
        error!(%book_id, "Chat model failed: {:?}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get AI response.")
    })?;

    state
        .db
        .save_chat_message(user_id, book_id, Sender::Ai, &ai_response)
        .await
        .map_err(|e| {
            error!("Failed to save AI message: {:?}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save message.")
        })?;

    info!(%book_id, "Answered chat message");
    Ok(Json(ChatResponse { ai_response }))
}

/// The stored conversation about a book, oldest first.
#[utoipa::path(
    get,
    path = "/get-chat-history/{bookId}",
    params(("bookId" = Uuid, Path, description = "The book whose conversation to load.")),
    responses(
        (status = 200, description = "Stored chat turns", body = ChatHistoryResponse),
        (status = 404, description = "Book not found", body = ErrorBody)
    )
)]
pub async fn chat_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(book_id): Path<Uuid>,
) -> Result<Json<ChatHistoryResponse>, HandlerError> {
    owned_book(&state, user_id, book_id).await?;

    let messages = state.db.get_chat_history(user_id, book_id).await.map_err(|e| {
        error!("Failed to fetch chat history: {:?}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch chat history.")
    })?;

    Ok(Json(ChatHistoryResponse {
        chat_history: messages
            .into_iter()
            .map(|m| ChatMessageDto {
                id: m.id,
                sender: m.sender.to_string(),
                text: m.text,
                timestamp: m.timestamp,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_history_becomes_conversation_turns() {
        let history: Vec<HistoryTurn> = serde_json::from_value(serde_json::json!([
            { "role": "user", "parts": [{ "text": "Who is Ahab?" }] },
            { "role": "model", "parts": [{ "text": "The captain." }, { "text": "Obsessed." }] }
        ]))
        .unwrap();

        let turns = conversation_turns(history).unwrap();
        assert_eq!(
            turns,
            vec![
                ConversationTurn { sender: Sender::User, text: "Who is Ahab?".to_string() },
                ConversationTurn { sender: Sender::Ai, text: "The captain.\nObsessed.".to_string() },
            ]
        );
    }

    #[test]
    fn unknown_roles_are_rejected() {
        let history = vec![HistoryTurn { role: "narrator".to_string(), parts: vec![] }];
        let (status, _) = conversation_turns(history).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
