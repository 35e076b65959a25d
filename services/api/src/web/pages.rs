//! services/api/src/web/pages.rs
//!
//! HTML pages that are only shown to a signed-in user.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension,
};
use bookchat_core::ports::PortError;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::web::state::AppState;

#[derive(Deserialize)]
pub struct ChatAppQuery {
    #[serde(rename = "bookId")]
    pub book_id: Option<String>,
}

fn back_to_upload(reason: &str) -> Response {
    Redirect::to(&format!("/upload?error={}", reason)).into_response()
}

async fn serve_page(path: &Path) -> Response {
    match tokio::fs::read_to_string(path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(path = %path.display(), "Page unavailable: {}", e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// GET /chat-app?bookId=... - the reader view, only for one of the user's books.
pub async fn chat_app_page(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ChatAppQuery>,
) -> Response {
    let Some(raw_id) = query.book_id.filter(|id| !id.trim().is_empty()) else {
        return back_to_upload("no_book_selected");
    };
    let Ok(book_id) = raw_id.trim().parse::<Uuid>() else {
        return back_to_upload("invalid_book_id");
    };

    match state.db.get_book_for_user(user_id, book_id).await {
        Ok(_) => serve_page(&state.config.public_dir.join("index.html")).await,
        Err(PortError::NotFound(_)) => back_to_upload("book_not_found"),
        Err(e) => {
            error!(%book_id, "Failed to verify book for the reader: {:?}", e);
            back_to_upload("invalid_book_id")
        }
    }
}
