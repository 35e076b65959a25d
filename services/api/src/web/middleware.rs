//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{error_response, HandlerError};
use crate::web::state::AppState;

/// Name of the cookie carrying the auth session id.
pub const SESSION_COOKIE: &str = "session";

/// The auth session id from the request's `Cookie` header, if present.
pub fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

/// The id of the user the request is authenticated as, if any.
pub async fn authenticated_user(state: &AppState, headers: &HeaderMap) -> Option<Uuid> {
    let auth_session_id = session_id(headers)?;
    match state.db.validate_auth_session(auth_session_id).await {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            debug!("Rejected auth session: {}", e);
            None
        }
    }
}

/// Middleware that validates the auth session cookie and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, HandlerError> {
    let user_id = authenticated_user(&state, req.headers())
        .await
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Not authenticated"))?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

/// Page counterpart of [`require_auth`]: signed-out visitors are sent to the
/// login page instead of getting a JSON error.
pub async fn require_page_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    match authenticated_user(&state, req.headers()).await {
        Some(user_id) => {
            req.extensions_mut().insert(user_id);
            next.run(req).await
        }
        None => Redirect::to("/login?error=not_logged_in").into_response(),
    }
}
