pub mod annotations;
pub mod auth;
pub mod chat;
pub mod middleware;
pub mod pages;
pub mod rest;
pub mod speech;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use rest::ApiDoc;
use state::AppState;

pub use middleware::{require_auth, require_page_session};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Public page routes and the file each one serves from the public directory.
const PAGES: [(&str, &str); 3] = [
    ("/", "home.html"),
    ("/login", "login.html"),
    ("/signup", "signup.html"),
];

fn cors_layer(config: &Config) -> Option<CorsLayer> {
    let origin = config.cors_origin.as_deref()?;
    match origin.parse::<HeaderValue>() {
        Ok(origin) => Some(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        ),
        Err(e) => {
            warn!("Ignoring invalid CORS_ORIGIN '{}': {}", origin, e);
            None
        }
    }
}

/// Builds the complete application: JSON API, Swagger UI and static pages.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/check", get(auth::check_auth_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/upload-book", post(rest::upload_book_handler))
        .route("/user-books", get(rest::user_books_handler))
        .route("/delete-book", post(rest::delete_book_handler))
        .route("/get-book-content/{bookId}", get(rest::get_book_content_handler))
        .route("/chat", post(chat::chat_handler))
        .route("/get-chat-history/{bookId}", get(chat::chat_history_handler))
        .route("/synthesize-speech", post(speech::synthesize_speech_handler))
        .route("/api/annotations", post(annotations::create_annotation_handler))
        // GET takes a book id, DELETE an annotation id.
        .route(
            "/api/annotations/{id}",
            get(annotations::list_annotations_handler)
                .delete(annotations::delete_annotation_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let cors = cors_layer(&state.config);
    let public_dir = state.config.public_dir.clone();

    // Pages for signed-in users; everyone else is redirected to the login page.
    let page_routes = Router::new()
        .route_service("/upload", ServeFile::new(public_dir.join("upload.html")))
        .route("/chat-app", get(pages::chat_app_page))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_page_session,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .merge(page_routes)
        .with_state(state);

    let mut app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    for (path, file) in PAGES {
        app = app.route_service(path, ServeFile::new(public_dir.join(file)));
    }
    let app = app
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => app.layer(cors),
        None => app,
    }
}
