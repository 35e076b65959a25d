//! crates/bookchat_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Annotation, Book, BookSummary, ChatMessage, ChatRequest, NewAnnotation, Sender,
    SynthesizedSpeech, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Invalid request: {0}")]
    Invalid(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persists highlight records keyed by (user, book). Every call is scoped to the
/// owning user; another user's annotation behaves exactly like a missing one.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Lists the user's annotations for a book, newest first.
    async fn list_annotations(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Vec<Annotation>>;

    async fn create_annotation(
        &self,
        user_id: Uuid,
        annotation: NewAnnotation,
    ) -> PortResult<Annotation>;

    /// Fails with `PortError::NotFound` for missing or foreign annotations.
    async fn delete_annotation(&self, user_id: Uuid, annotation_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait DatabaseService: AnnotationStore {
    // --- User Management ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Book Management ---
    async fn count_books_for_user(&self, user_id: Uuid) -> PortResult<usize>;

    async fn create_book(&self, user_id: Uuid, title: &str, content: &str) -> PortResult<Book>;

    async fn set_initial_greeting(&self, book_id: Uuid, greeting: &str) -> PortResult<()>;

    /// Fetches a book only if it belongs to `user_id`.
    async fn get_book_for_user(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Book>;

    /// Lists the user's books, newest first.
    async fn list_books_for_user(&self, user_id: Uuid) -> PortResult<Vec<BookSummary>>;

    /// Deletes a book together with its annotations and chat history.
    async fn delete_book(&self, user_id: Uuid, book_id: Uuid) -> PortResult<()>;

    // --- Chat History ---
    async fn save_chat_message(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        sender: Sender,
        text: &str,
    ) -> PortResult<ChatMessage>;

    /// Returns the stored turns for a book, oldest first.
    async fn get_chat_history(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Vec<ChatMessage>>;
}

#[async_trait]
pub trait SpeechSynthesisService: Send + Sync {
    /// Generates speech audio for a string of text.
    async fn synthesize(&self, text: &str) -> PortResult<SynthesizedSpeech>;
}

#[async_trait]
pub trait BookChatService: Send + Sync {
    /// Produces the greeting shown when a freshly uploaded book is first opened.
    async fn generate_greeting(&self, book_title: &str, excerpt: &str) -> PortResult<String>;

    /// Answers one user message in the context of a book conversation.
    async fn reply(&self, request: ChatRequest) -> PortResult<String>;
}
