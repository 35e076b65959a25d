//! crates/bookchat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A book uploaded by a user, with its extracted plain-text content.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
    pub initial_greeting: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// The library listing view of a book; never carries the content.
#[derive(Debug, Clone)]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub uploaded_at: DateTime<Utc>,
}

/// What the reader view needs to open a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookContent {
    pub book_title: String,
    pub book_text: String,
    pub initial_greeting: String,
}

impl Book {
    /// The stored greeting, or a generic one when none was generated.
    pub fn into_content(self) -> BookContent {
        let initial_greeting = self.initial_greeting.unwrap_or_else(|| {
            format!(
                "Hello! I've analyzed \"{}\". What would you like to discuss?",
                self.title
            )
        });
        BookContent {
            book_title: self.title,
            book_text: self.content,
            initial_greeting,
        }
    }
}

/// Who wrote a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            // The browser client labels assistant turns "model".
            "ai" | "model" => Ok(Sender::Ai),
            other => Err(format!("unknown chat sender '{}'", other)),
        }
    }
}

/// A persisted chat turn about one book.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A prior turn supplied by the client as conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub sender: Sender,
    pub text: String,
}

/// Everything the chat model needs to answer one user message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub book_title: String,
    pub book_excerpt: String,
    pub highlighted_text: Option<String>,
    pub history: Vec<ConversationTurn>,
    pub user_message: String,
}

/// A persisted highlight over a character range of a book's text.
///
/// `text` is the primary key for re-locating the highlight after a re-render;
/// the offsets are advisory and are not re-validated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub timestamp: DateTime<Utc>,
}

/// The client-supplied part of an annotation; the store assigns id, owner and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnotation {
    pub book_id: Uuid,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Synthesized speech as returned by the speech endpoint: base64 PCM plus its mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    pub audio_data: String,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(greeting: Option<&str>) -> Book {
        Book {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Emma".to_string(),
            content: "Emma Woodhouse, handsome, clever, and rich.".to_string(),
            initial_greeting: greeting.map(str::to_string),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn stored_greeting_is_kept() {
        let content = book(Some("Shall we talk about Highbury?")).into_content();
        assert_eq!(content.initial_greeting, "Shall we talk about Highbury?");
        assert_eq!(content.book_title, "Emma");
    }

    #[test]
    fn missing_greeting_falls_back_to_the_title() {
        let content = book(None).into_content();
        assert_eq!(
            content.initial_greeting,
            "Hello! I've analyzed \"Emma\". What would you like to discuss?"
        );
    }

    #[test]
    fn model_turns_parse_as_ai() {
        assert_eq!("model".parse::<Sender>(), Ok(Sender::Ai));
        assert_eq!(Sender::User.to_string(), "user");
        assert!("narrator".parse::<Sender>().is_err());
    }
}
