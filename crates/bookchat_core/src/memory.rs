//! crates/bookchat_core/src/memory.rs
//!
//! An in-memory implementation of the `DatabaseService` port. Used by tests and
//! as the development fallback when no database is configured; nothing survives
//! a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Annotation, AuthSession, Book, BookSummary, ChatMessage, NewAnnotation, Sender, User,
    UserCredentials,
};
use crate::ports::{AnnotationStore, DatabaseService, PortError, PortResult};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserCredentials>,
    auth_sessions: HashMap<String, AuthSession>,
    books: Vec<Book>,
    chat_messages: Vec<ChatMessage>,
    annotations: Vec<Annotation>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnnotationStore for InMemoryStore {
    async fn list_annotations(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Vec<Annotation>> {
        let tables = self.tables.read().await;
        let mut annotations: Vec<Annotation> = tables
            .annotations
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id && a.book_id == book_id)
            .cloned()
            .collect();
        annotations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(annotations)
    }

    async fn create_annotation(
        &self,
        user_id: Uuid,
        annotation: NewAnnotation,
    ) -> PortResult<Annotation> {
        if annotation.start_offset >= annotation.end_offset {
            return Err(PortError::Invalid(
                "startOffset must be smaller than endOffset".to_string(),
            ));
        }
        let record = Annotation {
            id: Uuid::new_v4(),
            user_id,
            book_id: annotation.book_id,
            text: annotation.text.trim().to_string(),
            start_offset: annotation.start_offset,
            end_offset: annotation.end_offset,
            timestamp: Utc::now(),
        };
        self.tables.write().await.annotations.push(record.clone());
        Ok(record)
    }

    async fn delete_annotation(&self, user_id: Uuid, annotation_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let before = tables.annotations.len();
        tables
            .annotations
            .retain(|a| !(a.id == annotation_id && a.user_id == user_id));
        if tables.annotations.len() == before {
            return Err(PortError::NotFound(format!("Annotation {} not found", annotation_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == email) {
            return Err(PortError::Invalid(format!("Email {} is already registered", email)));
        }
        let user_id = Uuid::new_v4();
        tables.users.insert(
            user_id,
            UserCredentials {
                user_id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
            },
        );
        Ok(User {
            user_id,
            email: Some(email.to_string()),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        self.tables
            .read()
            .await
            .users
            .get(&user_id)
            .map(|u| User {
                user_id: u.user_id,
                email: Some(u.email.clone()),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.tables.write().await.auth_sessions.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        match self.tables.read().await.auth_sessions.get(session_id) {
            Some(session) if session.expires_at > Utc::now() => Ok(session.user_id),
            Some(_) => Err(PortError::Unauthorized),
            None => Err(PortError::NotFound("Auth session not found".to_string())),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.write().await.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn count_books_for_user(&self, user_id: Uuid) -> PortResult<usize> {
        Ok(self
            .tables
            .read()
            .await
            .books
            .iter()
            .filter(|b| b.user_id == user_id)
            .count())
    }

    async fn create_book(&self, user_id: Uuid, title: &str, content: &str) -> PortResult<Book> {
        let book = Book {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            content: content.to_string(),
            initial_greeting: None,
            uploaded_at: Utc::now(),
        };
        self.tables.write().await.books.push(book.clone());
        Ok(book)
    }

    async fn set_initial_greeting(&self, book_id: Uuid, greeting: &str) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let book = tables
            .books
            .iter_mut()
            .find(|b| b.id == book_id)
            .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))?;
        book.initial_greeting = Some(greeting.to_string());
        Ok(())
    }

    async fn get_book_for_user(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Book> {
        self.tables
            .read()
            .await
            .books
            .iter()
            .find(|b| b.id == book_id && b.user_id == user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))
    }

    async fn list_books_for_user(&self, user_id: Uuid) -> PortResult<Vec<BookSummary>> {
        let tables = self.tables.read().await;
        let mut books: Vec<BookSummary> = tables
            .books
            .iter()
            .rev()
            .filter(|b| b.user_id == user_id)
            .map(|b| BookSummary {
                id: b.id,
                title: b.title.clone(),
                uploaded_at: b.uploaded_at,
            })
            .collect();
        books.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(books)
    }

    async fn delete_book(&self, user_id: Uuid, book_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        if !tables
            .books
            .iter()
            .any(|b| b.id == book_id && b.user_id == user_id)
        {
            return Err(PortError::NotFound(format!("Book {} not found", book_id)));
        }
        tables
            .annotations
            .retain(|a| !(a.book_id == book_id && a.user_id == user_id));
        tables
            .chat_messages
            .retain(|m| !(m.book_id == book_id && m.user_id == user_id));
        tables.books.retain(|b| b.id != book_id);
        Ok(())
    }

    async fn save_chat_message(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        sender: Sender,
        text: &str,
    ) -> PortResult<ChatMessage> {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            user_id,
            book_id,
            sender,
            text: text.to_string(),
            timestamp: Utc::now(),
        };
        self.tables.write().await.chat_messages.push(message.clone());
        Ok(message)
    }

    async fn get_chat_history(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        Ok(self
            .tables
            .read()
            .await
            .chat_messages
            .iter()
            .filter(|m| m.user_id == user_id && m.book_id == book_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_annotation(book_id: Uuid, text: &str, start: usize, end: usize) -> NewAnnotation {
        NewAnnotation {
            book_id,
            text: text.to_string(),
            start_offset: start,
            end_offset: end,
        }
    }

    #[tokio::test]
    async fn created_annotation_round_trips_through_list() {
        let store = InMemoryStore::new();
        let (user, book) = (Uuid::new_v4(), Uuid::new_v4());

        let created = store
            .create_annotation(user, new_annotation(book, "the cat", 0, 7))
            .await
            .unwrap();
        let listed = store.list_annotations(user, book).await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].text, "the cat");
        assert_eq!((listed[0].start_offset, listed[0].end_offset), (0, 7));
        assert!(listed[0].timestamp <= Utc::now());
    }

    #[tokio::test]
    async fn annotations_are_scoped_to_their_owner() {
        let store = InMemoryStore::new();
        let (owner, stranger, book) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let created = store
            .create_annotation(owner, new_annotation(book, "mine", 3, 7))
            .await
            .unwrap();

        assert!(store.list_annotations(stranger, book).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_annotation(stranger, created.id).await,
            Err(PortError::NotFound(_))
        ));
        store.delete_annotation(owner, created.id).await.unwrap();
        assert!(matches!(
            store.delete_annotation(owner, created.id).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn inverted_offsets_are_rejected() {
        let store = InMemoryStore::new();
        let result = store
            .create_annotation(Uuid::new_v4(), new_annotation(Uuid::new_v4(), "x", 5, 5))
            .await;
        assert!(matches!(result, Err(PortError::Invalid(_))));
    }

    #[tokio::test]
    async fn deleting_a_book_cascades() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let book = store.create_book(user, "Dune", "Sand.").await.unwrap();
        store
            .create_annotation(user, new_annotation(book.id, "Sand", 0, 4))
            .await
            .unwrap();
        store
            .save_chat_message(user, book.id, Sender::User, "hi")
            .await
            .unwrap();

        assert!(matches!(
            store.delete_book(Uuid::new_v4(), book.id).await,
            Err(PortError::NotFound(_))
        ));
        store.delete_book(user, book.id).await.unwrap();

        assert!(store.list_annotations(user, book.id).await.unwrap().is_empty());
        assert!(store.get_chat_history(user, book.id).await.unwrap().is_empty());
        assert_eq!(store.count_books_for_user(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn expired_auth_sessions_are_rejected() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store
            .create_auth_session("old", user, Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        store
            .create_auth_session("fresh", user, Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();

        assert!(store.validate_auth_session("old").await.is_err());
        assert_eq!(store.validate_auth_session("fresh").await.unwrap(), user);
    }
}
