//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use bookchat_core::domain::{
    Annotation, Book, BookSummary, ChatMessage, NewAnnotation, Sender, User, UserCredentials,
};
use bookchat_core::ports::{AnnotationStore, DatabaseService, PortError, PortResult};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("Row not found".to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => PortError::Invalid(db.to_string()),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::NotFound(db.to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

fn to_offset(value: usize, field: &str) -> PortResult<i32> {
    i32::try_from(value).map_err(|_| PortError::Invalid(format!("{} is out of range", field)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: Some(self.email),
        }
    }

    fn to_credentials(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    content: String,
    initial_greeting: Option<String>,
    uploaded_at: DateTime<Utc>,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            content: self.content,
            initial_greeting: self.initial_greeting,
            uploaded_at: self.uploaded_at,
        }
    }
}

#[derive(FromRow)]
struct BookSummaryRecord {
    id: Uuid,
    title: String,
    uploaded_at: DateTime<Utc>,
}
impl BookSummaryRecord {
    fn to_domain(self) -> BookSummary {
        BookSummary {
            id: self.id,
            title: self.title,
            uploaded_at: self.uploaded_at,
        }
    }
}

#[derive(FromRow)]
struct ChatMessageRecord {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    sender: String,
    text: String,
    timestamp: DateTime<Utc>,
}
impl ChatMessageRecord {
    fn to_domain(self) -> PortResult<ChatMessage> {
        let sender: Sender = self.sender.parse().map_err(PortError::Unexpected)?;
        Ok(ChatMessage {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            sender,
            text: self.text,
            timestamp: self.timestamp,
        })
    }
}

#[derive(FromRow)]
struct AnnotationRecord {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    text: String,
    start_offset: i32,
    end_offset: i32,
    timestamp: DateTime<Utc>,
}
impl AnnotationRecord {
    fn to_domain(self) -> Annotation {
        Annotation {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            text: self.text,
            start_offset: self.start_offset.max(0) as usize,
            end_offset: self.end_offset.max(0) as usize,
            timestamp: self.timestamp,
        }
    }
}

const ANNOTATION_COLUMNS: &str = "id, user_id, book_id, text, start_offset, end_offset, timestamp";

//=========================================================================================
// `AnnotationStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AnnotationStore for DbAdapter {
    async fn list_annotations(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Vec<Annotation>> {
        let records = sqlx::query_as::<_, AnnotationRecord>(&format!(
            "SELECT {} FROM annotations WHERE user_id = $1 AND book_id = $2 ORDER BY timestamp DESC",
            ANNOTATION_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
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
        let start = to_offset(annotation.start_offset, "startOffset")?;
        let end = to_offset(annotation.end_offset, "endOffset")?;

        let record = sqlx::query_as::<_, AnnotationRecord>(&format!(
            "INSERT INTO annotations (id, user_id, book_id, text, start_offset, end_offset) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            ANNOTATION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(annotation.book_id)
        .bind(annotation.text.trim())
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(record.to_domain())
    }

    async fn delete_annotation(&self, user_id: Uuid, annotation_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = $1 AND user_id = $2")
            .bind(annotation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Annotation {} not found", annotation_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email, hashed_password",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;

        Ok(record.to_credentials())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;

        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|(user_id,)| user_id)
            .ok_or_else(|| PortError::NotFound("Auth session not found or expired".to_string()))
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn count_books_for_user(&self, user_id: Uuid) -> PortResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM books WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count.max(0) as usize)
    }

    async fn create_book(&self, user_id: Uuid, title: &str, content: &str) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(
            "INSERT INTO books (id, user_id, title, content) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, title, content, initial_greeting, uploaded_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(record.to_domain())
    }

    async fn set_initial_greeting(&self, book_id: Uuid, greeting: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE books SET initial_greeting = $1 WHERE id = $2")
            .bind(greeting)
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Book {} not found", book_id)));
        }
        Ok(())
    }

    async fn get_book_for_user(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(
            "SELECT id, user_id, title, content, initial_greeting, uploaded_at \
             FROM books WHERE id = $1 AND user_id = $2",
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))?;

        Ok(record.to_domain())
    }

    async fn list_books_for_user(&self, user_id: Uuid) -> PortResult<Vec<BookSummary>> {
        let records = sqlx::query_as::<_, BookSummaryRecord>(
            "SELECT id, title, uploaded_at FROM books WHERE user_id = $1 ORDER BY uploaded_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_book(&self, user_id: Uuid, book_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("DELETE FROM annotations WHERE book_id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        sqlx::query("DELETE FROM chat_messages WHERE book_id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        let result = sqlx::query("DELETE FROM books WHERE id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Err(PortError::NotFound(format!("Book {} not found", book_id)));
        }
        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn save_chat_message(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        sender: Sender,
        text: &str,
    ) -> PortResult<ChatMessage> {
        let record = sqlx::query_as::<_, ChatMessageRecord>(
            "INSERT INTO chat_messages (id, user_id, book_id, sender, text) VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, user_id, book_id, sender, text, timestamp",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(book_id)
        .bind(sender.as_str())
        .bind(text)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        record.to_domain()
    }

    async fn get_chat_history(&self, user_id: Uuid, book_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        let records = sqlx::query_as::<_, ChatMessageRecord>(
            "SELECT id, user_id, book_id, sender, text, timestamp FROM chat_messages \
             WHERE user_id = $1 AND book_id = $2 ORDER BY timestamp ASC",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }
}
