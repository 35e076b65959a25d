//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every handler.

use crate::config::Config;
use bookchat_core::ports::{BookChatService, DatabaseService, SpeechSynthesisService};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub chat: Arc<dyn BookChatService>,
    pub speech: Arc<dyn SpeechSynthesisService>,
}
