//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the book-discussion chat model.
//! It implements the `BookChatService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use bookchat_core::domain::{ChatRequest, Sender};
use bookchat_core::ports::{BookChatService, PortError, PortResult};
use tracing::debug;

use crate::adapters::retry::{classify, with_model_fallback, RetryPolicy};

/// Characters of the book shown to the model when writing the greeting.
pub const GREETING_EXCERPT_CHARS: usize = 1000;
/// Characters of the book given to the model as conversation context.
pub const CHAT_EXCERPT_CHARS: usize = 10_000;

const SYSTEM_INSTRUCTIONS: &str = "You are an AI assistant specialized in analyzing books. \
Answer questions about the book the user is reading, using the provided excerpt as your primary context. \
Keep answers conversational and reasonably concise.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `BookChatService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    models: Vec<String>,
    retry: RetryPolicy,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`. `models` are tried in order.
    pub fn new(client: Client<OpenAIConfig>, models: Vec<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            models,
            retry,
        }
    }

    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> PortResult<String> {
        with_model_fallback(&self.models, self.retry, |model| {
            let messages = messages.clone();
            async move {
                debug!(%model, turns = messages.len(), "Sending chat completion request");
                let request = CreateChatCompletionRequestArgs::default()
                    .model(model)
                    .messages(messages)
                    .n(1)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?;

                let response = self.client.chat().create(request).await.map_err(classify)?;

                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or_else(|| {
                        PortError::Unexpected("Chat LLM response contained no text content.".to_string())
                    })
            }
        })
        .await
    }
}

/// The first `limit` characters of `text`.
pub fn excerpt(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

pub fn greeting_prompt(book_title: &str, excerpt: &str) -> String {
    format!(
        "The user has just uploaded a book titled \"{}\". Briefly acknowledge the book upload and ask a \
general question to start a conversation about it, like \"What aspect of the book would you like to explore first?\" \
Keep your greeting concise and encouraging.\n\nBook Content Excerpt (first {} characters for context): {}...",
        book_title, GREETING_EXCERPT_CHARS, excerpt
    )
}

/// The opening context turn: highlighted passage first, then the book excerpt.
pub fn context_prompt(request: &ChatRequest) -> String {
    let highlighted = request
        .highlighted_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| format!("The user highlighted this text from the book: \"{}\". ", text))
        .unwrap_or_default();
    format!(
        "{}The following text is from the book titled \"{}\" you are discussing. Please use this as context \
for our conversation. Book excerpt (first {} characters): {}",
        highlighted, request.book_title, CHAT_EXCERPT_CHARS, request.book_excerpt
    )
}

/// Builds the full message list for one chat turn.
pub fn chat_messages(request: &ChatRequest) -> PortResult<Vec<ChatCompletionRequestMessage>> {
    let build_err = |e: async_openai::error::OpenAIError| PortError::Unexpected(e.to_string());

    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_INSTRUCTIONS)
            .build()
            .map_err(build_err)?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(context_prompt(request))
            .build()
            .map_err(build_err)?
            .into(),
        ChatCompletionRequestAssistantMessageArgs::default()
            .content(format!(
                "Understood. I will use the book \"{}\" as the primary context for our discussion.",
                request.book_title
            ))
            .build()
            .map_err(build_err)?
            .into(),
    ];

    for turn in &request.history {
        let message: ChatCompletionRequestMessage = match turn.sender {
            Sender::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.text.clone())
                .build()
                .map_err(build_err)?
                .into(),
            Sender::Ai => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.text.clone())
                .build()
                .map_err(build_err)?
                .into(),
        };
        messages.push(message);
    }

    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(request.user_message.clone())
            .build()
            .map_err(build_err)?
            .into(),
    );
    Ok(messages)
}

//=========================================================================================
// `BookChatService` Trait Implementation
//=========================================================================================

#[async_trait]
impl BookChatService for OpenAiChatAdapter {
    async fn generate_greeting(&self, book_title: &str, excerpt: &str) -> PortResult<String> {
        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(greeting_prompt(book_title, excerpt))
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];
        self.complete(messages).await
    }

    async fn reply(&self, request: ChatRequest) -> PortResult<String> {
        let messages = chat_messages(&request)?;
        self.complete(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookchat_core::domain::ConversationTurn;

    fn request(highlighted: Option<&str>) -> ChatRequest {
        ChatRequest {
            book_title: "Dune".to_string(),
            book_excerpt: "A beginning is the time...".to_string(),
            highlighted_text: highlighted.map(str::to_string),
            history: vec![
                ConversationTurn {
                    sender: Sender::User,
                    text: "Who is Paul?".to_string(),
                },
                ConversationTurn {
                    sender: Sender::Ai,
                    text: "The heir of House Atreides.".to_string(),
                },
            ],
            user_message: "And Jessica?".to_string(),
        }
    }

    #[test]
    fn context_mentions_the_highlight_first() {
        let prompt = context_prompt(&request(Some("  the spice  ")));
        assert!(prompt.starts_with("The user highlighted this text from the book: \"the spice\". "));
        assert!(prompt.contains("titled \"Dune\""));
        assert!(prompt.ends_with("A beginning is the time..."));

        let plain = context_prompt(&request(Some("   ")));
        assert!(plain.starts_with("The following text"));
    }

    #[test]
    fn history_is_framed_by_context_and_the_new_message() {
        let messages = chat_messages(&request(None)).unwrap();
        // system, context, acknowledgement, two history turns, new message
        assert_eq!(messages.len(), 6);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[4], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[5], ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn excerpts_count_characters() {
        assert_eq!(excerpt("héllo wörld", 4), "héll");
        assert_eq!(excerpt("short", 100), "short");
    }
}
