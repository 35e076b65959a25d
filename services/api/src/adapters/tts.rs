//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `SpeechSynthesisService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice},
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bookchat_core::domain::SynthesizedSpeech;
use bookchat_core::ports::{PortError, PortResult, SpeechSynthesisService};
use tracing::debug;

use crate::adapters::retry::{classify, with_retry, RetryPolicy};

/// Raw PCM returned by the `pcm` response format: 16-bit little-endian mono at 24 kHz.
pub const PCM_MIME_TYPE: &str = "audio/L16;codec=pcm;rate=24000";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechSynthesisService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiSpeechAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
    retry: RetryPolicy,
}

impl OpenAiSpeechAdapter {
    /// Creates a new `OpenAiSpeechAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, voice: Voice, retry: RetryPolicy) -> Self {
        Self {
            client,
            model,
            voice,
            retry,
        }
    }
}

/// Parses a configured voice name.
pub fn parse_voice(name: &str) -> Option<Voice> {
    match name.to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

pub fn parse_speech_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

//=========================================================================================
// `SpeechSynthesisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechSynthesisService for OpenAiSpeechAdapter {
    /// Synthesizes `text` to raw PCM and returns it base64-encoded.
    async fn synthesize(&self, text: &str) -> PortResult<SynthesizedSpeech> {
        if text.trim().is_empty() {
            return Err(PortError::Invalid("No text provided for speech synthesis.".to_string()));
        }

        let request = CreateSpeechRequestArgs::default()
            .model(self.model.clone())
            .input(text)
            .voice(self.voice.clone())
            .response_format(SpeechResponseFormat::Pcm)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = with_retry(self.retry, || {
            let request = request.clone();
            async move { self.client.audio().speech(request).await.map_err(classify) }
        })
        .await?;

        if response.bytes.is_empty() {
            return Err(PortError::Unexpected(
                "No audio data received from the speech service.".to_string(),
            ));
        }
        debug!(bytes = response.bytes.len(), "Synthesized speech");

        Ok(SynthesizedSpeech {
            audio_data: STANDARD.encode(&response.bytes),
            mime_type: PCM_MIME_TYPE.to_string(),
        })
    }
}
