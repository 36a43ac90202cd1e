//! Text-to-speech playback
//!
//! Requests synthesized speech for a piece of text, decodes the PCM payload
//! and plays it on an [`AudioSink`]. `speak` resolves when playback has
//! finished, not when the request returns.
//!
//! The player does not queue or cancel. Callers must not start a second
//! `speak` while one is running; `ConversationState::request_speech` enforces
//! that for the app.

use crate::audio::{AudioDecoder, AudioError, AudioSink};
use crate::config::LingoConfig;
use crate::gemini::{
    Content, GenerateContentRequest, GeminiError, GenerationConfig, GenerativeBackend,
    ResponseModality, SpeechConfig,
};
use crate::recorder::ClipRecorder;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech request failed: {0}")]
    Backend(#[from] GeminiError),

    #[error("no audio data returned")]
    NoAudio,

    #[error(transparent)]
    Audio(#[from] AudioError),
}

pub struct SpeechPlayer<B, S> {
    backend: Arc<B>,
    sink: Arc<S>,
    model: String,
    voice: String,
    decoder: AudioDecoder,
    recorder: Mutex<ClipRecorder>,
}

impl<B: GenerativeBackend, S: AudioSink> SpeechPlayer<B, S> {
    pub fn new(backend: Arc<B>, sink: Arc<S>, config: &LingoConfig) -> Self {
        Self {
            backend,
            sink,
            model: config.tts_model.clone(),
            voice: config.voice.clone(),
            decoder: AudioDecoder::new(config.sample_rate, 1),
            recorder: Mutex::new(ClipRecorder::new(config.record)),
        }
    }

    /// Replace the clip recorder (e.g. to point it at another directory).
    pub fn with_recorder(mut self, recorder: ClipRecorder) -> Self {
        self.recorder = Mutex::new(recorder);
        self
    }

    pub fn build_request(&self, text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(text)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: vec![ResponseModality::Audio.as_str().to_string()],
                speech_config: Some(SpeechConfig::prebuilt(self.voice.as_str())),
                ..Default::default()
            }),
        }
    }

    /// Synthesizes and plays `text`, returning the played duration.
    pub async fn try_speak(&self, text: &str) -> Result<Duration, SpeechError> {
        let request = self.build_request(text);
        let response = self.backend.generate_content(&self.model, &request).await?;

        let payload = response.inline_data().ok_or(SpeechError::NoAudio)?;
        debug!("Received {} bytes of base64 audio", payload.data.len());

        let buffer = self.decoder.decode(&payload.data)?;
        let duration = buffer.duration();

        if let Ok(mut recorder) = self.recorder.lock() {
            recorder.on_clip(text, &buffer);
        }

        self.sink.play(buffer).await?;
        info!("Finished speaking {:?} of audio", duration);
        Ok(duration)
    }

    /// Synthesizes and plays `text`. Failures are logged and reported as
    /// `false`; they never propagate.
    pub async fn speak(&self, text: &str) -> bool {
        match self.try_speak(text).await {
            Ok(_) => true,
            Err(e) => {
                error!("TTS error: {}", e);
                false
            }
        }
    }
}
