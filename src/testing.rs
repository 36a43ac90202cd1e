//! Scripted backend and in-memory sink shared by the unit tests

use crate::audio::{AudioError, AudioSink, SampleBuffer};
use crate::gemini::{
    Candidate, Content, GenerateContentRequest, GenerateContentResponse, GeminiError,
    GenerativeBackend, InlineData, Part, Result,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued responses in order and records every request it sees.
/// An exhausted script answers with `GeminiError::EmptyResponse`.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<GenerateContentResponse>>>,
    calls: Mutex<Vec<(String, GenerateContentRequest)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<GenerateContentResponse>) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn push_text(&self, text: &str) -> &Self {
        self.push(Ok(text_response(text)))
    }

    pub fn push_error(&self) -> &Self {
        self.push(Err(GeminiError::Status {
            status: 503,
            body: "backend unavailable".to_string(),
        }))
    }

    pub fn calls(&self) -> Vec<(String, GenerateContentRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GeminiError::EmptyResponse))
    }
}

pub fn text_response(text: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content::model(text)),
            finish_reason: Some("STOP".to_string()),
        }],
    }
}

pub fn audio_response(data: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
                        data: data.to_string(),
                    }),
                }],
            }),
            finish_reason: Some("STOP".to_string()),
        }],
    }
}

/// Collects played buffers instead of touching an audio device.
#[derive(Default)]
pub struct MemorySink {
    played: Mutex<Vec<SampleBuffer>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<SampleBuffer> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for MemorySink {
    async fn play(&self, buffer: SampleBuffer) -> std::result::Result<(), AudioError> {
        self.played.lock().unwrap().push(buffer);
        Ok(())
    }
}
