//! LingoPal - English conversation companion
//!
//! Chat with a Gemini-backed persona, pull vocabulary flashcards out of the
//! conversation and listen to any reply or word through text-to-speech.

#![forbid(unsafe_code)]

/// PCM decoding and PulseAudio playback
pub mod audio;
/// Runtime configuration
pub mod config;
/// Chat turn client
pub mod conversation;
/// Gemini REST API client
pub mod gemini;
/// WAV dumps of synthesized speech
pub mod recorder;
/// Effect runner and event loop
pub mod session;
/// Text-to-speech playback
pub mod speech;
/// Conversation state machine
pub mod state;
pub mod types;
/// Vocabulary flashcard extraction
pub mod vocabulary;

#[cfg(test)]
mod testing;

pub use config::LingoConfig;
pub use gemini::{GeminiClient, GenerativeBackend};
pub use session::{Command, Services, Session, Update};
pub use state::{Completion, ConversationState, Effect, SpeechTarget};
pub use types::{Level, Message, Mode, Sender, UserInterests, VocabularyCard};
