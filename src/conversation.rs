//! Chat turn client
//!
//! Turns the rolling message log into a `generateContent` request with the
//! LingoPal persona attached. Failures never reach the caller: they come
//! back as a fixed apology so the chat always gets a bot message.

use crate::config::LingoConfig;
use crate::gemini::{
    Content, GenerateContentRequest, GeminiError, GenerationConfig, GenerativeBackend, Result,
};
use crate::types::{Message, Sender, UserInterests};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Number of prior messages sent as context
pub const HISTORY_LIMIT: usize = 5;

/// Reply used when the backend call fails
pub const NETWORK_FALLBACK: &str = "抱歉，网络连接好像有点问题，请稍后再试。";

/// Reply used when the backend answers without any text
pub const EMPTY_REPLY_FALLBACK: &str = "哎呀，我好像走神了，能再说一遍吗？";

pub const SYSTEM_INSTRUCTION: &str = "\
You are \"LingoPal\", a friendly, witty and encouraging English conversation partner for a Chinese learner.
Your job is to make the user enjoy English through interesting conversation.

Rules:
1. Always reply in English to keep the conversation immersive, unless the user explicitly asks for a Chinese explanation.
2. Be a friend, not a strict teacher.
3. Use emojis to keep the tone light.
4. When the user makes a grammar mistake or uses \"Chinglish\", correct it gently by rephrasing their sentence naturally in your reply (e.g. \"Oh, you mean...?\") and then carry on the conversation.
5. Match your vocabulary to the user's level.
6. Keep replies short (under 100 words).
";

pub struct ConversationClient<B> {
    backend: Arc<B>,
    model: String,
    temperature: f32,
}

impl<B: GenerativeBackend> ConversationClient<B> {
    pub fn new(backend: Arc<B>, config: &LingoConfig) -> Self {
        Self {
            backend,
            model: config.chat_model.clone(),
            temperature: config.chat_temperature,
        }
    }

    /// Builds the request for one chat turn. Only the last `HISTORY_LIMIT`
    /// messages are used and system messages are skipped.
    pub fn build_request(
        &self,
        history: &[Message],
        utterance: &str,
        interests: &UserInterests,
    ) -> GenerateContentRequest {
        let start = history.len().saturating_sub(HISTORY_LIMIT);
        let mut contents: Vec<Content> = history[start..]
            .iter()
            .filter_map(|m| match m.sender {
                Sender::User => Some(Content::user(m.text.as_str())),
                Sender::Bot => Some(Content::model(m.text.as_str())),
                Sender::System => None,
            })
            .collect();

        contents.push(Content::user(context_prompt(utterance, interests)));

        GenerateContentRequest {
            contents,
            system_instruction: Some(Content::system(SYSTEM_INSTRUCTION)),
            generation_config: Some(GenerationConfig {
                temperature: Some(self.temperature),
                ..Default::default()
            }),
        }
    }

    /// Like [`get_reply`](Self::get_reply) but surfaces the backend error.
    pub async fn try_get_reply(
        &self,
        history: &[Message],
        utterance: &str,
        interests: &UserInterests,
    ) -> Result<String> {
        let request = self.build_request(history, utterance, interests);
        let response = self.backend.generate_content(&self.model, &request).await?;
        response
            .text()
            .filter(|t| !t.is_empty())
            .ok_or(GeminiError::EmptyResponse)
    }

    /// Returns the model's reply verbatim, or a fixed fallback on any failure.
    pub async fn get_reply(
        &self,
        history: &[Message],
        utterance: &str,
        interests: &UserInterests,
    ) -> String {
        match self.try_get_reply(history, utterance, interests).await {
            Ok(text) => {
                debug!("Chat reply: {}", text.chars().take(50).collect::<String>());
                text
            }
            Err(GeminiError::EmptyResponse) => {
                warn!("Gemini chat returned no text");
                EMPTY_REPLY_FALLBACK.to_string()
            }
            Err(e) => {
                error!("Gemini chat error: {}", e);
                NETWORK_FALLBACK.to_string()
            }
        }
    }
}

fn context_prompt(utterance: &str, interests: &UserInterests) -> String {
    format!(
        "User Interests: {}.\nUser Level: {}.\nCurrent Message: {}",
        interests.topics.join(", "),
        interests.level,
        utterance
    )
}
