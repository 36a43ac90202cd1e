//! Vocabulary extraction
//!
//! Asks the model for a JSON list of notable words in a block of text and
//! turns it into flashcards. Any failure yields an empty list.

use crate::config::LingoConfig;
use crate::gemini::{Content, GenerateContentRequest, GeminiError, GenerationConfig, GenerativeBackend};
use crate::types::{new_id, VocabularyCard};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Context recorded on every extracted card
pub const EXTRACTED_CONTEXT: &str = "Extracted from chat";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Backend(#[from] GeminiError),

    #[error("malformed vocabulary list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One entry as returned by the model
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    word: String,
    #[serde(default)]
    phonetic: String,
    #[serde(default)]
    meaning: String,
    #[serde(default)]
    example_sentence: String,
}

/// JSON schema the model's answer must follow
pub fn response_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "word": { "type": "STRING" },
                "phonetic": { "type": "STRING", "description": "IPA notation" },
                "meaning": { "type": "STRING", "description": "Concise Chinese definition" },
                "exampleSentence": {
                    "type": "STRING",
                    "description": "A short English example sentence containing the word"
                }
            },
            "required": ["word", "phonetic", "meaning", "exampleSentence"]
        }
    })
}

fn extraction_prompt(source_text: &str) -> String {
    format!(
        "Analyze the following English conversation text and pick 3-5 useful, interesting or \
challenging English words or phrases that appear in it.\n\
Return them as a JSON list.\n\n\
IMPORTANT: the 'meaning' field MUST be a concise Chinese translation (中文释义) of the word as used in this context.\n\n\
Context text: \"{}\"",
        source_text
    )
}

/// Parses the model's JSON answer into fresh, unmastered cards. Entries with a
/// blank word are skipped; order is kept.
pub fn parse_cards(raw: &str) -> Result<Vec<VocabularyCard>, serde_json::Error> {
    let raw = raw.trim();
    let raw = if raw.is_empty() { "[]" } else { raw };
    let entries: Vec<RawEntry> = serde_json::from_str(raw)?;

    Ok(entries
        .into_iter()
        .filter(|e| !e.word.trim().is_empty())
        .map(|e| VocabularyCard {
            id: new_id(),
            word: e.word.trim().to_string(),
            phonetic: e.phonetic,
            meaning: e.meaning,
            example_sentence: e.example_sentence,
            context: Some(EXTRACTED_CONTEXT.to_string()),
            mastered: false,
        })
        .collect())
}

pub struct VocabularyExtractor<B> {
    backend: Arc<B>,
    model: String,
}

impl<B: GenerativeBackend> VocabularyExtractor<B> {
    pub fn new(backend: Arc<B>, config: &LingoConfig) -> Self {
        Self {
            backend,
            model: config.chat_model.clone(),
        }
    }

    pub fn build_request(&self, source_text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(extraction_prompt(source_text))],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(response_schema()),
                ..Default::default()
            }),
        }
    }

    pub async fn try_extract(&self, source_text: &str) -> Result<Vec<VocabularyCard>, ExtractError> {
        let request = self.build_request(source_text);
        let response = self.backend.generate_content(&self.model, &request).await?;
        let raw = response.text().unwrap_or_default();
        debug!("Vocabulary response: {} bytes", raw.len());
        Ok(parse_cards(&raw)?)
    }

    /// Extracts cards from `source_text`; errors are logged and yield no cards.
    pub async fn extract(&self, source_text: &str) -> Vec<VocabularyCard> {
        match self.try_extract(source_text).await {
            Ok(cards) => {
                info!("Extracted {} vocabulary cards", cards.len());
                cards
            }
            Err(e) => {
                error!("Vocabulary extraction error: {}", e);
                Vec::new()
            }
        }
    }
}
