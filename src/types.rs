//! Core data model shared by the orchestrator and the services
//!
//! Messages and vocabulary cards are created by the orchestrator (or from
//! extractor output) and handed out read-only; only `mastered` ever changes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    System,
}

/// One entry in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            text: text.into(),
            sender,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// A flashcard in the vocabulary deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyCard {
    pub id: String,
    pub word: String,
    /// IPA notation
    pub phonetic: String,
    /// Localized (Chinese) definition
    pub meaning: String,
    pub example_sentence: String,
    /// Where the card came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub mastered: bool,
}

impl VocabularyCard {
    /// Key used for deck deduplication.
    pub fn word_key(&self) -> String {
        self.word.trim().to_lowercase()
    }
}

/// Learner proficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        }
    }

    /// Label shown on the onboarding screen.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Beginner => "初级 (能说简单的句子)",
            Self::Intermediate => "中级 (能进行日常交流)",
            Self::Advanced => "高级 (追求地道表达)",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" | "1" => Ok(Self::Beginner),
            "intermediate" | "2" => Ok(Self::Intermediate),
            "advanced" | "3" => Ok(Self::Advanced),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

/// Topics and level picked during onboarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInterests {
    pub topics: Vec<String>,
    pub level: Level,
}

impl UserInterests {
    /// Builds interests with topics trimmed, blanks dropped and duplicates
    /// removed (first occurrence wins).
    pub fn new<I, S>(topics: I, level: Level) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for topic in topics {
            let topic = topic.as_ref().trim();
            if !topic.is_empty() && !unique.iter().any(|t| t == topic) {
                unique.push(topic.to_string());
            }
        }
        Self { topics: unique, level }
    }
}

/// A topic offered on the onboarding screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topic {
    pub id: &'static str,
    pub label: &'static str,
}

pub const TOPICS: [Topic; 6] = [
    Topic { id: "movies", label: "看美剧/电影" },
    Topic { id: "music", label: "欧美音乐" },
    Topic { id: "travel", label: "出国旅游" },
    Topic { id: "tech", label: "科技数码" },
    Topic { id: "daily", label: "日常生活" },
    Topic { id: "career", label: "职场英语" },
];

/// Resolves a user-typed topic: catalog ids and 1-based catalog indexes map to
/// the catalog id, anything else is kept as free text.
pub fn resolve_topic(input: &str) -> String {
    let input = input.trim();
    if let Ok(idx) = input.parse::<usize>() {
        if (1..=TOPICS.len()).contains(&idx) {
            return TOPICS[idx - 1].id.to_string();
        }
    }
    TOPICS
        .iter()
        .find(|t| t.id.eq_ignore_ascii_case(input) || t.label == input)
        .map(|t| t.id.to_string())
        .unwrap_or_else(|| input.to_string())
}

/// Application mode. `Chat` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Onboarding,
    Chat,
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}
