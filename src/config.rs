//! Runtime configuration
//!
//! Everything has a default except the API key, which must come from
//! `GEMINI_API_KEY`.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Kore";
/// Output rate of the TTS model
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct LingoConfig {
    pub api_key: String,
    pub base_url: String,
    /// Model used for chat turns and vocabulary extraction
    pub chat_model: String,
    pub tts_model: String,
    /// Prebuilt voice name
    pub voice: String,
    pub chat_temperature: f32,
    pub request_timeout: Duration,
    pub sample_rate: u32,
    /// Dump every synthesized clip to `recordings/`
    pub record: bool,
}

impl Default for LingoConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            chat_temperature: 0.8,
            request_timeout: Duration::from_secs(60),
            sample_rate: DEFAULT_SAMPLE_RATE,
            record: false,
        }
    }
}

impl LingoConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        if let Some(url) = lookup("LINGOPAL_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("LINGOPAL_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Some(model) = lookup("LINGOPAL_TTS_MODEL") {
            config.tts_model = model;
        }
        if let Some(voice) = lookup("LINGOPAL_VOICE") {
            config.voice = voice;
        }
        if let Some(secs) = lookup("LINGOPAL_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "LINGOPAL_TIMEOUT_SECS",
                value: secs.clone(),
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup("LINGOPAL_RECORD") {
            config.record = matches!(flag.trim(), "1" | "true" | "yes");
        }

        Ok(config)
    }
}
