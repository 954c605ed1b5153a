//! Service configuration, loaded from environment variables.

use std::env;
use tracing::Level;

// --- Application Constants ---

/// Sample rate the live session expects for captured audio.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Fixed block size for the microphone input stream.
pub const INPUT_BLOCK_SIZE: usize = 1_024;
/// Fixed block size for the output stream callback.
pub const OUTPUT_BLOCK_SIZE: usize = 1_024;
/// Mime descriptor sent with every outbound capture frame.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub model: String,
    pub voice: String,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Secret key for the Gemini API. Required.
    // *   `GEMINI_LIVE_MODEL`: (Optional) The live audio model to use.
    // *   `REFLECTION_VOICE`: (Optional) Synthesized voice name. Defaults to "Puck".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env for local development; ignored if not present.
        dotenvy::dotenv().ok();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let model = env::var("GEMINI_LIVE_MODEL")
            .unwrap_or_else(|_| "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string());
        let voice = env::var("REFLECTION_VOICE").unwrap_or_else(|_| "Puck".to_string());

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gemini_api_key,
            model,
            voice,
            log_level,
        })
    }
}
