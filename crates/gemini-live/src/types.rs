//! Wire shapes for the Gemini Live bidirectional stream. Field names follow
//! the service's camelCase JSON.

// Outgoing messages

#[derive(Debug, serde::Serialize)]
pub struct SetupRequest {
    pub setup: Setup,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

// Voice selection is nested three levels deep on the wire:
// speechConfig.voiceConfig.prebuiltVoiceConfig.voiceName.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// The steering text, wrapped in the content shape the setup message expects.
#[derive(Debug, serde::Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

impl SystemInstruction {
    pub fn from_text(text: String) -> Self {
        Self {
            parts: vec![TextPart { text }],
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Presence of this (empty) object enables transcription for a direction.
#[derive(Debug, Default, serde::Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputRequest {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, serde::Serialize)]
pub struct RealtimeInput {
    pub media: MediaBlob,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    /// Base64-encoded PCM16 bytes.
    pub data: String,
    pub mime_type: String,
}

// Incoming messages

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<SetupComplete>,
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
    pub model_turn: Option<ModelTurn>,
    pub turn_complete: Option<bool>,
    pub interrupted: Option<bool>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Transcription {
    pub text: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<MediaBlob>,
}
