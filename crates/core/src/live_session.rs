use anyhow::Result;
use async_trait::async_trait;

/// Which side of the conversation a transcript fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    User,
    Agent,
}

/// Events a live session delivers back to the controller.
///
/// `TurnComplete` is guaranteed by the provider to arrive only after every
/// audio chunk of that turn has been delivered; the controller trusts that
/// ordering rather than enforcing it.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session is open and ready for realtime audio.
    Opened,
    /// A fragment of transcribed speech, in delivery order per direction.
    TranscriptDelta { direction: Direction, text: String },
    /// One unit of synthesized agent audio, little-endian PCM16 at 24 kHz mono.
    AudioChunk { pcm: Vec<u8> },
    /// The agent's utterance has been fully transmitted.
    TurnComplete,
    /// The agent's in-progress utterance was cut short; unplayed audio should
    /// be discarded.
    Interrupted,
    /// The session terminated cleanly.
    Closed,
    /// The session terminated because of a provider or transport failure.
    Error(String),
}

/// Configuration handed to a provider when opening a session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Name of the synthesized voice the provider should use.
    pub voice: String,
    /// Free-form steering text for the agent.
    pub system_instruction: String,
    /// Whether the provider should transcribe the user's speech.
    pub input_transcription: bool,
    /// Whether the provider should transcribe the agent's speech.
    pub output_transcription: bool,
}

/// Failures that are surfaced to the user as a visible status change. All
/// other anomalies (decode, playback, individual frame sends) are absorbed
/// locally and logged.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("microphone access denied: {0}")]
    Permission(String),
    #[error("audio device unavailable: {0}")]
    Device(String),
    #[error("live session connection failed: {0}")]
    Connection(String),
}

/// A live bidirectional audio session with an AI provider.
///
/// The concrete backend is opaque to the controller: it only needs a stream
/// of [`SessionEvent`]s and a fire-and-forget outbound frame path. The trait
/// mirrors the provider adapters in the service crate, which is where the
/// wire protocol lives.
#[async_trait]
pub trait LiveSession: Send {
    /// Sends one captured audio frame (PCM16 at 16 kHz mono) upstream.
    /// Fire-and-forget: a failed send is logged by the caller and does not
    /// change controller state.
    async fn send_audio_frame(&mut self, pcm: Vec<i16>) -> Result<()>;

    /// Takes the inbound event channel. May only be taken once.
    async fn server_events(&mut self) -> Result<tokio::sync::mpsc::Receiver<SessionEvent>>;

    /// Terminates the session. The provider emits [`SessionEvent::Closed`]
    /// exactly once in response.
    async fn close(&mut self) -> Result<()>;
}
