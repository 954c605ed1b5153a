use anyhow::{Context, Result};
use async_trait::async_trait;
use gemini_live::types::ServerMessage;
use gemini_live::{GeminiLiveClient, LiveConfig, LiveEvent};
use reflection_core::live_session::{
    Direction, LiveSession, SessionConfig, SessionError, SessionEvent,
};
use reflection_native_utils::audio;

use crate::config::CAPTURE_MIME_TYPE;

/// Implements the controller-facing [`LiveSession`] contract on top of the
/// Gemini Live WebSocket client, translating wire messages into the generic
/// event union as they arrive.
pub struct GeminiSession {
    client: GeminiLiveClient,
    event_rx: Option<tokio::sync::mpsc::Receiver<SessionEvent>>,
}

impl GeminiSession {
    pub async fn connect(
        api_key: &str,
        model: &str,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let mut client = gemini_live::connect(
            api_key,
            LiveConfig {
                model: model.to_string(),
                voice: config.voice,
                system_instruction: config.system_instruction,
                input_audio_transcription: config.input_transcription,
                output_audio_transcription: config.output_transcription,
            },
        )
        .await
        .map_err(|e| SessionError::Connection(format!("{e:#}")))?;

        let mut live_rx = client.server_events();
        let (tx, rx) = tokio::sync::mpsc::channel(256);

        tokio::spawn(async move {
            loop {
                match live_rx.recv().await {
                    Ok(LiveEvent::Message(message)) => {
                        for event in translate(message) {
                            if tx.send(event).await.is_err() {
                                // Receiver dropped; session is being torn down.
                                return;
                            }
                        }
                    }
                    Ok(LiveEvent::Closed) => {
                        let _ = tx.send(SessionEvent::Closed).await;
                        return;
                    }
                    Ok(LiveEvent::TransportError(reason)) => {
                        let _ = tx.send(SessionEvent::Error(reason)).await;
                        return;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("live event stream lagged by {} messages", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(SessionEvent::Closed).await;
                        return;
                    }
                }
            }
        });

        Ok(Self {
            client,
            event_rx: Some(rx),
        })
    }
}

/// Maps one wire message onto zero or more session events, preserving the
/// order fields appear in within a message. Payloads that fail to decode are
/// skipped; the session keeps running.
fn translate(message: ServerMessage) -> Vec<SessionEvent> {
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(SessionEvent::Opened);
    }

    let Some(content) = message.server_content else {
        return events;
    };

    if let Some(transcription) = content.input_transcription {
        events.push(SessionEvent::TranscriptDelta {
            direction: Direction::User,
            text: transcription.text,
        });
    }
    if let Some(transcription) = content.output_transcription {
        events.push(SessionEvent::TranscriptDelta {
            direction: Direction::Agent,
            text: transcription.text,
        });
    }

    if let Some(turn) = content.model_turn {
        for part in turn.parts {
            let Some(blob) = part.inline_data else {
                continue;
            };
            if !blob.mime_type.starts_with("audio/pcm") {
                tracing::warn!("ignoring inline data with mime type {}", blob.mime_type);
                continue;
            }
            if let Some(pcm) = audio::decode_base64(&blob.data) {
                events.push(SessionEvent::AudioChunk { pcm });
            }
        }
    }

    if content.interrupted == Some(true) {
        events.push(SessionEvent::Interrupted);
    }
    if content.turn_complete == Some(true) {
        events.push(SessionEvent::TurnComplete);
    }

    events
}

#[async_trait]
impl LiveSession for GeminiSession {
    async fn send_audio_frame(&mut self, pcm: Vec<i16>) -> Result<()> {
        let encoded = audio::encode_i16(&pcm);
        self.client
            .send_realtime_audio(encoded, CAPTURE_MIME_TYPE)
            .await
            .context("Failed to send capture frame")
    }

    async fn server_events(&mut self) -> Result<tokio::sync::mpsc::Receiver<SessionEvent>> {
        self.event_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("server_events channel has already been taken"))
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_live::types::{
        MediaBlob, ModelTurn, Part, ServerContent, SetupComplete, Transcription,
    };

    fn content(content: ServerContent) -> ServerMessage {
        ServerMessage {
            setup_complete: None,
            server_content: Some(content),
        }
    }

    #[test]
    fn setup_complete_becomes_opened() {
        let message = ServerMessage {
            setup_complete: Some(SetupComplete::default()),
            server_content: None,
        };
        let events = translate(message);
        assert!(matches!(events.as_slice(), [SessionEvent::Opened]));
    }

    #[test]
    fn transcriptions_map_to_their_direction() {
        let events = translate(content(ServerContent {
            input_transcription: Some(Transcription {
                text: "I think".to_string(),
            }),
            output_transcription: Some(Transcription {
                text: "Go on".to_string(),
            }),
            ..Default::default()
        }));

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            SessionEvent::TranscriptDelta { direction: Direction::User, text } if text == "I think"
        ));
        assert!(matches!(
            &events[1],
            SessionEvent::TranscriptDelta { direction: Direction::Agent, text } if text == "Go on"
        ));
    }

    #[test]
    fn inline_audio_is_base64_decoded() {
        let pcm_base64 = audio::encode_i16(&[100, -100]);
        let events = translate(content(ServerContent {
            model_turn: Some(ModelTurn {
                parts: vec![Part {
                    text: None,
                    inline_data: Some(MediaBlob {
                        data: pcm_base64,
                        mime_type: "audio/pcm;rate=24000".to_string(),
                    }),
                }],
            }),
            ..Default::default()
        }));

        let [SessionEvent::AudioChunk { pcm }] = events.as_slice() else {
            panic!("expected one audio chunk, got {:?}", events);
        };
        assert_eq!(pcm.len(), 4);
    }

    #[test]
    fn undecodable_audio_payload_is_skipped() {
        let events = translate(content(ServerContent {
            model_turn: Some(ModelTurn {
                parts: vec![Part {
                    text: None,
                    inline_data: Some(MediaBlob {
                        data: "!!not-base64!!".to_string(),
                        mime_type: "audio/pcm;rate=24000".to_string(),
                    }),
                }],
            }),
            ..Default::default()
        }));
        assert!(events.is_empty());
    }

    #[test]
    fn non_audio_inline_data_is_ignored() {
        let events = translate(content(ServerContent {
            model_turn: Some(ModelTurn {
                parts: vec![Part {
                    text: Some("thinking".to_string()),
                    inline_data: Some(MediaBlob {
                        data: "AAAA".to_string(),
                        mime_type: "image/png".to_string(),
                    }),
                }],
            }),
            ..Default::default()
        }));
        assert!(events.is_empty());
    }

    #[test]
    fn turn_complete_and_interrupted_flags_map_through() {
        let events = translate(content(ServerContent {
            interrupted: Some(true),
            turn_complete: Some(true),
            ..Default::default()
        }));
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::Interrupted, SessionEvent::TurnComplete]
        ));
    }

    #[test]
    fn empty_message_produces_no_events() {
        let events = translate(ServerMessage::default());
        assert!(events.is_empty());
    }
}
