use anyhow::{Context, Result};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, protocol::Message},
};

use crate::types::{
    GenerationConfig, MediaBlob, PrebuiltVoiceConfig, RealtimeInput, RealtimeInputRequest,
    ServerMessage, Setup, SetupRequest, SpeechConfig, SystemInstruction, TranscriptionConfig,
    VoiceConfig,
};

const LIVE_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

type WsWriter =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Parameters for opening a live stream.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub input_audio_transcription: bool,
    pub output_audio_transcription: bool,
}

/// What the read task publishes to subscribers.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    Message(ServerMessage),
    /// The server closed the stream cleanly.
    Closed,
    /// The transport failed; no further events will arrive.
    TransportError(String),
}

type ServerTx = tokio::sync::broadcast::Sender<LiveEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<LiveEvent>;

/// A connected Gemini Live stream. Outbound messages go through the write
/// half; inbound messages are published by a background read task.
pub struct GeminiLiveClient {
    write: WsWriter,
    s_tx: ServerTx,
    // Subscribed before the read task starts, so messages arriving before the
    // caller asks for events are neither dropped nor kill the task.
    first_rx: Option<ServerRx>,
    recv_handle: tokio::task::JoinHandle<()>,
}

/// Connects, sends the setup message, and starts the read task.
pub async fn connect(api_key: &str, config: LiveConfig) -> Result<GeminiLiveClient> {
    let url = format!("{}?key={}", LIVE_ENDPOINT, api_key);
    let (ws_stream, _) = connect_async(url)
        .await
        .context("Failed to connect to Gemini Live WebSocket")?;
    tracing::info!("Connected to Gemini Live");

    let (mut write, read) = ws_stream.split();

    let setup = SetupRequest {
        setup: Setup {
            model: config.model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice,
                        },
                    },
                },
            },
            system_instruction: SystemInstruction::from_text(config.system_instruction),
            input_audio_transcription: config
                .input_audio_transcription
                .then(TranscriptionConfig::default),
            output_audio_transcription: config
                .output_audio_transcription
                .then(TranscriptionConfig::default),
        },
    };
    let json = serde_json::to_string(&setup)?;
    write
        .send(Message::Text(json))
        .await
        .context("Failed to send setup message")?;

    let (s_tx, first_rx) = tokio::sync::broadcast::channel(256);
    let recv_handle = tokio::spawn(read_task(read, s_tx.clone()));

    Ok(GeminiLiveClient {
        write,
        s_tx,
        first_rx: Some(first_rx),
        recv_handle,
    })
}

/// Reads the socket until it ends, publishing every inbound event. Failed
/// broadcast sends mean every subscriber is gone; the task keeps reading so
/// the socket is drained until the connection itself ends.
async fn read_task<R>(mut read: R, tx: ServerTx)
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(parsed) => {
                    if tx.send(LiveEvent::Message(parsed)).is_err() {
                        tracing::debug!("no subscribers for inbound server message");
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to deserialize server message: {}", e);
                }
            },
            Ok(Message::Binary(bin)) => {
                tracing::warn!("unexpected binary message ({} bytes)", bin.len());
            }
            Ok(Message::Close(frame)) => {
                tracing::info!("Gemini Live connection closed: {:?}", frame);
                let _ = tx.send(LiveEvent::Closed);
                return;
            }
            Err(e) => {
                tracing::error!("error reading from Gemini Live WebSocket: {}", e);
                let _ = tx.send(LiveEvent::TransportError(e.to_string()));
                return;
            }
            _ => { /* Ping/Pong */ }
        }
    }
    // Stream ended without a close frame.
    let _ = tx.send(LiveEvent::Closed);
}

impl GeminiLiveClient {
    /// Subscribes to inbound events. The first call receives the subscription
    /// opened before the read task started, so nothing the server sent during
    /// connection setup is missed; later calls see events from now on.
    pub fn server_events(&mut self) -> ServerRx {
        self.first_rx
            .take()
            .unwrap_or_else(|| self.s_tx.subscribe())
    }

    /// Sends one chunk of realtime audio. `mime_type` carries the encoding
    /// and rate, e.g. `audio/pcm;rate=16000`.
    pub async fn send_realtime_audio(&mut self, base64_pcm: String, mime_type: &str) -> Result<()> {
        let req = RealtimeInputRequest {
            realtime_input: RealtimeInput {
                media: MediaBlob {
                    data: base64_pcm,
                    mime_type: mime_type.to_string(),
                },
            },
        };
        let json = serde_json::to_string(&req)?;
        self.write
            .send(Message::Text(json))
            .await
            .context("Failed to send realtime audio")
    }

    /// Initiates a clean shutdown. The read task observes the server's close
    /// frame and publishes [`LiveEvent::Closed`].
    pub async fn close(&mut self) -> Result<()> {
        self.write
            .send(Message::Close(None))
            .await
            .context("Failed to send close frame")
    }
}

impl Drop for GeminiLiveClient {
    fn drop(&mut self) {
        self.recv_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn messages_arriving_before_the_first_subscriber_are_kept() {
        // Mirrors connect(): the receiver exists before the read task runs.
        let (s_tx, mut first_rx) = tokio::sync::broadcast::channel(256);

        let inbound = stream::iter(vec![Ok(Message::Text(
            r#"{"setupComplete": {}}"#.to_string(),
        ))]);
        read_task(inbound, s_tx).await;

        let event = first_rx.recv().await.expect("event should be buffered");
        assert!(matches!(
            event,
            LiveEvent::Message(message) if message.setup_complete.is_some()
        ));
        assert!(matches!(
            first_rx.recv().await.expect("stream end publishes a close"),
            LiveEvent::Closed
        ));
    }

    #[tokio::test]
    async fn read_task_survives_a_window_with_no_subscribers() {
        let (s_tx, _) = tokio::sync::broadcast::channel(16);
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

        // The first message is delivered immediately; the second waits on the
        // gate so a subscriber can appear in between.
        let inbound = Box::pin(stream::unfold(
            (0u8, Some(gate_rx)),
            |(step, gate)| async move {
                match step {
                    0 => Some((
                        Ok(Message::Text(r#"{"setupComplete": {}}"#.to_string())),
                        (1, gate),
                    )),
                    1 => {
                        if let Some(gate) = gate {
                            let _ = gate.await;
                        }
                        Some((
                            Ok(Message::Text(
                                r#"{"serverContent": {"turnComplete": true}}"#.to_string(),
                            )),
                            (2, None),
                        ))
                    }
                    _ => None,
                }
            },
        ));
        let task = tokio::spawn(read_task(inbound, s_tx.clone()));

        // Let the first message land with zero receivers.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut rx = s_tx.subscribe();
        gate_tx.send(()).expect("read task should still be polling");

        let mut saw_turn_complete = false;
        loop {
            match rx.recv().await.expect("channel should stay open") {
                LiveEvent::Message(message) => {
                    if message
                        .server_content
                        .is_some_and(|c| c.turn_complete == Some(true))
                    {
                        saw_turn_complete = true;
                    }
                }
                LiveEvent::Closed => break,
                LiveEvent::TransportError(reason) => panic!("unexpected failure: {reason}"),
            }
        }
        assert!(saw_turn_complete);
        task.await.expect("read task should finish cleanly");
    }

    #[tokio::test]
    async fn transport_failure_is_published_after_garbage() {
        let (s_tx, mut rx) = tokio::sync::broadcast::channel(16);

        let inbound = stream::iter(vec![
            Ok(Message::Text("not json".to_string())),
            Err(WsError::ConnectionClosed),
        ]);
        read_task(inbound, s_tx).await;

        // The garbage frame is skipped, not published.
        assert!(matches!(
            rx.recv().await.expect("failure should be published"),
            LiveEvent::TransportError(_)
        ));
    }
}
