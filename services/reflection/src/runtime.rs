//! Session lifecycle: opens the devices and the live session, wires their
//! callbacks into the event loop, and guarantees teardown on every exit path.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, FrameCount, SampleRate, StreamConfig};
use reflection_core::controller::EndReason;
use reflection_core::live_session::{LiveSession, SessionConfig, SessionError};
use reflection_core::playback::OUTPUT_SAMPLE_RATE;
use reflection_native_utils::{audio, device};

use crate::config::{Config, INPUT_BLOCK_SIZE, INPUT_SAMPLE_RATE, OUTPUT_BLOCK_SIZE};
use crate::event_loop::{EventLoop, Input};
use crate::gemini_adapter::GeminiSession;
use crate::prompt::{self, Assignment};
use crate::sink::CpalOutputSink;

struct ActiveSession {
    input_tx: tokio::sync::mpsc::Sender<Input>,
    // Dropping the streams stops capture and playback and releases both
    // devices.
    _input_stream: cpal::Stream,
    _output_stream: cpal::Stream,
    tick_handle: tokio::task::JoinHandle<()>,
    forward_handle: tokio::task::JoinHandle<()>,
    loop_handle: Option<tokio::task::JoinHandle<()>>,
    final_reason: Arc<Mutex<Option<EndReason>>>,
}

/// Owns at most one running session at a time. `start`, `stop`, and `toggle`
/// are the only entry points the presentation layer calls.
///
/// cpal streams are not `Send`, so a runtime must stay on the thread that
/// started it (the main task in this binary).
pub struct SessionRuntime {
    config: Config,
    assignment: Assignment,
    active: Option<ActiveSession>,
    last_end: Option<EndReason>,
}

impl SessionRuntime {
    pub fn new(config: Config, assignment: Assignment) -> Self {
        Self {
            config,
            assignment,
            active: None,
            last_end: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// How the previous session ended, if any.
    pub fn last_end(&self) -> Option<EndReason> {
        self.last_end
    }

    /// Brings up devices and the live session. On partial failure the
    /// resources acquired so far are released as they drop; nothing persists
    /// until everything is wired.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.active.is_some() {
            tracing::warn!("session already active; ignoring start");
            return Ok(());
        }
        self.last_end = None;

        let (input_tx, input_rx) = tokio::sync::mpsc::channel::<Input>(1024);

        // Output device at the fixed playback rate.
        let output = device::get_or_default_output(None)
            .map_err(|e| SessionError::Device(format!("{e:#}")))?;
        tracing::info!("Using output device: {:?}", output.name().ok());
        let output_channels = output
            .default_output_config()
            .map_err(|e| SessionError::Device(e.to_string()))?
            .channels() as usize;
        let output_config = StreamConfig {
            channels: output_channels as u16,
            sample_rate: SampleRate(OUTPUT_SAMPLE_RATE),
            buffer_size: BufferSize::Fixed(FrameCount::from(OUTPUT_BLOCK_SIZE as u32)),
        };
        let sink = CpalOutputSink::new();
        let output_stream = output
            .build_output_stream(
                &output_config,
                sink.callback(output_channels, input_tx.clone()),
                move |err| tracing::error!("output stream error: {}", err),
                None,
            )
            .map_err(|e| SessionError::Device(e.to_string()))?;
        output_stream
            .play()
            .map_err(|e| SessionError::Device(e.to_string()))?;

        // Microphone at the fixed capture rate. Failures here are the
        // permission path: reported to the caller, no session to tear down.
        let input = device::get_or_default_input(None)
            .map_err(|e| SessionError::Permission(format!("{e:#}")))?;
        tracing::info!("Using input device: {:?}", input.name().ok());
        let input_channels = input
            .default_input_config()
            .map_err(|e| SessionError::Permission(e.to_string()))?
            .channels() as usize;
        let input_config = StreamConfig {
            channels: input_channels as u16,
            sample_rate: SampleRate(INPUT_SAMPLE_RATE),
            buffer_size: BufferSize::Fixed(FrameCount::from(INPUT_BLOCK_SIZE as u32)),
        };
        let capture_tx = input_tx.clone();
        let input_stream = input
            .build_input_stream(
                &input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = audio::downmix_to_mono(data, input_channels);
                    if capture_tx.try_send(Input::CaptureFrame(mono)).is_err() {
                        // Queue full or loop gone; the frame is lost, which
                        // capture tolerates.
                        tracing::warn!("capture frame dropped before the event loop");
                    }
                },
                move |err| tracing::error!("input stream error: {}", err),
                None,
            )
            .map_err(|e| SessionError::Permission(e.to_string()))?;
        input_stream
            .play()
            .map_err(|e| SessionError::Permission(e.to_string()))?;

        // Live session with the reading-companion configuration.
        let session_config = SessionConfig {
            voice: self.config.voice.clone(),
            system_instruction: prompt::system_instruction(&self.assignment),
            input_transcription: true,
            output_transcription: true,
        };
        let mut session =
            GeminiSession::connect(&self.config.gemini_api_key, &self.config.model, session_config)
                .await?;
        let mut events = session
            .server_events()
            .await
            .map_err(|e| SessionError::Connection(format!("{e:#}")))?;

        // Forward inbound session events into the loop.
        let forward_tx = input_tx.clone();
        let forward_handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if forward_tx.send(Input::Session(event)).await.is_err() {
                    break;
                }
            }
        });

        // Per-second ticks for the reflection timer.
        let tick_tx = input_tx.clone();
        let tick_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // the immediate first tick
            loop {
                interval.tick().await;
                if tick_tx.send(Input::Tick).await.is_err() {
                    break;
                }
            }
        });

        let final_reason = Arc::new(Mutex::new(None));
        let loop_reason = Arc::clone(&final_reason);
        let event_loop = EventLoop::new(session, sink);
        let loop_handle = tokio::spawn(async move {
            let reason = event_loop.run(input_rx).await;
            *loop_reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
        });

        self.active = Some(ActiveSession {
            input_tx,
            _input_stream: input_stream,
            _output_stream: output_stream,
            tick_handle,
            forward_handle,
            loop_handle: Some(loop_handle),
            final_reason,
        });
        Ok(())
    }

    /// Resolves when the running session ends on its own (remote close or
    /// error). Returns immediately if no session is active. Call
    /// [`Self::stop`] afterwards to release the devices.
    pub async fn wait(&mut self) {
        let Some(active) = &mut self.active else {
            return;
        };
        if let Some(handle) = active.loop_handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("event loop task failed: {}", e);
            }
        }
    }

    /// Idempotent full teardown: stops the loop, closes the session, releases
    /// both devices, and cancels the timers. Safe from any state, including a
    /// session that never finished starting.
    pub async fn stop(&mut self) -> Option<EndReason> {
        let Some(active) = self.active.take() else {
            return self.last_end;
        };

        // Ask the loop to stop; it may already be gone, which is fine.
        let _ = active.input_tx.send(Input::Stop).await;
        if let Some(handle) = active.loop_handle {
            if let Err(e) = handle.await {
                tracing::error!("event loop task failed: {}", e);
            }
        }
        active.tick_handle.abort();
        active.forward_handle.abort();

        let reason = active
            .final_reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(EndReason::Ended);
        match reason {
            EndReason::Ended => tracing::info!("Session ended"),
            EndReason::Error => tracing::warn!("Session ended with an error"),
        }
        self.last_end = Some(reason);
        // Streams drop here, releasing the devices.
        Some(reason)
    }

    /// The single entry point a push-to-talk surface needs.
    pub async fn toggle(&mut self) -> Result<(), SessionError> {
        if self.is_active() {
            self.stop().await;
            Ok(())
        } else {
            self.start().await
        }
    }
}
