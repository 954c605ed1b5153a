use reflection_core::controller::{EndReason, InteractionState, ReflectionController};
use reflection_core::live_session::{LiveSession, SessionEvent};
use reflection_core::playback::OutputSink;

/// Everything the single event loop interleaves: the periodic capture
/// callback, asynchronously delivered session messages, per-second timer
/// ticks, playback completions, and the user's stop action. All controller
/// mutation happens through this one queue, so no two handlers ever race.
#[derive(Debug)]
pub enum Input {
    CaptureFrame(Vec<f32>),
    Session(SessionEvent),
    ChunkEnded(u64),
    Tick,
    Stop,
}

/// Drives one [`ReflectionController`] from a queue of [`Input`]s and owns
/// the outbound half of the live session.
pub struct EventLoop<L, S> {
    controller: ReflectionController<S>,
    session: L,
}

impl<L: LiveSession, S: OutputSink> EventLoop<L, S> {
    pub fn new(session: L, sink: S) -> Self {
        Self {
            controller: ReflectionController::new(sink),
            session,
        }
    }

    pub fn controller(&self) -> &ReflectionController<S> {
        &self.controller
    }

    /// Applies one input. Returns false when the loop should exit.
    async fn handle_input(&mut self, input: Input) -> bool {
        let before = self.controller.state();
        let keep_running = match input {
            Input::CaptureFrame(samples) => {
                if let Some(frame) = self.controller.on_capture_frame(&samples) {
                    // Fire-and-forget: a failed send is logged, never fatal.
                    // The session reports real failures through its events.
                    if let Err(e) = self.session.send_audio_frame(frame).await {
                        tracing::warn!("failed to send capture frame: {:?}", e);
                    }
                }
                true
            }
            Input::Session(SessionEvent::Closed) => {
                self.controller.stop(EndReason::Ended);
                false
            }
            Input::Session(SessionEvent::Error(reason)) => {
                tracing::error!("live session failed: {}", reason);
                self.controller.stop(EndReason::Error);
                if let Err(e) = self.session.close().await {
                    tracing::debug!("close after session error failed: {:?}", e);
                }
                false
            }
            Input::Session(event) => {
                self.controller.on_session_event(event);
                true
            }
            Input::ChunkEnded(id) => {
                self.controller.on_chunk_ended(id);
                true
            }
            Input::Tick => {
                self.controller.on_tick();
                true
            }
            Input::Stop => {
                self.controller.stop(EndReason::Ended);
                if let Err(e) = self.session.close().await {
                    tracing::debug!("close on stop failed: {:?}", e);
                }
                false
            }
        };

        let after = self.controller.state();
        if before != after {
            tracing::info!("{}", status_line(after));
        }
        keep_running
    }

    /// Consumes inputs until the session ends. Returns how it ended.
    pub async fn run(mut self, mut input_rx: tokio::sync::mpsc::Receiver<Input>) -> EndReason {
        while let Some(input) = input_rx.recv().await {
            if !self.handle_input(input).await {
                break;
            }
        }
        // Covers the queue being dropped without an explicit stop.
        self.controller.stop(EndReason::Ended);
        self.controller
            .end_reason()
            .unwrap_or(EndReason::Ended)
    }
}

fn status_line(state: InteractionState) -> &'static str {
    match state {
        InteractionState::Idle => "Session ended",
        InteractionState::Listening => "Listening...",
        InteractionState::Speaking => "Speaking...",
    }
}
