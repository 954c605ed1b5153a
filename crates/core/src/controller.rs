use crate::live_session::{Direction, SessionEvent};
use crate::pcm;
use crate::playback::{OutputSink, PlaybackScheduler};
use crate::timer::ReflectionTimer;
use crate::transcript::TranscriptBuffers;

/// Who is "live" right now. Exactly one value at any instant, owned by the
/// controller; everything else reads it or receives commands derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Listening,
    Speaking,
}

/// How the session ended, for the status line. A connection drop reads
/// differently to the user than tapping stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Ended,
    Error,
}

/// The turn-taking coordinator for one reflection session.
///
/// All cross-callback state lives here, mutated only through the explicit
/// entry points below, which the event loop invokes one at a time. That is
/// what makes the capture gate immediately consistent: the capture callback's
/// frame and the message that flipped the state are handled on the same loop,
/// so at most one already-queued frame can leak through after a transition.
pub struct ReflectionController<S> {
    state: InteractionState,
    turn_complete: bool,
    scheduler: PlaybackScheduler<S>,
    transcripts: TranscriptBuffers,
    timer: ReflectionTimer,
    end_reason: Option<EndReason>,
}

impl<S: OutputSink> ReflectionController<S> {
    pub fn new(sink: S) -> Self {
        Self {
            state: InteractionState::Idle,
            turn_complete: false,
            scheduler: PlaybackScheduler::new(sink),
            transcripts: TranscriptBuffers::new(),
            timer: ReflectionTimer::new(),
            end_reason: None,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn transcripts(&self) -> &TranscriptBuffers {
        &self.transcripts
    }

    pub fn timer(&self) -> &ReflectionTimer {
        &self.timer
    }

    pub fn outstanding_chunks(&self) -> usize {
        self.scheduler.outstanding()
    }

    /// Gate for the periodic capture callback. Returns the quantized frame to
    /// transmit while listening; `None` means the frame is dropped, not
    /// queued. This is the mutual-exclusion guarantee: the microphone never
    /// transmits while the agent is speaking or the session is down.
    pub fn on_capture_frame(&self, samples: &[f32]) -> Option<Vec<i16>> {
        if self.state != InteractionState::Listening {
            return None;
        }
        Some(pcm::quantize_to_i16(samples))
    }

    /// Routes one inbound session event. `Closed` and `Error` are handled by
    /// the lifecycle layer, which calls [`Self::stop`]; routing them here is
    /// a no-op.
    pub fn on_session_event(&mut self, event: SessionEvent) {
        if self.end_reason.is_some() {
            // Events can trail in after teardown; drop them.
            return;
        }
        match event {
            SessionEvent::Opened => {
                if self.state == InteractionState::Idle {
                    self.state = InteractionState::Listening;
                }
            }
            SessionEvent::TranscriptDelta { direction, text } => {
                self.transcripts.append(direction, &text);
                if direction == Direction::User
                    && self.state == InteractionState::Listening
                    && !self.transcripts.user().is_empty()
                    && self.timer.try_start()
                {
                    tracing::debug!("reflection timer started");
                }
            }
            SessionEvent::AudioChunk { pcm } => match self.scheduler.enqueue(&pcm) {
                Ok(_) => {
                    if self.state == InteractionState::Listening {
                        self.state = InteractionState::Speaking;
                        // A fresh utterance began; any completion flag left
                        // over from a previous turn no longer applies.
                        self.turn_complete = false;
                    }
                }
                Err(e) => {
                    tracing::warn!("ignoring malformed audio chunk: {}", e);
                }
            },
            SessionEvent::TurnComplete => {
                self.turn_complete = true;
                self.transcripts.clear();
                self.reevaluate_turn_end();
            }
            SessionEvent::Interrupted => {
                self.scheduler.interrupt_all();
                self.reevaluate_turn_end();
            }
            SessionEvent::Closed | SessionEvent::Error(_) => {}
        }
    }

    /// End-of-playback notification for one scheduled chunk.
    pub fn on_chunk_ended(&mut self, id: u64) {
        self.scheduler.on_chunk_ended(id);
        self.reevaluate_turn_end();
    }

    /// Per-second tick for the reflection timer.
    pub fn on_tick(&mut self) {
        self.timer.tick();
    }

    /// Forces the controller to its terminal state. Idempotent, callable from
    /// any state; the first recorded reason wins so an error ending is not
    /// repainted as a clean one by the subsequent manual stop.
    pub fn stop(&mut self, reason: EndReason) {
        self.scheduler.interrupt_all();
        self.timer.cancel();
        self.turn_complete = false;
        self.state = InteractionState::Idle;
        self.end_reason.get_or_insert(reason);
    }

    /// The one place the SPEAKING -> LISTENING condition is checked: the turn
    /// must be fully transmitted and every scheduled chunk finished. Invoked
    /// on flag-set, on every chunk end, and after an interrupt.
    fn reevaluate_turn_end(&mut self) {
        if self.turn_complete && self.scheduler.outstanding() == 0 {
            self.turn_complete = false;
            if self.state == InteractionState::Speaking {
                self.state = InteractionState::Listening;
            }
        }
    }
}
