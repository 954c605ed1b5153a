/// Length of the reflection window in seconds.
pub const REFLECTION_WINDOW_SECS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    /// Waiting for the user's first transcribed speech.
    Armed,
    Running,
    Stopped,
}

/// Advisory countdown that begins with the user's first speech.
///
/// Purely observational: reaching zero never terminates the session. The
/// timer starts at most once per session and floors at zero.
#[derive(Debug)]
pub struct ReflectionTimer {
    remaining: u32,
    state: TimerState,
}

impl ReflectionTimer {
    pub fn new() -> Self {
        Self {
            remaining: REFLECTION_WINDOW_SECS,
            state: TimerState::Armed,
        }
    }

    /// Starts the countdown. Returns false if it already started (or was
    /// cancelled) this session.
    pub fn try_start(&mut self) -> bool {
        if self.state == TimerState::Armed {
            self.state = TimerState::Running;
            true
        } else {
            false
        }
    }

    /// One-second tick from the event loop.
    pub fn tick(&mut self) {
        if self.state == TimerState::Running && self.remaining > 0 {
            self.remaining -= 1;
        }
    }

    pub fn cancel(&mut self) {
        self.state = TimerState::Stopped;
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining
    }
}

impl Default for ReflectionTimer {
    fn default() -> Self {
        Self::new()
    }
}
