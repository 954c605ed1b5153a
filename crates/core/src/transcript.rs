use crate::live_session::Direction;

/// Accumulated transcripts for the current turn, one buffer per direction.
/// Append-only within a turn; both buffers are cleared together when the
/// provider signals turn completion.
#[derive(Debug, Default)]
pub struct TranscriptBuffers {
    user: String,
    agent: String,
}

impl TranscriptBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, direction: Direction, text: &str) {
        match direction {
            Direction::User => self.user.push_str(text),
            Direction::Agent => self.agent.push_str(text),
        }
    }

    pub fn clear(&mut self) {
        self.user.clear();
        self.agent.clear();
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }
}
