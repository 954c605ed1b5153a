use std::collections::HashMap;

use crate::pcm;

/// Sample rate every agent audio chunk is delivered at. Chunks at any other
/// rate are a provider bug; nothing here resamples.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Capability interface over the output audio device, so the scheduler can
/// be exercised with a fake clock and device in tests.
pub trait OutputSink {
    /// Current position of the playback clock, in seconds. Non-decreasing.
    fn current_clock(&self) -> f64;

    /// Schedules a buffer of mono samples to begin playing at `start_time`
    /// seconds on the playback clock. Returns an id that the device reports
    /// back through its end-of-playback notification.
    fn schedule(&mut self, samples: Vec<f32>, start_time: f64) -> u64;

    /// Force-stops a scheduled buffer that has not finished playing. The
    /// device must not emit an end-of-playback notification for it.
    fn stop(&mut self, id: u64);
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio chunk carried no samples")]
    EmptyChunk,
}

#[derive(Debug)]
struct PendingChunk {
    duration: f64,
}

/// Schedules decoded agent audio back-to-back on the output device.
///
/// The `next_start_time` cursor is what keeps chunks gapless and in arrival
/// order: each chunk starts at `max(cursor, clock_now)` and advances the
/// cursor by its own duration, independent of when its decode finished or
/// when earlier chunks end. All mutation goes through the single event loop,
/// so the cursor and the outstanding count never race.
pub struct PlaybackScheduler<S> {
    sink: S,
    next_start_time: f64,
    pending: HashMap<u64, PendingChunk>,
}

impl<S: OutputSink> PlaybackScheduler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            next_start_time: 0.0,
            pending: HashMap::new(),
        }
    }

    /// Decodes one PCM16 chunk and schedules it immediately after whatever is
    /// already queued. Returns the sink id of the scheduled buffer.
    pub fn enqueue(&mut self, pcm: &[u8]) -> Result<u64, PlaybackError> {
        let samples = pcm::decode_pcm16(pcm);
        if samples.is_empty() {
            return Err(PlaybackError::EmptyChunk);
        }
        let duration = samples.len() as f64 / OUTPUT_SAMPLE_RATE as f64;
        let start_time = self.next_start_time.max(self.sink.current_clock());
        let id = self.sink.schedule(samples, start_time);
        self.next_start_time = start_time + duration;
        self.pending.insert(id, PendingChunk { duration });
        Ok(id)
    }

    /// Natural end-of-playback for one chunk. Unknown ids (already cleared by
    /// an interrupt) are a no-op, so the count never goes negative.
    pub fn on_chunk_ended(&mut self, id: u64) {
        self.pending.remove(&id);
    }

    /// Force-stops everything still queued or playing and resets the cursor
    /// to the device's current clock, so the next utterance starts with no
    /// residual scheduled-but-silent gap.
    pub fn interrupt_all(&mut self) {
        for id in self.pending.keys().copied().collect::<Vec<_>>() {
            self.sink.stop(id);
        }
        self.pending.clear();
        self.next_start_time = self.sink.current_clock();
    }

    /// Number of chunks queued or playing.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Total remaining duration of pending chunks, for status display.
    pub fn pending_duration(&self) -> f64 {
        self.pending.values().map(|c| c.duration).sum()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::OutputSink;

    /// In-memory sink with a manually driven clock.
    #[derive(Debug, Default)]
    pub struct FakeSink {
        pub clock: f64,
        pub next_id: u64,
        pub scheduled: Vec<(u64, f64, usize)>,
        pub stopped: Vec<u64>,
    }

    impl OutputSink for FakeSink {
        fn current_clock(&self) -> f64 {
            self.clock
        }

        fn schedule(&mut self, samples: Vec<f32>, start_time: f64) -> u64 {
            let id = self.next_id;
            self.next_id += 1;
            self.scheduled.push((id, start_time, samples.len()));
            id
        }

        fn stop(&mut self, id: u64) {
            self.stopped.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeSink;
    use super::*;

    fn chunk_of(duration_secs: f64) -> Vec<u8> {
        let samples = (duration_secs * OUTPUT_SAMPLE_RATE as f64).round() as usize;
        vec![0x01; samples * 2]
    }

    #[test]
    fn schedules_back_to_back_without_gaps() {
        let mut scheduler = PlaybackScheduler::new(FakeSink::default());

        let first = scheduler.enqueue(&chunk_of(0.5)).unwrap();
        let second = scheduler.enqueue(&chunk_of(0.7)).unwrap();

        let scheduled = &scheduler.sink.scheduled;
        assert_eq!(scheduled[0], (first, 0.0, 12_000));
        assert_eq!(scheduled[1], (second, 0.5, 16_800));
        assert!((scheduler.next_start_time() - 1.2).abs() < 1e-9);
        assert_eq!(scheduler.outstanding(), 2);
        assert!((scheduler.pending_duration() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn late_chunk_starts_at_the_current_clock() {
        let mut scheduler = PlaybackScheduler::new(FakeSink::default());
        scheduler.enqueue(&chunk_of(0.1)).unwrap();

        // Clock ran past the end of the first chunk before the next arrived.
        scheduler.sink.clock = 2.0;
        scheduler.enqueue(&chunk_of(0.1)).unwrap();

        assert_eq!(scheduler.sink.scheduled[1].1, 2.0);
        assert!((scheduler.next_start_time() - 2.1).abs() < 1e-9);
    }

    #[test]
    fn chunk_end_decrements_exactly_once() {
        let mut scheduler = PlaybackScheduler::new(FakeSink::default());
        let id = scheduler.enqueue(&chunk_of(0.2)).unwrap();

        scheduler.on_chunk_ended(id);
        assert_eq!(scheduler.outstanding(), 0);
        scheduler.on_chunk_ended(id);
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[test]
    fn interrupt_stops_everything_and_resets_the_cursor() {
        let mut scheduler = PlaybackScheduler::new(FakeSink::default());
        let first = scheduler.enqueue(&chunk_of(0.5)).unwrap();
        let second = scheduler.enqueue(&chunk_of(0.7)).unwrap();

        scheduler.sink.clock = 0.3;
        scheduler.interrupt_all();

        assert_eq!(scheduler.outstanding(), 0);
        assert_eq!(scheduler.sink.stopped.len(), 2);
        assert!(scheduler.sink.stopped.contains(&first));
        assert!(scheduler.sink.stopped.contains(&second));
        assert_eq!(scheduler.next_start_time(), 0.3);
    }

    #[test]
    fn interrupt_with_nothing_pending_is_a_noop() {
        let mut scheduler = PlaybackScheduler::new(FakeSink::default());
        scheduler.interrupt_all();
        assert_eq!(scheduler.outstanding(), 0);
        assert!(scheduler.sink.stopped.is_empty());
    }

    #[test]
    fn empty_chunk_is_rejected() {
        let mut scheduler = PlaybackScheduler::new(FakeSink::default());
        assert!(matches!(
            scheduler.enqueue(&[]),
            Err(PlaybackError::EmptyChunk)
        ));
        assert_eq!(scheduler.outstanding(), 0);
    }
}
