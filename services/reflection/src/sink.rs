//! Output device backend: a cpal stream whose callback mixes scheduled
//! buffers at their assigned positions on a sample-counter clock.

use std::sync::{Arc, Mutex};

use reflection_core::playback::{OUTPUT_SAMPLE_RATE, OutputSink};

use crate::event_loop::Input;

#[derive(Debug)]
struct Scheduled {
    id: u64,
    start_sample: u64,
    samples: Vec<f32>,
}

impl Scheduled {
    fn end_sample(&self) -> u64 {
        self.start_sample + self.samples.len() as u64
    }
}

#[derive(Debug, Default)]
struct SinkState {
    /// Samples rendered since the stream started; the playback clock.
    clock_samples: u64,
    next_id: u64,
    scheduled: Vec<Scheduled>,
    /// Completions not yet delivered to the event loop. Normally drained
    /// every block; survives a momentarily full queue.
    pending_ended: Vec<u64>,
}

/// Fills one interleaved output block from the scheduled buffers, advances
/// the clock, and returns the ids of buffers that finished inside it. The
/// mono signal is duplicated to the first two channels; extra channels stay
/// silent.
fn mix_into(state: &mut SinkState, data: &mut [f32], channels: usize) -> Vec<u64> {
    data.fill(0.0);
    let frames = data.len() / channels;

    for frame in 0..frames {
        let t = state.clock_samples + frame as u64;
        let mut value = 0.0f32;
        for chunk in &state.scheduled {
            if t >= chunk.start_sample {
                if let Some(sample) = chunk.samples.get((t - chunk.start_sample) as usize) {
                    value += sample;
                }
            }
        }
        if value != 0.0 {
            for ch in 0..channels.min(2) {
                data[frame * channels + ch] = value;
            }
        }
    }

    state.clock_samples += frames as u64;
    let clock = state.clock_samples;

    let mut ended = Vec::new();
    state.scheduled.retain(|chunk| {
        if chunk.end_sample() <= clock {
            ended.push(chunk.id);
            false
        } else {
            true
        }
    });
    ended
}

/// Cloneable handle over the shared sink state. The event loop schedules and
/// stops buffers through the [`OutputSink`] impl; the cpal callback renders
/// them and reports completions back into the loop.
#[derive(Clone, Default)]
pub struct CpalOutputSink {
    state: Arc<Mutex<SinkState>>,
}

impl CpalOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Builds the data callback for the cpal output stream.
    pub fn callback(
        &self,
        channels: usize,
        ended_tx: tokio::sync::mpsc::Sender<Input>,
    ) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
        let state = Arc::clone(&self.state);
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            {
                let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                let ended = mix_into(&mut state, data, channels);
                state.pending_ended.extend(ended);
            }
            flush_ended(&state, &ended_tx);
        }
    }
}

/// Delivers pending completions to the event loop. A full queue keeps the
/// undelivered ids for the next block; losing one would leave the turn's
/// outstanding count permanently above zero.
fn flush_ended(state: &Mutex<SinkState>, ended_tx: &tokio::sync::mpsc::Sender<Input>) {
    let pending = {
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut state.pending_ended)
    };
    for (index, id) in pending.iter().enumerate() {
        if ended_tx.try_send(Input::ChunkEnded(*id)).is_err() {
            let undelivered = &pending[index..];
            tracing::warn!(
                "event loop queue full; retrying {} chunk-ended notifications next block",
                undelivered.len()
            );
            state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pending_ended
                .extend_from_slice(undelivered);
            return;
        }
    }
}

impl OutputSink for CpalOutputSink {
    fn current_clock(&self) -> f64 {
        self.lock().clock_samples as f64 / OUTPUT_SAMPLE_RATE as f64
    }

    fn schedule(&mut self, samples: Vec<f32>, start_time: f64) -> u64 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.scheduled.push(Scheduled {
            id,
            start_sample: (start_time * OUTPUT_SAMPLE_RATE as f64).round() as u64,
            samples,
        });
        id
    }

    fn stop(&mut self, id: u64) {
        // Removing the buffer silences it; no end notification is emitted,
        // not even one already waiting for delivery.
        let mut state = self.lock();
        state.scheduled.retain(|chunk| chunk.id != id);
        state.pending_ended.retain(|&pending| pending != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(samples: u64) -> f64 {
        samples as f64 / OUTPUT_SAMPLE_RATE as f64
    }

    #[test]
    fn renders_a_buffer_at_its_scheduled_position() {
        let mut sink = CpalOutputSink::new();
        let id = sink.schedule(vec![0.5; 4], secs(2));

        let mut out = vec![0.0f32; 8];
        let ended = mix_into(&mut sink.lock(), &mut out, 1);

        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
        assert_eq!(ended, vec![id]);
        assert!((sink.current_clock() - secs(8)).abs() < 1e-9);
    }

    #[test]
    fn buffer_spanning_blocks_ends_in_the_second_block() {
        let mut sink = CpalOutputSink::new();
        let id = sink.schedule(vec![0.25; 6], 0.0);

        let mut out = vec![0.0f32; 4];
        assert!(mix_into(&mut sink.lock(), &mut out, 1).is_empty());
        assert_eq!(out, vec![0.25; 4]);

        let ended = mix_into(&mut sink.lock(), &mut out, 1);
        assert_eq!(ended, vec![id]);
        assert_eq!(out, vec![0.25, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn mono_is_duplicated_to_the_first_two_channels_only() {
        let mut sink = CpalOutputSink::new();
        sink.schedule(vec![0.5; 2], 0.0);

        let mut out = vec![0.0f32; 6]; // 2 frames x 3 channels
        mix_into(&mut sink.lock(), &mut out, 3);
        assert_eq!(out, vec![0.5, 0.5, 0.0, 0.5, 0.5, 0.0]);
    }

    #[test]
    fn stopped_buffer_is_silenced_without_notification() {
        let mut sink = CpalOutputSink::new();
        let id = sink.schedule(vec![0.5; 4], 0.0);
        sink.stop(id);

        let mut out = vec![0.0f32; 4];
        let ended = mix_into(&mut sink.lock(), &mut out, 1);
        assert!(ended.is_empty());
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn completion_blocked_by_a_full_queue_is_retried_next_block() {
        let mut sink = CpalOutputSink::new();
        let id = sink.schedule(vec![0.5; 2], 0.0);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        tx.try_send(Input::Tick).expect("queue starts empty");

        let mut out = vec![0.0f32; 4];
        {
            let mut state = sink.lock();
            let ended = mix_into(&mut state, &mut out, 1);
            state.pending_ended.extend(ended);
        }

        // Queue full: the completion is held, not lost.
        flush_ended(&sink.state, &tx);
        assert_eq!(sink.lock().pending_ended, vec![id]);

        // The loop drained; the next block delivers it.
        assert!(matches!(rx.try_recv(), Ok(Input::Tick)));
        flush_ended(&sink.state, &tx);
        assert!(sink.lock().pending_ended.is_empty());
        assert!(matches!(rx.try_recv(), Ok(Input::ChunkEnded(ended)) if ended == id));
    }

    #[test]
    fn stop_discards_a_held_completion() {
        let mut sink = CpalOutputSink::new();
        let id = sink.schedule(vec![0.5; 2], 0.0);

        let mut out = vec![0.0f32; 4];
        {
            let mut state = sink.lock();
            let ended = mix_into(&mut state, &mut out, 1);
            state.pending_ended.extend(ended);
        }
        sink.stop(id);

        assert!(sink.lock().pending_ended.is_empty());
    }

    #[test]
    fn clock_is_monotonic_across_empty_blocks() {
        let sink = CpalOutputSink::new();
        let mut out = vec![0.0f32; 4];
        mix_into(&mut sink.lock(), &mut out, 2);
        let first = sink.current_clock();
        mix_into(&mut sink.lock(), &mut out, 2);
        assert!(sink.current_clock() > first);
    }
}
