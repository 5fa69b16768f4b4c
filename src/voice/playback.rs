//! Gapless playback scheduling
//!
//! Inbound chunks are laid end to end on the output device's clock using a
//! "next free" cursor. A chunk never starts in the past: if the cursor has
//! fallen behind the device (starvation), the chunk starts immediately and the
//! gap is heard as silence.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::SAMPLE_RATE;
use super::device::{OutputDevice, OutputFactory};
use crate::{Error, Result};

/// Decoded block of assistant audio
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackChunk {
    /// Mono samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate of `samples`
    pub sample_rate: u32,
}

impl PlaybackChunk {
    /// Number of sample frames
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Decode a base64 int16 LE payload at the backend rate
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPlaybackPayload`] for invalid base64, a
    /// truncated sample or an empty payload
    pub fn from_base64(payload: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::MalformedPlaybackPayload(e.to_string()))?;

        if bytes.is_empty() {
            return Err(Error::MalformedPlaybackPayload("empty payload".to_string()));
        }
        if bytes.len() % 2 != 0 {
            return Err(Error::MalformedPlaybackPayload(format!(
                "odd byte count {}",
                bytes.len()
            )));
        }

        let samples = bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
            .collect();

        Ok(Self {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}

/// Schedules inbound chunks back to back on a lazily created output device
pub struct PlaybackScheduler<F: OutputFactory> {
    factory: F,
    device: Option<F::Device>,
    cursor: f64,
    scheduled: u64,
}

impl<F: OutputFactory> PlaybackScheduler<F> {
    /// Create a scheduler; no device is opened until the first chunk arrives
    pub const fn new(factory: F) -> Self {
        Self {
            factory,
            device: None,
            cursor: 0.0,
            scheduled: 0,
        }
    }

    /// Time on the device clock at which the device becomes free
    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Number of chunks handed to the device so far
    pub const fn scheduled(&self) -> u64 {
        self.scheduled
    }

    /// Output device, once created
    pub const fn device(&self) -> Option<&F::Device> {
        self.device.as_ref()
    }

    /// Decode and schedule one `assistant_audio` payload
    ///
    /// Malformed payloads are logged and dropped, leaving the timeline as it
    /// was. Returns the scheduled start time.
    pub fn handle_payload(&mut self, payload: &str) -> Option<f64> {
        let chunk = match PlaybackChunk::from_base64(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, len = payload.len(), "dropping playback chunk");
                return None;
            }
        };

        match self.enqueue(chunk) {
            Ok(start) => Some(start),
            Err(e) => {
                tracing::warn!(error = %e, "failed to schedule playback chunk");
                None
            }
        }
    }

    /// Schedule a decoded chunk right after everything already queued
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened or refuses the chunk
    pub fn enqueue(&mut self, chunk: PlaybackChunk) -> Result<f64> {
        if self.device.is_none() {
            let device = self.factory.create(chunk.sample_rate)?;
            self.cursor = device.now();
            tracing::debug!(sample_rate = chunk.sample_rate, "playback device opened");
            self.device = Some(device);
        }
        let Some(device) = self.device.as_mut() else {
            return Err(Error::Audio("output device missing".to_string()));
        };

        let start = self.cursor.max(device.now());
        let duration = chunk.duration();
        let frames = chunk.frame_count();

        device.schedule(start, chunk)?;

        self.cursor = start + duration;
        self.scheduled += 1;

        tracing::trace!(start, duration, frames, cursor = self.cursor, "chunk scheduled");
        Ok(start)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    /// Output device with a hand-driven clock
    #[derive(Clone, Default)]
    struct ManualOutput {
        now: Rc<Cell<f64>>,
        starts: Rc<RefCell<Vec<f64>>>,
    }

    impl OutputDevice for ManualOutput {
        fn now(&self) -> f64 {
            self.now.get()
        }

        fn schedule(&mut self, start_at: f64, _chunk: PlaybackChunk) -> Result<()> {
            self.starts.borrow_mut().push(start_at);
            Ok(())
        }
    }

    struct ManualFactory {
        output: ManualOutput,
        created: Rc<RefCell<Vec<u32>>>,
    }

    impl OutputFactory for ManualFactory {
        type Device = ManualOutput;

        fn create(&mut self, sample_rate: u32) -> Result<ManualOutput> {
            self.created.borrow_mut().push(sample_rate);
            Ok(self.output.clone())
        }
    }

    fn scheduler() -> (PlaybackScheduler<ManualFactory>, ManualOutput, Rc<RefCell<Vec<u32>>>) {
        let output = ManualOutput::default();
        let created = Rc::new(RefCell::new(Vec::new()));
        let factory = ManualFactory {
            output: output.clone(),
            created: Rc::clone(&created),
        };
        (PlaybackScheduler::new(factory), output, created)
    }

    fn chunk_ms(ms: usize) -> PlaybackChunk {
        PlaybackChunk {
            samples: vec![0.0; ms * 24],
            sample_rate: SAMPLE_RATE,
        }
    }

    #[test]
    fn decodes_int16_le() {
        let payload = STANDARD.encode([0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00]);
        let chunk = PlaybackChunk::from_base64(&payload).unwrap();
        assert_eq!(chunk.samples, vec![-1.0, 32767.0 / 32768.0, 0.0]);
        assert_eq!(chunk.sample_rate, 24000);
    }

    #[test]
    fn rejects_bad_payloads() {
        assert!(PlaybackChunk::from_base64("not-base64!!").is_err());
        assert!(PlaybackChunk::from_base64("").is_err());
        assert!(PlaybackChunk::from_base64(&STANDARD.encode([1, 2, 3])).is_err());
    }

    #[test]
    fn device_created_lazily_once() {
        let (mut sched, _output, created) = scheduler();
        assert!(sched.device().is_none());

        sched.enqueue(chunk_ms(10)).unwrap();
        sched.enqueue(chunk_ms(10)).unwrap();

        assert_eq!(*created.borrow(), vec![24000]);
    }

    #[test]
    fn back_to_back_chunks_are_contiguous() {
        let (mut sched, output, _) = scheduler();
        output.now.set(1.0);

        let c1 = sched.enqueue(chunk_ms(200)).unwrap();
        let c2 = sched.enqueue(chunk_ms(300)).unwrap();

        assert!((c1 - 1.0).abs() < 1e-9);
        assert!((c2 - (c1 + 0.2)).abs() < 1e-9);
        assert!((sched.cursor() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn burst_arrival_never_overlaps() {
        let (mut sched, output, _) = scheduler();

        for _ in 0..5 {
            sched.enqueue(chunk_ms(100)).unwrap();
        }

        let starts = output.starts.borrow();
        for pair in starts.windows(2) {
            assert!((pair[1] - pair[0] - 0.1).abs() < 1e-9);
        }
    }

    #[test]
    fn starvation_restarts_at_device_now() {
        let (mut sched, output, _) = scheduler();

        sched.enqueue(chunk_ms(200)).unwrap();
        output.now.set(5.2);
        let c2 = sched.enqueue(chunk_ms(100)).unwrap();

        assert!((c2 - 5.2).abs() < 1e-9);
        assert!((sched.cursor() - 5.3).abs() < 1e-9);
    }

    #[test]
    fn malformed_payload_leaves_cursor() {
        let (mut sched, output, _) = scheduler();
        sched.enqueue(chunk_ms(200)).unwrap();
        let cursor = sched.cursor();

        assert!(sched.handle_payload("not-base64!!").is_none());

        assert!((sched.cursor() - cursor).abs() < f64::EPSILON);
        assert_eq!(sched.scheduled(), 1);
        assert_eq!(output.starts.borrow().len(), 1);
    }
}
