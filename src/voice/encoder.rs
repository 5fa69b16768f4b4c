//! Float to 16-bit PCM framing
//!
//! Everything in this module may run on the real-time input thread, so none
//! of it blocks, logs or touches shared state beyond an atomic counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// Samples per quantum (one real-time render block)
pub const QUANTUM_SAMPLES: usize = 128;

/// Positive int16 full scale used when encoding
pub const FULL_SCALE: f32 = 32767.0;

/// Encode one normalized sample as int16
///
/// Scales by 32767, rounds half away from zero, then clamps to the int16
/// range so out-of-range input saturates instead of wrapping. NaN encodes to 0.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_sample(sample: f32) -> i16 {
    (sample * FULL_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// One quantum of int16 PCM, moved (never copied) from encoder to transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    samples: Box<[i16]>,
}

impl PcmFrame {
    /// Encode a slice of normalized samples into a frame
    #[must_use]
    pub fn from_f32(samples: &[f32]) -> Self {
        samples.iter().copied().map(encode_sample).collect::<Vec<_>>().into()
    }

    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame carries no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encoded samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Size of the frame on the wire
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    /// Serialize as raw little-endian int16, consuming the frame
    #[must_use]
    pub fn into_le_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        for sample in &*self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

impl From<Vec<i16>> for PcmFrame {
    fn from(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }
}

/// Accumulates device callback buffers into fixed-size quanta
///
/// Device callbacks deliver whatever buffer size the host picks; the encoder
/// re-blocks that into exact [`QUANTUM_SAMPLES`] frames. Multi-channel input
/// is reduced to its first channel.
#[derive(Debug)]
pub struct FrameEncoder {
    channels: usize,
    current: Vec<i16>,
}

impl FrameEncoder {
    /// Create an encoder for interleaved input with the given channel count
    #[must_use]
    pub fn new(channels: u16) -> Self {
        Self {
            channels: usize::from(channels.max(1)),
            current: Vec::with_capacity(QUANTUM_SAMPLES),
        }
    }

    /// Feed interleaved samples, invoking `emit` for every completed quantum
    pub fn push(&mut self, input: &[f32], mut emit: impl FnMut(PcmFrame)) {
        for &sample in input.iter().step_by(self.channels) {
            self.current.push(encode_sample(sample));
            if self.current.len() == QUANTUM_SAMPLES {
                let full = std::mem::replace(
                    &mut self.current,
                    Vec::with_capacity(QUANTUM_SAMPLES),
                );
                emit(PcmFrame::from(full));
            }
        }
    }

    /// Samples waiting for the current quantum to fill
    #[must_use]
    pub fn pending(&self) -> usize {
        self.current.len()
    }
}

/// Audio-thread end of the frame channel
///
/// Delivery never blocks: if the main loop has fallen behind and the channel
/// is full, the frame is dropped and counted.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<PcmFrame>,
    overflow: Arc<AtomicU64>,
}

impl FrameSink {
    /// Wrap a bounded sender
    #[must_use]
    pub fn new(tx: mpsc::Sender<PcmFrame>, overflow: Arc<AtomicU64>) -> Self {
        Self { tx, overflow }
    }

    /// Hand a frame to the main loop
    pub fn deliver(&self, frame: PcmFrame) {
        if self.tx.try_send(frame).is_err() {
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Encode a callback buffer and deliver every completed quantum
    pub fn encode_into(&self, encoder: &mut FrameEncoder, input: &[f32]) {
        encoder.push(input, |frame| self.deliver(frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_clamps_out_of_range() {
        assert_eq!(encode_sample(1.5), 32767);
        assert_eq!(encode_sample(-1.5), -32768);
        assert_eq!(encode_sample(f32::INFINITY), 32767);
        assert_eq!(encode_sample(f32::NEG_INFINITY), -32768);
    }

    #[test]
    fn encode_full_scale() {
        assert_eq!(encode_sample(1.0), 32767);
        assert_eq!(encode_sample(-1.0), -32767);
        assert_eq!(encode_sample(0.0), 0);
    }

    #[test]
    fn encode_rounds_half_away_from_zero() {
        // 0.5 * 32767 = 16383.5
        assert_eq!(encode_sample(0.5), 16384);
        assert_eq!(encode_sample(-0.5), -16384);
    }

    #[test]
    fn encode_nan_is_silence() {
        assert_eq!(encode_sample(f32::NAN), 0);
    }

    #[test]
    fn frame_byte_length_is_twice_samples() {
        let frame = PcmFrame::from_f32(&[0.25; QUANTUM_SAMPLES]);
        assert_eq!(frame.len(), QUANTUM_SAMPLES);
        assert_eq!(frame.byte_len(), 2 * QUANTUM_SAMPLES);
        assert_eq!(frame.into_le_bytes().len(), 2 * QUANTUM_SAMPLES);
    }

    #[test]
    fn frame_bytes_are_little_endian() {
        let frame = PcmFrame::from(vec![1, -2, 0x1234]);
        assert_eq!(frame.into_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
    }

    #[test]
    fn encoder_reblocks_into_quanta() {
        let mut encoder = FrameEncoder::new(1);
        let mut frames = Vec::new();

        encoder.push(&[0.0; 100], |f| frames.push(f));
        assert!(frames.is_empty());
        assert_eq!(encoder.pending(), 100);

        encoder.push(&[0.0; 300], |f| frames.push(f));
        assert_eq!(frames.len(), 3);
        assert_eq!(encoder.pending(), 400 - 3 * QUANTUM_SAMPLES);
        assert!(frames.iter().all(|f| f.len() == QUANTUM_SAMPLES));
    }

    #[test]
    fn encoder_preserves_order() {
        let mut encoder = FrameEncoder::new(1);
        let input: Vec<f32> = (0..QUANTUM_SAMPLES * 2)
            .map(|i| if i < QUANTUM_SAMPLES { 0.1 } else { -0.1 })
            .collect();
        let mut frames = Vec::new();
        encoder.push(&input, |f| frames.push(f));

        assert_eq!(frames.len(), 2);
        assert!(frames[0].samples().iter().all(|&s| s > 0));
        assert!(frames[1].samples().iter().all(|&s| s < 0));
    }

    #[test]
    fn encoder_takes_first_channel() {
        let mut encoder = FrameEncoder::new(2);
        let stereo: Vec<f32> = (0..QUANTUM_SAMPLES * 2)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let mut frames = Vec::new();
        encoder.push(&stereo, |f| frames.push(f));

        assert_eq!(frames.len(), 1);
        assert!(frames[0].samples().iter().all(|&s| s == 32767));
    }

    #[test]
    fn sink_counts_overflow_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let overflow = Arc::new(AtomicU64::new(0));
        let sink = FrameSink::new(tx, Arc::clone(&overflow));

        sink.deliver(PcmFrame::from(vec![1]));
        sink.deliver(PcmFrame::from(vec![2]));

        assert_eq!(overflow.load(Ordering::Relaxed), 1);
        assert_eq!(rx.try_recv().unwrap().samples(), &[1]);
        assert!(rx.try_recv().is_err());
    }
}
