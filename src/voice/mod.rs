//! Voice processing module
//!
//! Handles microphone capture, PCM framing, and gapless playback of
//! assistant audio.

mod capture;
mod device;
mod encoder;
mod output;
mod playback;
mod session;

pub use capture::CpalCapture;
pub use device::{CaptureDevice, OutputDevice, OutputFactory};
pub use encoder::{FULL_SCALE, FrameEncoder, FrameSink, PcmFrame, QUANTUM_SAMPLES, encode_sample};
pub use output::{CpalOutput, CpalOutputFactory};
pub use playback::{PlaybackChunk, PlaybackScheduler};
pub use session::{
    CaptureController, CaptureSession, CaptureState, DEFAULT_FRAME_CAPACITY,
};

/// Sample rate shared with the backend for both directions
pub const SAMPLE_RATE: u32 = 24000;
