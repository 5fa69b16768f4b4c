//! Audio device seams
//!
//! The controller and scheduler only talk to these traits so the pipeline can
//! be driven by cpal in production and by in-memory doubles in tests.

use super::SAMPLE_RATE;
use super::encoder::FrameSink;
use super::playback::PlaybackChunk;
use crate::Result;

/// Microphone side of the pipeline
pub trait CaptureDevice {
    /// Acquire the input device; called on every `start()`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceUnavailable`] if permission is denied or
    /// no hardware is present
    fn acquire(&mut self) -> Result<()>;

    /// Build the input → encoder graph, delivering frames into `sink`
    ///
    /// Called once, after the first successful acquisition. The graph keeps
    /// running for the lifetime of the device.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ModuleLoadFailure`] if the graph cannot be installed
    fn build_graph(&mut self, sink: FrameSink) -> Result<()>;

    /// Resume audio processing; must follow a user gesture
    ///
    /// # Errors
    ///
    /// Returns error if the device refuses to start
    fn resume(&mut self) -> Result<()>;

    /// Rate the graph captures at
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

/// Speaker side of the pipeline
pub trait OutputDevice {
    /// Current position of the device clock in seconds
    fn now(&self) -> f64;

    /// Hand a chunk to the device to start playing at `start_at` seconds
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot accept more audio
    fn schedule(&mut self, start_at: f64, chunk: PlaybackChunk) -> Result<()>;
}

/// Lazily opens output devices
pub trait OutputFactory {
    /// Device type produced
    type Device: OutputDevice;

    /// Open an output device running at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device exists
    fn create(&mut self, sample_rate: u32) -> Result<Self::Device>;
}
