//! Audio output through cpal
//!
//! ```text
//! PlaybackScheduler (main loop)        cpal output callback (RT thread)
//!        │                                       │
//!   schedule(start, chunk) ──► incoming ring ──► Mixer
//!        ▲                                       │
//!   reclaim ◄────────────────── retired ring ◄───┘
//!
//!                 sample clock (atomic) ◄── frames rendered
//! ```
//!
//! Chunk buffers are allocated and freed on the main loop only; the callback
//! moves them between the two rings.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream};

use super::device::{OutputDevice, OutputFactory};
use super::playback::PlaybackChunk;
use crate::{Error, Result};

/// Chunks that can be queued ahead of the output callback
const QUEUE_CAPACITY: usize = 256;

/// A chunk pinned to an absolute position on the sample clock
struct Scheduled {
    start_frame: u64,
    samples: Vec<f32>,
}

/// Callback-side state: plays queued chunks in start order
struct Mixer {
    incoming: rtrb::Consumer<Scheduled>,
    retired: rtrb::Producer<Scheduled>,
    current: Option<Scheduled>,
}

impl Mixer {
    const fn new(incoming: rtrb::Consumer<Scheduled>, retired: rtrb::Producer<Scheduled>) -> Self {
        Self {
            incoming,
            retired,
            current: None,
        }
    }

    /// Fill an interleaved buffer and advance the clock by its frame count
    fn render(&mut self, data: &mut [f32], channels: usize, clock: &AtomicU64) {
        let mut frame = clock.load(Ordering::Acquire);
        for out in data.chunks_mut(channels) {
            out.fill(self.next_sample(frame));
            frame += 1;
        }
        clock.store(frame, Ordering::Release);
    }

    /// Sample for absolute clock position `frame`
    ///
    /// Chunks are queued in start order and never overlap, so only one is
    /// audible at a time. A chunk picked up after its start frame has passed
    /// is moved to `frame` and plays from its first sample; the chunks behind
    /// it shift with it and stay contiguous.
    fn next_sample(&mut self, frame: u64) -> f32 {
        loop {
            if self.current.is_none() {
                let Ok(mut chunk) = self.incoming.pop() else {
                    return 0.0;
                };
                chunk.start_frame = chunk.start_frame.max(frame);
                self.current = Some(chunk);
            }

            let Some(chunk) = &self.current else {
                return 0.0;
            };
            if frame < chunk.start_frame {
                return 0.0;
            }
            #[allow(clippy::cast_possible_truncation)]
            let offset = (frame - chunk.start_frame) as usize;
            if let Some(&sample) = chunk.samples.get(offset) {
                return sample;
            }

            if let Some(done) = self.current.take() {
                // The retired ring holds every chunk in flight, so this never
                // fails while the main loop keeps reclaiming
                let _ = self.retired.push(done);
            }
        }
    }
}

/// Opens the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutputFactory;

impl OutputFactory for CpalOutputFactory {
    type Device = CpalOutput;

    fn create(&mut self, sample_rate: u32) -> Result<CpalOutput> {
        CpalOutput::open(sample_rate)
    }
}

/// Output stream that plays chunks at scheduled clock positions
pub struct CpalOutput {
    _stream: Stream,
    producer: rtrb::Producer<Scheduled>,
    retired: rtrb::Consumer<Scheduled>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no output device or matching config exists
    pub fn open(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

        let rate = SampleRate(sample_rate);
        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config.with_sample_rate(rate).config();
        let channels = usize::from(config.channels);

        let (producer, incoming) = rtrb::RingBuffer::<Scheduled>::new(QUEUE_CAPACITY);
        let (retired_tx, retired) = rtrb::RingBuffer::<Scheduled>::new(QUEUE_CAPACITY + 1);
        let clock = Arc::new(AtomicU64::new(0));
        let callback_clock = Arc::clone(&clock);
        let mut mixer = Mixer::new(incoming, retired_tx);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mixer.render(data, channels, &callback_clock);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio playback initialized"
        );

        Ok(Self {
            _stream: stream,
            producer,
            retired,
            clock,
            sample_rate,
        })
    }

    /// Sample frames rendered so far
    #[must_use]
    pub fn frames_played(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Free chunks the callback has finished with
    fn reclaim(&mut self) -> usize {
        let mut freed = 0;
        while self.retired.pop().is_ok() {
            freed += 1;
        }
        freed
    }
}

impl OutputDevice for CpalOutput {
    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        self.frames_played() as f64 / f64::from(self.sample_rate)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn schedule(&mut self, start_at: f64, chunk: PlaybackChunk) -> Result<()> {
        let freed = self.reclaim();
        if freed > 0 {
            tracing::trace!(freed, "reclaimed finished playback chunks");
        }

        let start_frame = (start_at * f64::from(self.sample_rate)).round().max(0.0) as u64;
        self.producer
            .push(Scheduled {
                start_frame,
                samples: chunk.samples,
            })
            .map_err(|_| Error::Audio("playback queue full".to_string()))
    }
}
