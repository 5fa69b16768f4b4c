//! Microphone capture through cpal

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, SupportedStreamConfig};

use super::SAMPLE_RATE;
use super::device::CaptureDevice;
use super::encoder::{FrameEncoder, FrameSink};
use crate::{Error, Result};

/// Scratch space for converting integer input, sized for typical host buffers
const SCRATCH_CAPACITY: usize = 4096;

/// Captures audio from the default input device
pub struct CpalCapture {
    sample_rate: u32,
    device: Option<Device>,
    config: Option<SupportedStreamConfig>,
    stream: Option<Stream>,
}

impl CpalCapture {
    /// Create a capture device that opens the default input at 24 kHz
    #[must_use]
    pub const fn new() -> Self {
        Self::with_sample_rate(SAMPLE_RATE)
    }

    /// Create a capture device for a specific sample rate
    #[must_use]
    pub const fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            device: None,
            config: None,
            stream: None,
        }
    }

    /// Whether the input graph has been built
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn find_config(&self, device: &Device) -> Result<SupportedStreamConfig> {
        let rate = SampleRate(self.sample_rate);
        let candidates: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .filter(|c| matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16))
            .collect();

        // Prefer mono float, then any mono, then anything at the right rate
        candidates
            .iter()
            .find(|c| c.channels() == 1 && c.sample_format() == SampleFormat::F32)
            .or_else(|| candidates.iter().find(|c| c.channels() == 1))
            .or_else(|| candidates.first())
            .cloned()
            .map(|c| c.with_sample_rate(rate))
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!(
                    "no input config supports {} Hz",
                    self.sample_rate
                ))
            })
    }
}

impl Default for CpalCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for CpalCapture {
    fn acquire(&mut self) -> Result<()> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let config = self.find_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = self.sample_rate,
            channels = config.channels(),
            format = ?config.sample_format(),
            "capture device acquired"
        );

        self.device = Some(device);
        self.config = Some(config);
        Ok(())
    }

    fn build_graph(&mut self, sink: FrameSink) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (Some(device), Some(supported)) = (&self.device, &self.config) else {
            return Err(Error::ModuleLoadFailure(
                "capture device not acquired".to_string(),
            ));
        };

        let config = supported.config();
        let mut encoder = FrameEncoder::new(config.channels);
        let on_error = |err: cpal::StreamError| tracing::error!(error = %err, "audio capture error");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.encode_into(&mut encoder, data);
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => {
                let mut scratch = Vec::with_capacity(SCRATCH_CAPACITY);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        scratch.clear();
                        scratch.extend(data.iter().map(|&s| f32::from(s) / 32768.0));
                        sink.encode_into(&mut encoder, &scratch);
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(Error::ModuleLoadFailure(format!(
                    "unsupported sample format {other:?}"
                )));
            }
        }
        .map_err(|e| Error::ModuleLoadFailure(e.to_string()))?;

        self.stream = Some(stream);
        tracing::debug!("capture graph installed");
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let Some(stream) = &self.stream else {
            return Err(Error::Audio("capture graph not built".to_string()));
        };
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio capture resumed");
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
