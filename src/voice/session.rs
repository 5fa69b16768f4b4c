//! Capture session controller
//!
//! Owns the recording state machine and forwards encoded frames to the
//! transport. The audio graph, once built, runs continuously; the state only
//! decides whether frames are forwarded and whether `stop()` commits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};

use super::device::CaptureDevice;
use super::encoder::{FrameSink, PcmFrame};
use crate::transport::{Outbound, Transport};
use crate::{Error, Result};

/// Frames buffered between the audio thread and the main loop (~340ms)
pub const DEFAULT_FRAME_CAPACITY: usize = 64;

/// Recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Not forwarding audio
    #[default]
    Idle,
    /// Forwarding every captured frame
    Recording,
}

/// Mutable session bookkeeping, reused across start/stop cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSession {
    /// Current recording state
    pub state: CaptureState,
    /// Capture sample rate
    pub sample_rate: u32,
    /// Frames forwarded to the transport since creation
    pub frames_sent: u64,
}

/// Drives capture start/stop and frame forwarding
pub struct CaptureController<D, T> {
    device: D,
    transport: T,
    session: CaptureSession,
    graph_built: bool,
    module_error: Option<String>,
    sink: FrameSink,
    frames: mpsc::Receiver<PcmFrame>,
    overflow: Arc<AtomicU64>,
    overflow_reported: u64,
    ui: watch::Sender<CaptureState>,
}

impl<D: CaptureDevice, T: Transport> CaptureController<D, T> {
    /// Create a controller with the default frame buffer
    pub fn new(device: D, transport: T) -> Self {
        Self::with_capacity(device, transport, DEFAULT_FRAME_CAPACITY)
    }

    /// Create a controller buffering up to `capacity` frames from the audio thread
    pub fn with_capacity(device: D, transport: T, capacity: usize) -> Self {
        let (tx, frames) = mpsc::channel(capacity.max(1));
        let overflow = Arc::new(AtomicU64::new(0));
        let (ui, _) = watch::channel(CaptureState::Idle);
        let sample_rate = device.sample_rate();

        Self {
            device,
            transport,
            session: CaptureSession {
                state: CaptureState::Idle,
                sample_rate,
                frames_sent: 0,
            },
            graph_built: false,
            module_error: None,
            sink: FrameSink::new(tx, Arc::clone(&overflow)),
            frames,
            overflow,
            overflow_reported: 0,
            ui,
        }
    }

    /// Current session snapshot
    pub const fn session(&self) -> CaptureSession {
        self.session
    }

    /// Current recording state
    pub const fn state(&self) -> CaptureState {
        self.session.state
    }

    /// Whether audio is being forwarded
    pub fn is_recording(&self) -> bool {
        self.session.state == CaptureState::Recording
    }

    /// Watch recording state changes (drives the mic control)
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.ui.subscribe()
    }

    /// Sender side the audio graph delivers frames into
    pub fn frame_sink(&self) -> FrameSink {
        self.sink.clone()
    }

    /// Capture device
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Begin recording
    ///
    /// No-op if already recording.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the microphone cannot be
    /// acquired and [`Error::ModuleLoadFailure`] if the audio graph cannot be
    /// installed. Either way the state stays Idle; nothing is retried.
    pub fn start(&mut self) -> Result<()> {
        if self.is_recording() {
            return Ok(());
        }

        if let Some(reason) = &self.module_error {
            tracing::warn!(reason, "capture unavailable for this session");
            return Err(Error::ModuleLoadFailure(reason.clone()));
        }

        if let Err(e) = self.device.acquire() {
            tracing::warn!(error = %e, "capture device unavailable");
            return Err(e);
        }

        if !self.graph_built {
            if let Err(e) = self.device.build_graph(self.sink.clone()) {
                tracing::warn!(error = %e, "failed to install capture graph");
                self.module_error = Some(e.to_string());
                return Err(match e {
                    Error::ModuleLoadFailure(_) => e,
                    other => Error::ModuleLoadFailure(other.to_string()),
                });
            }
            self.graph_built = true;
        }

        self.device.resume()?;

        // Frames captured while idle belong to no utterance
        let stale = self.discard_pending();
        if stale > 0 {
            tracing::trace!(stale, "discarded frames captured while idle");
        }

        self.set_state(CaptureState::Recording);
        tracing::info!(sample_rate = self.session.sample_rate, "recording started");
        Ok(())
    }

    /// End the utterance
    ///
    /// No-op if not recording. Frames already captured are forwarded before
    /// the single commit signal.
    pub fn stop(&mut self) {
        if !self.is_recording() {
            return;
        }

        self.forward_pending();
        self.set_state(CaptureState::Idle);

        if let Err(e) = self.transport.send(Outbound::AudioCommit) {
            tracing::warn!(error = %e, "failed to send audio commit");
        }

        tracing::info!(frames_sent = self.session.frames_sent, "recording stopped");
    }

    /// Start if idle, stop if recording
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::start`]
    pub fn toggle(&mut self) -> Result<()> {
        if self.is_recording() {
            self.stop();
            Ok(())
        } else {
            self.start()
        }
    }

    /// Handle one frame from the audio thread
    ///
    /// Forwarded as its own `audio_chunk` while recording, discarded otherwise.
    pub fn on_frame(&mut self, frame: PcmFrame) {
        if !self.is_recording() {
            return;
        }

        if let Err(e) = self.transport.send(Outbound::AudioChunk(frame)) {
            tracing::warn!(error = %e, "failed to send audio chunk");
            return;
        }
        self.session.frames_sent += 1;
    }

    /// Forward every frame already waiting in the channel, in order
    ///
    /// Returns the number of frames taken from the channel.
    pub fn forward_pending(&mut self) -> usize {
        let mut taken = 0;
        while let Ok(frame) = self.frames.try_recv() {
            self.on_frame(frame);
            taken += 1;
        }
        self.report_overflow();
        taken
    }

    /// Wait for the next frame from the audio thread
    pub async fn next_frame(&mut self) -> Option<PcmFrame> {
        let frame = self.frames.recv().await;
        self.report_overflow();
        frame
    }

    fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.frames.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    fn report_overflow(&mut self) {
        let total = self.overflow.load(Ordering::Relaxed);
        if total > self.overflow_reported {
            tracing::warn!(
                dropped = total - self.overflow_reported,
                total,
                "main loop fell behind, capture frames dropped"
            );
            self.overflow_reported = total;
        }
    }

    fn set_state(&mut self, state: CaptureState) {
        self.session.state = state;
        self.ui.send_replace(state);
    }
}
