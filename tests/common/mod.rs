//! Shared test utilities

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use beacon_voice::voice::{
    CaptureDevice, FrameEncoder, FrameSink, OutputDevice, OutputFactory, PlaybackChunk,
    QUANTUM_SAMPLES, SAMPLE_RATE,
};
use beacon_voice::{Error, Outbound, Result, Transport};

/// Microphone double that records lifecycle calls and exposes the frame sink
#[derive(Clone, Default)]
pub struct FakeMic {
    pub acquisitions: Rc<Cell<usize>>,
    pub deny: Rc<Cell<bool>>,
    pub sink: Rc<RefCell<Option<FrameSink>>>,
}

impl FakeMic {
    /// Push `quanta` blocks of silence through a real encoder into the sink
    pub fn produce_silence(&self, quanta: usize) {
        let sink = self.sink.borrow();
        let sink = sink.as_ref().expect("graph not built");
        let mut encoder = FrameEncoder::new(1);
        for _ in 0..quanta {
            sink.encode_into(&mut encoder, &[0.0; QUANTUM_SAMPLES]);
        }
    }
}

impl CaptureDevice for FakeMic {
    fn acquire(&mut self) -> Result<()> {
        self.acquisitions.set(self.acquisitions.get() + 1);
        if self.deny.get() {
            return Err(Error::DeviceUnavailable("permission denied".to_string()));
        }
        Ok(())
    }

    fn build_graph(&mut self, sink: FrameSink) -> Result<()> {
        *self.sink.borrow_mut() = Some(sink);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Transport double that keeps everything sent, in order
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub sent: Rc<RefCell<Vec<Outbound>>>,
}

impl RecordingTransport {
    /// Wire names of everything sent so far
    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.borrow().iter().map(Outbound::kind).collect()
    }

    /// Number of commit signals sent so far
    pub fn commits(&self) -> usize {
        self.sent
            .borrow()
            .iter()
            .filter(|m| matches!(m, Outbound::AudioCommit))
            .count()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, msg: Outbound) -> Result<()> {
        self.sent.borrow_mut().push(msg);
        Ok(())
    }
}

/// Output device with a clock the test moves by hand
#[derive(Clone, Default)]
pub struct ManualSpeaker {
    pub now: Rc<Cell<f64>>,
    pub starts: Rc<RefCell<Vec<f64>>>,
    pub opened: Rc<Cell<usize>>,
}

impl OutputDevice for ManualSpeaker {
    fn now(&self) -> f64 {
        self.now.get()
    }

    fn schedule(&mut self, start_at: f64, _chunk: PlaybackChunk) -> Result<()> {
        self.starts.borrow_mut().push(start_at);
        Ok(())
    }
}

impl OutputFactory for ManualSpeaker {
    type Device = Self;

    fn create(&mut self, _sample_rate: u32) -> Result<Self> {
        self.opened.set(self.opened.get() + 1);
        Ok(self.clone())
    }
}

/// Silent chunk lasting `ms` milliseconds at the backend rate
pub fn chunk_ms(ms: u32) -> PlaybackChunk {
    PlaybackChunk {
        samples: vec![0.0; (SAMPLE_RATE / 1000 * ms) as usize],
        sample_rate: SAMPLE_RATE,
    }
}
