//! Beacon Voice - Real-time voice streaming for conversational AI backends
//!
//! This library provides the voice pipeline behind the Beacon voice client:
//! - PCM framing of microphone audio on the real-time audio thread
//! - Recording lifecycle and per-quantum forwarding to the backend
//! - Gapless scheduling of synthesized replies
//! - A bridge relaying client sessions to a realtime speech backend
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Voice client                      │
//! │  mic → FrameEncoder → CaptureController ──┐          │
//! │  speaker ← PlaybackScheduler ◄────────┐   │          │
//! └───────────────────────────────────────┼───┼──────────┘
//!                                         │   ▼ WebSocket
//! ┌───────────────────────────────────────┴──────────────┐
//! │                     Bridge                           │
//! │   audio_chunk/audio_commit ⇄ assistant_audio/_text   │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │              Realtime speech backend                 │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod voice;

pub use client::{Command, TextSink, VoiceClient};
pub use config::Config;
pub use error::{Error, Result};
pub use transport::{ChannelTransport, Outbound, ServerEvent, Transport};
pub use voice::{CaptureController, CaptureState, PcmFrame, PlaybackChunk, PlaybackScheduler};
