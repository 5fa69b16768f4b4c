//! Wire messages exchanged between voice client and bridge
//!
//! Audio chunks travel as binary WebSocket frames (raw int16 LE). Everything
//! else is JSON tagged by `type`.

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::voice::PcmFrame;
use crate::Result;

/// Message sent from the client to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One quantum of captured audio
    AudioChunk(PcmFrame),
    /// End of utterance marker
    AudioCommit,
}

impl Outbound {
    /// Event name as used on the wire
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AudioChunk(_) => "audio_chunk",
            Self::AudioCommit => "audio_commit",
        }
    }

    /// Encode as a WebSocket message
    ///
    /// # Errors
    ///
    /// Returns error if the control message cannot be serialized
    pub fn into_message(self) -> Result<Message> {
        match self {
            Self::AudioChunk(frame) => Ok(Message::Binary(frame.into_le_bytes())),
            Self::AudioCommit => Ok(Message::Text(serde_json::to_string(
                &ClientControl::AudioCommit,
            )?)),
        }
    }
}

/// Text control messages sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    /// End of utterance marker
    AudioCommit,
}

/// Events pushed from the backend to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Synthesized speech, base64 int16 LE PCM at 24 kHz
    AssistantAudio { audio: String },
    /// Assistant text for the chat view
    AssistantText { text: String },
    /// Backend failure reported by the bridge
    Error { message: String },
}
