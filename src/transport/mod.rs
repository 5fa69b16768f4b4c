//! Bidirectional message channel between the voice client and the backend
//!
//! The core only ever sees the [`Transport`] trait: sends are fire-and-forget
//! and never wait for the backend.

mod protocol;
pub mod ws;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub use protocol::{ClientControl, Outbound, ServerEvent};

use crate::{Error, Result};

/// Outbound half of the message channel
pub trait Transport {
    /// Queue a message for delivery without waiting for it to be written
    ///
    /// # Errors
    ///
    /// Returns error if the channel is closed or its queue is full
    fn send(&self, msg: Outbound) -> Result<()>;
}

/// [`Transport`] backed by a bounded queue drained by a writer task
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelTransport {
    /// Create a transport and the receiving end its writer drains
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, msg: Outbound) -> Result<()> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(msg) => {
                Error::Transport(format!("outbound queue full, dropped {}", msg.kind()))
            }
            TrySendError::Closed(_) => Error::Transport("channel closed".to_string()),
        })
    }
}
