//! Voice client composition root
//!
//! Wires the capture controller, playback scheduler and transport together on
//! one cooperative loop. cpal streams are not `Send`, so the loop is meant to
//! run on a current-thread runtime.

use tokio::sync::mpsc;

use crate::transport::{ServerEvent, Transport};
use crate::transport::ws::Connection;
use crate::voice::{CaptureController, CaptureDevice, OutputFactory, PlaybackScheduler};

/// Receives assistant text for display; rendering is the caller's concern
pub trait TextSink {
    /// Handle one `assistant_text` message
    fn assistant_text(&mut self, text: &str);
}

impl<F: FnMut(&str)> TextSink for F {
    fn assistant_text(&mut self, text: &str) {
        self(text);
    }
}

/// User input driving the mic control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Press of the mic button
    Toggle,
    /// Leave the session
    Quit,
}

/// One voice conversation: mic in, assistant audio out
pub struct VoiceClient<D, T, F: OutputFactory, S> {
    controller: CaptureController<D, T>,
    scheduler: PlaybackScheduler<F>,
    text: S,
}

impl<D, T, F, S> VoiceClient<D, T, F, S>
where
    D: CaptureDevice,
    T: Transport,
    F: OutputFactory,
    S: TextSink,
{
    /// Assemble a client from its parts
    pub const fn new(
        controller: CaptureController<D, T>,
        scheduler: PlaybackScheduler<F>,
        text: S,
    ) -> Self {
        Self {
            controller,
            scheduler,
            text,
        }
    }

    /// Capture controller
    pub const fn controller(&self) -> &CaptureController<D, T> {
        &self.controller
    }

    /// Playback scheduler
    pub const fn scheduler(&self) -> &PlaybackScheduler<F> {
        &self.scheduler
    }

    /// Dispatch one inbound server event
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::AssistantAudio { audio } => {
                self.scheduler.handle_payload(&audio);
            }
            ServerEvent::AssistantText { text } => self.text.assistant_text(&text),
            ServerEvent::Error { message } => {
                tracing::warn!(message, "backend reported an error");
            }
        }
    }

    /// Apply one user command; returns `false` when the session should end
    ///
    /// A failed `start()` is reported and leaves the mic inactive; it is not
    /// retried.
    pub fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Toggle => {
                if let Err(e) = self.controller.toggle() {
                    tracing::error!(error = %e, "could not start recording");
                }
                true
            }
            Command::Quit => {
                self.controller.stop();
                false
            }
        }
    }

    /// Run until the user quits or the connection drops
    pub async fn run(&mut self, connection: &mut Connection, commands: &mut mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                Some(frame) = self.controller.next_frame() => {
                    self.controller.on_frame(frame);
                }
                event = connection.next_event() => {
                    let Some(event) = event else {
                        tracing::info!("voice backend disconnected");
                        self.controller.stop();
                        return;
                    };
                    self.handle_event(event);
                }
                command = commands.recv() => {
                    let command = command.unwrap_or(Command::Quit);
                    if !self.handle_command(command) {
                        return;
                    }
                }
            }
        }
    }
}
