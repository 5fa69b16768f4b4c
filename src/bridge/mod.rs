//! Voice bridge server
//!
//! Accepts voice client WebSockets at `/voice` and relays each one to its own
//! realtime backend session.
//!
//! ```text
//! client ──audio_chunk/audio_commit──► bridge ──append/commit──► realtime
//! client ◄─assistant_audio/_text────── bridge ◄──server events── realtime
//! ```

pub mod realtime;

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tower_http::trace::TraceLayer;

use crate::config::BridgeConfig;
use crate::transport::{ClientControl, ServerEvent};
use crate::{Error, Result};

/// Shared state for bridge handlers
#[derive(Debug)]
pub struct BridgeState {
    config: BridgeConfig,
}

impl BridgeState {
    /// Create bridge state
    #[must_use]
    pub const fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

/// What a client WebSocket message asks the bridge to do
#[derive(Debug, PartialEq, Eq)]
pub enum Upstream {
    /// Raw pcm16 to append to the utterance
    Audio(Vec<u8>),
    /// End of utterance
    Commit,
    /// Client is going away
    Close,
    /// Nothing to relay
    Ignore,
}

impl Upstream {
    /// Classify a client WebSocket message
    #[must_use]
    pub fn from_message(msg: Message) -> Self {
        match msg {
            Message::Binary(data) => Self::Audio(data.to_vec()),
            Message::Text(text) => match serde_json::from_str::<ClientControl>(text.as_str()) {
                Ok(ClientControl::AudioCommit) => Self::Commit,
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring unknown client message");
                    Self::Ignore
                }
            },
            Message::Close(_) => Self::Close,
            Message::Ping(_) | Message::Pong(_) => Self::Ignore,
        }
    }
}

/// Build bridge router
pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/voice", get(ws_upgrade))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the bridge until interrupted
///
/// # Errors
///
/// Returns error if no API key is configured or the port cannot be bound
pub async fn serve(config: BridgeConfig) -> Result<()> {
    if config.api_key.is_none() {
        return Err(Error::Config(
            "OPENAI_API_KEY is required for the bridge".to_string(),
        ));
    }

    let port = config.port;
    let app = router(Arc::new(BridgeState::new(config)));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;

    tracing::info!(port, "voice bridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down voice bridge");
        })
        .await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(State(state): State<Arc<BridgeState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Relay one client session
async fn handle_socket(socket: WebSocket, state: Arc<BridgeState>) {
    let session_id = uuid::Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let (mut upstream, mut events) = match realtime::connect(&state.config).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(%session_id, error = %e, "failed to open realtime session");
            let error = ServerEvent::Error {
                message: e.to_string(),
            };
            if let Ok(msg) = serde_json::to_string(&error) {
                let _ = sender.send(Message::Text(msg.into())).await;
            }
            return;
        }
    };

    tracing::info!(%session_id, "voice client connected");

    let mut recv_task = tokio::spawn(async move {
        let mut chunks = 0u64;
        while let Some(Ok(msg)) = receiver.next().await {
            let result = match Upstream::from_message(msg) {
                Upstream::Audio(pcm) => {
                    chunks += 1;
                    upstream.push_pcm(&pcm).await
                }
                Upstream::Commit => {
                    tracing::debug!(%session_id, chunks, "utterance committed");
                    chunks = 0;
                    upstream.commit().await
                }
                Upstream::Close => break,
                Upstream::Ignore => Ok(()),
            };
            if let Err(e) = result {
                tracing::warn!(%session_id, error = %e, "realtime send failed");
                break;
            }
        }
        upstream.close().await;
    });

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!(%session_id, "voice client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_is_audio() {
        let msg = Message::Binary(vec![1, 0, 2, 0].into());
        assert_eq!(Upstream::from_message(msg), Upstream::Audio(vec![1, 0, 2, 0]));
    }

    #[test]
    fn commit_text_is_commit() {
        let msg = Message::Text(r#"{"type":"audio_commit"}"#.into());
        assert_eq!(Upstream::from_message(msg), Upstream::Commit);
    }

    #[test]
    fn unknown_text_is_ignored() {
        let msg = Message::Text(r#"{"type":"chat"}"#.into());
        assert_eq!(Upstream::from_message(msg), Upstream::Ignore);
    }

    #[tokio::test]
    async fn serve_requires_api_key() {
        let config = crate::Config::resolve(Default::default(), |_| None).unwrap();
        let result = serve(config.bridge).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
