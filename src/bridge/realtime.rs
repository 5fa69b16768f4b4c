//! Realtime backend client
//!
//! One persistent WebSocket per client session. The session is configured for
//! 24 kHz pcm16 in both directions as soon as it opens.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::BridgeConfig;
use crate::transport::ServerEvent;
use crate::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Largest backend message accepted (long responses arrive as one event)
const MAX_MESSAGE_SIZE: usize = 4 << 20;

/// Write half of a realtime session
pub struct RealtimeSender {
    sink: SplitSink<Socket, Message>,
}

/// Read half of a realtime session
pub struct RealtimeEvents {
    stream: SplitStream<Socket>,
}

/// Open a realtime session and send the initial `session.update`
///
/// # Errors
///
/// Returns error if the API key is missing, the URL is invalid or the
/// handshake fails
pub async fn connect(config: &BridgeConfig) -> Result<(RealtimeSender, RealtimeEvents)> {
    let api_key = config
        .api_key
        .as_ref()
        .ok_or_else(|| Error::Config("OPENAI_API_KEY is required for the bridge".to_string()))?;

    let mut url = url::Url::parse(&config.realtime_url)
        .map_err(|e| Error::Config(format!("invalid realtime url: {e}")))?;
    url.query_pairs_mut().append_pair("model", &config.model);

    let mut request = url.as_str().into_client_request()?;
    let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
        .map_err(|e| Error::Config(format!("invalid api key: {e}")))?;
    request.headers_mut().insert("Authorization", auth);
    request
        .headers_mut()
        .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
    let (socket, _) =
        tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false).await?;
    let (sink, stream) = socket.split();

    let mut sender = RealtimeSender { sink };
    sender.send(session_update(&config.model, &config.voice)).await?;

    tracing::debug!(model = %config.model, voice = %config.voice, "realtime session opened");
    Ok((sender, RealtimeEvents { stream }))
}

impl RealtimeSender {
    /// Append raw pcm16 to the backend's input buffer
    ///
    /// Empty buffers are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the socket write fails
    pub async fn push_pcm(&mut self, pcm: &[u8]) -> Result<()> {
        if pcm.is_empty() {
            return Ok(());
        }
        self.send(append_message(pcm)).await
    }

    /// Flush the input buffer so server-side turn detection runs
    ///
    /// # Errors
    ///
    /// Returns error if the socket write fails
    pub async fn commit(&mut self) -> Result<()> {
        self.send(json!({ "type": "input_audio_buffer.commit" })).await
    }

    /// Close the session
    pub async fn close(&mut self) {
        let _ = self.sink.close().await;
    }

    async fn send(&mut self, payload: Value) -> Result<()> {
        self.sink.send(Message::Text(payload.to_string())).await?;
        Ok(())
    }
}

impl RealtimeEvents {
    /// Next event translated for the client
    ///
    /// Events the client has no use for are skipped, as is anything that is
    /// not valid JSON. Returns `None` once the backend closes.
    pub async fn next(&mut self) -> Option<ServerEvent> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let Ok(event) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    if let Some(translated) = translate_event(&event) {
                        return Some(translated);
                    }
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "realtime receive failed");
                    return None;
                }
            }
        }
        None
    }
}

/// Session configuration sent on connect
#[must_use]
pub fn session_update(model: &str, voice: &str) -> Value {
    json!({
        "type": "session.update",
        "session": {
            "modalities": ["audio", "text"],
            "model": model,
            "input_audio_format": "pcm16",
            "output_audio_format": "pcm16",
            "voice": voice,
        },
    })
}

/// `input_audio_buffer.append` carrying base64 pcm16
#[must_use]
pub fn append_message(pcm: &[u8]) -> Value {
    json!({
        "type": "input_audio_buffer.append",
        "audio": STANDARD.encode(pcm),
    })
}

/// Map a backend event onto the client protocol
#[must_use]
pub fn translate_event(event: &Value) -> Option<ServerEvent> {
    let str_field = |key: &str| event.get(key).and_then(Value::as_str).map(ToString::to_string);

    match event.get("type").and_then(Value::as_str)? {
        "response.audio.delta" => str_field("delta").map(|audio| ServerEvent::AssistantAudio { audio }),
        "output_audio_buffer.payload" => {
            str_field("audio").map(|audio| ServerEvent::AssistantAudio { audio })
        }
        "response.audio_transcript.done" => {
            str_field("transcript").map(|text| ServerEvent::AssistantText { text })
        }
        "response.text.done" => str_field("text").map(|text| ServerEvent::AssistantText { text }),
        "conversation.item.created" => item_text(event.get("item")?)
            .map(|text| ServerEvent::AssistantText { text }),
        "error" => {
            let message = event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown backend error")
                .to_string();
            Some(ServerEvent::Error { message })
        }
        _ => None,
    }
}

/// Text of an assistant conversation item, if it carries any
fn item_text(item: &Value) -> Option<String> {
    if let Some(message) = item.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    if item.get("role").and_then(Value::as_str) != Some("assistant") {
        return None;
    }

    let text: String = item
        .get("content")?
        .as_array()?
        .iter()
        .filter_map(|part| {
            part.get("text")
                .or_else(|| part.get("transcript"))
                .and_then(Value::as_str)
        })
        .collect();

    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_update_requests_pcm16() {
        let msg = session_update("m", "alloy");
        assert_eq!(msg["type"], "session.update");
        assert_eq!(msg["session"]["input_audio_format"], "pcm16");
        assert_eq!(msg["session"]["output_audio_format"], "pcm16");
        assert_eq!(msg["session"]["voice"], "alloy");
    }

    #[test]
    fn append_is_base64() {
        let msg = append_message(&[0x01, 0x00]);
        assert_eq!(msg["type"], "input_audio_buffer.append");
        assert_eq!(msg["audio"], "AQA=");
    }

    #[test]
    fn audio_delta_becomes_assistant_audio() {
        let event = json!({ "type": "response.audio.delta", "delta": "AAA=" });
        assert_eq!(
            translate_event(&event),
            Some(ServerEvent::AssistantAudio {
                audio: "AAA=".to_string()
            })
        );

        let event = json!({ "type": "output_audio_buffer.payload", "audio": "AQA=" });
        assert!(matches!(
            translate_event(&event),
            Some(ServerEvent::AssistantAudio { .. })
        ));
    }

    #[test]
    fn conversation_item_becomes_assistant_text() {
        let event = json!({
            "type": "conversation.item.created",
            "item": { "message": "hello there" },
        });
        assert_eq!(
            translate_event(&event),
            Some(ServerEvent::AssistantText {
                text: "hello there".to_string()
            })
        );

        let event = json!({
            "type": "conversation.item.created",
            "item": {
                "role": "assistant",
                "content": [{ "type": "text", "text": "hi" }],
            },
        });
        assert_eq!(
            translate_event(&event),
            Some(ServerEvent::AssistantText {
                text: "hi".to_string()
            })
        );
    }

    #[test]
    fn user_items_are_ignored() {
        let event = json!({
            "type": "conversation.item.created",
            "item": { "role": "user", "content": [{ "type": "input_audio" }] },
        });
        assert_eq!(translate_event(&event), None);
    }

    #[test]
    fn backend_error_is_forwarded() {
        let event = json!({ "type": "error", "error": { "message": "bad key" } });
        assert_eq!(
            translate_event(&event),
            Some(ServerEvent::Error {
                message: "bad key".to_string()
            })
        );
    }

    #[test]
    fn unknown_events_are_skipped() {
        assert_eq!(translate_event(&json!({ "type": "session.created" })), None);
        assert_eq!(translate_event(&json!({ "no_type": true })), None);
    }
}
