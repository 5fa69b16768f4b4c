//! Configuration management for Beacon voice

pub mod file;

use secrecy::SecretString;

use crate::voice::DEFAULT_FRAME_CAPACITY;
use crate::{Error, Result};

use file::VoiceConfigFile;

/// Default bridge port
pub const DEFAULT_PORT: u16 = 18790;

/// Default realtime backend endpoint
pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default realtime model
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

/// Default synthesized voice
pub const DEFAULT_VOICE: &str = "alloy";

/// Default transport queue depth
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Beacon voice configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Voice client configuration
    pub client: ClientConfig,

    /// Bridge server configuration
    pub bridge: BridgeConfig,

    /// Audio pipeline configuration
    pub audio: AudioConfig,
}

/// Voice client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bridge WebSocket URL
    pub backend_url: String,
}

/// Bridge server configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Port to listen on
    pub port: u16,

    /// Realtime backend WebSocket URL
    pub realtime_url: String,

    /// Realtime model identifier
    pub model: String,

    /// Synthesized voice name
    pub voice: String,

    /// `OpenAI` API key for the realtime backend
    pub api_key: Option<SecretString>,
}

/// Audio pipeline configuration
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    /// Frames buffered between the audio thread and the main loop
    pub frame_capacity: usize,

    /// Messages buffered on each side of the transport
    pub queue_capacity: usize,
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a resolved value is invalid
    pub fn load() -> Result<Self> {
        let fc = VoiceConfigFile::discover();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the backend URL, a port or a capacity is invalid
    pub fn resolve(fc: VoiceConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match env("BEACON_VOICE_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid BEACON_VOICE_PORT: {raw}")))?,
            None => fc.bridge.port.unwrap_or(DEFAULT_PORT),
        };

        let backend_url = env("BEACON_VOICE_BACKEND_URL")
            .or(fc.client.backend_url)
            .unwrap_or_else(|| format!("ws://127.0.0.1:{port}/voice"));
        validate_ws_url(&backend_url)?;

        let realtime_url = env("OPENAI_REALTIME_URL")
            .or(fc.bridge.realtime_url)
            .unwrap_or_else(|| DEFAULT_REALTIME_URL.to_string());
        validate_ws_url(&realtime_url)?;

        let bridge = BridgeConfig {
            port,
            realtime_url,
            model: env("OPENAI_REALTIME_MODEL")
                .or(fc.bridge.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: env("BEACON_VOICE_VOICE")
                .or(fc.bridge.voice)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            api_key: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
        };

        let audio = AudioConfig {
            frame_capacity: fc.audio.frame_capacity.unwrap_or(DEFAULT_FRAME_CAPACITY),
            queue_capacity: fc.audio.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
        };
        if audio.frame_capacity == 0 || audio.queue_capacity == 0 {
            return Err(Error::Config("audio capacities must be non-zero".to_string()));
        }

        Ok(Self {
            client: ClientConfig { backend_url },
            bridge,
            audio,
        })
    }
}

fn validate_ws_url(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).map_err(|e| Error::Config(format!("invalid url {raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(Error::Config(format!(
            "expected ws:// or wss:// url, got {other}://"
        ))),
    }
}
