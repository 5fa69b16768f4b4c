//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-voice/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoiceConfigFile {
    /// Voice client configuration
    #[serde(default)]
    pub client: ClientFileConfig,

    /// Bridge server configuration
    #[serde(default)]
    pub bridge: BridgeFileConfig,

    /// Audio pipeline tuning
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Voice client configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    /// Bridge WebSocket URL (e.g. "ws://127.0.0.1:18790/voice")
    pub backend_url: Option<String>,
}

/// Bridge server configuration
#[derive(Debug, Default, Deserialize)]
pub struct BridgeFileConfig {
    /// Port to listen on
    pub port: Option<u16>,

    /// Realtime backend WebSocket URL
    pub realtime_url: Option<String>,

    /// Realtime model identifier
    pub model: Option<String>,

    /// Synthesized voice name (e.g. "alloy")
    pub voice: Option<String>,
}

/// Audio pipeline tuning
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Frames buffered between the audio thread and the main loop
    pub frame_capacity: Option<usize>,

    /// Messages buffered on each side of the transport
    pub queue_capacity: Option<usize>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
}

impl VoiceConfigFile {
    /// Parse the overlay at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid TOML
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay from the standard location, empty when absent or unusable
    pub fn discover() -> Self {
        let Some(path) = config_file_path().filter(|p| p.exists()) else {
            return Self::default();
        };

        Self::read(&path).map_or_else(
            |e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring config file");
                Self::default()
            },
            |fc| {
                tracing::info!(path = %path.display(), "loaded config file");
                fc
            },
        )
    }
}

/// Return the config file path: `~/.config/omni/beacon-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-voice")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let fc: VoiceConfigFile = toml::from_str("").unwrap();
        assert!(fc.client.backend_url.is_none());
        assert!(fc.bridge.port.is_none());
    }

    #[test]
    fn partial_sections_parse() {
        let fc: VoiceConfigFile = toml::from_str(
            r#"
            [bridge]
            port = 9000
            voice = "verse"

            [audio]
            frame_capacity = 32
            "#,
        )
        .unwrap();

        assert_eq!(fc.bridge.port, Some(9000));
        assert_eq!(fc.bridge.voice.as_deref(), Some("verse"));
        assert_eq!(fc.audio.frame_capacity, Some(32));
        assert!(fc.audio.queue_capacity.is_none());
    }

    #[test]
    fn read_reports_invalid_toml() {
        let path = std::env::temp_dir().join(format!("beacon-voice-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[bridge\nport = ").unwrap();

        let result = VoiceConfigFile::read(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(crate::Error::Toml(_))));
    }

    #[test]
    fn read_parses_file_on_disk() {
        let path = std::env::temp_dir().join(format!("beacon-voice-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[client]\nbackend_url = \"ws://host:1/voice\"\n").unwrap();

        let fc = VoiceConfigFile::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(fc.client.backend_url.as_deref(), Some("ws://host:1/voice"));
    }

    #[test]
    fn read_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("beacon-voice-{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(VoiceConfigFile::read(&path), Err(crate::Error::Io(_))));
    }
}
