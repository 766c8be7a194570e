//! Configuration for the assistant runtime
//!
//! Provides centralized configuration for the transport, the supervisor
//! and the external service collaborators. Loaded from TOML, overridable
//! from the environment.

use crate::{Result, VoxError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP endpoints of the external collaborators
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL of the web backend serving the session and image routes
    pub base_url: String,

    /// Session negotiation route (returns an ephemeral credential)
    pub session_path: String,

    /// Realtime relay receiving the SDP offer
    pub relay_url: String,

    /// Realtime model name passed to the relay
    pub model: String,

    /// Image generation route
    pub image_path: String,

    /// Upper bound on a single image generation request
    pub image_timeout_ms: u64,

    /// Static realtime credential; when set the session route is skipped
    pub api_key: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787".to_string(),
            session_path: "/session".to_string(),
            relay_url: "https://api.openai.com/v1/realtime".to_string(),
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
            image_path: "/api/generate-image".to_string(),
            image_timeout_ms: 60_000,
            api_key: None,
        }
    }
}

impl EndpointConfig {
    pub fn session_url(&self) -> String {
        join_url(&self.base_url, &self.session_path)
    }

    pub fn image_url(&self) -> String {
        join_url(&self.base_url, &self.image_path)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }

    /// Relay URL for the SDP offer, model included
    pub fn relay_endpoint(&self) -> String {
        format!("{}?model={}", self.relay_url.trim_end_matches('/'), self.model)
    }

    /// Relay URL for the realtime socket, model included
    pub fn socket_endpoint(&self) -> String {
        let relay = self.relay_endpoint();
        if let Some(rest) = relay.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = relay.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            relay
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Retry and timeout settings for session establishment
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Automatic reconnection attempts after a failed connect
    pub max_retries: u32,

    /// Delay before an automatic reconnection attempt
    pub retry_delay_ms: u64,

    /// Upper bound on ICE candidate gathering
    pub ice_gathering_timeout_ms: u64,

    /// Upper bound on the whole negotiation
    pub connection_timeout_ms: u64,

    /// Delay before re-creating a closed message channel
    pub reconnect_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            ice_gathering_timeout_ms: 5000,
            connection_timeout_ms: 15_000,
            reconnect_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn ice_gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_gathering_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Circuit breaker policy
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Failures further apart than this do not accumulate
    pub failure_window_ms: u64,

    /// How long the circuit stays open before a probe is allowed
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window_ms: 30_000,
            // five reconnect intervals
            cooldown_ms: 5000,
        }
    }
}

impl BreakerConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Peer connection and message channel settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// STUN/TURN servers handed to the connectivity layer
    pub ice_servers: Vec<String>,

    /// Label of the message channel
    pub label: String,

    /// Whether the message channel delivers in order
    pub ordered: bool,

    /// Retransmit limit for the message channel
    pub max_retransmits: u16,

    /// Whether to capture the microphone
    pub capture_audio: bool,

    /// Modalities announced in the session configuration
    pub modalities: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            label: "oai-events".to_string(),
            ordered: true,
            max_retransmits: 3,
            capture_audio: true,
            modalities: vec!["text".to_string(), "audio".to_string()],
        }
    }
}

/// Configuration for the complete assistant
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub endpoints: EndpointConfig,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    pub channel: ChannelConfig,
}

impl AssistantConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| VoxError::Configuration(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// `<config dir>/voxpage/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxpage").join("config.toml"))
    }

    /// Load the default file if present, then apply environment overrides
    pub fn discover() -> Result<Self> {
        let config = match Self::default_path() {
            Some(path) if path.exists() => Self::load(path)?,
            _ => Self::default(),
        };
        Ok(config.apply_env())
    }

    /// Apply `VOXPAGE_*` environment overrides
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("VOXPAGE_BASE_URL") {
            self.endpoints.base_url = url;
        }
        if let Ok(url) = std::env::var("VOXPAGE_RELAY_URL") {
            self.endpoints.relay_url = url;
        }
        if let Ok(model) = std::env::var("VOXPAGE_MODEL") {
            self.endpoints.model = model;
        }
        if let Ok(key) = std::env::var("VOXPAGE_API_KEY") {
            self.endpoints.api_key = Some(key).filter(|k| !k.is_empty());
        }
        self
    }

    /// Set the backend base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints.base_url = url.into();
        self
    }

    /// Set the realtime model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.endpoints.model = model.into();
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the breaker policy
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Disable microphone capture (data-only session)
    pub fn without_audio(mut self) -> Self {
        self.channel.capture_audio = false;
        self.channel.modalities = vec!["text".to_string()];
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.base_url.is_empty() {
            return Err(VoxError::Configuration("base_url is required".to_string()));
        }
        if self.endpoints.relay_url.is_empty() {
            return Err(VoxError::Configuration("relay_url is required".to_string()));
        }
        if self.channel.label.is_empty() {
            return Err(VoxError::Configuration(
                "message channel label is required".to_string(),
            ));
        }
        if self.channel.modalities.is_empty() {
            return Err(VoxError::Configuration(
                "at least one modality is required".to_string(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(VoxError::Configuration(
                "breaker failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
