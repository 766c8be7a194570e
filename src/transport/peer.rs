//! Connectivity layer abstraction
//!
//! A [`PeerConnector`] creates a [`PeerLink`] plus a stream of
//! [`PeerEvent`]s. Links own one logical message channel; events report
//! connectivity changes and channel traffic.

use crate::config::ChannelConfig;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connectivity state as reported by the underlying layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Connectivity::New => "new",
            Connectivity::Checking => "checking",
            Connectivity::Connected => "connected",
            Connectivity::Completed => "completed",
            Connectivity::Disconnected => "disconnected",
            Connectivity::Failed => "failed",
            Connectivity::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Something happened on the link
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Connectivity(Connectivity),
    /// The message channel is usable
    ChannelOpen,
    /// Text frame received on the message channel
    ChannelMessage(String),
    /// The message channel closed
    ChannelClosed,
}

/// Message channel parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelOptions {
    pub label: String,
    pub ordered: bool,
    pub max_retransmits: u16,
}

impl From<&ChannelConfig> for ChannelOptions {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            label: config.label.clone(),
            ordered: config.ordered,
            max_retransmits: config.max_retransmits,
        }
    }
}

/// What a connector needs to build a link
#[derive(Clone, Debug)]
pub struct LinkRequest {
    pub ice_servers: Vec<String>,
    /// Ephemeral credential from session negotiation
    pub credential: String,
}

/// One peer connection
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Attach the local audio track
    async fn add_local_audio(&self) -> Result<()>;

    /// Create the message channel. Called before the offer, and again for
    /// a channel-level reconnect.
    async fn create_channel(&self, options: &ChannelOptions) -> Result<()>;

    /// Create and apply the local offer. `None` when the link needs no
    /// SDP exchange.
    async fn create_offer(&self) -> Result<Option<String>>;

    /// Resolves once candidate gathering is complete
    async fn ice_gathering_complete(&self);

    /// Local description including gathered candidates
    async fn local_description(&self) -> Result<String>;

    async fn apply_answer(&self, sdp: String) -> Result<()>;

    /// Send a text frame on the message channel
    fn send(&self, text: &str) -> Result<()>;

    async fn close(&self);
}

/// Event stream paired with a link
pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// Creates links
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, request: LinkRequest) -> Result<(Arc<dyn PeerLink>, PeerEvents)>;
}
