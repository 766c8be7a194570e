//! WebSocket link to the realtime relay
//!
//! The socket itself is the message channel: there is no SDP exchange,
//! so [`PeerLink::create_offer`] yields `None` and the session skips
//! straight to waiting for `ChannelOpen`.

use super::peer::{
    ChannelOptions, Connectivity, LinkRequest, PeerConnector, PeerEvent, PeerEvents, PeerLink,
};
use crate::config::EndpointConfig;
use crate::{Result, VoxError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Connects to `wss://…/realtime?model=…` with the session credential
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(endpoints: &EndpointConfig) -> Self {
        Self {
            url: endpoints.socket_endpoint(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Default)]
struct SocketFlags {
    open: AtomicBool,
    channel_open: AtomicBool,
    closing: AtomicBool,
}

struct WebSocketLink {
    flags: Arc<SocketFlags>,
    outgoing: mpsc::UnboundedSender<Message>,
    events: mpsc::UnboundedSender<PeerEvent>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl PeerConnector for WebSocketConnector {
    async fn connect(&self, request: LinkRequest) -> Result<(Arc<dyn PeerLink>, PeerEvents)> {
        let mut req = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| VoxError::Configuration(format!("Bad realtime URL {}: {}", self.url, e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", request.credential))
            .map_err(|e| VoxError::Transport(format!("Invalid credential header: {}", e)))?;
        let headers = req.headers_mut();
        headers.insert("Authorization", bearer);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        info!("Connecting realtime socket to {}", self.url);
        let (socket, _response) = tokio_tungstenite::connect_async(req)
            .await
            .map_err(|e| VoxError::Transport(format!("WebSocket connect failed: {}", e)))?;
        let (mut sink, mut stream) = socket.split();

        let (events, events_rx) = mpsc::unbounded_channel();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let flags = Arc::new(SocketFlags::default());
        flags.open.store(true, Ordering::SeqCst);
        // Queued ahead of anything the reader may report
        let _ = events.send(PeerEvent::Connectivity(Connectivity::Connected));

        tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    warn!("Realtime socket write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = {
            let flags = flags.clone();
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(frame) = stream.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            if flags.channel_open.load(Ordering::SeqCst) {
                                let message = text.as_str().to_string();
                                let _ = events.send(PeerEvent::ChannelMessage(message));
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            debug!("Realtime socket closed by peer: {:?}", frame);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Realtime socket read failed: {}", e);
                            break;
                        }
                    }
                }

                flags.open.store(false, Ordering::SeqCst);
                let was_open = flags.channel_open.swap(false, Ordering::SeqCst);
                if flags.closing.load(Ordering::SeqCst) {
                    return;
                }
                if was_open {
                    let _ = events.send(PeerEvent::ChannelClosed);
                }
                let _ = events.send(PeerEvent::Connectivity(Connectivity::Disconnected));
            })
        };

        let link = WebSocketLink {
            flags,
            outgoing,
            events,
            reader: Mutex::new(Some(reader)),
        };
        Ok((Arc::new(link), events_rx))
    }
}

#[async_trait]
impl PeerLink for WebSocketLink {
    async fn add_local_audio(&self) -> Result<()> {
        Err(VoxError::Transport(
            "Audio capture is not carried over the socket link".to_string(),
        ))
    }

    async fn create_channel(&self, options: &ChannelOptions) -> Result<()> {
        if !self.flags.open.load(Ordering::SeqCst) {
            return Err(VoxError::Transport("Realtime socket is closed".to_string()));
        }
        if !self.flags.channel_open.swap(true, Ordering::SeqCst) {
            debug!("Socket channel {} open", options.label);
            let _ = self.events.send(PeerEvent::ChannelOpen);
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<Option<String>> {
        Ok(None)
    }

    async fn ice_gathering_complete(&self) {}

    async fn local_description(&self) -> Result<String> {
        Err(VoxError::Transport(
            "Socket links carry no session description".to_string(),
        ))
    }

    async fn apply_answer(&self, _sdp: String) -> Result<()> {
        Err(VoxError::Transport(
            "Socket links carry no session description".to_string(),
        ))
    }

    fn send(&self, text: &str) -> Result<()> {
        if !self.flags.channel_open.load(Ordering::SeqCst) {
            return Err(VoxError::Transport("Message channel is not open".to_string()));
        }
        self.outgoing
            .send(Message::Text(text.to_string().into()))
            .map_err(|_| VoxError::Transport("Realtime socket writer is gone".to_string()))
    }

    async fn close(&self) {
        self.flags.closing.store(true, Ordering::SeqCst);
        self.flags.channel_open.store(false, Ordering::SeqCst);
        self.flags.open.store(false, Ordering::SeqCst);
        let _ = self.outgoing.send(Message::Close(None));
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}
