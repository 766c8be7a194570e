//! In-process peer
//!
//! A link whose "remote side" is a [`LoopbackRemote`] handle: frames the
//! session sends are recorded there, and whatever the handle delivers
//! arrives as channel traffic.

use super::peer::{
    ChannelOptions, Connectivity, LinkRequest, PeerConnector, PeerEvent, PeerEvents, PeerLink,
};
use super::signaling::{SessionCredential, Signaling};
use crate::{Result, VoxError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

const LOOPBACK_OFFER: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=loopback\r\n";
const LOOPBACK_ANSWER: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=loopback-answer\r\n";

#[derive(Debug, Default)]
struct LinkState {
    calls: Vec<&'static str>,
    channel_requested: bool,
    channel_open: bool,
    connected: bool,
    closed: bool,
    sent: Vec<String>,
}

/// Remote end of a loopback link
#[derive(Clone)]
pub struct LoopbackRemote {
    events: mpsc::UnboundedSender<PeerEvent>,
    state: Arc<Mutex<LinkState>>,
    sent_notify: Arc<Notify>,
}

impl LoopbackRemote {
    fn emit(&self, event: PeerEvent) {
        // The session may already be gone
        let _ = self.events.send(event);
    }

    /// Deliver a frame to the local side; false when the channel is not open
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        if !self.state.lock().channel_open {
            return false;
        }
        self.emit(PeerEvent::ChannelMessage(text.into()));
        true
    }

    /// Report a connectivity change
    pub fn set_connectivity(&self, connectivity: Connectivity) {
        let open_channel = {
            let mut state = self.state.lock();
            match connectivity {
                Connectivity::Connected | Connectivity::Completed => {
                    state.connected = true;
                    let open = state.channel_requested && !state.channel_open;
                    state.channel_open |= open;
                    open
                }
                Connectivity::Disconnected | Connectivity::Failed | Connectivity::Closed => {
                    state.connected = false;
                    state.channel_open = false;
                    false
                }
                Connectivity::New | Connectivity::Checking => false,
            }
        };
        self.emit(PeerEvent::Connectivity(connectivity));
        if open_channel {
            self.emit(PeerEvent::ChannelOpen);
        }
    }

    /// Close only the message channel; the connection stays up
    pub fn close_channel(&self) {
        {
            let mut state = self.state.lock();
            state.channel_open = false;
            state.channel_requested = false;
        }
        self.emit(PeerEvent::ChannelClosed);
    }

    /// Frames the local side has sent so far
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Sent frames parsed as JSON; unparsable frames are skipped
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Wait until at least `count` frames were sent
    pub async fn wait_for_sent(&self, count: usize) -> Vec<String> {
        loop {
            let notified = self.sent_notify.notified();
            {
                let state = self.state.lock();
                if state.sent.len() >= count {
                    return state.sent.clone();
                }
            }
            notified.await;
        }
    }

    /// Link operations in call order
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn is_channel_open(&self) -> bool {
        self.state.lock().channel_open
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

struct LoopbackLink {
    remote: LoopbackRemote,
    deny_audio: bool,
    stall_ice: bool,
    manual_connectivity: bool,
}

#[async_trait]
impl PeerLink for LoopbackLink {
    async fn add_local_audio(&self) -> Result<()> {
        self.remote.state.lock().calls.push("audio");
        if self.deny_audio {
            Err(VoxError::Transport("Permission denied: microphone".to_string()))
        } else {
            Ok(())
        }
    }

    async fn create_channel(&self, options: &ChannelOptions) -> Result<()> {
        let reopened = {
            let mut state = self.remote.state.lock();
            state.calls.push("channel");
            if state.closed {
                return Err(VoxError::Transport("Link is closed".to_string()));
            }
            state.channel_requested = true;
            if state.connected && !state.channel_open {
                state.channel_open = true;
                true
            } else {
                false
            }
        };
        debug!("Loopback channel {} requested", options.label);
        if reopened {
            self.remote.emit(PeerEvent::ChannelOpen);
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<Option<String>> {
        self.remote.state.lock().calls.push("offer");
        Ok(Some(LOOPBACK_OFFER.to_string()))
    }

    async fn ice_gathering_complete(&self) {
        if self.stall_ice {
            std::future::pending::<()>().await;
        }
    }

    async fn local_description(&self) -> Result<String> {
        Ok(LOOPBACK_OFFER.to_string())
    }

    async fn apply_answer(&self, _sdp: String) -> Result<()> {
        self.remote.state.lock().calls.push("answer");
        if !self.manual_connectivity {
            self.remote.set_connectivity(Connectivity::Connected);
        }
        Ok(())
    }

    fn send(&self, text: &str) -> Result<()> {
        {
            let mut state = self.remote.state.lock();
            if !state.channel_open {
                return Err(VoxError::Transport("Message channel is not open".to_string()));
            }
            state.sent.push(text.to_string());
        }
        self.remote.sent_notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.remote.state.lock();
        state.calls.push("close");
        state.closed = true;
        state.connected = false;
        state.channel_open = false;
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    fail_next: u32,
    attempts: u32,
    deny_audio: bool,
    stall_ice: bool,
    manual_connectivity: bool,
}

/// Connector producing loopback links
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    state: Arc<Mutex<ConnectorState>>,
    remotes: Arc<Mutex<Vec<LoopbackRemote>>>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `count` connection attempts
    pub fn fail_next(&self, count: u32) {
        self.state.lock().fail_next = count;
    }

    /// Make microphone capture fail
    pub fn deny_audio(&self, deny: bool) {
        self.state.lock().deny_audio = deny;
    }

    /// Never finish candidate gathering
    pub fn stall_ice_gathering(&self, stall: bool) {
        self.state.lock().stall_ice = stall;
    }

    /// Leave connectivity reports to the remote handle
    pub fn manual_connectivity(&self, manual: bool) {
        self.state.lock().manual_connectivity = manual;
    }

    /// Connection attempts made, including refused ones
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    /// Remote end of the most recent link
    pub fn remote(&self) -> Option<LoopbackRemote> {
        self.remotes.lock().last().cloned()
    }

    /// Remote ends of every link created so far
    pub fn remotes(&self) -> Vec<LoopbackRemote> {
        self.remotes.lock().clone()
    }
}

#[async_trait]
impl PeerConnector for LoopbackConnector {
    async fn connect(&self, request: LinkRequest) -> Result<(Arc<dyn PeerLink>, PeerEvents)> {
        let (deny_audio, stall_ice, manual_connectivity) = {
            let mut state = self.state.lock();
            state.attempts += 1;
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(VoxError::Transport(
                    "Loopback peer refused the connection".to_string(),
                ));
            }
            (state.deny_audio, state.stall_ice, state.manual_connectivity)
        };
        debug!(
            "Loopback link with {} ICE server(s)",
            request.ice_servers.len()
        );

        let (events, rx) = mpsc::unbounded_channel();
        let remote = LoopbackRemote {
            events,
            state: Arc::new(Mutex::new(LinkState::default())),
            sent_notify: Arc::new(Notify::new()),
        };
        self.remotes.lock().push(remote.clone());
        let link = LoopbackLink {
            remote,
            deny_audio,
            stall_ice,
            manual_connectivity,
        };
        Ok((Arc::new(link), rx))
    }
}

/// Signaling that answers every offer locally
#[derive(Clone, Debug, Default)]
pub struct LoopbackSignaling;

impl LoopbackSignaling {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Signaling for LoopbackSignaling {
    async fn fetch_credential(&self) -> Result<SessionCredential> {
        Ok(SessionCredential::new("loopback"))
    }

    async fn exchange(&self, _credential: &SessionCredential, _offer: &str) -> Result<String> {
        Ok(LOOPBACK_ANSWER.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> LinkRequest {
        LinkRequest {
            ice_servers: vec![],
            credential: "loopback".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_requires_open_channel() {
        let connector = LoopbackConnector::new();
        let (link, mut events) = connector.connect(request()).await.unwrap();
        assert!(link.send("early").is_err());

        link.create_channel(&ChannelOptions::from(&crate::config::ChannelConfig::default()))
            .await
            .unwrap();
        link.apply_answer(LOOPBACK_ANSWER.to_string()).await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(PeerEvent::Connectivity(Connectivity::Connected))
        );
        assert_eq!(events.recv().await, Some(PeerEvent::ChannelOpen));

        link.send("{\"type\":\"ping\"}").unwrap();
        let remote = connector.remote().unwrap();
        assert_eq!(remote.wait_for_sent(1).await, vec!["{\"type\":\"ping\"}"]);
    }

    #[tokio::test]
    async fn test_channel_reopen_emits_open() {
        let connector = LoopbackConnector::new();
        let (link, mut events) = connector.connect(request()).await.unwrap();
        let options = ChannelOptions::from(&crate::config::ChannelConfig::default());
        link.create_channel(&options).await.unwrap();
        link.apply_answer(String::new()).await.unwrap();
        let remote = connector.remote().unwrap();

        remote.close_channel();
        assert!(!remote.deliver("lost"));
        link.create_channel(&options).await.unwrap();
        assert!(remote.is_channel_open());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                PeerEvent::Connectivity(Connectivity::Connected),
                PeerEvent::ChannelOpen,
                PeerEvent::ChannelClosed,
                PeerEvent::ChannelOpen,
            ]
        );
    }

    #[tokio::test]
    async fn test_refused_attempts_counted() {
        let connector = LoopbackConnector::new();
        connector.fail_next(2);
        assert!(connector.connect(request()).await.is_err());
        assert!(connector.connect(request()).await.is_err());
        assert!(connector.connect(request()).await.is_ok());
        assert_eq!(connector.attempts(), 3);
        assert_eq!(connector.remotes().len(), 1);
    }
}
