//! Transport session state machine
//!
//! `new -> negotiating -> connected -> {disconnected, failed, closed}`.
//! `closed` is only entered through [`TransportSession::close`]; failures
//! reported by the connectivity layer land in `disconnected` or `failed`.

use super::peer::{ChannelOptions, Connectivity, LinkRequest, PeerConnector, PeerEvents, PeerLink};
use super::signaling::Signaling;
use crate::config::AssistantConfig;
use crate::{Result, VoxError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle state of a transport session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    New,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl SessionState {
    /// Whether the session can carry messages
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// States the session does not leave on its own
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::New => "new",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Negotiation parameters taken from the assistant configuration
#[derive(Clone, Debug)]
pub struct NegotiationOptions {
    pub ice_servers: Vec<String>,
    pub channel: ChannelOptions,
    pub capture_audio: bool,
    pub ice_gathering_timeout: Duration,
}

impl From<&AssistantConfig> for NegotiationOptions {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            ice_servers: config.channel.ice_servers.clone(),
            channel: ChannelOptions::from(&config.channel),
            capture_audio: config.channel.capture_audio,
            ice_gathering_timeout: config.retry.ice_gathering_timeout(),
        }
    }
}

/// One established (or establishing) peer session
pub struct TransportSession {
    link: Arc<dyn PeerLink>,
    state: SessionState,
    channel: ChannelOptions,
}

impl TransportSession {
    /// Run the full negotiation and hand back the session with its events
    pub async fn negotiate(
        connector: &dyn PeerConnector,
        signaling: &dyn Signaling,
        options: &NegotiationOptions,
    ) -> Result<(Self, PeerEvents)> {
        let credential = signaling.fetch_credential().await?;
        if credential.is_expired() {
            return Err(VoxError::ExternalService(
                "Session credential already expired".to_string(),
            ));
        }

        let (link, events) = connector
            .connect(LinkRequest {
                ice_servers: options.ice_servers.clone(),
                credential: credential.value.clone(),
            })
            .await?;
        let mut session = Self {
            link,
            state: SessionState::New,
            channel: options.channel.clone(),
        };
        session.transition(SessionState::Negotiating);

        match session.run_offer(signaling, &credential, options).await {
            Ok(()) => Ok((session, events)),
            Err(e) => {
                warn!("Negotiation failed: {}", e);
                session.link.close().await;
                session.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn run_offer(
        &self,
        signaling: &dyn Signaling,
        credential: &super::signaling::SessionCredential,
        options: &NegotiationOptions,
    ) -> Result<()> {
        if options.capture_audio {
            if let Err(e) = self.link.add_local_audio().await {
                warn!("Audio capture unavailable, continuing data-only: {}", e);
            }
        }

        // The channel must exist before the offer so it opens with the session
        self.link.create_channel(&self.channel).await?;

        let Some(_initial) = self.link.create_offer().await? else {
            debug!("Link needs no offer exchange");
            return Ok(());
        };

        if tokio::time::timeout(
            options.ice_gathering_timeout,
            self.link.ice_gathering_complete(),
        )
        .await
        .is_err()
        {
            warn!(
                "ICE gathering did not finish within {:?}, sending partial candidates",
                options.ice_gathering_timeout
            );
        }

        let offer = self.link.local_description().await?;
        let answer = signaling.exchange(credential, &offer).await?;
        self.link.apply_answer(answer).await?;
        debug!("Remote answer applied");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feed a connectivity report; returns the new state when it changed
    pub fn on_connectivity(&mut self, connectivity: Connectivity) -> Option<SessionState> {
        if self.state == SessionState::Closed {
            return None;
        }
        let next = match connectivity {
            Connectivity::Connected | Connectivity::Completed => SessionState::Connected,
            Connectivity::Disconnected | Connectivity::Closed => SessionState::Disconnected,
            Connectivity::Failed => SessionState::Failed,
            Connectivity::New | Connectivity::Checking => return None,
        };
        if next == self.state {
            None
        } else {
            self.transition(next);
            Some(next)
        }
    }

    /// Send one text frame on the message channel
    pub fn send(&self, text: &str) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(VoxError::Transport("Session is closed".to_string()));
        }
        self.link.send(text)
    }

    /// Re-create the message channel on the existing link
    pub async fn reopen_channel(&self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(VoxError::Transport(format!(
                "Cannot reopen channel on a {} session",
                self.state
            )));
        }
        self.link.create_channel(&self.channel).await
    }

    /// Deliberate local teardown
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.link.close().await;
        self.transition(SessionState::Closed);
    }

    fn transition(&mut self, next: SessionState) {
        info!("Transport session {} -> {}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::{LoopbackConnector, LoopbackSignaling};
    use crate::transport::peer::PeerEvent;

    fn options() -> NegotiationOptions {
        NegotiationOptions::from(&AssistantConfig::default())
    }

    #[tokio::test]
    async fn test_negotiation_creates_channel_before_offer() {
        let connector = LoopbackConnector::new();
        let (session, mut events) =
            TransportSession::negotiate(&connector, &LoopbackSignaling::new(), &options())
                .await
                .unwrap();
        assert_eq!(session.state(), SessionState::Negotiating);

        let remote = connector.remote().unwrap();
        assert_eq!(remote.calls(), vec!["audio", "channel", "offer", "answer"]);
        assert_eq!(events.recv().await, Some(PeerEvent::Connectivity(Connectivity::Connected)));
        assert_eq!(events.recv().await, Some(PeerEvent::ChannelOpen));
    }

    #[tokio::test]
    async fn test_media_failure_is_not_fatal() {
        let connector = LoopbackConnector::new();
        connector.deny_audio(true);
        let result =
            TransportSession::negotiate(&connector, &LoopbackSignaling::new(), &options()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ice_gathering_timeout_continues() {
        let connector = LoopbackConnector::new();
        connector.stall_ice_gathering(true);
        let result =
            TransportSession::negotiate(&connector, &LoopbackSignaling::new(), &options()).await;
        assert!(result.is_ok());
        assert!(connector.remote().unwrap().calls().contains(&"answer"));
    }

    #[tokio::test]
    async fn test_failed_connect_is_error() {
        let connector = LoopbackConnector::new();
        connector.fail_next(1);
        let result =
            TransportSession::negotiate(&connector, &LoopbackSignaling::new(), &options()).await;
        assert!(matches!(result, Err(VoxError::Transport(_))));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_connectivity_transitions() {
        let connector = LoopbackConnector::new();
        let (mut session, _events) =
            TransportSession::negotiate(&connector, &LoopbackSignaling::new(), &options())
                .await
                .unwrap();

        assert_eq!(session.on_connectivity(Connectivity::Checking), None);
        assert_eq!(
            session.on_connectivity(Connectivity::Connected),
            Some(SessionState::Connected)
        );
        assert_eq!(session.on_connectivity(Connectivity::Completed), None);
        assert_eq!(
            session.on_connectivity(Connectivity::Disconnected),
            Some(SessionState::Disconnected)
        );

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.on_connectivity(Connectivity::Failed), None);
        assert!(session.send("{}").is_err());
    }
}
