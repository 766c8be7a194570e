//! Connection supervisor
//!
//! Owns the transport session and keeps it alive: full renegotiation with
//! bounded automatic retries behind the circuit breaker, message channel
//! reopening after a close, and the session configuration re-sent on every
//! channel open. All timers are spawned tasks whose handles are aborted on
//! deliberate teardown; a generation counter discards anything already
//! queued from a torn-down attempt.

use super::breaker::{BreakerPhase, CircuitBreaker};
use crate::config::AssistantConfig;
use crate::dispatch::{Dispatcher, Outbound};
use crate::transport::{
    NegotiationOptions, PeerConnector, PeerEvent, PeerEvents, SessionState, Signaling,
    TransportSession,
};
use crate::{Result, VoxError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Inbound frames buffered ahead of the dispatch loop
const INBOUND_CAPACITY: usize = 64;

/// Connection status shown to the user
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Rough cause of a connection failure, for status display
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionIssue {
    /// Microphone or other capture permission
    Permission,
    Network,
    Unknown,
}

impl ConnectionIssue {
    /// Classify an error message
    pub fn categorize(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("getusermedia") || lower.contains("permission") {
            ConnectionIssue::Permission
        } else if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("timed out")
            || message.contains("ICE")
            || message.contains("STUN")
        {
            ConnectionIssue::Network
        } else {
            ConnectionIssue::Unknown
        }
    }
}

/// Commands accepted by the supervisor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorCommand {
    Connect,
    Disconnect,
    /// Tear down whatever exists and connect again
    Retry,
    Shutdown,
}

/// Notifications from the supervisor
#[derive(Clone, Debug, PartialEq)]
pub enum SupervisorEvent {
    Status(ConnectionStatus),
    /// `session.update` with the tool catalog went out
    SessionConfigured,
    Error {
        issue: ConnectionIssue,
        message: String,
        recoverable: bool,
    },
    RetryScheduled {
        attempt: u32,
        delay_ms: u64,
    },
    /// The breaker refused an attempt without touching the network
    ConnectRejected {
        retry_in_ms: u64,
    },
    Breaker(BreakerPhase),
}

enum Internal {
    Negotiated {
        generation: u64,
        result: Result<(TransportSession, PeerEvents)>,
    },
    Peer {
        generation: u64,
        event: PeerEvent,
    },
    RetryDue {
        generation: u64,
    },
    ReopenDue {
        generation: u64,
    },
}

/// Handle to a running supervisor task
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<SupervisorCommand>,
    events: mpsc::UnboundedReceiver<SupervisorEvent>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn send(&self, command: SupervisorCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| VoxError::Channel("Supervisor has stopped".to_string()))
    }

    pub fn connect(&self) -> Result<()> {
        self.send(SupervisorCommand::Connect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(SupervisorCommand::Disconnect)
    }

    pub fn retry(&self) -> Result<()> {
        self.send(SupervisorCommand::Retry)
    }

    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SupervisorEvent> {
        self.events.try_recv().ok()
    }

    /// Stop the supervisor and wait for its teardown
    pub async fn shutdown(self) {
        let _ = self.commands.send(SupervisorCommand::Shutdown);
        let _ = self.task.await;
    }
}

pub struct Supervisor {
    config: AssistantConfig,
    options: NegotiationOptions,
    connector: Arc<dyn PeerConnector>,
    signaling: Arc<dyn Signaling>,
    breaker: CircuitBreaker,
    status: ConnectionStatus,
    session: Option<TransportSession>,
    generation: u64,
    retries: u32,
    pending_connect: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    reopen_timer: Option<JoinHandle<()>>,
    forwarder: Option<JoinHandle<()>>,
    /// Results produced while the message channel was closed
    held: Vec<Outbound>,
    internal: mpsc::UnboundedSender<Internal>,
    inbound: mpsc::Sender<String>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl Supervisor {
    /// Start the supervisor and its dispatch loop on the current runtime
    pub fn spawn(
        config: AssistantConfig,
        connector: Arc<dyn PeerConnector>,
        signaling: Arc<dyn Signaling>,
        dispatcher: Dispatcher,
    ) -> SupervisorHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let dispatch = tokio::spawn(dispatcher.run(inbound_rx, outbound_tx));
        let supervisor = Supervisor {
            options: NegotiationOptions::from(&config),
            breaker: CircuitBreaker::new(&config.breaker),
            config,
            connector,
            signaling,
            status: ConnectionStatus::Idle,
            session: None,
            generation: 0,
            retries: 0,
            pending_connect: None,
            retry_timer: None,
            reopen_timer: None,
            forwarder: None,
            held: Vec::new(),
            internal: internal_tx,
            inbound: inbound_tx,
            events: event_tx,
        };
        let task = tokio::spawn(supervisor.run(command_rx, internal_rx, outbound_rx, dispatch));

        SupervisorHandle {
            commands: command_tx,
            events: event_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SupervisorCommand>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        dispatch: JoinHandle<()>,
    ) {
        info!("Supervisor started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SupervisorCommand::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
                Some(message) = internal.recv() => self.on_internal(message).await,
                Some(frame) = outbound.recv() => self.deliver(frame),
            }
        }

        self.teardown().await;
        self.set_status(ConnectionStatus::Closed);
        dispatch.abort();
        info!("Supervisor stopped");
    }

    async fn on_command(&mut self, command: SupervisorCommand) {
        debug!("Supervisor command {:?}", command);
        match command {
            SupervisorCommand::Connect => {
                if self.session.is_some() || self.pending_connect.is_some() {
                    debug!("Already connected or connecting");
                    return;
                }
                self.retries = 0;
                self.start_attempt(false);
            }
            SupervisorCommand::Disconnect => {
                self.teardown().await;
                self.set_status(ConnectionStatus::Closed);
            }
            SupervisorCommand::Retry => {
                info!("Manual retry requested");
                self.teardown().await;
                self.start_attempt(false);
            }
            SupervisorCommand::Shutdown => {}
        }
    }

    async fn on_internal(&mut self, message: Internal) {
        match message {
            Internal::Negotiated { generation, result } => {
                if generation != self.generation {
                    if let Ok((mut session, _)) = result {
                        debug!("Discarding session from an abandoned attempt");
                        session.close().await;
                    }
                    return;
                }
                self.pending_connect = None;
                match result {
                    Ok((session, events)) => {
                        let was = self.breaker.phase();
                        self.breaker.record_success();
                        self.report_breaker(was);
                        self.retries = 0;
                        self.session = Some(session);
                        self.forwarder = Some(self.forward(events, generation));
                    }
                    Err(e) => self.on_failure(e),
                }
            }
            Internal::Peer { generation, event } => {
                if generation == self.generation {
                    self.on_peer_event(event).await;
                }
            }
            Internal::RetryDue { generation } => {
                if generation != self.generation {
                    return;
                }
                self.retry_timer = None;
                if self.session.is_none() && self.pending_connect.is_none() {
                    self.start_attempt(true);
                }
            }
            Internal::ReopenDue { generation } => {
                if generation != self.generation {
                    return;
                }
                self.reopen_timer = None;
                let result = match &self.session {
                    Some(session) => session.reopen_channel().await,
                    None => return,
                };
                if let Err(e) = result {
                    warn!("Message channel reopen failed: {}", e);
                    self.drop_session().await;
                    self.on_failure(e);
                }
            }
        }
    }

    async fn on_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Connectivity(connectivity) => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                match session.on_connectivity(connectivity) {
                    Some(SessionState::Connected) => self.set_status(ConnectionStatus::Connected),
                    Some(state @ (SessionState::Disconnected | SessionState::Failed)) => {
                        self.drop_session().await;
                        self.on_failure(VoxError::Transport(format!("Connection {}", state)));
                    }
                    _ => {}
                }
            }
            PeerEvent::ChannelOpen => {
                cancel(&mut self.reopen_timer);
                info!("Message channel open, sending session configuration");
                let update = Outbound::session_update(&self.config.channel.modalities);
                if self.send_frame(&update) {
                    self.flush_held();
                    self.emit(SupervisorEvent::SessionConfigured);
                }
            }
            PeerEvent::ChannelMessage(text) => {
                if self.inbound.send(text).await.is_err() {
                    warn!("Dispatch loop is gone, dropping inbound frame");
                }
            }
            PeerEvent::ChannelClosed => {
                let Some(session) = &self.session else {
                    return;
                };
                if session.state().is_terminal() {
                    return;
                }
                let delay = self.config.retry.reconnect_delay();
                warn!("Message channel closed, reopening in {:?}", delay);
                cancel(&mut self.reopen_timer);
                self.reopen_timer = Some(self.schedule(
                    delay,
                    Internal::ReopenDue {
                        generation: self.generation,
                    },
                ));
            }
        }
    }

    fn start_attempt(&mut self, automatic: bool) {
        cancel(&mut self.retry_timer);

        let was = self.breaker.phase();
        let acquired = self.breaker.try_acquire();
        self.report_breaker(was);
        if let Err(e) = acquired {
            let retry_in_ms = match e {
                VoxError::CircuitOpen { retry_in_ms } => retry_in_ms,
                _ => 0,
            };
            warn!("Connection attempt refused: {}", e);
            self.emit(SupervisorEvent::ConnectRejected { retry_in_ms });
            if automatic {
                // Probe once the cooldown is over
                self.retry_timer = Some(self.schedule(
                    Duration::from_millis(retry_in_ms.max(1)),
                    Internal::RetryDue {
                        generation: self.generation,
                    },
                ));
            } else {
                self.set_status(ConnectionStatus::Failed);
            }
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.set_status(ConnectionStatus::Connecting);

        let connector = self.connector.clone();
        let signaling = self.signaling.clone();
        let options = self.options.clone();
        let internal = self.internal.clone();
        let timeout = self.config.retry.connection_timeout();
        self.pending_connect = Some(tokio::spawn(async move {
            let negotiation =
                TransportSession::negotiate(connector.as_ref(), signaling.as_ref(), &options);
            let result = match tokio::time::timeout(timeout, negotiation).await {
                Ok(result) => result,
                Err(_) => Err(VoxError::Transport(format!(
                    "Connection timed out after {:?}",
                    timeout
                ))),
            };
            let _ = internal.send(Internal::Negotiated { generation, result });
        }));
    }

    fn on_failure(&mut self, err: VoxError) {
        error!("Connection failed: {}", err);
        let was = self.breaker.phase();
        self.breaker.record_failure();
        self.report_breaker(was);

        let message = err.to_string();
        self.emit(SupervisorEvent::Error {
            issue: ConnectionIssue::categorize(&message),
            recoverable: err.is_recoverable(),
            message,
        });
        self.set_status(ConnectionStatus::Failed);

        let max_retries = self.config.retry.max_retries;
        if self.retries < max_retries {
            self.retries += 1;
            let delay = self.config.retry.retry_delay();
            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay, self.retries, max_retries
            );
            self.emit(SupervisorEvent::RetryScheduled {
                attempt: self.retries,
                delay_ms: delay.as_millis() as u64,
            });
            self.retry_timer = Some(self.schedule(
                delay,
                Internal::RetryDue {
                    generation: self.generation,
                },
            ));
        } else if max_retries > 0 {
            warn!("Giving up after {} retries", max_retries);
        }
    }

    /// Send a dispatcher frame, holding it while the session waits for
    /// its channel to reopen
    fn deliver(&mut self, frame: Outbound) {
        if (!self.held.is_empty() || !self.send_frame(&frame)) && self.session.is_some() {
            debug!("Holding {} frame until the channel reopens", frame.kind());
            self.held.push(frame);
        }
    }

    fn flush_held(&mut self) {
        if self.held.is_empty() {
            return;
        }
        info!("Sending {} held frame(s)", self.held.len());
        let held = std::mem::take(&mut self.held);
        let mut frames = held.into_iter();
        for frame in frames.by_ref() {
            if !self.send_frame(&frame) {
                self.held.push(frame);
                break;
            }
        }
        self.held.extend(frames);
    }

    fn send_frame(&self, frame: &Outbound) -> bool {
        let Some(session) = &self.session else {
            warn!("No session, dropping {} frame", frame.kind());
            return false;
        };
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Could not encode {} frame: {}", frame.kind(), e);
                return false;
            }
        };
        match session.send(&text) {
            Ok(()) => {
                debug!("Sent {} frame", frame.kind());
                true
            }
            Err(e) => {
                warn!("Could not send {} frame: {}", frame.kind(), e);
                false
            }
        }
    }

    fn forward(&self, mut events: PeerEvents, generation: u64) -> JoinHandle<()> {
        let internal = self.internal.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if internal.send(Internal::Peer { generation, event }).is_err() {
                    break;
                }
            }
        })
    }

    fn schedule(&self, delay: Duration, message: Internal) -> JoinHandle<()> {
        let internal = self.internal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(message);
        })
    }

    /// Close the current session after a failure
    async fn drop_session(&mut self) {
        self.generation += 1;
        self.held.clear();
        cancel(&mut self.reopen_timer);
        cancel(&mut self.forwarder);
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }

    /// Deliberate teardown: nothing scheduled survives it
    async fn teardown(&mut self) {
        self.generation += 1;
        if self.pending_connect.is_some() {
            // An aborted probe never reports back
            let was = self.breaker.phase();
            self.breaker.abandon_probe();
            self.report_breaker(was);
        }
        self.held.clear();
        for timer in [
            &mut self.pending_connect,
            &mut self.retry_timer,
            &mut self.reopen_timer,
            &mut self.forwarder,
        ] {
            cancel(timer);
        }
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        self.retries = 0;
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            info!("Connection status {} -> {}", self.status, status);
            self.status = status;
            self.emit(SupervisorEvent::Status(status));
        }
    }

    fn report_breaker(&self, was: BreakerPhase) {
        let now = self.breaker.phase();
        if now != was {
            self.emit(SupervisorEvent::Breaker(now));
        }
    }

    fn emit(&self, event: SupervisorEvent) {
        let _ = self.events.send(event);
    }
}

fn cancel(timer: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = timer.take() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_issues() {
        assert_eq!(
            ConnectionIssue::categorize("Transport error: Permission denied: microphone"),
            ConnectionIssue::Permission
        );
        assert_eq!(
            ConnectionIssue::categorize("ICE gathering failed"),
            ConnectionIssue::Network
        );
        assert_eq!(
            ConnectionIssue::categorize("Transport error: Connection timed out after 15s"),
            ConnectionIssue::Network
        );
        assert_eq!(
            ConnectionIssue::categorize("External service error: relay said no"),
            ConnectionIssue::Unknown
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionStatus::Closed.to_string(), "closed");
    }
}
