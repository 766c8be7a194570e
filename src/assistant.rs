//! Assistant runtime
//!
//! Wires the element registry, the tool set, the dispatch loop and the
//! connection supervisor together, and runs them on a worker thread with
//! its own tokio runtime. Callers drive it through an [`AssistantHandle`]:
//! commands in, status events out, both over crossbeam channels.

use crate::config::AssistantConfig;
use crate::dispatch::Dispatcher;
use crate::images::{HttpImageGenerator, ImageGenerator};
use crate::registry::{render::render_page, shared_registry, SharedRegistry};
use crate::supervisor::{
    BreakerPhase, ConnectionIssue, ConnectionStatus, Supervisor, SupervisorEvent,
};
use crate::tools::{catalog, ToolContext, ToolSet};
use crate::transport::{HttpSignaling, PeerConnector, Signaling, WebSocketConnector};
use crate::{Result, VoxError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

/// Commands that can be sent to the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantCommand {
    /// Establish the realtime session
    Connect,

    /// Tear the session down; pending reconnects are cancelled
    Disconnect,

    /// Manual retry after a failure
    Retry,

    /// Stop the worker
    Shutdown,
}

/// Events emitted by the assistant
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    /// Worker is running with this many tools registered
    Ready { tools: usize },

    /// Connection status changed
    Status(ConnectionStatus),

    /// Tool catalog was (re)sent to the remote model
    SessionConfigured,

    /// A connection attempt failed
    ConnectionError {
        issue: ConnectionIssue,
        message: String,
        recoverable: bool,
    },

    /// Automatic reconnection is pending
    RetryScheduled { attempt: u32, delay_ms: u64 },

    /// The circuit breaker refused to connect
    ConnectRejected { retry_in_ms: u64 },

    /// Circuit breaker changed phase
    Breaker(BreakerPhase),

    /// The worker could not run
    Error(String),

    /// Worker has shut down
    Shutdown,
}

impl From<SupervisorEvent> for AssistantEvent {
    fn from(event: SupervisorEvent) -> Self {
        match event {
            SupervisorEvent::Status(status) => AssistantEvent::Status(status),
            SupervisorEvent::SessionConfigured => AssistantEvent::SessionConfigured,
            SupervisorEvent::Error {
                issue,
                message,
                recoverable,
            } => AssistantEvent::ConnectionError {
                issue,
                message,
                recoverable,
            },
            SupervisorEvent::RetryScheduled { attempt, delay_ms } => {
                AssistantEvent::RetryScheduled { attempt, delay_ms }
            }
            SupervisorEvent::ConnectRejected { retry_in_ms } => {
                AssistantEvent::ConnectRejected { retry_in_ms }
            }
            SupervisorEvent::Breaker(phase) => AssistantEvent::Breaker(phase),
        }
    }
}

/// Handle for controlling the assistant
#[derive(Clone)]
pub struct AssistantHandle {
    /// Command sender
    command_tx: Sender<AssistantCommand>,

    /// Event receiver
    event_rx: Receiver<AssistantEvent>,

    /// The page the tools operate on
    registry: SharedRegistry,
}

impl AssistantHandle {
    /// Send a command to the assistant
    pub fn send_command(&self, cmd: AssistantCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| VoxError::Channel(format!("Failed to send command: {}", e)))
    }

    /// Try to receive an event from the assistant
    pub fn try_recv_event(&self) -> Option<AssistantEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<AssistantEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Shared element registry
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Current page rendered to HTML
    pub fn page_html(&self) -> String {
        render_page(&self.registry.lock())
    }
}

/// Connects the tool set to a realtime session
pub struct Assistant {
    config: AssistantConfig,
    command_rx: Receiver<AssistantCommand>,
    event_tx: Sender<AssistantEvent>,
    registry: SharedRegistry,
    tools: Arc<ToolSet>,
    connector: Arc<dyn PeerConnector>,
    signaling: Arc<dyn Signaling>,
    images: Arc<dyn ImageGenerator>,
}

impl Assistant {
    /// Create an assistant with the given collaborators
    ///
    /// Fails when the configuration is invalid or the tool set and the
    /// advertised catalog disagree.
    pub fn new(
        config: AssistantConfig,
        connector: Arc<dyn PeerConnector>,
        signaling: Arc<dyn Signaling>,
        images: Arc<dyn ImageGenerator>,
    ) -> Result<(Self, AssistantHandle)> {
        config.validate()?;
        let tools = ToolSet::standard()?;
        tools.verify_catalog(catalog())?;

        let (command_tx, command_rx) = bounded(100);
        let (event_tx, event_rx) = bounded(100);
        let registry = shared_registry();

        let handle = AssistantHandle {
            command_tx,
            event_rx,
            registry: Arc::clone(&registry),
        };
        let assistant = Self {
            config,
            command_rx,
            event_tx,
            registry,
            tools: Arc::new(tools),
            connector,
            signaling,
            images,
        };
        Ok((assistant, handle))
    }

    /// Start the worker thread
    ///
    /// This consumes the assistant and returns the join handle of the worker.
    pub fn start(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("voxpage-assistant".to_string())
            .spawn(move || self.run_worker())?;
        Ok(handle)
    }

    fn run_worker(self) {
        info!("Assistant worker starting");

        let runtime = match Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create tokio runtime: {}", e);
                let _ = self
                    .event_tx
                    .send(AssistantEvent::Error(format!("Runtime creation failed: {}", e)));
                let _ = self.event_tx.send(AssistantEvent::Shutdown);
                return;
            }
        };

        let event_tx = self.event_tx.clone();
        runtime.block_on(self.run());
        let _ = event_tx.send(AssistantEvent::Shutdown);
        info!("Assistant worker stopped");
    }

    async fn run(self) {
        let ctx = ToolContext::new(Arc::clone(&self.registry), Arc::clone(&self.images))
            .with_image_timeout(self.config.endpoints.image_timeout());
        let dispatcher = Dispatcher::new(Arc::clone(&self.tools), ctx);
        let mut supervisor = Supervisor::spawn(
            self.config.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.signaling),
            dispatcher,
        );
        let _ = self.event_tx.send(AssistantEvent::Ready {
            tools: self.tools.len(),
        });

        loop {
            match self.command_rx.try_recv() {
                Ok(AssistantCommand::Shutdown) => {
                    info!("Assistant shutdown requested");
                    break;
                }
                Ok(cmd) => {
                    debug!("Assistant command {:?}", cmd);
                    let forwarded = match cmd {
                        AssistantCommand::Connect => supervisor.connect(),
                        AssistantCommand::Disconnect => supervisor.disconnect(),
                        AssistantCommand::Retry => supervisor.retry(),
                        AssistantCommand::Shutdown => Ok(()),
                    };
                    if let Err(e) = forwarded {
                        warn!("Supervisor unavailable: {}", e);
                        break;
                    }
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    warn!("Command channel disconnected");
                    break;
                }
            }

            while let Some(event) = supervisor.try_next_event() {
                // Never block the runtime on a caller that stopped reading
                if self.event_tx.try_send(AssistantEvent::from(event)).is_err() {
                    debug!("Event queue full, dropping event");
                }
            }

            // Small sleep to avoid busy-waiting
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        supervisor.shutdown().await;
    }
}

/// Builder for creating an assistant
pub struct AssistantBuilder {
    config: AssistantConfig,
    connector: Option<Arc<dyn PeerConnector>>,
    signaling: Option<Arc<dyn Signaling>>,
    images: Option<Arc<dyn ImageGenerator>>,
}

impl AssistantBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: AssistantConfig::default(),
            connector: None,
            signaling: None,
            images: None,
        }
    }

    /// Set the complete configuration
    pub fn with_config(mut self, config: AssistantConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific connectivity layer
    pub fn with_connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a specific credential source and offer relay
    pub fn with_signaling(mut self, signaling: Arc<dyn Signaling>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    /// Use a specific image generator
    pub fn with_images(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    /// Build the assistant; unset collaborators talk to the configured endpoints
    pub fn build(self) -> Result<(Assistant, AssistantHandle)> {
        let endpoints = &self.config.endpoints;
        let connector: Arc<dyn PeerConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WebSocketConnector::new(endpoints)),
        };
        let signaling: Arc<dyn Signaling> = match self.signaling {
            Some(signaling) => signaling,
            None => Arc::new(HttpSignaling::new(endpoints)),
        };
        let images: Arc<dyn ImageGenerator> = match self.images {
            Some(images) => images,
            None => Arc::new(HttpImageGenerator::new(endpoints)),
        };
        Assistant::new(self.config, connector, signaling, images)
    }
}

impl Default for AssistantBuilder {
    fn default() -> Self {
        Self::new()
    }
}
