//! Connection health: circuit breaker and reconnection supervisor

pub mod breaker;
#[allow(clippy::module_inception)]
pub mod supervisor;

pub use breaker::{BreakerPhase, CircuitBreaker, CircuitState};
pub use supervisor::{
    ConnectionIssue, ConnectionStatus, Supervisor, SupervisorCommand, SupervisorEvent,
    SupervisorHandle,
};
