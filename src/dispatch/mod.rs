//! Function-call dispatch over the message channel

pub mod dispatcher;
pub mod envelope;

pub use dispatcher::Dispatcher;
pub use envelope::{parse_inbound, ConversationItem, FunctionCall, Inbound, Outbound, SessionConfig};
