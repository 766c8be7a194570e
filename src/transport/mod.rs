//! Realtime transport
//!
//! Session negotiation ([`signaling`]), the connectivity abstraction
//! ([`peer`]) with a socket and a loopback implementation, and the
//! session state machine tying them together.

pub mod loopback;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod socket;

pub use loopback::{LoopbackConnector, LoopbackRemote, LoopbackSignaling};
pub use peer::{ChannelOptions, Connectivity, LinkRequest, PeerConnector, PeerEvent, PeerEvents, PeerLink};
pub use session::{NegotiationOptions, SessionState, TransportSession};
pub use signaling::{parse_credential, HttpSignaling, SessionCredential, Signaling};
pub use socket::WebSocketConnector;
