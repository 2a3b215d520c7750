//! Peer-connection transport: controller, negotiation state machine, and
//! the engine seam.

pub mod engine;
pub mod session;
pub mod testing;
pub mod transport;

pub use engine::{new_peer_connection, WebRtcSession, WebRtcTransceiver};
pub use session::{GatheringState, PeerSession, SenderSlot, SessionTransceiver};
pub use transport::{OfferOptions, PcTransport};
