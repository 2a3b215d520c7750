//! Seam between the transport controller and the WebRTC engine.
//!
//! The controller's state machines only need a narrow slice of a peer
//! connection; expressing it as a trait keeps them testable without a
//! network. [`crate::rtc::engine`] binds the trait to the `webrtc` crate.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{CodecCapability, IceCandidate, MediaKind, SessionDescription};

/// ICE gathering progress, as reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GatheringState {
    #[default]
    New,
    Gathering,
    Complete,
}

/// Occupancy of a transceiver's sending slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderSlot {
    /// The transceiver has no sender at all.
    Missing,
    /// A sender exists but carries no track.
    Empty,
    /// A sender exists and is carrying a track.
    Sending,
}

pub type GatheringCompleteHandler = Arc<dyn Fn() + Send + Sync>;

/// The subset of a peer connection the transport controller drives.
///
/// SDP bodies and candidate strings pass through opaquely.
#[async_trait]
pub trait PeerSession: Send + Sync + 'static {
    type Transceiver: SessionTransceiver + Clone + Send + Sync;

    /// Create a local offer. `ice_restart` forces fresh ICE credentials.
    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription>;

    async fn set_local_description(&self, sd: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, sd: SessionDescription) -> Result<()>;

    /// The pending or current remote description, if any has been applied.
    async fn remote_description(&self) -> Option<SessionDescription>;

    /// The remote description of the last completed exchange.
    async fn current_remote_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn transceivers(&self) -> Vec<Self::Transceiver>;

    fn gathering_state(&self) -> GatheringState;

    fn is_closed(&self) -> bool;

    /// Register the hook invoked whenever ICE gathering completes. The hook
    /// must not re-enter the engine synchronously.
    fn on_gathering_complete(&self, hook: GatheringCompleteHandler);

    async fn close(&self) -> Result<()>;
}

/// Read-only view of a transceiver, for slot matching and codec recording.
#[async_trait]
pub trait SessionTransceiver {
    /// Media identifier, assigned once the transceiver has been negotiated.
    fn mid(&self) -> Option<String>;

    fn kind(&self) -> MediaKind;

    async fn sender_slot(&self) -> SenderSlot;

    /// Codecs negotiated for this transceiver's sender.
    async fn send_codecs(&self) -> Vec<CodecCapability>;
}
