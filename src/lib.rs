//! Selective forwarding unit core.
//!
//! This crate implements the two hot-path subsystems of an SFU: the
//! per-peer transport controller and the per-publisher simulcast health
//! monitor. The outer server supplies rooms, authentication, routing and
//! the signaling channel; the WebRTC engine supplies ICE/DTLS/SRTP.
//!
//! ## Architecture
//!
//! - **[`PcTransport`]**: wraps a peer connection with negotiation
//!   bookkeeping: debounced renegotiation with at most one offer in
//!   flight, remote candidates buffered until a remote description exists,
//!   ICE restart deferred past an active gathering cycle, and a per-mid
//!   record of negotiated codecs for subscriber slot placement.
//! - **[`StreamTracker`]**: per-layer liveness detection with sample/cycle
//!   hysteresis.
//! - **[`StreamTrackerManager`]**: folds tracker transitions into a sorted
//!   available-layer set and publishes every change, in order, to the
//!   subscriber forwarder.
//!
//! The engine is reached through the [`PeerSession`] seam; [`rtc::engine`]
//! binds it to the `webrtc` crate, and [`rtc::testing`] provides an
//! in-memory double.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crossbar::{Config, PcTransport, WebRtcSession};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let session = Arc::new(WebRtcSession::new(&config.rtc).await?);
//! let transport = PcTransport::new(session, &config.rtc);
//! transport.on_offer(|offer| {
//!     // hand the offer to the signaling channel
//! });
//! transport.negotiate();
//! ```

pub mod config;
pub mod debounce;
pub mod error;
pub mod logging;
pub mod rtc;
pub mod sfu;
pub mod types;

pub use config::{CodecSpec, Config, LoggingConfig, RtcConfig, StreamTrackerConfig, TrackerTuning};
pub use debounce::Debouncer;
pub use error::{Error, Result};
pub use rtc::{
    new_peer_connection, GatheringState, OfferOptions, PcTransport, PeerSession, SenderSlot,
    SessionTransceiver, WebRtcSession, WebRtcTransceiver,
};
pub use sfu::{StreamStatus, StreamTracker, StreamTrackerManager, DEFAULT_MAX_SPATIAL_LAYER};
pub use types::{CodecCapability, IceCandidate, MediaKind, SdpKind, SessionDescription};
