//! Simulcast stream health: per-layer liveness tracking and per-publisher
//! aggregation.

pub mod manager;
pub mod tracker;

pub use manager::{StreamTrackerManager, DEFAULT_MAX_SPATIAL_LAYER};
pub use tracker::{StreamStatus, StreamTracker};
