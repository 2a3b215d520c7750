use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The WebRTC engine rejected or failed an operation.
    #[error("webrtc engine error: {0}")]
    Engine(#[from] webrtc::Error),

    /// A signaling input could not be applied.
    #[error("signaling error: {0}")]
    Signaling(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
