use std::fs::File;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Filter directives applied when `RUST_LOG` is absent: the configured
/// level for our own crates, with the engine's ICE/DTLS/SCTP internals
/// capped at `error` so a debug session is not drowned in transport chatter.
fn default_directives(level: &str) -> String {
    format!(
        "{level},webrtc=error,webrtc_ice=error,webrtc_dtls=error,webrtc_srtp=error,webrtc_sctp=error"
    )
}

/// Initialize structured logging based on configuration.
///
/// JSON output is meant for production collectors, the pretty format for
/// development; file output is plain text without ANSI escapes. `RUST_LOG`
/// wins over the configured level when set. Fails if a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .unwrap_or_else(|_| EnvFilter::new(default_directives("info")));

    let registry = tracing_subscriber::registry().with(filter);

    match (config.format.as_str(), &config.file_path) {
        ("json", Some(path)) => {
            let layer = fmt::layer().json().with_target(true).with_writer(open_log_file(path)?);
            registry.with(layer).try_init()?;
        }
        ("json", None) => {
            registry.with(fmt::layer().json().with_target(true)).try_init()?;
        }
        (_, Some(path)) => {
            let layer = fmt::layer().with_ansi(false).with_writer(open_log_file(path)?);
            registry.with(layer).try_init()?;
        }
        (_, None) => {
            registry.with(fmt::layer().pretty()).try_init()?;
        }
    }

    Ok(())
}

fn open_log_file(path: &str) -> std::io::Result<Arc<File>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(Arc::new(file))
}
