//! Logging bootstrap, exercised end to end through a file sink.

use crossbar::logging::init_logging;
use crossbar::LoggingConfig;

#[test]
fn json_logging_writes_to_the_configured_file() {
    let path = std::env::temp_dir().join(format!("crossbar-test-{}.log", std::process::id()));
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: "json".to_string(),
        file_path: Some(path.display().to_string()),
    };

    init_logging(&config).unwrap();
    tracing::info!(peer = "peer-1", "transport controller ready");

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("transport controller ready"));
    assert!(contents.contains("peer-1"));

    // the global subscriber installs once; a second init reports failure
    assert!(init_logging(&config).is_err());

    let _ = std::fs::remove_file(&path);
}
