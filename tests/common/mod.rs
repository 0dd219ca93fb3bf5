//! Common test helpers and utilities.

#![allow(dead_code)]

pub mod temp_workspace;

use std::path::PathBuf;
use std::time::Duration;

use kadabra_lsp::config::{Config, Language};
use kadabra_lsp::engine::Engine;

// Re-export for convenience
pub use temp_workspace::TestWorkspace;

/// Helper to get the fixture project path
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample_project")
}

/// Helper to find rust-analyzer executable
pub fn find_rust_analyzer() -> String {
    if let Ok(path) = std::env::var("RUST_ANALYZER_PATH") {
        return path;
    }

    let candidates = ["rust-analyzer", "~/.cargo/bin/rust-analyzer"];

    for candidate in candidates {
        if let Ok(output) = std::process::Command::new(candidate).arg("--version").output()
            && output.status.success()
        {
            return candidate.to_string();
        }
    }

    "rust-analyzer".to_string()
}

/// Helper to create and start an `Engine` against the sample fixture project.
pub async fn setup_engine() -> Engine {
    // CI environments need longer timeouts due to slower hardware and more concurrent processes
    let (init_timeout, request_timeout, index_wait) = if std::env::var("CI").is_ok() {
        (
            Duration::from_secs(120),
            Duration::from_secs(60),
            Duration::from_millis(8000),
        )
    } else {
        (
            Duration::from_secs(60),
            Duration::from_secs(30),
            Duration::from_millis(2000),
        )
    };

    let mut config = Config::new(Language::Rust, fixture_path(), find_rust_analyzer());
    config.init_timeout = init_timeout;
    config.request_timeout = request_timeout;

    let engine = Engine::start(config).await.expect("failed to start session");

    // Give rust-analyzer time to fully index the workspace
    tokio::time::sleep(index_wait).await;

    engine
}

/// Helper wait after opening a file, giving rust-analyzer time to process it.
pub async fn wait_for_processing() {
    let process_wait = if std::env::var("CI").is_ok() {
        Duration::from_millis(3000)
    } else {
        Duration::from_millis(500)
    };
    tokio::time::sleep(process_wait).await;
}
