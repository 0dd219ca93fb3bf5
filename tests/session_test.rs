//! End-to-end coverage of the session lifecycle against a real language
//! server: `Session::stop` must be idempotent, and a stopped session must
//! stay stopped rather than bounce back to `Ready`.
mod common;

use kadabra_lsp::config::{Config, Language};
use kadabra_lsp::lsp::session::{Session, SessionState};

use common::{fixture_path, find_rust_analyzer};

#[tokio::test]
async fn test_stop_is_idempotent() {
    let config = Config::new(Language::Rust, fixture_path(), find_rust_analyzer());
    let session = Session::start(config).await.expect("session should start");
    assert_eq!(session.state(), SessionState::Ready);

    session.stop().await.expect("first stop should succeed");
    assert_eq!(session.state(), SessionState::Stopped);

    // Calling stop again on an already-stopped session is a no-op, not an
    // error or a panic.
    session.stop().await.expect("second stop should be a no-op");
    assert_eq!(session.state(), SessionState::Stopped);
}
