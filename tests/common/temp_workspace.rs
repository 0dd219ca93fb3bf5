use std::path::PathBuf;
use std::time::Duration;

use kadabra_lsp::buffer::BufferHandle;
use kadabra_lsp::config::{Config, Language};
use kadabra_lsp::engine::Engine;
use tempfile::TempDir;

use super::find_rust_analyzer;

/// Represents a test fixture with files and a cursor position.
#[derive(Debug)]
pub struct Fixture {
    /// files in fixture
    pub files: Vec<(PathBuf, String)>,
    /// Position of cursor in fixture
    pub cursor: (PathBuf, u32, u32),
}

/// Parses fixate and covert to file content and paths
/// ## Panics
/// if input is malformed or cursor is not found
pub fn parse_fixture(temp_dir: &TempDir, input: &str) -> Fixture {
    std::fs::create_dir_all(temp_dir.path()).expect("mkdir failed");
    let mut files = Vec::new();
    let mut current_path: Option<PathBuf> = None;
    let mut current_content = String::new();

    let mut cursor = None;

    for line in input.lines() {
        if let Some(path) = line.strip_prefix("//- ") {
            if let Some(p) = current_path.take() {
                files.push((p, current_content.clone()));
                current_content.clear();
            }
            let pbuf = PathBuf::from(path.trim_start_matches('/'));
            current_path = Some(pbuf);
        } else {
            let mut l = line.to_string();
            if let Some(idx) = l.find("$0") {
                let line_no = u32::try_from(current_content.lines().count() + 1).expect("line count out of range");
                let col = u32::try_from(idx + 1).expect("line index out of range");
                cursor = Some((current_path.clone().unwrap(), line_no, col));
                l = l.replace("$0", "");
            }
            current_content.push_str(&l);
            current_content.push('\n');
        }
    }

    if let Some(p) = current_path {
        files.push((p, current_content));
    }

    Fixture {
        files,
        cursor: cursor.expect("missing $0 cursor"),
    }
}

/// Test workspace with an optional running session.
pub struct TestWorkspace {
    /// Temporary folder for the workspace
    pub root: TempDir,
    /// fixture for the workspace
    pub fixture: Fixture,
    /// The running session, if one was built
    pub engine: Option<Engine>,
    /// Handles keeping opened fixture files open for the session's lifetime
    open_handles: Vec<BufferHandle>,
    /// Canonicalized root path
    canonical_root: PathBuf,
}

impl TestWorkspace {
    /// creates new workspace
    /// ## Panics
    pub fn new(root: TempDir, fixture: &'_ str) -> Self {
        let fixture = parse_fixture(&root, fixture);

        for (path, content) in &fixture.files {
            let abs = root.path().join(path);
            std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
            std::fs::write(&abs, content).unwrap();
        }

        let canonical_root = root.path().canonicalize().expect("failed to canonicalize root");

        Self {
            root,
            fixture,
            engine: None,
            open_handles: Vec::new(),
            canonical_root,
        }
    }

    /// Creates a new builder for constructing a test workspace
    pub fn builder() -> TestWorkspaceBuilder {
        TestWorkspaceBuilder::new()
    }

    /// Returns the canonicalized root path
    pub fn canonical_root(&self) -> &PathBuf {
        &self.canonical_root
    }

    /// Converts a relative path to an absolute path
    pub fn apath(&self, path: &str) -> PathBuf {
        self.canonical_root.join(path)
    }

    /// Returns a reference to the running session
    /// ## Panics
    /// Panics if the session was not created
    pub fn engine(&self) -> &Engine {
        self.engine
            .as_ref()
            .expect("session not initialized. Use builder().build() to create one")
    }
}

/// Builder for creating test workspaces with a running session and optional
/// file opening.
pub struct TestWorkspaceBuilder {
    fixture: Option<String>,
    open_files: bool,
}

impl TestWorkspaceBuilder {
    /// Creates a new builder
    pub fn new() -> Self {
        Self {
            fixture: None,
            open_files: false,
        }
    }

    /// Sets the fixture content
    #[must_use]
    pub fn fixture(mut self, fixture: &str) -> Self {
        self.fixture = Some(fixture.to_string());
        self
    }

    /// Enables automatically opening all files in the workspace on build
    #[must_use]
    pub fn open_all_files(mut self) -> Self {
        self.open_files = true;
        self
    }

    /// Builds the test workspace with a running session.
    /// ## Panics
    /// Panics if fixture is not set
    pub async fn build(self) -> TestWorkspace {
        let fixture_str = self.fixture.expect("fixture must be set using .fixture()");

        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let mut workspace = TestWorkspace::new(temp_dir, &fixture_str);

        let config = Config::new(Language::Rust, workspace.canonical_root().clone(), find_rust_analyzer());
        let engine = Engine::start(config).await.expect("failed to start session");

        if self.open_files {
            for (relative_path, _) in workspace.fixture.files.clone() {
                if let Ok(handle) = engine.open_scope(relative_path).await {
                    workspace.open_handles.push(handle);
                }
            }
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }

        workspace.engine = Some(engine);
        workspace
    }
}

impl Default for TestWorkspaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
