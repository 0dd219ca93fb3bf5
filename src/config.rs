//! Crate-level configuration.
//!
//! This mirrors how the original `multilspy` config record selects a
//! language and a small number of behavioral flags, without tying the crate
//! to any outer CLI or IDE configuration format.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The language a session's underlying language server speaks.
///
/// This only selects defaults (server command, language id); the caller is
/// still responsible for having the server binary installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python, via e.g. `pylsp` or `pyright`.
    Python,
    /// Java, via e.g. `jdtls`.
    Java,
    /// Rust, via `rust-analyzer`.
    Rust,
    /// C#, via `omnisharp` or `csharp-ls`.
    CSharp,
    /// TypeScript, via `typescript-language-server`.
    TypeScript,
    /// JavaScript, via `typescript-language-server`.
    JavaScript,
    /// Go, via `gopls`.
    Go,
    /// Ruby, via `solargraph`.
    Ruby,
}

impl Language {
    /// Returns the LSP `languageId` used in `textDocument/didOpen` for this
    /// language.
    pub fn language_id(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Rust => "rust",
            Language::CSharp => "csharp",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Ruby => "ruby",
        }
    }
}

/// Configuration for a session against a single repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The language the session's server speaks.
    pub code_language: Language,

    /// When set, every outbound and inbound LSP message is logged at
    /// `DEBUG`. Off by default since wire traffic is verbose.
    #[serde(default)]
    pub trace_lsp_communication: bool,

    /// When set, `referencingSymbols` falls back to a heuristic that infers
    /// a containing "symbol" for attribute-assignment sites with no
    /// enclosing function, by inspecting the reference line's source text.
    /// This is a language-specific heuristic and is off by default.
    #[serde(default)]
    pub enable_attribute_assignment_fallback: bool,

    /// Root directory of the repository being analyzed.
    pub repository_root: PathBuf,

    /// Command used to launch the language server.
    pub server_command: String,

    /// Arguments passed to the language server command.
    #[serde(default)]
    pub server_args: Vec<String>,

    /// Timeout for the `initialize` handshake.
    #[serde(default = "default_init_timeout", with = "duration_secs")]
    pub init_timeout: Duration,

    /// Timeout for individual requests.
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
}

fn default_init_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Config {
    /// Creates a configuration with the given language, repository root, and
    /// server command, using default timeouts and flags.
    pub fn new(
        code_language: Language,
        repository_root: impl Into<PathBuf>,
        server_command: impl Into<String>,
    ) -> Self {
        Self {
            code_language,
            trace_lsp_communication: false,
            enable_attribute_assignment_fallback: false,
            repository_root: repository_root.into(),
            server_command: server_command.into(),
            server_args: Vec::new(),
            init_timeout: default_init_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new_uses_default_timeouts() {
        let cfg = Config::new(Language::Rust, "/tmp/repo", "rust-analyzer");
        assert_eq!(cfg.init_timeout, Duration::from_secs(30));
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert!(!cfg.trace_lsp_communication);
        assert!(!cfg.enable_attribute_assignment_fallback);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg = Config::new(Language::Python, "/tmp/repo", "pylsp");
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code_language, Language::Python);
        assert_eq!(back.server_command, "pylsp");
    }

    #[test]
    fn test_language_id() {
        assert_eq!(Language::Rust.language_id(), "rust");
        assert_eq!(Language::TypeScript.language_id(), "typescript");
    }
}
