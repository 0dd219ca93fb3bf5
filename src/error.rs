//! Error types for the kadabra-lsp client.
//!
//! Errors are organized by subsystem: transport, session, buffer manager,
//! symbol-graph engine, and symbol cache. Each subsystem error composes into
//! the crate-level [`Error`] via `#[from]`, matching the taxonomy of
//! `NotStarted` / `TransportFatal` / `RpcError` / `Cancelled` /
//! `ProtocolViolation` / `ServerReturnedNone` used throughout the session.

use thiserror::Error;

/// Errors raised while spawning or framing messages to the language server
/// process.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The language server process failed to start.
    #[error("failed to start language server: {0}")]
    SpawnFailed(String),

    /// The language server process exited unexpectedly.
    #[error("language server exited unexpectedly: {0}")]
    ProcessExited(String),

    /// The child process's stdio handles were not available.
    #[error("failed to capture language server stdio: {0}")]
    StdioUnavailable(String),

    /// IO error while reading or writing framed messages.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the session lifecycle and raw LSP operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation was attempted before the session reached `Ready`.
    #[error("session not started")]
    NotStarted,

    /// The transport failed fatally; the session is no longer usable.
    #[error("transport failed fatally: {0}")]
    TransportFatal(#[from] TransportError),

    /// Initialization with the language server failed.
    #[error("language server initialization failed: {0}")]
    InitializationFailed(String),

    /// The language server returned a JSON-RPC error response.
    #[error("language server returned an error: {message} (code: {code})")]
    RpcError {
        /// The JSON-RPC error code.
        code: i32,
        /// The JSON-RPC error message.
        message: String,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// A request to the language server timed out.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The server's response did not match the shape the protocol promises.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid position in a document.
    #[error("invalid position: line {line}, character {character}")]
    InvalidPosition {
        /// Zero-indexed line number.
        line: u32,
        /// Zero-indexed character offset.
        character: u32,
    },

    /// A file path could not be turned into a `file://` URI.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Errors raised by the reference-counted document buffer manager.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The requested document is not open.
    #[error("document not open: {0}")]
    NotOpen(String),

    /// The document could not be read from disk.
    #[error("failed to read '{path}': {source}")]
    ReadFailed {
        /// The path that failed to read.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An edit referenced a position outside the buffer's current contents.
    #[error("edit position out of bounds: line {line}, character {character}")]
    PositionOutOfBounds {
        /// Zero-indexed line number.
        line: u32,
        /// Zero-indexed character offset.
        character: u32,
    },

    /// A session-level error surfaced while emitting a buffer notification.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors raised by the persistent document-symbols cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error while reading or writing the cache file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The cache file failed to (de)serialize.
    #[error("failed to (de)serialize cache: {0}")]
    Codec(String),
}

/// Errors raised by the symbol-graph engine's layered algorithms.
#[derive(Debug, Error)]
pub enum SymbolGraphError {
    /// A session-level error occurred while resolving a symbol query.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A buffer-level error occurred while resolving a symbol query.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The server returned no result for an operation that legitimately can
    /// return none (e.g. a definition for an external/generic symbol).
    #[error("language server returned no result for {0}")]
    ServerReturnedNone(String),
}

/// A unified error type for the kadabra-lsp crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session-level error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Buffer manager error.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Symbol cache error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Symbol-graph engine error.
    #[error("symbol graph error: {0}")]
    SymbolGraph(#[from] SymbolGraphError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for kadabra-lsp operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::NotStarted;
        assert_eq!(err.to_string(), "session not started");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = SessionError::Cancelled.into();
        assert!(matches!(err, Error::Session(SessionError::Cancelled)));
    }

    #[test]
    fn test_buffer_error_from_session_error() {
        let session_err = SessionError::NotStarted;
        let buf_err: BufferError = session_err.into();
        assert!(matches!(buf_err, BufferError::Session(_)));
    }

    #[test]
    fn test_symbol_graph_error_from_buffer_error() {
        let buf_err = BufferError::NotOpen("a.rs".to_string());
        let sg_err: SymbolGraphError = buf_err.into();
        assert!(matches!(sg_err, SymbolGraphError::Buffer(_)));
    }
}
