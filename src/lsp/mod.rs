//! The raw client-side LSP session: process spawn, JSON-RPC framing
//! (delegated to `async-lsp`), correlation, initialization, and shutdown.
//!
//! # Architecture
//!
//! - `session`: the session lifecycle and the raw request wrappers every
//!   higher-level component (buffer manager, symbol-graph engine) is built
//!   on top of.
//!
//! Everything above this module works with [`crate::types`], never with
//! raw `lsp_types` values.

pub mod session;

use crate::error::SessionError;

/// Result type for raw session operations.
pub type LspResult<T> = std::result::Result<T, SessionError>;
