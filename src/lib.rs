//! A client-side Language Server Protocol façade.
//!
//! Spawns a language server, speaks the LSP base protocol over its stdio,
//! and layers a reference-counted buffer manager and a symbol-graph engine
//! on top of the raw protocol so callers reason in terms of symbols and
//! file positions instead of JSON-RPC requests.
//!
//! # Overview
//!
//! This library provides:
//! - A session type owning the server process and the `initialize` /
//!   `shutdown` handshake
//! - A reference-counted buffer manager guaranteeing `didOpen`/`didClose`
//!   pairing regardless of how many callers have a document open at once
//! - A content-addressed, persistent document-symbols cache
//! - A symbol-graph engine layering containing/defining/referencing-symbol
//!   queries over the raw protocol
//! - Both a concurrent (`async`) and a synchronous, thread-backed façade
//!   over the same operation surface
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │       Caller       │
//! └─────────┬──────────┘
//!           │ async or blocking calls
//! ┌─────────▼──────────┐      ┌──────────────────┐
//! │   engine::Engine   │◄────►│  cache::SymbolCache │
//! │  facade::SyncSession│      └──────────────────┘
//! └─────────┬──────────┘
//!           │
//! ┌─────────▼──────────┐      ┌──────────────────┐
//! │ buffer::BufferManager│◄──►│ symbols::SymbolGraph │
//! └─────────┬──────────┘      └──────────────────┘
//!           │
//! ┌─────────▼──────────┐
//! │    lsp::session     │
//! └─────────┬──────────┘
//!           │ JSON-RPC over stdio
//! ┌─────────▼──────────┐
//! │   Language Server   │
//! │   (e.g. rust-analyzer)│
//! └────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`error`] — the crate's error taxonomy
//! - [`config`] — session configuration
//! - [`types`] — the normalized data model ([`types::UnifiedSymbolInformation`],
//!   [`types::Location`], [`types::Hover`], [`types::CompletionItem`])
//! - [`lsp`] — the raw client-side LSP session
//! - [`buffer`] — the reference-counted document buffer manager
//! - [`cache`] — the persistent document-symbols cache
//! - [`symbols`] — the symbol-graph engine
//! - [`engine`] — the concurrent façade core
//! - [`facade`] — the synchronous, thread-backed façade
//!
//! # Example
//!
//! ```ignore
//! use kadabra_lsp::config::{Config, Language};
//! use kadabra_lsp::engine::Engine;
//!
//! #[tokio::main]
//! async fn main() -> kadabra_lsp::Result<()> {
//!     let config = Config::new(Language::Rust, ".", "rust-analyzer");
//!     let engine = Engine::start(config).await?;
//!     let cancel = Default::default();
//!     let (symbols, _tree) = engine.document_symbols(std::path::Path::new("src/lib.rs"), &cancel).await?;
//!     println!("{} symbols", symbols.len());
//!     engine.stop().await?;
//!     Ok(())
//! }
//! ```

// Enforce documentation and other quality attributes
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are too strict
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod buffer;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod lsp;
pub mod symbols;
pub mod types;

// Re-export commonly used types at the crate root
pub use error::{Error, Result};
