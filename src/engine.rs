//! The concurrent façade core (§4.7): the full operation surface, built by
//! composing [`Session`], [`BufferManager`], and [`SymbolGraph`] behind a
//! single async API. [`crate::facade`] wraps this in a blocking adapter for
//! callers that don't want to drive an executor themselves.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lsp_types::{CompletionResponse, GotoDefinitionResponse, Position};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::buffer::{BufferHandle, BufferManager};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lsp::session::Session;
use crate::symbols::SymbolGraph;
use crate::types::{CompletionItem, Hover, Location, UnifiedSymbolInformation, url_to_path};

/// The maximum number of retries `completions` performs while the server
/// reports `isIncomplete = true` and the caller has not opted in to
/// incomplete results.
const MAX_COMPLETION_RETRIES: usize = 30;

/// The concurrent core: every operation in the façade's surface, as an
/// `async fn` over a single live session.
pub struct Engine {
    session: Arc<Session>,
    buffers: Arc<BufferManager>,
    graph: SymbolGraph,
}

impl Engine {
    /// Starts the language server and brings the session to `Ready`.
    ///
    /// ## Errors
    /// Propagates [`crate::error::SessionError`] if the server cannot be
    /// spawned or the `initialize` handshake fails.
    pub async fn start(config: Config) -> Result<Self> {
        let session = Arc::new(Session::start(config.clone()).await?);
        let buffers = BufferManager::new(Arc::clone(&session));
        let graph = SymbolGraph::new(Arc::clone(&session), Arc::clone(&buffers), &config).await;
        Ok(Self {
            session,
            buffers,
            graph,
        })
    }

    /// Flushes the symbol cache and shuts down the session.
    ///
    /// ## Errors
    /// Propagates cache flush or session shutdown errors.
    pub async fn stop(&self) -> Result<()> {
        self.graph.flush_cache().await?;
        self.session.stop().await?;
        Ok(())
    }

    /// Opens `relative_path` for the lifetime of the returned handle. See
    /// [`BufferManager::open_scope`].
    ///
    /// ## Errors
    /// Returns [`crate::error::BufferError::ReadFailed`] if the file cannot
    /// be read on first open.
    pub async fn open_scope(&self, relative_path: impl Into<PathBuf>) -> Result<BufferHandle> {
        Ok(self.buffers.open_scope(relative_path).await?)
    }

    /// The full current contents of an open document.
    ///
    /// ## Errors
    /// Returns [`crate::error::BufferError::NotOpen`] if the document is not
    /// open.
    pub async fn text_of(&self, relative_path: &Path) -> Result<String> {
        Ok(self.buffers.text_of(relative_path).await?)
    }

    /// Inserts `text` at `position` in an open document.
    ///
    /// ## Errors
    /// See [`BufferManager::insert`].
    pub async fn insert(&self, relative_path: &Path, position: Position, text: &str) -> Result<Position> {
        Ok(self.buffers.insert(relative_path, position, text).await?)
    }

    /// Deletes the text between `start` and `end` in an open document.
    ///
    /// ## Errors
    /// See [`BufferManager::delete`].
    pub async fn delete(&self, relative_path: &Path, start: Position, end: Position) -> Result<String> {
        Ok(self.buffers.delete(relative_path, start, end).await?)
    }

    /// `textDocument/definition`, normalized into this crate's [`Location`].
    ///
    /// ## Errors
    /// Propagates session errors from the underlying request.
    pub async fn definition(
        &self,
        relative_path: &Path,
        line: u32,
        character: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Location>> {
        let handle = self.buffers.open_scope(relative_path).await?;
        let absolute = self.session.repository_root().join(handle.path());
        let uri = crate::types::path_to_url(&absolute)?;
        let response = self
            .session
            .definition(uri, Position { line, character }, cancel)
            .await?;
        let repo_root = self.session.repository_root();
        Ok(match response {
            GotoDefinitionResponse::Scalar(loc) => vec![Location::from_lsp(&loc, repo_root)],
            GotoDefinitionResponse::Array(locs) => {
                locs.iter().map(|loc| Location::from_lsp(loc, repo_root)).collect()
            }
            GotoDefinitionResponse::Link(links) => links
                .iter()
                .map(|l| {
                    Location::from_lsp(
                        &lsp_types::Location {
                            uri: l.target_uri.clone(),
                            range: l.target_selection_range,
                        },
                        repo_root,
                    )
                })
                .collect(),
        })
    }

    /// `textDocument/references`, normalized into this crate's [`Location`].
    ///
    /// ## Errors
    /// Propagates session errors from the underlying request.
    pub async fn references(
        &self,
        relative_path: &Path,
        line: u32,
        character: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Location>> {
        let handle = self.buffers.open_scope(relative_path).await?;
        let absolute = self.session.repository_root().join(handle.path());
        let uri = crate::types::path_to_url(&absolute)?;
        let locations = self
            .session
            .references(uri, Position { line, character }, false, cancel)
            .await?;
        let repo_root = self.session.repository_root();
        Ok(locations.iter().map(|loc| Location::from_lsp(loc, repo_root)).collect())
    }

    /// `textDocument/hover`, normalized into this crate's [`Hover`].
    ///
    /// ## Errors
    /// Propagates session errors from the underlying request.
    pub async fn hover(
        &self,
        relative_path: &Path,
        line: u32,
        character: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<Hover>> {
        let handle = self.buffers.open_scope(relative_path).await?;
        let absolute = self.session.repository_root().join(handle.path());
        let uri = crate::types::path_to_url(&absolute)?;
        let hover = self.session.hover(uri, Position { line, character }, cancel).await?;
        Ok(hover.map(Hover::from))
    }

    /// `textDocument/completion`, retrying while the server reports
    /// `isIncomplete = true` and `allow_incomplete` is `false`, up to
    /// [`MAX_COMPLETION_RETRIES`] times. Returns an empty list if the
    /// results never settle within that bound. Keyword completions are
    /// dropped and the remaining items are deduplicated, preserving the
    /// server's ordering.
    ///
    /// ## Errors
    /// Propagates session errors from the underlying request.
    pub async fn completions(
        &self,
        relative_path: &Path,
        line: u32,
        character: u32,
        allow_incomplete: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<CompletionItem>> {
        let handle = self.buffers.open_scope(relative_path).await?;
        let absolute = self.session.repository_root().join(handle.path());
        let uri = crate::types::path_to_url(&absolute)?;
        let position = Position { line, character };

        for attempt in 0..MAX_COMPLETION_RETRIES {
            let response = self.session.completion(uri.clone(), position, cancel).await?;
            let (items, is_incomplete) = match response {
                Some(CompletionResponse::Array(items)) => (items, false),
                Some(CompletionResponse::List(list)) => (list.items, list.is_incomplete),
                None => (vec![], false),
            };
            if allow_incomplete || !is_incomplete {
                return Ok(dedup_completions(items));
            }
            warn!(path = %relative_path.display(), attempt, "completion results incomplete, retrying");
        }
        warn!(path = %relative_path.display(), "completion never settled, returning empty");
        Ok(vec![])
    }

    /// `textDocument/documentSymbol`, normalized and served from the
    /// content-addressed cache. See [`SymbolGraph::document_symbols`].
    ///
    /// ## Errors
    /// Propagates session or buffer errors.
    pub async fn document_symbols(
        &self,
        relative_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(Vec<UnifiedSymbolInformation>, Option<Vec<UnifiedSymbolInformation>>)> {
        Ok(self.graph.document_symbols(relative_path, cancel).await?)
    }

    /// The set of absolute paths the server has indexed, derived from
    /// `workspace/symbol` with an empty query and deduplicated.
    ///
    /// Some servers reject or truncate an empty-query workspace-symbol
    /// request; this operation does not fall back to a directory walk when
    /// that happens, since that behavior is outside this crate's scope.
    ///
    /// ## Errors
    /// Propagates session errors from the underlying request.
    pub async fn parsed_files(&self, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
        let symbols = self.session.workspace_symbol("", cancel).await?;
        let mut paths: Vec<PathBuf> = symbols
            .iter()
            .filter_map(|s| url_to_path(&s.location.uri))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// The innermost class/function/method/variable symbol enclosing
    /// `(line, character)`. See [`SymbolGraph::containing_symbol`].
    ///
    /// ## Errors
    /// Propagates session or buffer errors.
    pub async fn containing_symbol(
        &self,
        relative_path: &Path,
        line: u32,
        character: Option<u32>,
        strict: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<UnifiedSymbolInformation>> {
        Ok(self
            .graph
            .containing_symbol(relative_path, line, character, strict, cancel)
            .await?)
    }

    /// The symbol lexically containing `sym`. See
    /// [`SymbolGraph::container_of_symbol`].
    ///
    /// ## Errors
    /// Propagates session or buffer errors.
    pub async fn container_of_symbol(
        &self,
        sym: &UnifiedSymbolInformation,
        cancel: &CancellationToken,
    ) -> Result<Option<UnifiedSymbolInformation>> {
        Ok(self.graph.container_of_symbol(sym, cancel).await?)
    }

    /// The symbol defining the identifier at `(line, character)`. See
    /// [`SymbolGraph::defining_symbol`].
    ///
    /// ## Errors
    /// Propagates session or buffer errors.
    pub async fn defining_symbol(
        &self,
        relative_path: &Path,
        line: u32,
        character: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<UnifiedSymbolInformation>> {
        Ok(self
            .graph
            .defining_symbol(relative_path, line, character, cancel)
            .await?)
    }

    /// Symbols referencing the identifier at `(line, character)`. See
    /// [`SymbolGraph::referencing_symbols`].
    ///
    /// ## Errors
    /// Propagates session or buffer errors.
    pub async fn referencing_symbols(
        &self,
        relative_path: &Path,
        line: u32,
        character: u32,
        include_imports: bool,
        include_self: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<UnifiedSymbolInformation>> {
        Ok(self
            .graph
            .referencing_symbols(relative_path, line, character, include_imports, include_self, cancel)
            .await?)
    }
}

/// Drops keyword completions and deduplicates the rest, preserving the
/// order the server returned them in.
fn dedup_completions(items: Vec<lsp_types::CompletionItem>) -> Vec<CompletionItem> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::with_capacity(items.len());
    for item in items {
        if item.kind == Some(lsp_types::CompletionItemKind::KEYWORD) {
            continue;
        }
        let item = CompletionItem::from(item);
        if seen.insert(item.clone()) {
            deduped.push(item);
        }
    }
    deduped
}
