//! The symbol-graph engine (§4.6): `documentSymbols` normalization and its
//! content-addressed cache, plus the layered algorithms built on top of raw
//! LSP operations — containing symbol, container-of symbol, defining
//! symbol, and referencing symbols. Ported from `multilspy`'s
//! `request_containing_symbol` / `request_defining_symbol` /
//! `request_referencing_symbols`, expressed against our normalized
//! [`UnifiedSymbolInformation`] rather than raw LSP unions.

use std::path::Path;
use std::sync::Arc;

use lsp_types::{DocumentSymbol, DocumentSymbolResponse, GotoDefinitionResponse, Range, SymbolInformation, Url};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::buffer::BufferManager;
use crate::cache::SymbolCache;
use crate::config::Config;
use crate::error::SymbolGraphError;
use crate::lsp::session::Session;
use crate::types::{ContainerKind, Location, UnifiedSymbolInformation, path_to_url};

/// Flattens a raw `DocumentSymbolResponse` into normalized symbols, preorder,
/// plus the hierarchical roots when the source was itself hierarchical.
pub fn normalize_document_symbols(
    response: DocumentSymbolResponse,
    uri: &Url,
    repo_root: &Path,
) -> (Vec<UnifiedSymbolInformation>, Option<Vec<UnifiedSymbolInformation>>) {
    match response {
        DocumentSymbolResponse::Flat(flat) => (
            flat.into_iter()
                .map(|s| from_symbol_information(s, repo_root))
                .collect(),
            None,
        ),
        DocumentSymbolResponse::Nested(roots) => {
            let tree: Vec<UnifiedSymbolInformation> = roots
                .into_iter()
                .map(|s| from_document_symbol(s, uri, repo_root, None))
                .collect();
            let mut flat = Vec::new();
            flatten_preorder(&tree, &mut flat);
            (flat, Some(tree))
        }
    }
}

fn from_symbol_information(sym: SymbolInformation, repo_root: &Path) -> UnifiedSymbolInformation {
    UnifiedSymbolInformation {
        name: sym.name,
        kind: sym.kind,
        location: Location::from_lsp(&sym.location, repo_root),
        selection_range: sym.location.range,
        container_name: sym.container_name,
        children: None,
    }
}

fn from_document_symbol(
    sym: DocumentSymbol,
    uri: &Url,
    repo_root: &Path,
    container_name: Option<String>,
) -> UnifiedSymbolInformation {
    #[allow(deprecated)]
    let DocumentSymbol {
        name,
        kind,
        range,
        selection_range,
        children,
        ..
    } = sym;
    let location = Location::from_lsp(&lsp_types::Location { uri: uri.clone(), range }, repo_root);
    let own_name = name.clone();
    let children = children.map(|kids| {
        kids.into_iter()
            .map(|k| from_document_symbol(k, uri, repo_root, Some(own_name.clone())))
            .collect()
    });
    UnifiedSymbolInformation {
        name,
        kind,
        location,
        selection_range,
        container_name,
        children,
    }
}

fn flatten_preorder(nodes: &[UnifiedSymbolInformation], out: &mut Vec<UnifiedSymbolInformation>) {
    for node in nodes {
        let mut flat_node = node.clone();
        flat_node.children = None;
        out.push(flat_node);
        if let Some(children) = &node.children {
            flatten_preorder(children, out);
        }
    }
}

const CONTAINER_KINDS: [ContainerKind; 4] = [
    ContainerKind::Class,
    ContainerKind::Function,
    ContainerKind::Method,
    ContainerKind::Variable,
];

fn range_contains(range: Range, line: u32, character: Option<u32>, strict: bool) -> bool {
    let line_ok = if strict {
        range.start.line < line && line <= range.end.line
    } else {
        range.start.line <= line && line <= range.end.line
    };
    if !line_ok {
        return false;
    }
    match character {
        None => true,
        Some(c) => {
            if strict {
                c > range.start.character
            } else {
                c >= range.start.character
            }
        }
    }
}

/// Picks the innermost symbol among `symbols` whose range contains
/// `(line, character)`, per the containing-symbol algorithm: class,
/// function, method, and variable kinds only; one-line class/function/
/// method symbols (e.g. imports) are discarded; ties broken by the
/// greatest start position.
fn resolve_containing(
    symbols: &[UnifiedSymbolInformation],
    line: u32,
    character: Option<u32>,
    strict: bool,
) -> Option<UnifiedSymbolInformation> {
    symbols
        .iter()
        .filter(|s| CONTAINER_KINDS.contains(&s.container_kind()))
        .filter(|s| {
            !matches!(
                s.container_kind(),
                ContainerKind::Class | ContainerKind::Function | ContainerKind::Method
            ) || !s.is_one_line()
        })
        .filter(|s| range_contains(s.location.range, line, character, strict))
        .max_by_key(|s| (s.location.range.start.line, s.location.range.start.character))
        .cloned()
}

/// The symbol-graph engine for a single session: `documentSymbols` with its
/// persistent cache, and the layered containing/defining/referencing symbol
/// algorithms built on top of it.
pub struct SymbolGraph {
    session: Arc<Session>,
    buffers: Arc<BufferManager>,
    cache: SymbolCache,
    enable_attribute_assignment_fallback: bool,
}

impl SymbolGraph {
    /// Builds a symbol-graph engine over an already-started session and its
    /// buffer manager, loading the persistent cache from disk.
    pub async fn new(session: Arc<Session>, buffers: Arc<BufferManager>, config: &Config) -> Self {
        let cache = SymbolCache::load(&config.repository_root).await;
        Self {
            session,
            buffers,
            cache,
            enable_attribute_assignment_fallback: config.enable_attribute_assignment_fallback,
        }
    }

    /// Flushes the persistent document-symbols cache. Called on session
    /// shutdown.
    pub async fn flush_cache(&self) -> Result<(), crate::error::CacheError> {
        self.cache.flush().await
    }

    /// `textDocument/documentSymbol`, normalized and served from the
    /// content-addressed cache when the document's contents have not
    /// changed since the last call.
    ///
    /// ## Errors
    /// Propagates session errors from the underlying request.
    pub async fn document_symbols(
        &self,
        relative_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(Vec<UnifiedSymbolInformation>, Option<Vec<UnifiedSymbolInformation>>), SymbolGraphError>
    {
        let handle = self.buffers.open_scope(relative_path).await?;
        let content_hash = self
            .buffers
            .content_hash(handle.path())
            .await
            .expect("buffer open after open_scope");

        if let Some(cached) = self.cache.get(relative_path, &content_hash).await {
            return Ok(cached);
        }

        let absolute = self.session.repository_root().join(relative_path);
        let uri = path_to_url(&absolute)?;
        let response = self.session.document_symbol(uri.clone(), cancel).await?;
        let (symbols, tree) = normalize_document_symbols(response, &uri, self.session.repository_root());
        self.cache
            .put(relative_path, content_hash, symbols.clone(), tree.clone())
            .await;
        Ok((symbols, tree))
    }

    /// The innermost class/function/method/variable symbol enclosing
    /// `(line, character)` in `relative_path`. Returns `None` if the line is
    /// blank (no well-defined container) or no symbol encloses the
    /// position.
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
    ) -> Result<Option<UnifiedSymbolInformation>, SymbolGraphError> {
        {
            let handle = self.buffers.open_scope(relative_path).await?;
            if let Some(text) = self.buffers.line_text(handle.path(), line).await
                && text.trim().is_empty()
            {
                return Ok(None);
            }
        }
        let (symbols, _) = self.document_symbols(relative_path, cancel).await?;
        Ok(resolve_containing(&symbols, line, character, strict))
    }

    /// The symbol that lexically contains `sym` — `sym` can never be its
    /// own container (resolved with `strict = true` at `sym`'s own start).
    ///
    /// ## Errors
    /// Propagates session or buffer errors.
    pub async fn container_of_symbol(
        &self,
        sym: &UnifiedSymbolInformation,
        cancel: &CancellationToken,
    ) -> Result<Option<UnifiedSymbolInformation>, SymbolGraphError> {
        let start = sym.location.range.start;
        self.containing_symbol(&sym.location.relative_path, start.line, Some(start.character), true, cancel)
            .await
    }

    /// The symbol defining the identifier at `(line, character)`: resolves
    /// `textDocument/definition`, then the containing symbol at the
    /// definition site.
    ///
    /// ## Errors
    /// Returns [`SymbolGraphError::ServerReturnedNone`] if the server has no
    /// definition for the position (legitimate for externals/generics).
    pub async fn defining_symbol(
        &self,
        relative_path: &Path,
        line: u32,
        character: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<UnifiedSymbolInformation>, SymbolGraphError> {
        let absolute = self.session.repository_root().join(relative_path);
        let uri = path_to_url(&absolute)?;
        let position = lsp_types::Position { line, character };
        let response = self.session.definition(uri, position, cancel).await?;

        let first = match response {
            GotoDefinitionResponse::Scalar(loc) => Some(loc),
            GotoDefinitionResponse::Array(mut locs) => {
                if locs.is_empty() {
                    None
                } else {
                    Some(locs.remove(0))
                }
            }
            GotoDefinitionResponse::Link(mut links) => links.pop().map(|l| lsp_types::Location {
                uri: l.target_uri,
                range: l.target_selection_range,
            }),
        };

        let Some(loc) = first else {
            warn!(path = %relative_path.display(), line, character, "no definition for position");
            return Ok(None);
        };

        let target_path = crate::types::url_to_path(&loc.uri)
            .and_then(|p| p.strip_prefix(self.session.repository_root()).map(Path::to_path_buf).ok())
            .unwrap_or_else(|| relative_path.to_path_buf());

        self.containing_symbol(
            &target_path,
            loc.range.start.line,
            Some(loc.range.start.character),
            false,
            cancel,
        )
        .await
    }

    /// Symbols whose body contains a reference to the identifier at
    /// `(line, character)` in `relative_path`.
    ///
    /// `include_imports = false` drops sites whose containing symbol shares
    /// the (name, kind) of the incoming symbol at the query position —
    /// typically import statements LSP reports as references.
    /// `include_self = false` drops the reference at the query position
    /// itself.
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
    ) -> Result<Vec<UnifiedSymbolInformation>, SymbolGraphError> {
        let absolute = self.session.repository_root().join(relative_path);
        let uri = path_to_url(&absolute)?;
        let position = lsp_types::Position { line, character };
        let refs = self.session.references(uri, position, false, cancel).await?;

        let incoming = self
            .containing_symbol(relative_path, line, Some(character), false, cancel)
            .await?;

        let mut results = Vec::with_capacity(refs.len());
        for reference in refs {
            let ref_path = crate::types::url_to_path(&reference.uri)
                .and_then(|p| p.strip_prefix(self.session.repository_root()).map(Path::to_path_buf).ok())
                .unwrap_or_else(|| relative_path.to_path_buf());
            let ref_line = reference.range.start.line;
            let ref_char = reference.range.start.character;

            let mut container = self
                .containing_symbol(&ref_path, ref_line, Some(ref_char), false, cancel)
                .await?;

            if container.is_none() && self.enable_attribute_assignment_fallback {
                container = self.attribute_assignment_fallback(&ref_path, ref_line, reference.range, cancel).await?;
            }

            let Some(container) = container else {
                warn!(path = %ref_path.display(), line = ref_line, "no containing symbol for reference, skipping");
                continue;
            };

            let is_incoming = incoming.as_ref().is_some_and(|inc| {
                inc.location.relative_path == container.location.relative_path
                    && inc.selection_range.start == container.selection_range.start
            });
            if is_incoming && !include_self {
                continue;
            }
            if !include_imports
                && let Some(inc) = &incoming
                && inc.name == container.name
                && inc.kind == container.kind
                && !is_incoming
            {
                continue;
            }

            results.push(container);
        }

        Ok(results)
    }

    /// Heuristic fallback for attribute-assignment reference sites with no
    /// enclosing function: infers a base identifier from the text
    /// immediately preceding the first `.` on the reference's line, and
    /// looks it up as a `Variable` symbol in the same document.
    async fn attribute_assignment_fallback(
        &self,
        ref_path: &Path,
        ref_line: u32,
        ref_range: Range,
        cancel: &CancellationToken,
    ) -> Result<Option<UnifiedSymbolInformation>, SymbolGraphError> {
        let handle = self.buffers.open_scope(ref_path).await?;
        let Some(line_text) = self.buffers.line_text(handle.path(), ref_line).await else {
            return Ok(None);
        };
        let Some(base_name) = extract_attribute_base(&line_text) else {
            return Ok(None);
        };

        let (symbols, _) = self.document_symbols(ref_path, cancel).await?;
        let Some(variable) = symbols
            .into_iter()
            .find(|s| s.name == base_name && s.container_kind() == ContainerKind::Variable)
        else {
            return Ok(None);
        };

        Ok(Some(UnifiedSymbolInformation {
            location: Location {
                uri: variable.location.uri.clone(),
                range: ref_range,
                absolute_path: variable.location.absolute_path.clone(),
                relative_path: variable.location.relative_path.clone(),
            },
            ..variable
        }))
    }
}

fn extract_attribute_base(line_text: &str) -> Option<String> {
    let dot_idx = line_text.find('.')?;
    let prefix = &line_text[..dot_idx];
    let ident: String = prefix
        .chars()
        .rev()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!ident.is_empty()).then(|| ident.chars().rev().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{Position, SymbolKind};

    fn symbol(name: &str, kind: SymbolKind, start: (u32, u32), end: (u32, u32)) -> UnifiedSymbolInformation {
        UnifiedSymbolInformation {
            name: name.to_string(),
            kind,
            location: Location {
                uri: Url::parse("file:///tmp/a.rs").unwrap(),
                range: Range::new(Position::new(start.0, start.1), Position::new(end.0, end.1)),
                absolute_path: "/tmp/a.rs".into(),
                relative_path: "a.rs".into(),
            },
            selection_range: Range::new(Position::new(start.0, start.1), Position::new(start.0, start.1 + 1)),
            container_name: None,
            children: None,
        }
    }

    #[test]
    fn test_containing_symbol_picks_innermost() {
        let class = symbol("C", SymbolKind::CLASS, (0, 0), (3, 0));
        let method = symbol("m", SymbolKind::METHOD, (1, 2), (2, 10));
        let symbols = vec![class.clone(), method.clone()];

        let found = resolve_containing(&symbols, 1, Some(6), false).unwrap();
        assert_eq!(found.name, "m");

        let found = resolve_containing(&symbols, 1, Some(6), true).unwrap();
        assert_eq!(found.name, "C");
    }

    #[test]
    fn test_containing_symbol_discards_one_line_containers() {
        let import = symbol("std", SymbolKind::CLASS, (0, 0), (0, 10));
        let symbols = vec![import];
        assert!(resolve_containing(&symbols, 0, Some(3), false).is_none());
    }

    #[test]
    fn test_containing_symbol_keeps_one_line_variable() {
        let var = symbol("x", SymbolKind::VARIABLE, (2, 0), (2, 5));
        let symbols = vec![var];
        assert!(resolve_containing(&symbols, 2, Some(2), false).is_some());
    }

    #[test]
    fn test_containing_symbol_none_beyond_range() {
        let class = symbol("C", SymbolKind::CLASS, (0, 0), (3, 0));
        let symbols = vec![class];
        assert!(resolve_containing(&symbols, 10, Some(0), false).is_none());
    }

    #[test]
    fn test_extract_attribute_base() {
        assert_eq!(extract_attribute_base("self.value = 1"), Some("self".to_string()));
        assert_eq!(extract_attribute_base("no_dot_here"), None);
        assert_eq!(extract_attribute_base("obj.attr.nested = 2"), Some("obj".to_string()));
    }

    #[test]
    fn test_normalize_flat_symbols() {
        let flat = vec![SymbolInformation {
            name: "foo".to_string(),
            kind: SymbolKind::FUNCTION,
            tags: None,
            deprecated: None,
            location: lsp_types::Location {
                uri: Url::parse("file:///tmp/a.rs").unwrap(),
                range: Range::new(Position::new(0, 0), Position::new(1, 0)),
            },
            container_name: None,
        }];
        let uri = Url::parse("file:///tmp/a.rs").unwrap();
        let (symbols, tree) = normalize_document_symbols(
            DocumentSymbolResponse::Flat(flat),
            &uri,
            Path::new("/tmp"),
        );
        assert_eq!(symbols.len(), 1);
        assert!(tree.is_none());
        assert_eq!(symbols[0].name, "foo");
    }
}
