//! Crate data model.
//!
//! These types normalize the two shapes LSP itself uses for "a symbol" and
//! "a place in a file" into single representations the rest of the crate
//! builds on. Raw `lsp_types` values never escape the session boundary
//! (see [`crate::lsp::session`]) — everything above it works with these.

use std::path::{Path, PathBuf};

use lsp_types::Url;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// A zero-indexed (line, character) position, matching LSP's own indexing.
/// `character` counts UTF-16 code units, per the LSP specification.
pub type Position = lsp_types::Position;

/// A half-open range between two [`Position`]s.
pub type Range = lsp_types::Range;

/// A location in a file: a URI-addressed range plus the filesystem paths
/// derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// The `file://` URI of the containing document.
    pub uri: Url,
    /// The range within the document.
    pub range: Range,
    /// The absolute filesystem path decoded from `uri`.
    pub absolute_path: PathBuf,
    /// `absolute_path` relative to the repository root, or the absolute
    /// path itself if it lies outside the repository.
    pub relative_path: PathBuf,
}

impl Location {
    /// Builds a [`Location`] from a raw LSP location and a repository root.
    pub fn from_lsp(loc: &lsp_types::Location, repo_root: &Path) -> Self {
        let absolute_path = url_to_path(&loc.uri).unwrap_or_else(|| PathBuf::from(loc.uri.path()));
        let relative_path = absolute_path
            .strip_prefix(repo_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| absolute_path.clone());
        Self {
            uri: loc.uri.clone(),
            range: loc.range,
            absolute_path,
            relative_path,
        }
    }
}

/// The kinds of LSP symbols the symbol-graph engine treats as potential
/// containers of other symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A class, struct, or similarly-scoped type definition.
    Class,
    /// A free function.
    Function,
    /// A method defined within a class/impl.
    Method,
    /// A variable or field, considered a container only for
    /// attribute-assignment heuristics.
    Variable,
    /// Any other symbol kind, never treated as a container.
    Other,
}

impl From<lsp_types::SymbolKind> for ContainerKind {
    fn from(kind: lsp_types::SymbolKind) -> Self {
        use lsp_types::SymbolKind;
        match kind {
            SymbolKind::CLASS | SymbolKind::STRUCT | SymbolKind::INTERFACE => ContainerKind::Class,
            SymbolKind::FUNCTION | SymbolKind::CONSTRUCTOR => ContainerKind::Function,
            SymbolKind::METHOD => ContainerKind::Method,
            SymbolKind::VARIABLE | SymbolKind::FIELD | SymbolKind::PROPERTY => {
                ContainerKind::Variable
            }
            _ => ContainerKind::Other,
        }
    }
}

/// A structural superset of LSP's `SymbolInformation` (flat, with a
/// location) and `DocumentSymbol` (hierarchical, with a range but no URI).
/// Both shapes normalize into this one via
/// [`crate::symbols::flatten_document_symbols`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedSymbolInformation {
    /// The symbol's name.
    pub name: String,
    /// The symbol's kind.
    pub kind: lsp_types::SymbolKind,
    /// The symbol's full extent, and the document it lives in.
    pub location: Location,
    /// The narrower range that should be selected when navigating to this
    /// symbol (e.g. just the identifier, not the whole body).
    pub selection_range: Range,
    /// The name of the symbol's lexical container, if known.
    pub container_name: Option<String>,
    /// Nested symbols, when the source was hierarchical. Always `None` for
    /// symbols normalized from a flat `SymbolInformation` list.
    pub children: Option<Vec<UnifiedSymbolInformation>>,
}

impl UnifiedSymbolInformation {
    /// Returns this symbol's container kind for the containing-symbol
    /// algorithm.
    pub fn container_kind(&self) -> ContainerKind {
        ContainerKind::from(self.kind)
    }

    /// Returns true if this symbol's range spans a single line — used to
    /// filter out one-line constructs (e.g. imports) masquerading as
    /// containers.
    pub fn is_one_line(&self) -> bool {
        self.location.range.start.line == self.location.range.end.line
    }
}

/// A normalized hover result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hover {
    /// The rendered hover contents (Markdown or plain text).
    pub contents: String,
    /// The range the hover applies to, if the server provided one.
    pub range: Option<Range>,
}

impl From<lsp_types::Hover> for Hover {
    fn from(hover: lsp_types::Hover) -> Self {
        let contents = match hover.contents {
            lsp_types::HoverContents::Scalar(marked) => marked_string_to_text(marked),
            lsp_types::HoverContents::Array(items) => items
                .into_iter()
                .map(marked_string_to_text)
                .collect::<Vec<_>>()
                .join("\n\n"),
            lsp_types::HoverContents::Markup(markup) => markup.value,
        };
        Self {
            contents,
            range: hover.range,
        }
    }
}

fn marked_string_to_text(marked: lsp_types::MarkedString) -> String {
    match marked {
        lsp_types::MarkedString::String(s) => s,
        lsp_types::MarkedString::LanguageString(ls) => ls.value,
    }
}

/// A normalized completion suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompletionItem {
    /// The text to insert.
    pub completion_text: String,
    /// The kind of completion, if the server provided one.
    pub kind: Option<lsp_types::CompletionItemKind>,
    /// Additional detail (e.g. a type signature), if the server provided
    /// one.
    pub detail: Option<String>,
}

impl From<lsp_types::CompletionItem> for CompletionItem {
    fn from(item: lsp_types::CompletionItem) -> Self {
        // `label` is a required LSP field; `insertText` is only consulted
        // when a server sends an empty one.
        let completion_text = if item.label.is_empty() {
            item.insert_text.clone().unwrap_or_default()
        } else {
            item.label.clone()
        };
        Self {
            completion_text,
            kind: item.kind,
            detail: item.detail,
        }
    }
}

/// Converts a filesystem path to a `file://` URI.
///
/// The path is canonicalized first, so the file must exist.
pub fn path_to_url(path: &Path) -> Result<Url, SessionError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| SessionError::InvalidPath(format!("no current directory: {e}")))?
            .join(path)
    };
    let canonical = absolute
        .canonicalize()
        .map_err(|e| SessionError::InvalidPath(format!("'{}': {e}", path.display())))?;
    Url::from_file_path(&canonical)
        .map_err(|()| SessionError::InvalidPath(canonical.display().to_string()))
}

/// Decodes a `file://` URI back into a filesystem path, if it is one.
pub fn url_to_path(url: &Url) -> Option<PathBuf> {
    url.to_file_path().ok()
}

/// Converts an LSP symbol kind to a human-readable string, used in logging.
pub fn symbol_kind_to_string(kind: lsp_types::SymbolKind) -> &'static str {
    use lsp_types::SymbolKind;
    match kind {
        SymbolKind::FILE => "file",
        SymbolKind::MODULE => "module",
        SymbolKind::NAMESPACE => "namespace",
        SymbolKind::PACKAGE => "package",
        SymbolKind::CLASS => "class",
        SymbolKind::METHOD => "method",
        SymbolKind::PROPERTY => "property",
        SymbolKind::FIELD => "field",
        SymbolKind::CONSTRUCTOR => "constructor",
        SymbolKind::ENUM => "enum",
        SymbolKind::INTERFACE => "interface",
        SymbolKind::FUNCTION => "function",
        SymbolKind::VARIABLE => "variable",
        SymbolKind::CONSTANT => "constant",
        SymbolKind::STRING => "string",
        SymbolKind::NUMBER => "number",
        SymbolKind::BOOLEAN => "boolean",
        SymbolKind::ARRAY => "array",
        SymbolKind::OBJECT => "object",
        SymbolKind::KEY => "key",
        SymbolKind::NULL => "null",
        SymbolKind::ENUM_MEMBER => "enum_member",
        SymbolKind::STRUCT => "struct",
        SymbolKind::EVENT => "event",
        SymbolKind::OPERATOR => "operator",
        SymbolKind::TYPE_PARAMETER => "type_parameter",
        _ => "unknown",
    }
}
