//! The reference-counted document buffer manager (§4.4).
//!
//! Mirrors `multilspy`'s `open_file` context manager: nested callers may
//! each "open" the same document, and the underlying `textDocument/didOpen`
//! / `didClose` pair fires exactly once, when the outermost scope is
//! entered and exited. Unlike the original, edits are synchronized
//! incrementally rather than by replacing the whole document on every
//! change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lsp_types::{Position, Range, Url};
use md5::{Digest, Md5};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::BufferError;
use crate::lsp::session::Session;
use crate::types::path_to_url;

#[derive(Debug, Clone)]
struct FileBuffer {
    uri: Url,
    contents: String,
    version: i32,
    ref_count: usize,
    content_hash: String,
}

impl FileBuffer {
    fn new(uri: Url, contents: String) -> Self {
        let content_hash = hash_contents(&contents);
        Self {
            uri,
            contents,
            version: 0,
            ref_count: 1,
            content_hash,
        }
    }
}

fn hash_contents(contents: &str) -> String {
    format!("{:x}", Md5::digest(contents.as_bytes()))
}

fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("rs") => "rust",
        Some("py") => "python",
        Some("js") => "javascript",
        Some("ts") => "typescript",
        Some("go") => "go",
        Some("c") => "c",
        Some("cpp" | "cc" | "cxx") => "cpp",
        Some("java") => "java",
        Some("cs") => "csharp",
        Some("rb") => "ruby",
        _ => "plaintext",
    }
}

/// Converts a zero-indexed LSP `Position` (UTF-16 code units) into a byte
/// offset into `text`. Returns `None` if the position does not land on a
/// character boundary within `text`.
fn position_to_offset(text: &str, pos: Position) -> Option<usize> {
    let mut line_start = 0usize;
    let mut line = 0u32;
    if pos.line > 0 {
        let mut found = false;
        for (idx, ch) in text.char_indices() {
            if ch == '\n' {
                line += 1;
                if line == pos.line {
                    line_start = idx + 1;
                    found = true;
                    break;
                }
            }
        }
        if !found {
            return None;
        }
    }

    let mut utf16_count = 0u32;
    let mut byte_offset = line_start;
    for ch in text[line_start..].chars() {
        if ch == '\n' {
            break;
        }
        if utf16_count == pos.character {
            return Some(byte_offset);
        }
        utf16_count += u32::try_from(ch.len_utf16()).unwrap_or(1);
        byte_offset += ch.len_utf8();
    }
    (utf16_count == pos.character).then_some(byte_offset)
}

/// Walks `inserted` starting at `start`, returning the resulting cursor
/// position (the position immediately after the inserted text).
fn advance_position(start: Position, inserted: &str) -> Position {
    let mut line = start.line;
    let mut character = start.character;
    for ch in inserted.chars() {
        if ch == '\n' {
            line += 1;
            character = 0;
        } else {
            character += u32::try_from(ch.len_utf16()).unwrap_or(1);
        }
    }
    Position { line, character }
}

/// The reference-counted table of open documents, keyed by repository-
/// relative path.
pub struct BufferManager {
    session: Arc<Session>,
    buffers: Mutex<HashMap<PathBuf, FileBuffer>>,
}

impl BufferManager {
    /// Creates an empty buffer manager bound to `session`.
    pub fn new(session: Arc<Session>) -> Arc<Self> {
        Arc::new(Self {
            session,
            buffers: Mutex::new(HashMap::new()),
        })
    }

    /// Opens `relative_path`, reading it from disk on first open and
    /// emitting `didOpen`, or incrementing the reference count if another
    /// caller already has it open. The returned handle releases its share
    /// of the reference count on drop, emitting `didClose` once the last
    /// holder releases.
    ///
    /// ## Errors
    /// Returns [`BufferError::ReadFailed`] if the file cannot be read on
    /// first open.
    pub async fn open_scope(
        self: &Arc<Self>,
        relative_path: impl Into<PathBuf>,
    ) -> Result<BufferHandle, BufferError> {
        let relative_path = relative_path.into();
        let absolute = self.session.repository_root().join(&relative_path);

        let mut buffers = self.buffers.lock().await;
        if let Some(buf) = buffers.get_mut(&relative_path) {
            buf.ref_count += 1;
        } else {
            let contents =
                tokio::fs::read_to_string(&absolute)
                    .await
                    .map_err(|source| BufferError::ReadFailed {
                        path: absolute.display().to_string(),
                        source,
                    })?;
            let uri = path_to_url(&absolute)?;
            let language_id = language_id_for(&relative_path);
            let buf = FileBuffer::new(uri.clone(), contents.clone());
            self.session
                .notify_did_open(uri, language_id, 0, contents)
                .await?;
            buffers.insert(relative_path.clone(), buf);
        }
        drop(buffers);

        Ok(BufferHandle {
            manager: Arc::clone(self),
            relative_path: Some(relative_path),
        })
    }

    async fn release(&self, relative_path: &Path) {
        let uri_to_close = {
            let mut buffers = self.buffers.lock().await;
            let Some(buf) = buffers.get_mut(relative_path) else {
                return;
            };
            buf.ref_count = buf.ref_count.saturating_sub(1);
            if buf.ref_count == 0 {
                let uri = buf.uri.clone();
                buffers.remove(relative_path);
                Some(uri)
            } else {
                None
            }
        };
        if let Some(uri) = uri_to_close
            && let Err(e) = self.session.notify_did_close(uri).await
        {
            warn!(path = %relative_path.display(), error = %e, "didClose failed");
        }
    }

    /// Returns the full current contents of an open document.
    ///
    /// ## Errors
    /// Returns [`BufferError::NotOpen`] if the document has no open scope.
    pub async fn text_of(&self, relative_path: &Path) -> Result<String, BufferError> {
        self.buffers
            .lock()
            .await
            .get(relative_path)
            .map(|b| b.contents.clone())
            .ok_or_else(|| BufferError::NotOpen(relative_path.display().to_string()))
    }

    /// Returns the current content hash of an open document, used by the
    /// symbol cache to detect staleness.
    pub(crate) async fn content_hash(&self, relative_path: &Path) -> Option<String> {
        self.buffers
            .lock()
            .await
            .get(relative_path)
            .map(|b| b.content_hash.clone())
    }

    /// Returns the text of a single line (without its trailing newline) of
    /// an open document, or `None` if the document is closed or the line
    /// does not exist.
    pub(crate) async fn line_text(&self, relative_path: &Path, line: u32) -> Option<String> {
        let buffers = self.buffers.lock().await;
        let buf = buffers.get(relative_path)?;
        buf.contents.lines().nth(usize::try_from(line).ok()?).map(str::to_string)
    }

    /// Inserts `text` at `position`, bumps the document version, and emits
    /// an incremental `didChange`. Returns the cursor position immediately
    /// following the inserted text.
    ///
    /// ## Errors
    /// Returns [`BufferError::NotOpen`] if the document has no open scope,
    /// or [`BufferError::PositionOutOfBounds`] if `position` is not a valid
    /// offset into the current contents.
    pub async fn insert(
        &self,
        relative_path: &Path,
        position: Position,
        text: &str,
    ) -> Result<Position, BufferError> {
        let (uri, version) = {
            let mut buffers = self.buffers.lock().await;
            let buf = buffers
                .get_mut(relative_path)
                .ok_or_else(|| BufferError::NotOpen(relative_path.display().to_string()))?;
            let offset =
                position_to_offset(&buf.contents, position).ok_or(BufferError::PositionOutOfBounds {
                    line: position.line,
                    character: position.character,
                })?;
            buf.contents.insert_str(offset, text);
            buf.version += 1;
            buf.content_hash = hash_contents(&buf.contents);
            (buf.uri.clone(), buf.version)
        };

        self.session
            .notify_did_change(
                uri,
                version,
                Some(Range {
                    start: position,
                    end: position,
                }),
                text.to_string(),
            )
            .await?;

        Ok(advance_position(position, text))
    }

    /// Deletes the text between `start` and `end`, bumps the document
    /// version, and emits an incremental `didChange`. Returns the deleted
    /// text.
    ///
    /// ## Errors
    /// Returns [`BufferError::NotOpen`] or [`BufferError::PositionOutOfBounds`]
    /// as in [`Self::insert`].
    pub async fn delete(
        &self,
        relative_path: &Path,
        start: Position,
        end: Position,
    ) -> Result<String, BufferError> {
        let (uri, version, deleted) = {
            let mut buffers = self.buffers.lock().await;
            let buf = buffers
                .get_mut(relative_path)
                .ok_or_else(|| BufferError::NotOpen(relative_path.display().to_string()))?;
            let start_off =
                position_to_offset(&buf.contents, start).ok_or(BufferError::PositionOutOfBounds {
                    line: start.line,
                    character: start.character,
                })?;
            let end_off =
                position_to_offset(&buf.contents, end).ok_or(BufferError::PositionOutOfBounds {
                    line: end.line,
                    character: end.character,
                })?;
            let deleted = buf.contents[start_off..end_off].to_string();
            buf.contents.replace_range(start_off..end_off, "");
            buf.version += 1;
            buf.content_hash = hash_contents(&buf.contents);
            (buf.uri.clone(), buf.version, deleted)
        };

        self.session
            .notify_did_change(uri, version, Some(Range { start, end }), String::new())
            .await?;

        Ok(deleted)
    }
}

/// A scoped handle to an open document. Releases its share of the
/// reference count when dropped, guaranteeing `didClose` fires exactly
/// once the last handle for a document is dropped, on every exit path.
pub struct BufferHandle {
    manager: Arc<BufferManager>,
    relative_path: Option<PathBuf>,
}

impl BufferHandle {
    /// The repository-relative path this handle keeps open.
    pub fn path(&self) -> &Path {
        self.relative_path
            .as_deref()
            .expect("path taken only by Drop")
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        let Some(relative_path) = self.relative_path.take() else {
            return;
        };
        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move {
            manager.release(&relative_path).await;
        });
    }
}
