//! The content-addressed persistent document-symbols cache (§4.5).
//!
//! Keyed by repository-relative path and the MD5 hash of the document's
//! current contents — an entry is only returned when its stored hash
//! matches the buffer's current hash, so a stale entry is never handed
//! back. Persisted at `<repo>/.multilspy/cache/document_symbols_cache.bin`,
//! a magic-header-prefixed `bincode` blob; a version mismatch or corrupt
//! file is treated as an absent cache rather than a fatal error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::types::UnifiedSymbolInformation;

const CACHE_MAGIC: [u8; 4] = *b"RNSC";
const CACHE_FORMAT_VERSION: u8 = 1;
const CACHE_RELATIVE_PATH: &str = ".multilspy/cache/document_symbols_cache.bin";

type CacheEntry = (String, (Vec<UnifiedSymbolInformation>, Option<Vec<UnifiedSymbolInformation>>));

#[derive(Debug, Default, Serialize, Deserialize)]
struct CachePayload {
    entries: HashMap<String, CacheEntry>,
}

/// A persistent, content-addressed cache of `textDocument/documentSymbol`
/// results for a single repository.
pub struct SymbolCache {
    file_path: PathBuf,
    payload: Mutex<CachePayload>,
    dirty: AtomicBool,
}

impl SymbolCache {
    /// Loads the cache for `repository_root`. An absent, unreadable, or
    /// version-mismatched cache file is not an error: the cache starts
    /// empty and a warning is logged.
    pub async fn load(repository_root: &Path) -> Self {
        let file_path = repository_root.join(CACHE_RELATIVE_PATH);
        let payload = match tokio::fs::read(&file_path).await {
            Ok(bytes) => decode(&bytes).unwrap_or_else(|e| {
                warn!(path = %file_path.display(), error = %e, "document-symbols cache unreadable, starting empty");
                CachePayload::default()
            }),
            Err(_) => CachePayload::default(),
        };
        Self {
            file_path,
            payload: Mutex::new(payload),
            dirty: AtomicBool::new(false),
        }
    }

    /// Returns the cached `(symbols, tree)` for `relative_path` iff its
    /// stored content hash equals `content_hash`.
    pub async fn get(
        &self,
        relative_path: &Path,
        content_hash: &str,
    ) -> Option<(Vec<UnifiedSymbolInformation>, Option<Vec<UnifiedSymbolInformation>>)> {
        let payload = self.payload.lock().await;
        let (hash, data) = payload.entries.get(&key_for(relative_path))?;
        (hash == content_hash).then(|| data.clone())
    }

    /// Stores (or replaces) the entry for `relative_path` and marks the
    /// cache dirty so it is persisted on the next [`Self::flush`].
    pub async fn put(
        &self,
        relative_path: &Path,
        content_hash: String,
        symbols: Vec<UnifiedSymbolInformation>,
        tree: Option<Vec<UnifiedSymbolInformation>>,
    ) {
        let mut payload = self.payload.lock().await;
        payload
            .entries
            .insert(key_for(relative_path), (content_hash, (symbols, tree)));
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Persists the cache to disk iff it has changed since the last flush
    /// (or since load). A no-op otherwise.
    ///
    /// ## Errors
    /// Returns [`CacheError`] if the cache directory or temp file cannot be
    /// written.
    pub async fn flush(&self) -> Result<(), CacheError> {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = {
            let payload = self.payload.lock().await;
            encode(&payload)?
        };
        let temp_path = self.file_path.with_extension("tmp");
        tokio::fs::write(&temp_path, &bytes).await?;
        tokio::fs::rename(&temp_path, &self.file_path).await?;
        debug!(path = %self.file_path.display(), entries = bytes.len(), "flushed document-symbols cache");
        Ok(())
    }
}

fn key_for(relative_path: &Path) -> String {
    relative_path.to_string_lossy().replace('\\', "/")
}

fn encode(payload: &CachePayload) -> Result<Vec<u8>, CacheError> {
    let mut bytes = Vec::with_capacity(CACHE_MAGIC.len() + 1);
    bytes.extend_from_slice(&CACHE_MAGIC);
    bytes.push(CACHE_FORMAT_VERSION);
    bincode::serialize_into(&mut bytes, payload).map_err(|e| CacheError::Codec(e.to_string()))?;
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<CachePayload, CacheError> {
    let (header, body) = bytes
        .split_at_checked(CACHE_MAGIC.len() + 1)
        .ok_or_else(|| CacheError::Codec("truncated header".to_string()))?;
    if header[..CACHE_MAGIC.len()] != CACHE_MAGIC {
        return Err(CacheError::Codec("bad magic".to_string()));
    }
    if header[CACHE_MAGIC.len()] != CACHE_FORMAT_VERSION {
        return Err(CacheError::Codec(format!(
            "unsupported cache version {}",
            header[CACHE_MAGIC.len()]
        )));
    }
    bincode::deserialize(body).map_err(|e| CacheError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Location;
    use lsp_types::{Range, SymbolKind, Url};

    fn sample_symbol(name: &str) -> UnifiedSymbolInformation {
        UnifiedSymbolInformation {
            name: name.to_string(),
            kind: SymbolKind::FUNCTION,
            location: Location {
                uri: Url::parse("file:///tmp/a.rs").unwrap(),
                range: Range::new(lsp_types::Position::new(0, 0), lsp_types::Position::new(1, 0)),
                absolute_path: PathBuf::from("/tmp/a.rs"),
                relative_path: PathBuf::from("a.rs"),
            },
            selection_range: Range::new(lsp_types::Position::new(0, 3), lsp_types::Position::new(0, 6)),
            container_name: None,
            children: None,
        }
    }

    #[tokio::test]
    async fn test_put_then_get_with_matching_hash() {
        let temp = tempfile::tempdir().unwrap();
        let cache = SymbolCache::load(temp.path()).await;
        let symbols = vec![sample_symbol("foo")];
        cache
            .put(Path::new("a.rs"), "hash1".to_string(), symbols.clone(), None)
            .await;
        let hit = cache.get(Path::new("a.rs"), "hash1").await;
        assert_eq!(hit, Some((symbols, None)));
    }

    #[tokio::test]
    async fn test_get_misses_on_hash_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        let cache = SymbolCache::load(temp.path()).await;
        cache
            .put(Path::new("a.rs"), "hash1".to_string(), vec![sample_symbol("foo")], None)
            .await;
        assert_eq!(cache.get(Path::new("a.rs"), "hash2").await, None);
    }

    #[tokio::test]
    async fn test_flush_then_reload_round_trips() {
        let temp = tempfile::tempdir().unwrap();
        let cache = SymbolCache::load(temp.path()).await;
        let symbols = vec![sample_symbol("bar")];
        cache
            .put(Path::new("b.rs"), "hashA".to_string(), symbols.clone(), None)
            .await;
        cache.flush().await.unwrap();

        let reloaded = SymbolCache::load(temp.path()).await;
        let hit = reloaded.get(Path::new("b.rs"), "hashA").await;
        assert_eq!(hit, Some((symbols, None)));
    }

    #[tokio::test]
    async fn test_flush_is_noop_when_not_dirty() {
        let temp = tempfile::tempdir().unwrap();
        let cache = SymbolCache::load(temp.path()).await;
        cache.flush().await.unwrap();
        assert!(!temp.path().join(CACHE_RELATIVE_PATH).exists());
    }

    #[tokio::test]
    async fn test_load_tolerates_corrupt_file() {
        let temp = tempfile::tempdir().unwrap();
        let cache_path = temp.path().join(CACHE_RELATIVE_PATH);
        tokio::fs::create_dir_all(cache_path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&cache_path, b"not a cache file")
            .await
            .unwrap();

        let cache = SymbolCache::load(temp.path()).await;
        assert_eq!(cache.get(Path::new("a.rs"), "hash1").await, None);
    }
}
