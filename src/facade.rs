//! The synchronous façade (§4.7): a blocking adapter over [`Engine`] for
//! callers that don't want to drive an async executor themselves, modeled
//! on `multilspy`'s `SyncLanguageServer`. Owns a dedicated background
//! thread running a single-threaded `tokio` runtime; every method submits
//! its work to that thread and blocks the calling thread until it
//! completes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use lsp_types::Position;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{CompletionItem, Hover, Location, UnifiedSymbolInformation};

/// A unit of work submitted to the scheduler thread: given the engine, it
/// produces the future the scheduler awaits in place (the scheduler loop is
/// single-threaded, so jobs run strictly one at a time, in submission
/// order).
type Job = Box<dyn FnOnce(Arc<Engine>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// A blocking handle to a language server session, running on a dedicated
/// background thread.
pub struct SyncSession {
    jobs: Option<mpsc::Sender<Job>>,
    scheduler: Option<JoinHandle<()>>,
}

impl SyncSession {
    /// Spawns the scheduler thread, starts the session on it, and blocks
    /// until the session reaches `Ready`.
    ///
    /// ## Errors
    /// Propagates any error from [`Engine::start`].
    pub fn start(config: Config) -> Result<Self> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let scheduler = std::thread::Builder::new()
            .name("kadabra-lsp-scheduler".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(Error::Io(e)));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let engine = match Engine::start(config).await {
                        Ok(engine) => Arc::new(engine),
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    while let Ok(job) = jobs_rx.recv() {
                        job(Arc::clone(&engine)).await;
                    }

                    let _ = engine.stop().await;
                });
            })
            .map_err(Error::Io)?;

        ready_rx
            .recv()
            .unwrap_or_else(|_| Err(Error::Session(crate::error::SessionError::NotStarted)))?;

        Ok(Self {
            jobs: Some(jobs_tx),
            scheduler: Some(scheduler),
        })
    }

    /// Runs `scope` against a freshly started session, guaranteeing the
    /// session is stopped (and the scheduler thread joined) when `scope`
    /// returns, whether or not it errors.
    ///
    /// ## Errors
    /// Propagates any error from [`Self::start`], `scope`, or [`Self::stop`].
    pub fn with_server<T>(config: Config, scope: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let session = Self::start(config)?;
        let result = scope(&session);
        session.stop()?;
        result
    }

    /// Submits `f` to the scheduler thread and blocks until it completes.
    fn call<T, Fut, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        F: FnOnce(Arc<Engine>) -> Fut + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move |engine| {
            Box::pin(async move {
                let _ = tx.send(f(engine).await);
            })
        });
        self.jobs
            .as_ref()
            .ok_or(Error::Session(crate::error::SessionError::NotStarted))?
            .send(job)
            .map_err(|_| Error::Session(crate::error::SessionError::NotStarted))?;
        rx.recv().map_err(|_| Error::Session(crate::error::SessionError::NotStarted))?
    }

    /// Opens `relative_path`, runs `f`, and releases the scope — all on the
    /// scheduler thread, so the [`crate::buffer::BufferHandle`]'s
    /// `didClose`-on-drop guarantee fires there rather than racing a caller
    /// thread with no `tokio` runtime of its own.
    ///
    /// ## Errors
    /// See [`Engine::open_scope`]; also propagates any error `f` returns.
    pub fn with_open<T, F>(&self, relative_path: PathBuf, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        self.call(move |engine| async move {
            let handle = engine.open_scope(relative_path).await?;
            let result = f(handle.path());
            drop(handle);
            result
        })
    }

    /// The full current contents of an open document.
    ///
    /// ## Errors
    /// See [`Engine::text_of`].
    pub fn text_of(&self, relative_path: PathBuf) -> Result<String> {
        self.call(move |engine| async move { engine.text_of(&relative_path).await })
    }

    /// Inserts `text` at `position` in an open document.
    ///
    /// ## Errors
    /// See [`Engine::insert`].
    pub fn insert(&self, relative_path: PathBuf, position: Position, text: String) -> Result<Position> {
        self.call(move |engine| async move { engine.insert(&relative_path, position, &text).await })
    }

    /// Deletes the text between `start` and `end` in an open document.
    ///
    /// ## Errors
    /// See [`Engine::delete`].
    pub fn delete(&self, relative_path: PathBuf, start: Position, end: Position) -> Result<String> {
        self.call(move |engine| async move { engine.delete(&relative_path, start, end).await })
    }

    /// `textDocument/definition`. See [`Engine::definition`].
    ///
    /// ## Errors
    /// See [`Engine::definition`].
    pub fn definition(&self, relative_path: PathBuf, line: u32, character: u32) -> Result<Vec<Location>> {
        self.call(move |engine| async move {
            engine
                .definition(&relative_path, line, character, &CancellationToken::new())
                .await
        })
    }

    /// `textDocument/references`. See [`Engine::references`].
    ///
    /// ## Errors
    /// See [`Engine::references`].
    pub fn references(&self, relative_path: PathBuf, line: u32, character: u32) -> Result<Vec<Location>> {
        self.call(move |engine| async move {
            engine
                .references(&relative_path, line, character, &CancellationToken::new())
                .await
        })
    }

    /// `textDocument/hover`. See [`Engine::hover`].
    ///
    /// ## Errors
    /// See [`Engine::hover`].
    pub fn hover(&self, relative_path: PathBuf, line: u32, character: u32) -> Result<Option<Hover>> {
        self.call(move |engine| async move {
            engine.hover(&relative_path, line, character, &CancellationToken::new()).await
        })
    }

    /// `textDocument/completion`, with the `isIncomplete` retry loop. See
    /// [`Engine::completions`].
    ///
    /// ## Errors
    /// See [`Engine::completions`].
    pub fn completions(
        &self,
        relative_path: PathBuf,
        line: u32,
        character: u32,
        allow_incomplete: bool,
    ) -> Result<Vec<CompletionItem>> {
        self.call(move |engine| async move {
            engine
                .completions(&relative_path, line, character, allow_incomplete, &CancellationToken::new())
                .await
        })
    }

    /// `textDocument/documentSymbol`, normalized and cached. See
    /// [`Engine::document_symbols`].
    ///
    /// ## Errors
    /// See [`Engine::document_symbols`].
    pub fn document_symbols(
        &self,
        relative_path: PathBuf,
    ) -> Result<(Vec<UnifiedSymbolInformation>, Option<Vec<UnifiedSymbolInformation>>)> {
        self.call(move |engine| async move {
            engine.document_symbols(&relative_path, &CancellationToken::new()).await
        })
    }

    /// The absolute paths of every file the server has indexed. See
    /// [`Engine::parsed_files`].
    ///
    /// ## Errors
    /// See [`Engine::parsed_files`].
    pub fn parsed_files(&self) -> Result<Vec<PathBuf>> {
        self.call(|engine| async move { engine.parsed_files(&CancellationToken::new()).await })
    }

    /// The innermost symbol enclosing `(line, character)`. See
    /// [`Engine::containing_symbol`].
    ///
    /// ## Errors
    /// See [`Engine::containing_symbol`].
    pub fn containing_symbol(
        &self,
        relative_path: PathBuf,
        line: u32,
        character: Option<u32>,
        strict: bool,
    ) -> Result<Option<UnifiedSymbolInformation>> {
        self.call(move |engine| async move {
            engine
                .containing_symbol(&relative_path, line, character, strict, &CancellationToken::new())
                .await
        })
    }

    /// The symbol lexically containing `sym`. See
    /// [`Engine::container_of_symbol`].
    ///
    /// ## Errors
    /// See [`Engine::container_of_symbol`].
    pub fn container_of_symbol(&self, sym: UnifiedSymbolInformation) -> Result<Option<UnifiedSymbolInformation>> {
        self.call(move |engine| async move {
            engine.container_of_symbol(&sym, &CancellationToken::new()).await
        })
    }

    /// The symbol defining the identifier at `(line, character)`. See
    /// [`Engine::defining_symbol`].
    ///
    /// ## Errors
    /// See [`Engine::defining_symbol`].
    pub fn defining_symbol(
        &self,
        relative_path: PathBuf,
        line: u32,
        character: u32,
    ) -> Result<Option<UnifiedSymbolInformation>> {
        self.call(move |engine| async move {
            engine
                .defining_symbol(&relative_path, line, character, &CancellationToken::new())
                .await
        })
    }

    /// Symbols referencing the identifier at `(line, character)`. See
    /// [`Engine::referencing_symbols`].
    ///
    /// ## Errors
    /// See [`Engine::referencing_symbols`].
    pub fn referencing_symbols(
        &self,
        relative_path: PathBuf,
        line: u32,
        character: u32,
        include_imports: bool,
        include_self: bool,
    ) -> Result<Vec<UnifiedSymbolInformation>> {
        self.call(move |engine| async move {
            engine
                .referencing_symbols(
                    &relative_path,
                    line,
                    character,
                    include_imports,
                    include_self,
                    &CancellationToken::new(),
                )
                .await
        })
    }

    /// Schedules session shutdown, blocks until it completes, and joins the
    /// scheduler thread. Idempotent: dropping a [`SyncSession`] that was
    /// already stopped is safe.
    ///
    /// ## Errors
    /// Propagates any error from [`Engine::stop`].
    pub fn stop(mut self) -> Result<()> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Result<()> {
        // Dropping the job sender closes the channel; the scheduler's
        // `recv()` loop exits and it stops the engine itself before the
        // thread function returns.
        self.jobs.take();
        if let Some(handle) = self.scheduler.take()
            && handle.join().is_err()
        {
            return Err(Error::Session(crate::error::SessionError::NotStarted));
        }
        Ok(())
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        if self.scheduler.is_some() {
            let _ = self.stop_inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_closure_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Job>();
    }
}
