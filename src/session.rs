//! The remote session: read queries, capability cache, and editor
//! lifecycle.

use std::collections::HashMap;
use std::fmt::Formatter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::editor::{CommitEditor, EditorInner};
use crate::engine::{CancelFlag, EngineResult, RaEngine};
use crate::error::RemoteError;
use crate::handle::EngineHandle;
use crate::lock;
use crate::options::CommitOptions;
use crate::path::validate_rel_dir_path;
use crate::registry::EditorRegistry;
use crate::types::{Capability, Depth, Lock, NodeKind, Revision};
use crate::url::SessionUrl;
use crate::Result;

pub(crate) struct SessionCore {
    pub(crate) handle: Mutex<EngineHandle>,
    pub(crate) registry: EditorRegistry,
    url: Mutex<SessionUrl>,
    caps: Mutex<HashMap<Capability, bool>>,
    cancel: CancelFlag,
    disposed: AtomicBool,
}

impl SessionCore {
    fn engine_call<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut dyn RaEngine) -> EngineResult<T>,
    ) -> Result<T> {
        let mut handle = lock(&self.handle);
        let engine = handle.engine()?;
        f(engine).map_err(|err| RemoteError::Engine(err.with_context(op)))
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut aborted = 0usize;
        for cell in self.registry.snapshot() {
            let was_live = lock(&cell).force_abort();
            if !was_live {
                continue;
            }
            aborted += 1;
            let mut handle = lock(&self.handle);
            if let Ok(engine) = handle.engine()
                && let Err(err) = engine.abort_edit()
            {
                warn!(error = %err, "failed to abort open editor during session disposal");
            }
        }
        self.registry.clear();
        lock(&self.handle).dispose();
        debug!(aborted_editors = aborted, "remote session disposed");
    }
}

/// A connected, stateful session to a remote repository.
///
/// A session exclusively owns one [`EngineHandle`]. Operations block the
/// calling thread until the engine responds and serialize on the session;
/// callers wanting parallelism open additional sessions. Dropping a session
/// runs the same idempotent disposal path as [`RemoteSession::dispose`].
pub struct RemoteSession {
    core: Arc<SessionCore>,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("url", &lock(&self.core.url).url)
            .field("disposed", &self.core.disposed.load(Ordering::Acquire))
            .finish()
    }
}

impl RemoteSession {
    /// Wraps an authenticated engine connection produced by an external
    /// factory.
    ///
    /// The session installs its cancellation flag into the engine and reads
    /// the engine's current URL; it fails if the handle is already disposed
    /// or the engine reports an unparsable URL.
    pub fn new(mut handle: EngineHandle) -> Result<Self> {
        let cancel = CancelFlag::new();
        let url = {
            let engine = handle.engine()?;
            engine.install_cancel_flag(cancel.clone());
            SessionUrl::parse(&engine.session_url())?
        };
        debug!(url = %url, "remote session opened");
        Ok(Self {
            core: Arc::new(SessionCore {
                handle: Mutex::new(handle),
                registry: EditorRegistry::new(),
                url: Mutex::new(url),
                caps: Mutex::new(HashMap::new()),
                cancel,
                disposed: AtomicBool::new(false),
            }),
        })
    }

    /// Returns the URL this session is currently parented at.
    pub fn session_url(&self) -> SessionUrl {
        lock(&self.core.url).clone()
    }

    /// Changes the repository URL for this session.
    ///
    /// Fails with [`RemoteError::EditorInProgress`] while any editor is
    /// open, and with [`RemoteError::InvalidUrl`] if the new URL does not
    /// parse or points outside this session's repository root.
    pub fn reparent(&mut self, url: &str) -> Result<()> {
        if self.core.registry.has_live() {
            return Err(RemoteError::EditorInProgress);
        }
        let new_url = SessionUrl::parse(url)?;
        let root = self
            .core
            .engine_call("reparent", |engine| engine.repos_root_url())?;
        let root = SessionUrl::parse(&root)?;
        if !root.is_ancestor_of(&new_url) {
            return Err(RemoteError::InvalidUrl(format!(
                "{url} is outside the repository root {root}"
            )));
        }
        self.core
            .engine_call("reparent", |engine| engine.reparent(new_url.url.as_str()))?;
        *lock(&self.core.url) = new_url;
        Ok(())
    }

    /// Returns the repository root URL.
    pub fn repos_root_url(&mut self) -> Result<String> {
        self.core
            .engine_call("get-repos-root", |engine| engine.repos_root_url())
    }

    /// Returns the repository UUID.
    pub fn repos_uuid(&mut self) -> Result<String> {
        self.core
            .engine_call("get-repos-uuid", |engine| engine.repos_uuid())
    }

    /// Returns the path of `url` relative to the session URL (`""` when
    /// equal). Purely local; uses the cached session URL.
    pub fn get_session_relative_path(&self, url: &str) -> Result<String> {
        let target = SessionUrl::parse(url)?;
        let session_url = lock(&self.core.url).clone();
        session_url.relative_path_of(&target).ok_or_else(|| {
            RemoteError::InvalidUrl(format!("{url} is not a child of the session url"))
        })
    }

    /// Returns the path of `url` relative to the repository root.
    pub fn get_repos_relative_path(&mut self, url: &str) -> Result<String> {
        let target = SessionUrl::parse(url)?;
        let root = self.repos_root_url()?;
        let root = SessionUrl::parse(&root)?;
        root.relative_path_of(&target).ok_or_else(|| {
            RemoteError::InvalidUrl(format!("{url} is not within the repository root"))
        })
    }

    /// Returns the latest (HEAD) revision number.
    pub fn get_latest_revision(&mut self) -> Result<Revision> {
        self.core
            .engine_call("get-latest-rev", |engine| engine.latest_revision())
    }

    /// Returns the last revision committed at or before `timestamp_us`
    /// (microseconds since the Unix epoch).
    pub fn get_revision_by_timestamp(&mut self, timestamp_us: i64) -> Result<Revision> {
        self.core.engine_call("get-dated-rev", |engine| {
            engine.revision_by_timestamp(timestamp_us)
        })
    }

    /// Convenience wrapper for [`RemoteSession::get_revision_by_timestamp`].
    pub fn get_revision_by_time(&mut self, time: SystemTime) -> Result<Revision> {
        let timestamp_us = match time.duration_since(UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_micros()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_micros())
                .map(|us| -us)
                .unwrap_or(i64::MIN),
        };
        self.get_revision_by_timestamp(timestamp_us)
    }

    /// Returns the kind of the node at `path`. A `None` revision resolves
    /// to the latest revision at call time (never cached).
    pub fn check_path(&mut self, path: &str, revision: Option<Revision>) -> Result<NodeKind> {
        let path = validate_rel_dir_path(path)?;
        self.core
            .engine_call("check-path", |engine| engine.check_path(&path, revision))
    }

    /// Returns the locks at or below `path`, to the given depth.
    pub fn get_locks(&mut self, path: &str, depth: Depth) -> Result<Vec<Lock>> {
        let path = validate_rel_dir_path(path)?;
        self.core
            .engine_call("get-locks", |engine| engine.get_locks(&path, depth))
    }

    /// Returns whether the repository/server supports `capability`.
    ///
    /// The first query per capability is an engine round-trip; the answer is
    /// cached for the session's lifetime (capability semantics never change
    /// mid-session). Query failures surface as errors and are not cached.
    pub fn has_capability(&self, capability: Capability) -> Result<bool> {
        let mut caps = lock(&self.core.caps);
        if let Some(answer) = caps.get(&capability) {
            return Ok(*answer);
        }
        let answer = self.core.engine_call("has-capability", |engine| {
            engine.has_capability(capability.as_query_word())
        })?;
        caps.insert(capability, answer);
        Ok(answer)
    }

    /// Requests cooperative cancellation of the operation in progress.
    ///
    /// This only raises a flag the engine polls during long-running calls;
    /// it does not unblock a thread already inside an engine call, and it
    /// takes effect at the engine's next polling point.
    pub fn cancel_operation(&self) {
        debug!("operation cancellation requested");
        self.core.cancel.raise();
    }

    /// Opens a commit transaction and returns its editor.
    ///
    /// Fails with [`RemoteError::SessionDisposed`] after disposal and with
    /// [`RemoteError::EditorInProgress`] while another editor is live.
    pub fn begin_commit(&mut self, options: &CommitOptions) -> Result<CommitEditor> {
        if self.core.disposed.load(Ordering::Acquire) {
            return Err(RemoteError::SessionDisposed);
        }
        if self.core.registry.has_live() {
            return Err(RemoteError::EditorInProgress);
        }
        self.core
            .engine_call("commit", |engine| engine.begin_edit(options))?;
        let cell = Arc::new(Mutex::new(EditorInner::new()));
        self.core.registry.register(&cell);
        debug!("commit editor opened");
        Ok(CommitEditor::new(cell, Arc::downgrade(&self.core)))
    }

    /// Disposes the session: aborts every live editor, then releases the
    /// engine handle. Idempotent; a second call is a no-op.
    pub fn dispose(&mut self) {
        self.core.dispose();
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        // Backstop for callers that forget explicit disposal; same path,
        // never panics.
        self.core.dispose();
    }
}
