//! The engine boundary: an opaque, synchronous repository-access call
//! surface.
//!
//! A [`RaEngine`] is produced by an external factory that owns connection
//! setup and authentication. This crate never looks behind the trait: it
//! treats the engine as a blocking RPC-like surface and layers session and
//! editor semantics on top. Engine implementations report failures as
//! [`EngineError`] values carrying the full layered error chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::EngineError;
use crate::notify::NotifyHandler;
use crate::options::CommitOptions;
use crate::types::{CommitInfo, Depth, Lock, NodeKind, Revision};

/// Result type for engine-boundary calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Cooperative cancellation flag shared between a session and its engine.
///
/// [`crate::RemoteSession::cancel_operation`] raises the flag; the engine
/// polls it at its own pace during long-running calls. Raising the flag
/// never unblocks a call that is already past its last polling point.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Lowers the flag (engines typically do this between operations).
    pub fn lower(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Returns `true` if cancellation has been requested.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A live connection to a repository-access engine.
///
/// All methods block the calling thread until the engine responds. The
/// tree-delta primitives mirror the editor protocol one-to-one and use
/// caller-chosen string tokens to name open scopes; the engine must apply
/// them in call order without reordering. At most one edit is in progress
/// per connection (`begin_edit` .. `close_edit`/`abort_edit`).
pub trait RaEngine: Send {
    /// Releases the underlying connection. Called exactly once, at handle
    /// disposal; must not fail.
    fn close(&mut self);

    /// Returns the URL this connection is currently parented at.
    fn session_url(&self) -> String;

    /// Points the connection at a different URL within the same repository.
    fn reparent(&mut self, url: &str) -> EngineResult<()>;

    /// Returns the repository root URL.
    fn repos_root_url(&mut self) -> EngineResult<String>;

    /// Returns the repository UUID.
    fn repos_uuid(&mut self) -> EngineResult<String>;

    /// Installs the session's cancellation flag. Engines that cannot poll
    /// may ignore it; cancellation is strictly cooperative.
    fn install_cancel_flag(&mut self, _flag: CancelFlag) {}

    /// Returns the latest (HEAD) revision number.
    fn latest_revision(&mut self) -> EngineResult<Revision>;

    /// Returns the last revision committed at or before the given time
    /// (microseconds since the Unix epoch).
    fn revision_by_timestamp(&mut self, timestamp_us: i64) -> EngineResult<Revision>;

    /// Returns the kind of the node at `path`. A `None` revision means the
    /// latest revision at call time.
    fn check_path(&mut self, path: &str, revision: Option<Revision>) -> EngineResult<NodeKind>;

    /// Returns the locks at or below `path`, to the given depth.
    fn get_locks(&mut self, path: &str, depth: Depth) -> EngineResult<Vec<Lock>>;

    /// Answers a capability query for the given query word. A failed query
    /// is an error, never an implicit "unsupported".
    fn has_capability(&mut self, query_word: &str) -> EngineResult<bool>;

    /// Opens a new commit transaction.
    fn begin_edit(&mut self, options: &CommitOptions) -> EngineResult<()>;

    /// Opens the root directory scope of the edit.
    fn open_root(&mut self, base_rev: Option<Revision>, token: &str) -> EngineResult<()>;

    /// Adds a directory, optionally copied from `copy_from`.
    fn add_directory(
        &mut self,
        path: &str,
        parent_token: &str,
        token: &str,
        copy_from: Option<(&str, Revision)>,
    ) -> EngineResult<()>;

    /// Opens an existing directory for editing.
    fn open_directory(
        &mut self,
        path: &str,
        parent_token: &str,
        token: &str,
        base_rev: Revision,
    ) -> EngineResult<()>;

    /// Adds a file, optionally copied from `copy_from`.
    fn add_file(
        &mut self,
        path: &str,
        parent_token: &str,
        token: &str,
        copy_from: Option<(&str, Revision)>,
    ) -> EngineResult<()>;

    /// Opens an existing file for editing.
    fn open_file(
        &mut self,
        path: &str,
        parent_token: &str,
        token: &str,
        base_rev: Revision,
    ) -> EngineResult<()>;

    /// Deletes the entry at `path` within the open directory scope.
    fn delete_entry(
        &mut self,
        path: &str,
        base_rev: Option<Revision>,
        parent_token: &str,
    ) -> EngineResult<()>;

    /// Sets (or with `None`, deletes) a directory property.
    fn change_dir_prop(
        &mut self,
        token: &str,
        name: &str,
        value: Option<&[u8]>,
    ) -> EngineResult<()>;

    /// Sets (or with `None`, deletes) a file property.
    fn change_file_prop(
        &mut self,
        token: &str,
        name: &str,
        value: Option<&[u8]>,
    ) -> EngineResult<()>;

    /// Starts the text stream for an open file scope.
    fn apply_text_delta(&mut self, token: &str, base_checksum: Option<&str>) -> EngineResult<()>;

    /// Appends a chunk of text to the open stream.
    fn write_text_chunk(&mut self, token: &str, chunk: &[u8]) -> EngineResult<()>;

    /// Ends the text stream for a file scope.
    fn text_delta_end(&mut self, token: &str) -> EngineResult<()>;

    /// Closes a file scope.
    fn close_file(&mut self, token: &str, text_checksum: Option<&str>) -> EngineResult<()>;

    /// Closes a directory scope.
    fn close_directory(&mut self, token: &str) -> EngineResult<()>;

    /// Commits the transaction, emitting one notification per server-side
    /// event. If the handler returns an error the engine must abort the
    /// edit and report the failure; handler errors never unwind through the
    /// engine.
    fn close_edit(&mut self, notify: Option<&mut dyn NotifyHandler>) -> EngineResult<CommitInfo>;

    /// Discards the transaction and everything accumulated in it.
    fn abort_edit(&mut self) -> EngineResult<()>;
}

impl std::fmt::Debug for dyn RaEngine + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RaEngine")
    }
}
