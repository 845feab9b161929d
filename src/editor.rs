//! The commit editor: a tree-delta transaction builder.
//!
//! A [`CommitEditor`] accumulates one atomic tree mutation through a
//! constrained call sequence and drives the engine's tree-delta primitives
//! in that exact order. Scopes nest strictly: one chain of open directories
//! (plus at most one open file) exists at a time, and scopes close in
//! reverse order of opening. Protocol violations are rejected locally,
//! before any engine call is attempted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use md5::{Digest, Md5};
use tracing::{debug, warn};

use crate::error::{EngineError, RemoteError};
use crate::lock;
use crate::notify::{NotifyHandler, NotifyInfo};
use crate::path::{parent_dir, validate_rel_path};
use crate::session::SessionCore;
use crate::types::{CommitInfo, Revision};
use crate::Result;

const ROOT_TOKEN: &str = "r";

/// Protocol state of a [`CommitEditor`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EditState {
    /// Created; `open_root` is the only valid next call.
    Opened,
    /// The root scope (and possibly children) is open.
    Active,
    /// All scopes are closed; `close_edit` commits the transaction.
    Completing,
    /// Terminal: the transaction was committed.
    Closed,
    /// Terminal: the transaction was discarded.
    Aborted,
}

impl EditState {
    /// Returns `true` for the two terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum ScopeKind {
    Dir,
    File,
}

struct Scope {
    kind: ScopeKind,
    path: String,
    token: String,
}

struct TextDelta {
    token: String,
    hasher: Md5,
}

#[derive(Default)]
struct TokenGen {
    next_dir: u64,
    next_file: u64,
}

impl TokenGen {
    fn dir(&mut self) -> String {
        self.next_dir += 1;
        format!("d{}", self.next_dir)
    }

    fn file(&mut self) -> String {
        self.next_file += 1;
        format!("f{}", self.next_file)
    }
}

pub(crate) struct EditorInner {
    state: EditState,
    scopes: Vec<Scope>,
    deleted: HashSet<String>,
    tokens: TokenGen,
    text: Option<TextDelta>,
}

pub(crate) type EditorCell = Mutex<EditorInner>;

impl EditorInner {
    pub(crate) fn new() -> Self {
        Self {
            state: EditState::Opened,
            scopes: Vec::new(),
            deleted: HashSet::new(),
            tokens: TokenGen::default(),
            text: None,
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Forces the editor into `Aborted`; returns `true` if it was live.
    pub(crate) fn force_abort(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = EditState::Aborted;
        true
    }

    fn ensure_not_terminal(&self) -> Result<()> {
        if self.is_terminal() {
            Err(RemoteError::EditorClosed)
        } else {
            Ok(())
        }
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            EditState::Opened => Err(RemoteError::InvalidEditSequence(
                "open_root must be the first call".into(),
            )),
            EditState::Active => Ok(()),
            EditState::Completing => Err(RemoteError::InvalidEditSequence(
                "the root scope is already closed".into(),
            )),
            EditState::Closed | EditState::Aborted => Err(RemoteError::EditorClosed),
        }
    }

    /// Checks that `path` can be introduced under the innermost open scope
    /// and returns the parent directory token.
    fn child_scope_parent(&self, path: &str) -> Result<String> {
        self.ensure_active()?;
        let scope = self
            .scopes
            .last()
            .ok_or(RemoteError::EditorClosed)?;
        if scope.kind != ScopeKind::Dir {
            return Err(RemoteError::InvalidEditSequence(
                "a file scope is open; close it first".into(),
            ));
        }
        if parent_dir(path) != scope.path {
            return Err(RemoteError::InvalidEditSequence(format!(
                "{path} is not a direct child of the open directory scope"
            )));
        }
        Ok(scope.token.clone())
    }
}

/// A tree-delta editor bound to one [`crate::RemoteSession`].
///
/// The application owns the editor; the session only keeps a non-owning
/// back-reference so it can abort the editor if it is disposed first.
/// Dropping a non-terminal editor aborts it.
pub struct CommitEditor {
    cell: Arc<EditorCell>,
    session: Weak<SessionCore>,
}

impl std::fmt::Debug for CommitEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitEditor")
            .field("state", &self.state())
            .finish()
    }
}

fn engine_err(op: &'static str) -> impl FnOnce(EngineError) -> RemoteError {
    move |err| RemoteError::Engine(err.with_context(op))
}

impl CommitEditor {
    pub(crate) fn new(cell: Arc<EditorCell>, session: Weak<SessionCore>) -> Self {
        Self { cell, session }
    }

    /// Returns the editor's current protocol state.
    pub fn state(&self) -> EditState {
        lock(&self.cell).state
    }

    fn session(&self) -> Result<Arc<SessionCore>> {
        self.session.upgrade().ok_or(RemoteError::SessionDisposed)
    }

    /// Opens the root directory scope against `base_rev` (`None` for the
    /// latest revision). Must be the first call on a new editor.
    pub fn open_root(&mut self, base_rev: Option<Revision>) -> Result<()> {
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        if inner.state != EditState::Opened {
            return Err(RemoteError::InvalidEditSequence(
                "the root scope is already open".into(),
            ));
        }
        let session = self.session()?;
        let mut handle = lock(&session.handle);
        handle
            .engine()?
            .open_root(base_rev, ROOT_TOKEN)
            .map_err(engine_err("open-root"))?;
        drop(handle);
        inner.state = EditState::Active;
        inner.scopes.push(Scope {
            kind: ScopeKind::Dir,
            path: String::new(),
            token: ROOT_TOKEN.to_string(),
        });
        Ok(())
    }

    /// Adds a directory under the innermost open directory scope and opens
    /// a scope for it. A path deleted earlier in this edit may be re-added.
    pub fn add_directory(
        &mut self,
        path: &str,
        copy_from: Option<(&str, Revision)>,
    ) -> Result<()> {
        self.add_node(path, copy_from, ScopeKind::Dir)
    }

    /// Adds a file under the innermost open directory scope and opens a
    /// scope for it. A path deleted earlier in this edit may be re-added.
    pub fn add_file(&mut self, path: &str, copy_from: Option<(&str, Revision)>) -> Result<()> {
        self.add_node(path, copy_from, ScopeKind::File)
    }

    fn add_node(
        &mut self,
        path: &str,
        copy_from: Option<(&str, Revision)>,
        kind: ScopeKind,
    ) -> Result<()> {
        let path = validate_rel_path(path)?;
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        let parent_token = inner.child_scope_parent(&path)?;
        let token = match kind {
            ScopeKind::Dir => inner.tokens.dir(),
            ScopeKind::File => inner.tokens.file(),
        };
        let session = self.session()?;
        let mut handle = lock(&session.handle);
        let engine = handle.engine()?;
        match kind {
            ScopeKind::Dir => engine
                .add_directory(&path, &parent_token, &token, copy_from)
                .map_err(engine_err("add-dir"))?,
            ScopeKind::File => engine
                .add_file(&path, &parent_token, &token, copy_from)
                .map_err(engine_err("add-file"))?,
        }
        drop(handle);
        // A re-add supersedes an earlier deletion of the same path.
        inner.deleted.remove(&path);
        inner.scopes.push(Scope { kind, path, token });
        Ok(())
    }

    /// Opens an existing directory for editing.
    pub fn open_directory(&mut self, path: &str, base_rev: Revision) -> Result<()> {
        self.open_node(path, base_rev, ScopeKind::Dir)
    }

    /// Opens an existing file for editing.
    pub fn open_file(&mut self, path: &str, base_rev: Revision) -> Result<()> {
        self.open_node(path, base_rev, ScopeKind::File)
    }

    fn open_node(&mut self, path: &str, base_rev: Revision, kind: ScopeKind) -> Result<()> {
        let path = validate_rel_path(path)?;
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        let parent_token = inner.child_scope_parent(&path)?;
        if inner.deleted.contains(&path) {
            return Err(RemoteError::InvalidEditSequence(format!(
                "{path} was deleted earlier in this edit"
            )));
        }
        let token = match kind {
            ScopeKind::Dir => inner.tokens.dir(),
            ScopeKind::File => inner.tokens.file(),
        };
        let session = self.session()?;
        let mut handle = lock(&session.handle);
        let engine = handle.engine()?;
        match kind {
            ScopeKind::Dir => engine
                .open_directory(&path, &parent_token, &token, base_rev)
                .map_err(engine_err("open-dir"))?,
            ScopeKind::File => engine
                .open_file(&path, &parent_token, &token, base_rev)
                .map_err(engine_err("open-file"))?,
        }
        drop(handle);
        inner.scopes.push(Scope { kind, path, token });
        Ok(())
    }

    /// Records the deletion of `path` within the innermost open directory
    /// scope. The deletion is terminal for that path within this edit; only
    /// a subsequent re-add makes it editable again.
    pub fn delete_entry(&mut self, path: &str, base_rev: Option<Revision>) -> Result<()> {
        let path = validate_rel_path(path)?;
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        let parent_token = inner.child_scope_parent(&path)?;
        if inner.deleted.contains(&path) {
            return Err(RemoteError::InvalidEditSequence(format!(
                "{path} was already deleted in this edit"
            )));
        }
        let session = self.session()?;
        let mut handle = lock(&session.handle);
        handle
            .engine()?
            .delete_entry(&path, base_rev, &parent_token)
            .map_err(engine_err("delete-entry"))?;
        drop(handle);
        inner.deleted.insert(path);
        Ok(())
    }

    /// Sets (or with `None`, deletes) a property on the innermost open
    /// scope.
    pub fn set_property(&mut self, name: &str, value: Option<&[u8]>) -> Result<()> {
        let inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        inner.ensure_active()?;
        let scope = inner.scopes.last().ok_or(RemoteError::EditorClosed)?;
        let (kind, token) = (scope.kind, scope.token.clone());
        let session = self.session()?;
        let mut handle = lock(&session.handle);
        let engine = handle.engine()?;
        match kind {
            ScopeKind::Dir => engine
                .change_dir_prop(&token, name, value)
                .map_err(engine_err("change-dir-prop")),
            ScopeKind::File => engine
                .change_file_prop(&token, name, value)
                .map_err(engine_err("change-file-prop")),
        }
    }

    /// Starts the text stream for the innermost open file scope. Valid at
    /// most once per file scope.
    pub fn apply_text_delta(&mut self, base_checksum: Option<&str>) -> Result<()> {
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        let token = inner.file_scope_token()?;
        if inner.text.is_some() {
            return Err(RemoteError::InvalidEditSequence(
                "a text delta is already applied to this file".into(),
            ));
        }
        let session = self.session()?;
        let mut handle = lock(&session.handle);
        handle
            .engine()?
            .apply_text_delta(&token, base_checksum)
            .map_err(engine_err("apply-textdelta"))?;
        drop(handle);
        inner.text = Some(TextDelta {
            token,
            hasher: Md5::new(),
        });
        Ok(())
    }

    /// Appends content to the open text stream.
    pub fn write_text(&mut self, chunk: &[u8]) -> Result<()> {
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        let token = inner.file_scope_token()?;
        let Some(text) = inner.text.as_mut() else {
            return Err(RemoteError::InvalidEditSequence(
                "apply_text_delta must precede content writes".into(),
            ));
        };
        if text.token != token {
            return Err(RemoteError::InvalidEditSequence(
                "apply_text_delta must precede content writes".into(),
            ));
        }
        let session = self.session()?;
        let mut handle = lock(&session.handle);
        handle
            .engine()?
            .write_text_chunk(&token, chunk)
            .map_err(engine_err("textdelta-chunk"))?;
        drop(handle);
        if let Some(text) = inner.text.as_mut() {
            text.hasher.update(chunk);
        }
        Ok(())
    }

    /// Closes the innermost open file scope.
    ///
    /// If `text_checksum` is supplied and a text delta was applied, it is
    /// verified against the written content; a mismatch aborts the entire
    /// transaction and fails with [`RemoteError::ChecksumMismatch`].
    pub fn close_file(&mut self, text_checksum: Option<&str>) -> Result<()> {
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        let token = inner.file_scope_token()?;

        let session = self.session()?;
        let written = match inner.text.take() {
            Some(text) if text.token == token => {
                let mut handle = lock(&session.handle);
                handle
                    .engine()?
                    .text_delta_end(&token)
                    .map_err(engine_err("textdelta-end"))?;
                Some(hex::encode(text.hasher.finalize()))
            }
            other => {
                inner.text = other;
                None
            }
        };

        if let Some(expected) = text_checksum
            && let Some(actual) = written.as_deref()
            && !expected.eq_ignore_ascii_case(actual)
        {
            let err = RemoteError::ChecksumMismatch {
                expected: expected.to_ascii_lowercase(),
                actual: actual.to_string(),
            };
            drop(inner);
            self.abort_after_failure(&session, "checksum mismatch");
            return Err(err);
        }

        let mut handle = lock(&session.handle);
        handle
            .engine()?
            .close_file(&token, text_checksum)
            .map_err(engine_err("close-file"))?;
        drop(handle);
        inner.scopes.pop();
        Ok(())
    }

    /// Closes the innermost open scope, which must be a directory. Closing
    /// the root scope moves the editor to `Completing`.
    pub fn close_directory(&mut self) -> Result<()> {
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        inner.ensure_active()?;
        let scope = inner.scopes.last().ok_or(RemoteError::EditorClosed)?;
        if scope.kind != ScopeKind::Dir {
            return Err(RemoteError::InvalidEditSequence(
                "the innermost open scope is a file".into(),
            ));
        }
        let token = scope.token.clone();
        let session = self.session()?;
        let mut handle = lock(&session.handle);
        handle
            .engine()?
            .close_directory(&token)
            .map_err(engine_err("close-dir"))?;
        drop(handle);
        inner.scopes.pop();
        if inner.scopes.is_empty() {
            inner.state = EditState::Completing;
        }
        Ok(())
    }

    /// Commits the transaction. Valid only once every scope, including the
    /// root, has been closed.
    pub fn close_edit(&mut self) -> Result<CommitInfo> {
        self.finish_edit(None)
    }

    /// Commits the transaction, reporting server-side events to `handler`.
    ///
    /// A handler failure is recorded, the edit is aborted, and the recorded
    /// error is returned.
    pub fn close_edit_with_notify(
        &mut self,
        handler: &mut dyn NotifyHandler,
    ) -> Result<CommitInfo> {
        self.finish_edit(Some(handler))
    }

    fn finish_edit(&mut self, handler: Option<&mut dyn NotifyHandler>) -> Result<CommitInfo> {
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        match inner.state {
            EditState::Opened => {
                return Err(RemoteError::InvalidEditSequence(
                    "no root scope was opened".into(),
                ));
            }
            EditState::Active => {
                return Err(RemoteError::InvalidEditSequence(
                    "scopes are still open".into(),
                ));
            }
            EditState::Completing => {}
            EditState::Closed | EditState::Aborted => return Err(RemoteError::EditorClosed),
        }

        let session = self.session()?;
        let mut recorder = handler.map(RecordingNotify::new);
        let result = {
            let mut handle = lock(&session.handle);
            let engine = handle.engine()?;
            engine.close_edit(
                recorder
                    .as_mut()
                    .map(|recorder| recorder as &mut dyn NotifyHandler),
            )
        };

        let handler_error = recorder.and_then(|recorder| recorder.error);
        match result {
            Ok(info) if handler_error.is_none() => {
                inner.state = EditState::Closed;
                drop(inner);
                self.deregister(&session);
                debug!(new_rev = info.new_rev, "edit committed");
                Ok(info)
            }
            Ok(_) => {
                // The engine committed despite a handler failure; the edit
                // is still surfaced as aborted. The caller must re-query the
                // repository to learn the true outcome.
                inner.state = EditState::Aborted;
                drop(inner);
                self.deregister(&session);
                Err(handler_error.unwrap_or(RemoteError::EditorClosed))
            }
            Err(err) => {
                inner.state = EditState::Aborted;
                drop(inner);
                self.abort_after_failure(&session, "close-edit failed");
                match handler_error {
                    Some(handler_error) => Err(handler_error),
                    None => Err(engine_err("close-edit")(err)),
                }
            }
        }
    }

    /// Discards the transaction. Valid from any non-terminal state.
    pub fn abort_edit(&mut self) -> Result<()> {
        let mut inner = lock(&self.cell);
        inner.ensure_not_terminal()?;
        inner.state = EditState::Aborted;
        drop(inner);
        let Some(session) = self.session.upgrade() else {
            // Nothing left to release; the session cascade got here first.
            return Ok(());
        };
        let result = {
            let mut handle = lock(&session.handle);
            match handle.engine() {
                Ok(engine) => engine.abort_edit().map_err(engine_err("abort-edit")),
                Err(err) => Err(err),
            }
        };
        self.deregister(&session);
        debug!("edit aborted");
        result
    }

    fn deregister(&self, session: &Arc<SessionCore>) {
        session.registry.deregister(&self.cell);
    }

    /// Best-effort engine-side abort after a failure that already decided
    /// the editor's fate. Never fails; anomalies are logged.
    fn abort_after_failure(&self, session: &Arc<SessionCore>, reason: &'static str) {
        {
            let mut inner = lock(&self.cell);
            inner.state = EditState::Aborted;
        }
        let mut handle = lock(&session.handle);
        if let Ok(engine) = handle.engine()
            && let Err(err) = engine.abort_edit()
        {
            warn!(error = %err, reason, "failed to abort edit after failure");
        }
        drop(handle);
        self.deregister(session);
    }
}

impl EditorInner {
    fn file_scope_token(&self) -> Result<String> {
        self.ensure_active()?;
        let scope = self.scopes.last().ok_or(RemoteError::EditorClosed)?;
        if scope.kind != ScopeKind::File {
            return Err(RemoteError::InvalidEditSequence(
                "no file scope is open".into(),
            ));
        }
        Ok(scope.token.clone())
    }
}

impl Drop for CommitEditor {
    fn drop(&mut self) {
        let was_live = lock(&self.cell).force_abort();
        let Some(session) = self.session.upgrade() else {
            return;
        };
        if was_live {
            debug!("aborting dropped editor");
            let mut handle = lock(&session.handle);
            if let Ok(engine) = handle.engine()
                && let Err(err) = engine.abort_edit()
            {
                warn!(error = %err, "failed to abort dropped editor");
            }
        }
        session.registry.deregister(&self.cell);
    }
}

struct RecordingNotify<'a> {
    inner: &'a mut dyn NotifyHandler,
    error: Option<RemoteError>,
}

impl<'a> RecordingNotify<'a> {
    fn new(inner: &'a mut dyn NotifyHandler) -> Self {
        Self { inner, error: None }
    }
}

impl NotifyHandler for RecordingNotify<'_> {
    fn on_notify(&mut self, info: &NotifyInfo) -> Result<()> {
        if self.error.is_some() {
            // Already failed; swallow the rest of the stream.
            return Ok(());
        }
        match self.inner.on_notify(info) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.error = Some(err);
                Err(RemoteError::Engine(EngineError::single(
                    -1,
                    "commit notification handler failed",
                )))
            }
        }
    }
}
