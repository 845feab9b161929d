//! Client-side session layer over a Subversion repository-access (RA)
//! engine.
//!
//! This crate sits between application code and an opaque, synchronous
//! repository-access engine (the [`RaEngine`] trait). It owns the engine
//! connection through a [`RemoteSession`], answers read queries (latest
//! revision, path kind, locks, capabilities), and produces atomic tree-edit
//! transactions through a [`CommitEditor`] that enforces the tree-delta
//! protocol's strict scope nesting. It is **not** a wire-protocol
//! implementation and does not manage a working copy: connection setup,
//! authentication, and transport belong to the engine factory.
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use svn_remote::{CommitOptions, EngineHandle, RaEngine, RemoteSession};
//!
//! fn demo(engine: Box<dyn RaEngine>) -> svn_remote::Result<()> {
//!     // The engine comes from your factory, already authenticated.
//!     let mut session = RemoteSession::new(EngineHandle::new(engine))?;
//!     let head = session.get_latest_revision()?;
//!
//!     let mut editor = session.begin_commit(&CommitOptions::new("add greeting"))?;
//!     editor.open_root(Some(head))?;
//!     editor.add_file("hello.txt", None)?;
//!     editor.apply_text_delta(None)?;
//!     editor.write_text(b"hello\n")?;
//!     editor.close_file(None)?;
//!     editor.close_directory()?; // the root scope
//!     let info = editor.close_edit()?;
//!     println!("committed r{}", info.new_rev);
//!
//!     session.dispose();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `serde`: enables `Serialize`/`Deserialize` for public data types.
//!
//! ## Lifecycle notes
//!
//! - A session exclusively owns its engine handle; disposal is idempotent
//!   and cascade-aborts any editors still open.
//! - Editors are owned by the application and hold only a weak reference
//!   back to their session; dropping either side is safe in any order.
//! - Protocol violations (`InvalidEditSequence`, `EditorClosed`,
//!   `EditorInProgress`) are detected locally and never reach the engine.

#![deny(unsafe_code)]

mod editor;
mod engine;
mod error;
mod handle;
mod notify;
mod options;
mod path;
mod registry;
mod session;
mod types;
mod url;

pub use editor::{CommitEditor, EditState};
pub use engine::{CancelFlag, EngineResult, RaEngine};
pub use error::{EngineError, ErrorEntry, RemoteError};
pub use handle::EngineHandle;
pub use notify::{NotifyAction, NotifyHandler, NotifyInfo, StateChange};
pub use options::{CommitLockToken, CommitOptions};
pub use session::RemoteSession;
pub use types::{Capability, CommitInfo, Depth, Lock, NodeKind, PropertyList, Revision};
pub use url::SessionUrl;

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, RemoteError>;

pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
