//! Commit notification types.
//!
//! During long-running operations (currently `close_edit`) the engine emits
//! one event per server-side action. Callers that want progress reporting
//! implement [`NotifyHandler`] and pass it to
//! [`crate::CommitEditor::close_edit_with_notify`].

use crate::types::{NodeKind, Revision};
use crate::RemoteError;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
/// What happened to the path carried by a [`NotifyInfo`] event.
pub enum NotifyAction {
    /// The path was added.
    Added,
    /// The path was modified.
    Modified,
    /// The path was deleted.
    Deleted,
    /// The path was replaced (deleted and re-added in one transaction).
    Replaced,
    /// The server is finalizing the transaction; `path` is the target root.
    Finalizing,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
/// Whether the content or properties of a path changed.
pub enum StateChange {
    /// The engine did not report this dimension.
    Unknown,
    /// Nothing changed.
    Unchanged,
    /// The dimension changed.
    Changed,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// One server-side event reported during a long-running operation.
pub struct NotifyInfo {
    /// Repository-relative path the event applies to.
    pub path: String,
    /// The action taken on `path`.
    pub action: NotifyAction,
    /// Node kind of `path`, if known.
    pub kind: NodeKind,
    /// MIME type of the content, if the engine reports one.
    pub mime_type: Option<String>,
    /// Whether the content changed.
    pub content_state: StateChange,
    /// Whether properties changed.
    pub prop_state: StateChange,
    /// Revision the event belongs to, if known at emission time.
    pub revision: Option<Revision>,
}

/// Handler for server-side event streams.
///
/// Handlers must not panic across the engine boundary: return an error
/// instead. The engine records the first error, aborts the running edit,
/// and the failure surfaces from the operation that was in flight.
pub trait NotifyHandler {
    /// Called once per incoming event.
    fn on_notify(&mut self, info: &NotifyInfo) -> Result<(), RemoteError>;
}

impl<F> NotifyHandler for F
where
    F: FnMut(&NotifyInfo) -> Result<(), RemoteError>,
{
    fn on_notify(&mut self, info: &NotifyInfo) -> Result<(), RemoteError> {
        self(info)
    }
}
