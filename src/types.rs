//! Public data types used by the session and editor APIs.
//!
//! Most of these types are thin, owned snapshots of values reported by the
//! repository-access engine.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// A property list (`name -> raw bytes`).
///
/// Property values can be binary; callers should treat the value as opaque
/// bytes unless they know it is UTF-8.
pub type PropertyList = BTreeMap<String, Vec<u8>>;

/// A repository revision number.
pub type Revision = u64;

/// The kind of a node in the repository.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// No node exists at the requested path/revision.
    None,
    /// A file node.
    File,
    /// A directory node.
    Dir,
    /// An unknown kind (usually a forward-compatibility fallback).
    Unknown,
}

impl NodeKind {
    /// Returns a stable string representation of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
            Self::Dir => "dir",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Depth of a recursive query (used by lock queries).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Depth {
    /// The target itself only.
    Empty,
    /// The target and its file children.
    Files,
    /// The target and its immediate children (files and dirs).
    Immediates,
    /// Fully recursive.
    Infinity,
}

/// A lock description as returned by lock queries.
///
/// Values are immutable snapshots; the lock may have changed or expired
/// server-side by the time the caller inspects them.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lock {
    /// Repository-relative path (no leading `/`) that is locked.
    pub path: String,
    /// Opaque lock token.
    pub token: String,
    /// Lock owner.
    pub owner: String,
    /// Optional lock comment.
    pub comment: Option<String>,
    /// Creation date string as reported by the engine.
    pub created: String,
    /// Expiration date string as reported by the engine, if any.
    pub expires: Option<String>,
}

/// A successful commit result returned by [`crate::CommitEditor::close_edit`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// The new committed revision number.
    pub new_rev: Revision,
    /// Commit date, if provided by the server (usually an RFC3339-ish string).
    pub date: Option<String>,
    /// Commit author, if provided by the server.
    pub author: Option<String>,
    /// Server-reported post-commit error, if any.
    pub post_commit_err: Option<String>,
}

/// An abstract repository/server capability that a session can query.
///
/// Capability semantics never change during a session's lifetime, so query
/// results are cached per session (see
/// [`crate::RemoteSession::has_capability`]).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Support for depth-related parameters.
    Depth,
    /// Support for mergeinfo queries.
    MergeInfo,
    /// Support for requesting revision properties from log queries.
    LogRevProps,
    /// Support for partial replay of revisions.
    PartialReplay,
    /// Support for setting revision properties during commit.
    CommitRevProps,
    /// Support for atomic revision-property changes.
    AtomicRevProps,
    /// Support for inherited properties.
    InheritedProps,
    /// Support for ephemeral transaction properties.
    EphemeralTxnProps,
}

impl Capability {
    /// Returns the engine query word for this capability.
    pub fn as_query_word(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::MergeInfo => "mergeinfo",
            Self::LogRevProps => "log-revprops",
            Self::PartialReplay => "partial-replay",
            Self::CommitRevProps => "commit-revprops",
            Self::AtomicRevProps => "atomic-revprops",
            Self::InheritedProps => "inherited-props",
            Self::EphemeralTxnProps => "ephemeral-txnprops",
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_query_word())
    }
}
