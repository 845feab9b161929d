//! Builder-style option types for commit transactions.

use crate::PropertyList;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A path/token pair to include in [`CommitOptions::lock_tokens`].
pub struct CommitLockToken {
    /// Locked repository path.
    pub path: String,
    /// Lock token to present during commit.
    pub token: String,
}

impl CommitLockToken {
    /// Creates a path/token pair.
    pub fn new(path: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            token: token.into(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::RemoteSession::begin_commit`].
///
/// `rev_props` is for additional revision properties; the engine always
/// derives `svn:log` from `log_message`.
pub struct CommitOptions {
    /// Commit log message.
    pub log_message: String,
    /// Lock tokens to present during commit.
    pub lock_tokens: Vec<CommitLockToken>,
    /// Whether to keep locks after a successful commit.
    pub keep_locks: bool,
    /// Additional revision properties to set during commit.
    pub rev_props: PropertyList,
}

impl CommitOptions {
    /// Creates commit options with a required log message.
    pub fn new(log_message: impl Into<String>) -> Self {
        Self {
            log_message: log_message.into(),
            lock_tokens: Vec::new(),
            keep_locks: false,
            rev_props: PropertyList::new(),
        }
    }

    /// Sets lock tokens to be included in the commit.
    pub fn with_lock_tokens(mut self, lock_tokens: Vec<CommitLockToken>) -> Self {
        self.lock_tokens = lock_tokens;
        self
    }

    /// Requests that locks be kept after the commit.
    pub fn keep_locks(mut self) -> Self {
        self.keep_locks = true;
        self
    }

    /// Sets additional revision properties.
    pub fn with_rev_props(mut self, rev_props: PropertyList) -> Self {
        self.rev_props = rev_props;
        self
    }
}
