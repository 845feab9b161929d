use thiserror::Error;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
/// One layer of an engine-reported error chain.
pub struct ErrorEntry {
    /// Engine error code for this layer.
    pub code: i32,
    /// Error message text for this layer.
    pub message: String,
    /// Whether this is the generic message for `code` rather than a more
    /// specific message produced at the failure site.
    pub generic: bool,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A structured, layered error reported across the engine boundary.
///
/// `chain` is the engine-provided error stack, ordered exactly as received
/// (outermost cause first). It is never reordered, deduplicated, or
/// collapsed; callers needing diagnostic detail can walk every layer.
pub struct EngineError {
    /// High-level context for the failure (usually the operation name).
    pub context: Option<String>,
    /// Identifier of the error's source inside the engine, if provided.
    pub source: Option<String>,
    /// Error code of the outermost layer (`-1` if the chain is empty).
    pub code: i32,
    /// The full engine-provided error chain.
    pub chain: Vec<ErrorEntry>,
}

impl EngineError {
    /// Builds an error from a raw engine chain, preserving its order.
    pub fn from_chain(source: Option<String>, chain: Vec<ErrorEntry>) -> Self {
        let code = chain.first().map(|entry| entry.code).unwrap_or(-1);
        Self {
            context: None,
            source,
            code,
            chain,
        }
    }

    /// Convenience constructor for a single-layer error.
    pub fn single(code: i32, message: impl Into<String>) -> Self {
        Self::from_chain(
            None,
            vec![ErrorEntry {
                code,
                message: message.into(),
                generic: false,
            }],
        )
    }

    /// Attaches additional context to this error.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns a single-line, human-readable message.
    ///
    /// This is a best-effort summary of the error chain; the individual
    /// layers remain available through [`EngineError::chain`].
    pub fn message_summary(&self) -> String {
        let mut messages = Vec::new();
        for entry in &self.chain {
            if !entry.message.is_empty() {
                messages.push(entry.message.as_str());
            }
        }
        if messages.is_empty() {
            "unknown error".to_string()
        } else {
            messages.join("; ")
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ctx) = self.context.as_deref()
            && !ctx.is_empty()
        {
            write!(f, "{ctx}: ")?;
        }
        write!(f, "{}", self.message_summary())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
/// Errors returned by this crate.
pub enum RemoteError {
    /// The engine handle has been disposed; the connection is gone for good.
    #[error("engine handle disposed")]
    HandleDisposed,
    /// The session has been disposed and can no longer start operations.
    #[error("session disposed")]
    SessionDisposed,
    /// The editor has already reached `Closed` or `Aborted`.
    #[error("editor closed")]
    EditorClosed,
    /// The editor call sequence violates the tree-delta protocol.
    #[error("invalid edit sequence: {0}")]
    InvalidEditSequence(String),
    /// The checksum supplied to `close_file` does not match the written text.
    #[error("checksum mismatch: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        /// Checksum supplied by the caller.
        expected: String,
        /// Checksum computed over the text actually written.
        actual: String,
    },
    /// The operation is not valid while an editor is open on the session.
    #[error("an editor is still open on this session")]
    EditorInProgress,
    /// The provided URL is syntactically invalid or targets a foreign root.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The provided repository path is invalid or unsafe.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// A failure reported by the engine, with its full error chain.
    #[error("engine error: {0}")]
    Engine(EngineError),
}

impl From<EngineError> for RemoteError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}
