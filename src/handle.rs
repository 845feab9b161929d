//! Exclusive ownership of a live engine connection.

use std::fmt::Formatter;

use tracing::debug;

use crate::engine::RaEngine;
use crate::error::RemoteError;

/// An opaque, move-only capability wrapping one live engine connection.
///
/// Exactly one [`crate::RemoteSession`] owns a handle. Disposal consumes
/// the connection and is permanent: the handle is never reattached to a
/// different connection, and any later access fails with
/// [`RemoteError::HandleDisposed`]. Disposal is idempotent.
pub struct EngineHandle {
    engine: Option<Box<dyn RaEngine>>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("disposed", &self.engine.is_none())
            .finish()
    }
}

impl EngineHandle {
    /// Wraps a connection produced by an engine factory.
    pub fn new(engine: Box<dyn RaEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    /// Returns `true` once the handle has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.engine.is_none()
    }

    pub(crate) fn engine(&mut self) -> Result<&mut dyn RaEngine, RemoteError> {
        match self.engine.as_deref_mut() {
            Some(engine) => Ok(engine),
            None => Err(RemoteError::HandleDisposed),
        }
    }

    /// Closes the connection and permanently invalidates the handle.
    pub fn dispose(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
            debug!("engine handle disposed");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        // Backstop only; the owning session disposes explicitly.
        self.dispose();
    }
}
