//! Bookkeeping for editors spawned by a session.
//!
//! The registry never owns an editor (applications do); it keeps weak
//! references so the session can reach every still-live editor during
//! disposal and force it into its aborted state. Entries for dropped
//! editors are pruned opportunistically and never dereferenced.

use std::sync::{Arc, Mutex, Weak};

use crate::editor::EditorCell;
use crate::lock;

pub(crate) struct EditorRegistry {
    entries: Mutex<Vec<Weak<EditorCell>>>,
}

impl EditorRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, editor: &Arc<EditorCell>) {
        let mut entries = lock(&self.entries);
        entries.retain(|weak| weak.strong_count() > 0);
        entries.push(Arc::downgrade(editor));
    }

    pub(crate) fn deregister(&self, editor: &Arc<EditorCell>) {
        let target = Arc::downgrade(editor);
        lock(&self.entries).retain(|weak| weak.strong_count() > 0 && !weak.ptr_eq(&target));
    }

    /// Snapshots the live members. Entry locks are never taken while the
    /// table lock is held, so callers are free to lock the editors they get
    /// back.
    pub(crate) fn snapshot(&self) -> Vec<Arc<EditorCell>> {
        lock(&self.entries)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Returns `true` if any registered editor is still in a non-terminal
    /// state.
    pub(crate) fn has_live(&self) -> bool {
        self.snapshot()
            .iter()
            .any(|cell| !lock(cell).is_terminal())
    }

    pub(crate) fn clear(&self) {
        lock(&self.entries).clear();
    }
}
