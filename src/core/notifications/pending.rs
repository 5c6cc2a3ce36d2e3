// src/core/notifications/pending.rs

//! The buffer of emitted changes waiting for a client to poll them.

use super::ItemValue;
use crate::core::driver::PointHandle;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Emitted changes accumulated since the last `GETCHANGED`.
///
/// Holds at most one entry per point: a later change replaces the earlier one
/// but keeps its position, so entries stay in order of first emission and the
/// buffer is bounded by the number of registered points.
#[derive(Debug, Default)]
pub struct PendingChanges {
    entries: Mutex<IndexMap<PointHandle, ItemValue>>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_all(&self, changes: &[ItemValue]) {
        let mut entries = self.entries.lock();
        for change in changes {
            entries.insert(change.handle, change.clone());
        }
    }

    /// Takes every pending change, leaving the buffer empty.
    pub fn drain(&self) -> Vec<ItemValue> {
        std::mem::take(&mut *self.entries.lock())
            .into_values()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
