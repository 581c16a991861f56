//! Lock-free holder for the error observed by a tracker's background work.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

use crate::error::TaskError;

/// Single error slot shared between background loops and accessors.
///
/// `set` keeps the first error stored; later failures are usually
/// consequences of the first one. `combine` is for errors that must be
/// reported alongside whatever is already there.
#[derive(Debug, Default)]
pub struct ErrorCell {
    slot: ArcSwapOption<TaskError>,
}

impl ErrorCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `err` unless an error is already present.
    /// Returns `true` if this call stored it.
    pub fn set(&self, err: TaskError) -> bool {
        let new = Some(Arc::new(err));
        let previous = self.slot.compare_and_swap(&None::<Arc<TaskError>>, new);
        previous.is_none()
    }

    /// Append `err` to the stored error, or store it if the slot is empty.
    /// Returns the resulting value.
    pub fn combine(&self, err: TaskError) -> TaskError {
        let stored = self.slot.rcu(|current| {
            let merged = match current {
                Some(existing) => existing.as_ref().clone().combine(err.clone()),
                None => err.clone(),
            };
            Some(Arc::new(merged))
        });
        // `rcu` returns the value it replaced; recompute what is now stored.
        match stored {
            Some(previous) => previous.as_ref().clone().combine(err),
            None => err,
        }
    }

    pub fn get(&self) -> Option<TaskError> {
        self.slot.load_full().map(|err| err.as_ref().clone())
    }

    pub fn is_set(&self) -> bool {
        self.slot.load().is_some()
    }
}
