//! Forward-only iteration over engine iterator objects.

use crate::error::ChemResult;
use crate::handle::Handle;

/// Iterator adapter over an engine iterator object.
///
/// The engine's `chemNext` returns `0` at end of sequence; that is the normal
/// termination signal, never an error, and repeated calls after exhaustion
/// keep returning it. Elements are parented to the iterator handle so the
/// iterator wrapper outlives every element derived from it.
pub struct HandleIter {
    handle: Handle,
}

impl HandleIter {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// The underlying iterator object.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Side-effect-free peek; idempotent between advances.
    pub fn has_next(&self) -> ChemResult<bool> {
        let raw = self.handle.call_int(|s, id| unsafe { (s.chemHasNext)(id) })?;
        Ok(raw != 0)
    }

    /// Advance; `Ok(None)` at (and after) end of sequence.
    pub fn next_item(&self) -> ChemResult<Option<Handle>> {
        self.handle.call_optional(|s, id| unsafe { (s.chemNext)(id) })
    }
}

impl Iterator for HandleIter {
    type Item = ChemResult<Handle>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item().transpose()
    }
}
