//! Handles: wrappers over engine object ids.
//!
//! Every accessor follows one fixed protocol: guard the id (a disposed handle
//! fails closed without touching the engine), activate the owning session,
//! invoke the entry point, translate the raw return, and wrap any new id in a
//! child handle. Disposal is explicit and idempotent; `Drop` is only a
//! last-resort backstop and never panics, including during process teardown.

use crate::error::{ChemError, ChemResult};
use crate::iter::HandleIter;
use crate::loader::{EngineLibrary, SymbolTable};
use crate::marshal::{copy_native_buffer, encode_cstr};
use crate::session::Session;
use std::ffi::{c_char, c_int};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Id value a handle carries once disposed.
const DISPOSED: i32 = -1;

/// Guard an id before any native call.
pub(crate) fn guard_id(id: i32) -> ChemResult<i32> {
    if id < 0 {
        Err(ChemError::InvalidHandle)
    } else {
        Ok(id)
    }
}

/// A wrapper around one engine object id.
///
/// Cheap to clone; clones share the id, and disposing any clone disposes all
/// of them. A handle produced by another handle keeps its producer alive via
/// `parent`; that extends the producer's *wrapper* lifetime only, never its
/// ownership of native memory.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: AtomicI32,
    session: Session,
    /// Keep-alive back-reference for derived views (iterator elements,
    /// match mappings, sub-objects).
    #[allow(dead_code)]
    parent: Option<Handle>,
}

impl Handle {
    /// Wrap a raw return value that must carry a new id.
    pub(crate) fn adopt(session: &Session, raw: c_int, parent: Option<&Handle>) -> ChemResult<Self> {
        let id = session.check_int(raw)?;
        session.register(id);
        Ok(Self {
            inner: Arc::new(HandleInner {
                id: AtomicI32::new(id),
                session: session.clone(),
                parent: parent.cloned(),
            }),
        })
    }

    /// Wrap a raw return value from the "`0` means absent" call family
    /// (`chemNext`, `chemMatch`, `chemMapItem`).
    pub(crate) fn adopt_optional(
        session: &Session,
        raw: c_int,
        parent: Option<&Handle>,
    ) -> ChemResult<Option<Self>> {
        let id = session.check_int(raw)?;
        if id == 0 {
            return Ok(None);
        }
        session.register(id);
        Ok(Some(Self {
            inner: Arc::new(HandleInner {
                id: AtomicI32::new(id),
                session: session.clone(),
                parent: parent.cloned(),
            }),
        }))
    }

    /// Live id, or `InvalidHandle` after dispose.
    pub fn id(&self) -> ChemResult<i32> {
        guard_id(self.inner.id.load(Ordering::SeqCst))
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.id.load(Ordering::SeqCst) < 0
    }

    /// Session this handle belongs to.
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    fn require_same_session(&self, other: &Handle) -> ChemResult<()> {
        if self.inner.session.same_as(&other.inner.session) {
            Ok(())
        } else {
            Err(ChemError::Usage(
                "handles belong to different sessions".to_string(),
            ))
        }
    }

    /// Id-guarded native call returning an integer.
    pub(crate) fn call_int(
        &self,
        f: impl FnOnce(&SymbolTable, c_int) -> c_int,
    ) -> ChemResult<i32> {
        let id = self.id()?;
        let raw = self.inner.session.run(|s| f(s, id));
        self.inner.session.check_int(raw)
    }

    fn call_float(&self, f: impl FnOnce(&SymbolTable, c_int) -> f64) -> ChemResult<f64> {
        let id = self.id()?;
        let raw = self.inner.session.run(|s| f(s, id));
        self.inner.session.check_float(raw)
    }

    fn call_str(
        &self,
        f: impl FnOnce(&SymbolTable, c_int) -> *const c_char,
    ) -> ChemResult<String> {
        let id = self.id()?;
        let raw = self.inner.session.run(|s| f(s, id));
        self.inner.session.check_str(raw)
    }

    /// Id-guarded call producing a new handle, parented to `self`.
    fn call_new(&self, f: impl FnOnce(&SymbolTable, c_int) -> c_int) -> ChemResult<Handle> {
        let id = self.id()?;
        let raw = self.inner.session.run(|s| f(s, id));
        Handle::adopt(&self.inner.session, raw, Some(self))
    }

    /// Like [`call_new`](Self::call_new) for the "`0` means absent" family.
    pub(crate) fn call_optional(
        &self,
        f: impl FnOnce(&SymbolTable, c_int) -> c_int,
    ) -> ChemResult<Option<Handle>> {
        let id = self.id()?;
        let raw = self.inner.session.run(|s| f(s, id));
        Handle::adopt_optional(&self.inner.session, raw, Some(self))
    }

    /// Id-guarded call producing an engine-owned (pointer, length) buffer,
    /// copied out immediately.
    fn call_buffer(
        &self,
        f: impl FnOnce(&SymbolTable, c_int, *mut *const u8, *mut c_int) -> c_int,
    ) -> ChemResult<Vec<u8>> {
        let id = self.id()?;
        let mut ptr: *const u8 = std::ptr::null();
        let mut len: c_int = 0;
        let raw = self.inner.session.run(|s| f(s, id, &mut ptr, &mut len));
        self.inner.session.check_int(raw)?;
        // The pointer dies at the next call on this session; copy now.
        Ok(unsafe { copy_native_buffer(ptr, len) })
    }

    /// Engine's text rendering of this object (opaque payload).
    pub fn to_text(&self) -> ChemResult<String> {
        self.call_str(|s, id| unsafe { (s.chemToString)(id) })
    }

    /// Canonical text representation, stable across serialize/deserialize.
    pub fn representation(&self) -> ChemResult<String> {
        self.call_str(|s, id| unsafe { (s.chemRepresentation)(id) })
    }

    /// Engine-side type name, e.g. for diagnostics.
    pub fn type_name(&self) -> ChemResult<String> {
        self.call_str(|s, id| unsafe { (s.chemTypeName)(id) })
    }

    pub fn name(&self) -> ChemResult<String> {
        self.call_str(|s, id| unsafe { (s.chemName)(id) })
    }

    pub fn set_name(&self, name: &str) -> ChemResult<()> {
        let name_c = encode_cstr(name)?;
        self.call_int(|s, id| unsafe { (s.chemSetName)(id, name_c.as_ptr()) })?;
        Ok(())
    }

    /// Element count of a collection object. `0` is a valid result.
    pub fn count(&self) -> ChemResult<i32> {
        self.call_int(|s, id| unsafe { (s.chemCount)(id) })
    }

    pub fn checksum(&self) -> ChemResult<i32> {
        self.call_int(|s, id| unsafe { (s.chemChecksum)(id) })
    }

    /// Mass-style float measurement (failure sentinel `< -0.5`; `0.0` is a
    /// valid measurement).
    pub fn mass(&self) -> ChemResult<f64> {
        self.call_float(|s, id| unsafe { (s.chemMass)(id) })
    }

    /// Deep copy on the engine side.
    pub fn clone_object(&self) -> ChemResult<Handle> {
        self.call_new(|s, id| unsafe { (s.chemClone)(id) })
    }

    /// Element of a collection by index.
    pub fn at(&self, index: i32) -> ChemResult<Handle> {
        self.call_new(|s, id| unsafe { (s.chemAt)(id, index) })
    }

    /// Binary serialized form, copied into a caller-owned buffer.
    pub fn serialize(&self) -> ChemResult<Vec<u8>> {
        self.call_buffer(|s, id, ptr, len| unsafe { (s.chemSerialize)(id, ptr, len) })
    }

    /// Accumulated bytes of a writer object ([`Session::buffer_writer`]).
    pub fn buffer_contents(&self) -> ChemResult<Vec<u8>> {
        self.call_buffer(|s, id, ptr, len| unsafe { (s.chemToBuffer)(id, ptr, len) })
    }

    /// Append an item to an engine-side array.
    pub fn array_add(&self, item: &Handle) -> ChemResult<()> {
        self.require_same_session(item)?;
        let item_id = item.id()?;
        self.call_int(|s, id| unsafe { (s.chemArrayAdd)(id, item_id) })?;
        Ok(())
    }

    /// Empty a collection object.
    pub fn clear(&self) -> ChemResult<()> {
        self.call_int(|s, id| unsafe { (s.chemClear)(id) })?;
        Ok(())
    }

    /// Append another object to a writer/collection object.
    pub fn append(&self, other: &Handle) -> ChemResult<()> {
        self.require_same_session(other)?;
        let other_id = other.id()?;
        self.call_int(|s, id| unsafe { (s.chemAppend)(id, other_id) })?;
        Ok(())
    }

    /// Flush and close a writer-style object without disposing it.
    pub fn close(&self) -> ChemResult<()> {
        self.call_int(|s, id| unsafe { (s.chemClose)(id) })?;
        Ok(())
    }

    /// Derive a sub-object from an index list, passed as (pointer, count).
    pub fn subset(&self, indices: &[i32]) -> ChemResult<Handle> {
        let count = c_int::try_from(indices.len()).map_err(|_| {
            ChemError::Usage(format!(
                "index list of {} entries exceeds the ABI limit",
                indices.len()
            ))
        })?;
        self.call_new(|s, id| unsafe { (s.chemSubset)(id, indices.as_ptr(), count) })
    }

    /// Match a query against this object. `Ok(None)` means "no match", which
    /// the engine reports as `0` (success, not an error).
    pub fn match_query(&self, query: &Handle) -> ChemResult<Option<Handle>> {
        self.require_same_session(query)?;
        let query_id = query.id()?;
        self.call_optional(|s, id| unsafe { (s.chemMatch)(id, query_id) })
    }

    /// Number of matches of a query against this object (`0` is valid).
    pub fn count_matches(&self, query: &Handle) -> ChemResult<i32> {
        self.require_same_session(query)?;
        let query_id = query.id()?;
        self.call_int(|s, id| unsafe { (s.chemCountMatches)(id, query_id) })
    }

    /// Map a query item onto the target of a match mapping. `Ok(None)` means
    /// the item is not mapped (engine `0`, success).
    pub fn map_item(&self, item: &Handle) -> ChemResult<Option<Handle>> {
        self.require_same_session(item)?;
        let item_id = item.id()?;
        self.call_optional(|s, id| unsafe { (s.chemMapItem)(id, item_id) })
    }

    /// Target object of a match mapping, with match highlighting applied.
    pub fn highlighted_target(&self) -> ChemResult<Handle> {
        self.call_new(|s, id| unsafe { (s.chemHighlightedTarget)(id) })
    }

    /// Treat this handle itself as an iterator object.
    pub fn iter(&self) -> HandleIter {
        HandleIter::new(self.clone())
    }

    /// Iterator over this object's items.
    pub fn items(&self) -> ChemResult<HandleIter> {
        let iterator = self.call_new(|s, id| unsafe { (s.chemIterateItems)(id) })?;
        Ok(HandleIter::new(iterator))
    }

    /// Iterator over match mappings of a query against this object.
    pub fn matches(&self, query: &Handle) -> ChemResult<HandleIter> {
        self.require_same_session(query)?;
        let query_id = query.id()?;
        let iterator = self.call_new(|s, id| unsafe { (s.chemIterateMatches)(id, query_id) })?;
        Ok(HandleIter::new(iterator))
    }

    /// Release the native object.
    ///
    /// Idempotent; the second and later calls are pure no-ops. Safe to call
    /// after the binding has been retired at process teardown (the native
    /// free is skipped).
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl HandleInner {
    fn dispose(&self) {
        let id = self.id.swap(DISPOSED, Ordering::SeqCst);
        if id < 0 {
            return;
        }
        self.session.unregister(id);
        if !EngineLibrary::is_live() {
            return;
        }
        // Free result deliberately ignored: dispose never raises.
        self.session.run(|s| unsafe { (s.chemFree)(id) });
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.inner.id.load(Ordering::SeqCst);
        if id < 0 {
            f.write_str("Handle(disposed)")
        } else {
            write!(f, "Handle({id})")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposed_id_fails_closed() {
        assert!(matches!(guard_id(DISPOSED), Err(ChemError::InvalidHandle)));
        assert!(matches!(guard_id(-7), Err(ChemError::InvalidHandle)));
    }

    #[test]
    fn zero_is_a_live_id() {
        // Engine id 0 is valid in non-iterator call families.
        assert_eq!(guard_id(0).unwrap(), 0);
        assert_eq!(guard_id(41).unwrap(), 41);
    }
}
