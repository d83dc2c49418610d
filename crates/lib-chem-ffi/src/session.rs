//! Engine sessions: activation scope for every handle-bound call.
//!
//! The engine keeps a single ambient "current session" slot. A [`Session`]
//! simulates an isolated logical session over that slot by re-activating its
//! id immediately before every native call it issues. No locking is provided:
//! interleaving calls from two sessions on two threads without external
//! serialization may touch the wrong session's state, exactly as the engine
//! itself behaves.

use crate::error::{float_failed, int_failed, ChemError, ChemResult};
use crate::handle::Handle;
use crate::loader::{EngineLibrary, SymbolTable};
use crate::marshal::{buffer_len, encode_cstr, read_c_string};
use crate::options::OptionValue;
use std::borrow::Borrow;
use std::collections::HashSet;
use std::ffi::{c_char, c_float, c_int};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One logical engine session.
///
/// Cheap to clone; all clones share the same native session id. The id is
/// released when the last clone (and the last handle created on it) drops.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    sid: u64,
    library: Arc<EngineLibrary>,
    /// Ids of handles created on this session and not yet disposed. Purely
    /// diagnostic; native lifetime is governed by dispose/release.
    registry: Mutex<HashSet<i32>>,
}

impl Session {
    /// Bind the engine (or reuse the process-wide binding) and allocate a
    /// fresh session.
    pub fn attach(root: impl AsRef<Path>) -> ChemResult<Self> {
        let library = EngineLibrary::load(root.as_ref())?;
        let sid = unsafe { (library.symbols().chemAllocSessionId)() };
        tracing::debug!(sid, "Allocated engine session");
        let session = Self {
            inner: Arc::new(SessionInner {
                sid,
                library,
                registry: Mutex::new(HashSet::new()),
            }),
        };
        session.run(|_| ());
        Ok(session)
    }

    /// Native session id.
    pub fn id(&self) -> u64 {
        self.inner.sid
    }

    /// Activate this session and invoke one native call.
    ///
    /// Activation happens at every call site, never relied on from a prior
    /// call; this is the entire multi-session contract (see module docs).
    pub(crate) fn run<R>(&self, f: impl FnOnce(&SymbolTable) -> R) -> R {
        let symbols = self.inner.library.symbols();
        unsafe { (symbols.chemSetSessionId)(self.inner.sid) };
        f(symbols)
    }

    pub(crate) fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fetch the engine's last-error text for this (still active) session.
    ///
    /// The borrowed pointer is only valid until the next call, so the text is
    /// copied immediately.
    fn last_error(&self) -> String {
        let ptr = unsafe { (self.inner.library.symbols().chemGetLastError)() };
        unsafe { read_c_string(ptr) }
            .unwrap_or_else(|| "engine reported a failure with no diagnostic".to_string())
    }

    /// Translate an integer return value (`< 0` is the failure sentinel).
    pub(crate) fn check_int(&self, raw: c_int) -> ChemResult<i32> {
        if int_failed(raw) {
            Err(ChemError::NativeCall(self.last_error()))
        } else {
            Ok(raw)
        }
    }

    /// Translate a float return value (`< -0.5` is the failure sentinel).
    pub(crate) fn check_float(&self, raw: f64) -> ChemResult<f64> {
        if float_failed(raw) {
            Err(ChemError::NativeCall(self.last_error()))
        } else {
            Ok(raw)
        }
    }

    /// Translate a borrowed string return (null is the failure sentinel) and
    /// copy it out before the next call can invalidate it.
    pub(crate) fn check_str(&self, raw: *const c_char) -> ChemResult<String> {
        unsafe { read_c_string(raw) }.ok_or_else(|| ChemError::NativeCall(self.last_error()))
    }

    pub(crate) fn register(&self, id: i32) {
        if let Ok(mut registry) = self.inner.registry.lock() {
            registry.insert(id);
        }
    }

    pub(crate) fn unregister(&self, id: i32) {
        if let Ok(mut registry) = self.inner.registry.lock() {
            registry.remove(&id);
        }
    }

    /// Number of handles created on this session and not yet disposed.
    pub fn live_handles(&self) -> usize {
        self.inner.registry.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Engine version string.
    pub fn version(&self) -> ChemResult<String> {
        let raw = self.run(|s| unsafe { (s.chemVersion)() });
        self.check_str(raw)
    }

    /// Extended engine version/build information.
    pub fn version_info(&self) -> ChemResult<String> {
        let raw = self.run(|s| unsafe { (s.chemVersionInfo)() });
        self.check_str(raw)
    }

    /// Engine-reported count of live object references on this session.
    pub fn count_references(&self) -> ChemResult<i32> {
        let raw = self.run(|s| unsafe { (s.chemCountReferences)() });
        self.check_int(raw)
    }

    /// Free every object on this session, regardless of outstanding handles.
    ///
    /// Outstanding [`Handle`]s keep their wrapper state and fail closed with
    /// `NativeCall` errors afterwards; this is a leak-recovery hatch, not a
    /// normal dispose path.
    pub fn free_all(&self) -> ChemResult<i32> {
        let freed = {
            let raw = self.run(|s| unsafe { (s.chemFreeAllObjects)() });
            self.check_int(raw)?
        };
        if let Ok(mut registry) = self.inner.registry.lock() {
            registry.clear();
        }
        tracing::debug!(freed, "Freed all session objects");
        Ok(freed)
    }

    /// Set an option; the entry point is selected by the value's shape.
    pub fn set_option(&self, name: &str, value: impl Into<OptionValue>) -> ChemResult<()> {
        let name_c = encode_cstr(name)?;
        let value = value.into();
        tracing::trace!(name, kind = ?value.kind(), "Setting engine option");
        let raw = match &value {
            OptionValue::Text(text) => {
                let text_c = encode_cstr(text)?;
                self.run(|s| unsafe { (s.chemSetOption)(name_c.as_ptr(), text_c.as_ptr()) })
            }
            OptionValue::Int(v) => {
                self.run(|s| unsafe { (s.chemSetOptionInt)(name_c.as_ptr(), *v) })
            }
            OptionValue::Float(v) => {
                self.run(|s| unsafe { (s.chemSetOptionFloat)(name_c.as_ptr(), *v) })
            }
            OptionValue::Bool(v) => {
                self.run(|s| unsafe { (s.chemSetOptionBool)(name_c.as_ptr(), i32::from(*v)) })
            }
            OptionValue::Point(x, y) => {
                self.run(|s| unsafe { (s.chemSetOptionXY)(name_c.as_ptr(), *x, *y) })
            }
            OptionValue::Color(r, g, b) => {
                self.run(|s| unsafe { (s.chemSetOptionColor)(name_c.as_ptr(), *r, *g, *b) })
            }
        };
        self.check_int(raw)?;
        Ok(())
    }

    /// Option value rendered as text by the engine.
    pub fn get_option(&self, name: &str) -> ChemResult<String> {
        let name_c = encode_cstr(name)?;
        let raw = self.run(|s| unsafe { (s.chemGetOption)(name_c.as_ptr()) });
        self.check_str(raw)
    }

    pub fn get_option_int(&self, name: &str) -> ChemResult<i32> {
        let name_c = encode_cstr(name)?;
        let mut value: c_int = 0;
        let raw = self.run(|s| unsafe { (s.chemGetOptionInt)(name_c.as_ptr(), &mut value) });
        self.check_int(raw)?;
        Ok(value)
    }

    pub fn get_option_bool(&self, name: &str) -> ChemResult<bool> {
        let name_c = encode_cstr(name)?;
        let mut value: c_int = 0;
        let raw = self.run(|s| unsafe { (s.chemGetOptionBool)(name_c.as_ptr(), &mut value) });
        self.check_int(raw)?;
        Ok(value != 0)
    }

    pub fn get_option_float(&self, name: &str) -> ChemResult<f32> {
        let name_c = encode_cstr(name)?;
        let mut value: c_float = 0.0;
        let raw = self.run(|s| unsafe { (s.chemGetOptionFloat)(name_c.as_ptr(), &mut value) });
        self.check_int(raw)?;
        Ok(value)
    }

    /// The engine's declared type name for an option.
    pub fn get_option_type(&self, name: &str) -> ChemResult<String> {
        let name_c = encode_cstr(name)?;
        let raw = self.run(|s| unsafe { (s.chemGetOptionType)(name_c.as_ptr()) });
        self.check_str(raw)
    }

    /// Reset every option on this session to its default.
    pub fn reset_options(&self) -> ChemResult<()> {
        let raw = self.run(|s| unsafe { (s.chemResetOptions)() });
        self.check_int(raw)?;
        Ok(())
    }

    /// Load a structure from its text form. The content is opaque to this
    /// layer; format detection happens inside the engine.
    pub fn load_structure(&self, text: &str) -> ChemResult<Handle> {
        let text_c = encode_cstr(text)?;
        let raw = self.run(|s| unsafe { (s.chemLoadStructureFromString)(text_c.as_ptr()) });
        Handle::adopt(self, raw, None)
    }

    /// Load a structure from raw bytes, passed as (pointer, length).
    pub fn load_structure_from_buffer(&self, bytes: &[u8]) -> ChemResult<Handle> {
        let len = buffer_len(bytes)?;
        let raw = self.run(|s| unsafe { (s.chemLoadStructureFromBuffer)(bytes.as_ptr(), len) });
        Handle::adopt(self, raw, None)
    }

    /// Load a structure from a file the engine reads itself.
    pub fn load_structure_from_file(&self, path: &Path) -> ChemResult<Handle> {
        let path_str = path
            .to_str()
            .ok_or_else(|| ChemError::Usage(format!("non-UTF-8 path: {}", path.display())))?;
        let path_c = encode_cstr(path_str)?;
        let raw = self.run(|s| unsafe { (s.chemLoadStructureFromFile)(path_c.as_ptr()) });
        Handle::adopt(self, raw, None)
    }

    /// Load a query object for matching.
    pub fn load_query(&self, text: &str) -> ChemResult<Handle> {
        let text_c = encode_cstr(text)?;
        let raw = self.run(|s| unsafe { (s.chemLoadQueryFromString)(text_c.as_ptr()) });
        Handle::adopt(self, raw, None)
    }

    /// Create an empty engine-side array object.
    pub fn create_array(&self) -> ChemResult<Handle> {
        let raw = self.run(|s| unsafe { (s.chemCreateArray)() });
        Handle::adopt(self, raw, None)
    }

    /// Collect anything that yields handles into an engine-side array.
    ///
    /// The bound rejects non-handle inputs at the type level; there is no
    /// runtime "is this iterable" probing.
    pub fn array_from<I>(&self, items: I) -> ChemResult<Handle>
    where
        I: IntoIterator,
        I::Item: Borrow<Handle>,
    {
        let array = self.create_array()?;
        for item in items {
            array.array_add(item.borrow())?;
        }
        Ok(array)
    }

    /// Create an in-memory writer; its accumulated bytes are read back with
    /// [`Handle::buffer_contents`].
    pub fn buffer_writer(&self) -> ChemResult<Handle> {
        let raw = self.run(|s| unsafe { (s.chemWriteBuffer)() });
        Handle::adopt(self, raw, None)
    }

    /// Rebuild an object from its binary serialized form
    /// ([`Handle::serialize`]).
    pub fn deserialize(&self, bytes: &[u8]) -> ChemResult<Handle> {
        let len = buffer_len(bytes)?;
        let raw = self.run(|s| unsafe { (s.chemDeserialize)(bytes.as_ptr(), len) });
        Handle::adopt(self, raw, None)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sid", &self.inner.sid)
            .field("library", &self.inner.library.path)
            .finish()
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // The binding may already be gone at process teardown; releasing a
        // session then must degrade to a no-op instead of faulting.
        if !EngineLibrary::is_live() {
            return;
        }
        tracing::debug!(sid = self.sid, "Releasing engine session");
        unsafe { (self.library.symbols().chemReleaseSessionId)(self.sid) };
    }
}
