//! Marshaling helpers for the C ABI boundary.
//!
//! Strings cross the boundary as null-terminated byte buffers. Variable-length
//! binary output comes back as an engine-owned `(pointer, length)` pair that
//! must be copied before the next call on the same session invalidates it.

use crate::error::{ChemError, ChemResult};
use std::ffi::{c_char, c_int, CStr, CString};

/// Encode a Rust string for the engine.
///
/// An embedded NUL cannot be represented in the wire form and is rejected
/// before any native call is attempted.
pub(crate) fn encode_cstr(value: &str) -> ChemResult<CString> {
    CString::new(value)
        .map_err(|_| ChemError::Usage(format!("string contains an embedded NUL byte: {value:?}")))
}

/// Clamp a buffer length to the `c_int` the ABI carries.
pub(crate) fn buffer_len(bytes: &[u8]) -> ChemResult<c_int> {
    c_int::try_from(bytes.len())
        .map_err(|_| ChemError::Usage(format!("buffer of {} bytes exceeds the ABI limit", bytes.len())))
}

/// Read a borrowed C string, returning `None` if null.
///
/// The engine's diagnostic text is not guaranteed to be UTF-8; invalid bytes
/// are replaced rather than dropped so no diagnostic is ever lost.
///
/// # Safety
/// `ptr` must be null or point to a valid null-terminated C string.
pub(crate) unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Copy an engine-owned `(pointer, length)` buffer into a caller-owned `Vec`.
///
/// The native pointer must not be read again after this copy; its lifetime is
/// tied to the producing session and ends at the next call on it.
///
/// # Safety
/// `ptr` must be null or valid for reads of `len` bytes.
pub(crate) unsafe fn copy_native_buffer(ptr: *const u8, len: c_int) -> Vec<u8> {
    if ptr.is_null() || len <= 0 {
        return Vec::new();
    }
    unsafe { std::slice::from_raw_parts(ptr, len as usize) }.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_nul_is_a_usage_error() {
        assert!(encode_cstr("timeout").is_ok());
        let err = encode_cstr("bad\0name").unwrap_err();
        assert!(matches!(err, ChemError::Usage(_)));
    }

    #[test]
    fn copy_is_independent_of_source() {
        let source = vec![0x43u8, 0x4d, 0x46, 0x00, 0x07];
        let copied = unsafe { copy_native_buffer(source.as_ptr(), source.len() as c_int) };
        drop(source);
        assert_eq!(copied, [0x43, 0x4d, 0x46, 0x00, 0x07]);
    }

    #[test]
    fn null_and_empty_buffers_copy_to_empty() {
        assert!(unsafe { copy_native_buffer(std::ptr::null(), 16) }.is_empty());
        let source = [1u8];
        assert!(unsafe { copy_native_buffer(source.as_ptr(), 0) }.is_empty());
    }

    #[test]
    fn null_c_string_reads_as_none() {
        assert_eq!(unsafe { read_c_string(std::ptr::null()) }, None);
        let text = CString::new("ring bond count mismatch").unwrap();
        assert_eq!(
            unsafe { read_c_string(text.as_ptr()) }.as_deref(),
            Some("ring bond count mismatch")
        );
    }
}
