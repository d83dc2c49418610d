//! Error types for bridge operations.

use thiserror::Error;

/// Errors that can occur while talking to the native engine.
#[derive(Debug, Error)]
pub enum ChemError {
    /// The engine shared library could not be located for the current target.
    #[error("could not find native engine library for target in: {path}")]
    LibraryNotFound { path: String },

    /// The engine shared library exists but could not be loaded.
    #[error("failed to load engine library '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: libloading::Error,
    },

    /// Required entry point missing from the engine library.
    #[error("symbol '{symbol}' not found in engine library")]
    SymbolNotFound { symbol: String },

    /// The engine signaled failure through a sentinel return value.
    ///
    /// The message is the engine's own last-error diagnostic, passed through
    /// unchanged.
    #[error("{0}")]
    NativeCall(String),

    /// A call was made on a handle after it was disposed.
    #[error("object handle has been disposed")]
    InvalidHandle,

    /// Malformed input rejected before reaching the native layer.
    #[error("{0}")]
    Usage(String),
}

/// Result type for bridge operations.
pub type ChemResult<T> = Result<T, ChemError>;

/// Failure sentinel for integer-returning entry points.
///
/// Only strictly negative values signal failure; `0` is a legitimate result
/// ("no items", "index zero", ...).
pub(crate) fn int_failed(raw: i32) -> bool {
    raw < 0
}

/// Failure sentinel for float-returning entry points.
///
/// Legitimate measurements are non-negative; the threshold sits at `-0.5` to
/// tolerate floating rounding near zero.
pub(crate) fn float_failed(raw: f64) -> bool {
    raw < -0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_int_is_success() {
        assert!(!int_failed(0));
        assert!(!int_failed(1));
        assert!(int_failed(-1));
        assert!(int_failed(i32::MIN));
    }

    #[test]
    fn float_threshold_tolerates_rounding() {
        assert!(!float_failed(0.0));
        assert!(!float_failed(-0.4));
        assert!(!float_failed(-0.5));
        assert!(float_failed(-0.500001));
        assert!(float_failed(-1.0));
    }

    #[test]
    fn native_call_text_is_verbatim() {
        let err = ChemError::NativeCall("element: bad valence on N".to_string());
        assert_eq!(err.to_string(), "element: bad valence on N");
    }
}
