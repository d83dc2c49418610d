//! # lib-chem-ffi
//!
//! Safe FFI bridge to the chemengine native toolkit.
//!
//! The engine exposes a flat C ABI of integer object ids scoped to sessions.
//! This crate provides the systems layer over that ABI:
//!
//! - Library discovery and one-time symbol binding with `libloading`
//! - Session activation (the engine has a single ambient "current session")
//! - Handle lifecycle: idempotent dispose, keep-alive parent chains, `Drop`
//!   as a last-resort backstop
//! - Error-sentinel translation carrying the engine's own diagnostics
//! - Forward-only iteration over engine iterator objects
//! - Copy-out marshaling of engine-owned (pointer, length) buffers
//!
//! Everything chemical (parsing, matching, rendering) happens inside the
//! engine; payloads are opaque bytes and strings here.
//!
//! # Safety
//!
//! All `unsafe` is confined to the call sites of bound entry points and the
//! marshaling helpers. The invariants each site relies on (pointer lifetimes,
//! session activation ordering, id validity) are documented where they are
//! upheld, not at the ABI declarations.

pub mod error;
pub mod handle;
pub mod iter;
pub mod loader;
pub mod marshal;
pub mod options;
pub mod session;

pub use error::{ChemError, ChemResult};
pub use handle::Handle;
pub use iter::HandleIter;
pub use loader::{library_path, EngineLibrary, Platform, TargetOs, ENGINE_NAME};
pub use options::{OptionKind, OptionValue};
pub use session::Session;
