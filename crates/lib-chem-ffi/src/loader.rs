//! Dynamic loading and symbol binding for the chemengine shared library.
//!
//! The engine ships as a platform shared library under
//! `<root>/lib/<os>-<arch>/`. This module resolves that path from the target
//! triple, loads the library with global symbol visibility, and binds every
//! entry point's signature exactly once. The binding is a process-wide
//! singleton; repeat construction is a cheap no-op returning the existing
//! binding.

use crate::error::{ChemError, ChemResult};
use libloading::Library;
use std::ffi::{c_char, c_double, c_float, c_int};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Base name of the engine shared library.
pub const ENGINE_NAME: &str = "chemengine";

/// Operating systems the engine ships binaries for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetOs {
    Linux,
    Macos,
    Windows,
}

impl TargetOs {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Linux | Self::Macos => "lib",
            Self::Windows => "",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Linux => ".so",
            Self::Macos => ".dylib",
            Self::Windows => ".dll",
        }
    }
}

/// Target platform the library path is computed for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Platform {
    pub os: TargetOs,
    pub arch: String,
}

impl Platform {
    /// Platform of the running process.
    pub fn current() -> ChemResult<Self> {
        Self::detect(
            std::env::consts::OS,
            std::env::consts::ARCH,
            std::mem::size_of::<usize>(),
        )
    }

    /// Normalize an `(os, machine, pointer-width)` triple.
    ///
    /// Architecture aliases collapse (`amd64` -> `x86_64`, `arm64` ->
    /// `aarch64`), and a 32-bit process on x86_64 selects the `i386` binary.
    pub fn detect(os: &str, machine: &str, pointer_width: usize) -> ChemResult<Self> {
        let os = match os {
            "linux" => TargetOs::Linux,
            "macos" | "darwin" => TargetOs::Macos,
            "windows" => TargetOs::Windows,
            other => {
                return Err(ChemError::LibraryNotFound {
                    path: format!("<unsupported target OS '{other}'>"),
                })
            }
        };
        let mut arch = match machine {
            "amd64" => "x86_64",
            "arm64" => "aarch64",
            other => other,
        }
        .to_string();
        if arch == "x86_64" && pointer_width == 4 {
            arch = "i386".to_string();
        }
        Ok(Self { os, arch })
    }
}

/// Compute the engine library path for an install root and platform.
///
/// Layout: `<root>/lib/<os>-<arch>/<prefix>chemengine<suffix>`. Pure; the
/// same inputs always produce the same path.
pub fn library_path(root: &Path, platform: &Platform) -> PathBuf {
    root.join("lib")
        .join(format!("{}-{}", platform.os.dir_name(), platform.arch))
        .join(format!(
            "{}{}{}",
            platform.os.prefix(),
            ENGINE_NAME,
            platform.os.suffix()
        ))
}

macro_rules! engine_symbols {
    ($( $(#[$meta:meta])* $name:ident : $ty:ty ; )+) => {
        /// Typed table of every engine entry point, bound once at load.
        ///
        /// Field names are the C symbol names. Entry points returning a new
        /// object id use `0` as an ordinary valid result unless the field's
        /// doc says otherwise; `chemNext`, `chemMatch` and `chemMapItem` are
        /// the only members where `0` means "no element" instead.
        #[allow(non_snake_case)]
        #[derive(Debug)]
        pub struct SymbolTable {
            $( $(#[$meta])* pub $name: $ty, )+
        }

        impl SymbolTable {
            fn bind(library: &Library) -> ChemResult<Self> {
                Ok(Self {
                    $(
                        $name: {
                            let symbol = unsafe {
                                library.get::<$ty>(concat!(stringify!($name), "\0").as_bytes())
                            }
                            .map_err(|_| ChemError::SymbolNotFound {
                                symbol: stringify!($name).to_string(),
                            })?;
                            *symbol
                        },
                    )+
                })
            }
        }
    };
}

engine_symbols! {
    // Session management.
    /// Allocates a process-unique session id.
    chemAllocSessionId: unsafe extern "C" fn() -> u64;
    /// Makes a session the engine's ambient "current" session.
    chemSetSessionId: unsafe extern "C" fn(u64);
    /// Releases a session id and everything scoped to it.
    chemReleaseSessionId: unsafe extern "C" fn(u64);
    /// Last diagnostic text for the current session; borrowed, valid until
    /// the next call on that session.
    chemGetLastError: unsafe extern "C" fn() -> *const c_char;
    chemVersion: unsafe extern "C" fn() -> *const c_char;
    chemVersionInfo: unsafe extern "C" fn() -> *const c_char;
    /// Frees one object id. Idempotence is this layer's job, not the engine's.
    chemFree: unsafe extern "C" fn(c_int) -> c_int;
    /// Live object count across the current session.
    chemCountReferences: unsafe extern "C" fn() -> c_int;
    chemFreeAllObjects: unsafe extern "C" fn() -> c_int;

    // Option setters, one entry point per payload shape.
    chemSetOption: unsafe extern "C" fn(*const c_char, *const c_char) -> c_int;
    chemSetOptionInt: unsafe extern "C" fn(*const c_char, c_int) -> c_int;
    chemSetOptionBool: unsafe extern "C" fn(*const c_char, c_int) -> c_int;
    chemSetOptionFloat: unsafe extern "C" fn(*const c_char, c_float) -> c_int;
    chemSetOptionXY: unsafe extern "C" fn(*const c_char, c_int, c_int) -> c_int;
    chemSetOptionColor: unsafe extern "C" fn(*const c_char, c_float, c_float, c_float) -> c_int;
    chemGetOption: unsafe extern "C" fn(*const c_char) -> *const c_char;
    chemGetOptionInt: unsafe extern "C" fn(*const c_char, *mut c_int) -> c_int;
    chemGetOptionBool: unsafe extern "C" fn(*const c_char, *mut c_int) -> c_int;
    chemGetOptionFloat: unsafe extern "C" fn(*const c_char, *mut c_float) -> c_int;
    chemGetOptionType: unsafe extern "C" fn(*const c_char) -> *const c_char;
    chemResetOptions: unsafe extern "C" fn() -> c_int;

    // Object factories.
    chemLoadStructureFromString: unsafe extern "C" fn(*const c_char) -> c_int;
    chemLoadStructureFromBuffer: unsafe extern "C" fn(*const u8, c_int) -> c_int;
    chemLoadStructureFromFile: unsafe extern "C" fn(*const c_char) -> c_int;
    chemLoadQueryFromString: unsafe extern "C" fn(*const c_char) -> c_int;
    chemCreateArray: unsafe extern "C" fn() -> c_int;
    chemWriteBuffer: unsafe extern "C" fn() -> c_int;
    /// Rebuilds an object from its binary serialized form.
    chemDeserialize: unsafe extern "C" fn(*const u8, c_int) -> c_int;

    // Object accessors.
    chemClone: unsafe extern "C" fn(c_int) -> c_int;
    chemClose: unsafe extern "C" fn(c_int) -> c_int;
    chemToString: unsafe extern "C" fn(c_int) -> *const c_char;
    /// Canonical text representation; stable across serialize/deserialize.
    chemRepresentation: unsafe extern "C" fn(c_int) -> *const c_char;
    chemTypeName: unsafe extern "C" fn(c_int) -> *const c_char;
    chemName: unsafe extern "C" fn(c_int) -> *const c_char;
    chemSetName: unsafe extern "C" fn(c_int, *const c_char) -> c_int;
    chemCount: unsafe extern "C" fn(c_int) -> c_int;
    chemChecksum: unsafe extern "C" fn(c_int) -> c_int;
    /// Float-returning measurement; failure sentinel is `< -0.5`.
    chemMass: unsafe extern "C" fn(c_int) -> c_double;
    /// Binary serialization as an engine-owned (pointer, length) pair.
    chemSerialize: unsafe extern "C" fn(c_int, *mut *const u8, *mut c_int) -> c_int;
    chemToBuffer: unsafe extern "C" fn(c_int, *mut *const u8, *mut c_int) -> c_int;
    chemAt: unsafe extern "C" fn(c_int, c_int) -> c_int;
    chemArrayAdd: unsafe extern "C" fn(c_int, c_int) -> c_int;
    chemClear: unsafe extern "C" fn(c_int) -> c_int;
    chemAppend: unsafe extern "C" fn(c_int, c_int) -> c_int;
    /// Derives a sub-object from an index list passed as (pointer, count).
    chemSubset: unsafe extern "C" fn(c_int, *const c_int, c_int) -> c_int;

    // Matching.
    /// Returns a match mapping id, or `0` when the query does not match
    /// (success, not an error).
    chemMatch: unsafe extern "C" fn(c_int, c_int) -> c_int;
    chemCountMatches: unsafe extern "C" fn(c_int, c_int) -> c_int;
    chemIterateMatches: unsafe extern "C" fn(c_int, c_int) -> c_int;
    /// Maps an item of the query onto the target; `0` means "not mapped"
    /// (success, not an error).
    chemMapItem: unsafe extern "C" fn(c_int, c_int) -> c_int;
    chemHighlightedTarget: unsafe extern "C" fn(c_int) -> c_int;

    // Iteration.
    /// Advances an iterator object; `0` means end of sequence (success, not
    /// an error).
    chemNext: unsafe extern "C" fn(c_int) -> c_int;
    /// Pure peek; no side effects, idempotent between `chemNext` calls.
    chemHasNext: unsafe extern "C" fn(c_int) -> c_int;
    chemIterateItems: unsafe extern "C" fn(c_int) -> c_int;
}

static BINDING: OnceLock<Arc<EngineLibrary>> = OnceLock::new();

/// Cleared when the process is tearing down and the binding must no longer be
/// called. Dispose/release paths check this and silently skip.
static LIVE: AtomicBool = AtomicBool::new(false);

/// Loaded engine library with its bound symbol table.
#[derive(Debug)]
pub struct EngineLibrary {
    /// Keeps the OS handle open; symbols borrow from it.
    #[allow(dead_code)]
    library: Library,

    /// Resolved path the library was loaded from.
    pub path: PathBuf,

    symbols: SymbolTable,
}

impl EngineLibrary {
    /// Load the engine from an install root, or return the existing binding.
    ///
    /// The binding is process-wide and bound exactly once; a second call with
    /// the same root is a cheap no-op. A different root cannot rebind and is
    /// rejected as a usage error.
    pub fn load(root: &Path) -> ChemResult<Arc<Self>> {
        let platform = Platform::current()?;
        let path = library_path(root, &platform);

        if let Some(existing) = BINDING.get() {
            if existing.path != path {
                return Err(ChemError::Usage(format!(
                    "engine already bound from '{}'; cannot rebind from '{}'",
                    existing.path.display(),
                    path.display()
                )));
            }
            return Ok(existing.clone());
        }

        if !path.exists() {
            return Err(ChemError::LibraryNotFound {
                path: path.display().to_string(),
            });
        }

        let library = open_native(&path)?;
        let symbols = SymbolTable::bind(&library)?;
        tracing::info!(path = %path.display(), "Loaded chemengine library");

        let built = Arc::new(Self {
            library,
            path,
            symbols,
        });
        // If two threads raced here, the loser's duplicate OS handle is
        // dropped and everyone shares the winner's binding.
        let shared = BINDING.get_or_init(|| built);
        LIVE.store(true, Ordering::SeqCst);
        Ok(shared.clone())
    }

    /// The bound entry points.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Whether the process-wide binding may still be called.
    pub fn is_live() -> bool {
        LIVE.load(Ordering::SeqCst)
    }

    /// Mark the binding unusable for the remainder of the process.
    ///
    /// Called during shutdown when the library may be unloaded underneath
    /// outstanding sessions and handles; their cleanup degrades to a no-op.
    pub fn retire() {
        LIVE.store(false, Ordering::SeqCst);
    }
}

/// Open the shared library with global symbol visibility.
///
/// The engine's optional add-on libraries (renderer, search index) resolve
/// symbols against the core at their own load time, which requires
/// `RTLD_GLOBAL` on unix targets.
fn open_native(path: &Path) -> ChemResult<Library> {
    let load_error = |source| ChemError::LoadError {
        path: path.display().to_string(),
        source,
    };

    #[cfg(unix)]
    {
        use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
        let library = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }
            .map_err(load_error)?;
        Ok(library.into())
    }

    #[cfg(not(unix))]
    {
        unsafe { Library::new(path) }.map_err(load_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_for(os: &str, machine: &str, width: usize) -> String {
        let platform = Platform::detect(os, machine, width).unwrap();
        library_path(Path::new("/opt/engine"), &platform)
            .display()
            .to_string()
    }

    #[test]
    fn linux_path_shape() {
        assert_eq!(
            path_for("linux", "x86_64", 8),
            "/opt/engine/lib/linux-x86_64/libchemengine.so"
        );
    }

    #[test]
    fn macos_path_shape() {
        assert_eq!(
            path_for("macos", "aarch64", 8),
            "/opt/engine/lib/macos-aarch64/libchemengine.dylib"
        );
    }

    #[test]
    fn windows_has_no_lib_prefix() {
        let platform = Platform::detect("windows", "x86_64", 8).unwrap();
        let path = library_path(Path::new("C:/engine"), &platform);
        assert!(path.ends_with("windows-x86_64/chemengine.dll") || path.ends_with("windows-x86_64\\chemengine.dll"));
    }

    #[test]
    fn architecture_aliases_normalize() {
        assert_eq!(path_for("linux", "amd64", 8), path_for("linux", "x86_64", 8));
        assert_eq!(
            path_for("macos", "arm64", 8),
            path_for("macos", "aarch64", 8)
        );
    }

    #[test]
    fn narrow_pointer_selects_i386() {
        assert_eq!(
            path_for("linux", "x86_64", 4),
            "/opt/engine/lib/linux-i386/libchemengine.so"
        );
        // Only x86_64 has a 32-bit variant name.
        assert_eq!(
            path_for("linux", "aarch64", 4),
            "/opt/engine/lib/linux-aarch64/libchemengine.so"
        );
    }

    #[test]
    fn discovery_is_deterministic() {
        assert_eq!(
            path_for("linux", "x86_64", 8),
            path_for("linux", "x86_64", 8)
        );
    }

    #[test]
    fn unsupported_os_is_library_not_found() {
        let err = Platform::detect("freebsd", "x86_64", 8).unwrap_err();
        assert!(matches!(err, ChemError::LibraryNotFound { .. }));
    }

    #[test]
    fn missing_library_reports_searched_path() {
        let err = EngineLibrary::load(Path::new("/nonexistent-engine-root")).unwrap_err();
        match err {
            ChemError::LibraryNotFound { path } => {
                assert!(path.starts_with("/nonexistent-engine-root"))
            }
            // A prior test in this process may already have bound the engine.
            ChemError::Usage(_) => {}
            other => panic!("unexpected error: {other}"),
        }
    }
}
