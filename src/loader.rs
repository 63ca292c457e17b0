//! Dynamic artifact loading: `CALL`/`LINK`/`XCTL` target resolution
//! (§4.4), grounded on `execLoadModule`/`globalCallCallback`.
//!
//! Program artifacts are shared objects on disk, one file per artifact
//! name, found by joining a configured directory with the name and the
//! platform's shared-library suffix. Two names never touch the
//! filesystem at all: `DSNTIAR` and `xmlGenerate` are pseudo-symbols the
//! monitor implements itself (§4.6), checked before any `dlopen`-style
//! lookup — exactly the order `globalCallCallback` checks them in.

use crate::error::{Error, Result};
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The number of positional parameter slots the Artifact ABI reserves
/// after the commarea (§6: "`void entry(void* commarea, void* p1, …,
/// void* pN)` with N ≤ 10").
pub const MAX_POSITIONAL_PARAMS: usize = 10;

/// The signature every loaded artifact exports: the commarea pointer
/// followed by a fixed bank of `MAX_POSITIONAL_PARAMS` positional
/// parameter pointers (§4.4 `loadAndCall`: "invokes it with `commArea`
/// plus `parCount` positional pointers drawn from a fixed bank"),
/// a completion code out. Unused slots are passed as null. The loader
/// has no opinion on what any pointer's target layout is.
pub type ArtifactEntry = unsafe extern "C" fn(
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
    *mut std::os::raw::c_void,
) -> i32;

/// Invokes `entry` with `commarea` plus up to [`MAX_POSITIONAL_PARAMS`]
/// positional pointers drawn from `params`, null-padding the remainder
/// of the bank (§4.4, §6). Extra entries beyond the bank size are
/// ignored rather than passed, matching `parCount`'s own cap.
///
/// # Safety
/// `entry` must have been resolved from an artifact honoring the
/// documented ABI, and every field in `params` must outlive this call.
pub unsafe fn call_entry(entry: ArtifactEntry, commarea: *mut std::os::raw::c_void, params: &mut [crate::field::Field]) -> i32 {
    let mut bank: [*mut std::os::raw::c_void; MAX_POSITIONAL_PARAMS] = [std::ptr::null_mut(); MAX_POSITIONAL_PARAMS];
    for (slot, field) in bank.iter_mut().zip(params.iter_mut()) {
        *slot = field.as_ptr() as *mut std::os::raw::c_void;
    }
    entry(
        commarea, bank[0], bank[1], bank[2], bank[3], bank[4], bank[5], bank[6], bank[7], bank[8], bank[9],
    )
}

/// A resolved `CALL`/`LINK`/`XCTL` target.
pub enum ResolvedEntry {
    /// A dynamically loaded artifact. The library is kept alive
    /// alongside the function pointer since the pointer is only valid
    /// for as long as the library stays mapped.
    Native(ArtifactEntry, Arc<Library>),
    /// The built-in `DSNTIAR` SQLCA-message-formatting shim (§4.6).
    DsnTiar,
    /// The built-in `xmlGenerate` copybook-to-JSON shim (§4.6, `writeJson`).
    XmlGenerate,
}

const PLATFORM_SUFFIX: &str = if cfg!(target_os = "macos") {
    ".dylib"
} else if cfg!(target_os = "windows") {
    ".dll"
} else {
    ".so"
};

/// Loads and caches program artifacts from a configured directory.
pub struct ArtifactLoader {
    directory: PathBuf,
    libraries: std::sync::Mutex<HashMap<String, Arc<Library>>>,
}

impl ArtifactLoader {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        ArtifactLoader { directory: directory.into(), libraries: std::sync::Mutex::new(HashMap::new()) }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}{PLATFORM_SUFFIX}"))
    }

    /// Resolves `name` to a callable entry point, intercepting the two
    /// pseudo-symbols before touching the filesystem. A genuine artifact
    /// is loaded at most once per loader and cached by name; a missing
    /// file or missing entry symbol both surface as
    /// [`Error::ArtifactNotFound`] (resp 27/3, the original's
    /// `abend(27, 1)`).
    pub fn resolve(&self, name: &str) -> Result<ResolvedEntry> {
        if name.eq_ignore_ascii_case("DSNTIAR") {
            return Ok(ResolvedEntry::DsnTiar);
        }
        if name.eq_ignore_ascii_case("xmlGenerate") {
            return Ok(ResolvedEntry::XmlGenerate);
        }

        let mut libraries = self.libraries.lock().expect("artifact loader mutex poisoned");
        let library = match libraries.get(name) {
            Some(lib) => Arc::clone(lib),
            None => {
                let path = self.path_for(name);
                let lib = unsafe { Library::new(&path) }.map_err(|_| Error::ArtifactNotFound(name.to_string()))?;
                let lib = Arc::new(lib);
                libraries.insert(name.to_string(), Arc::clone(&lib));
                lib
            }
        };

        let symbol: Symbol<ArtifactEntry> =
            unsafe { library.get(name.as_bytes()) }.map_err(|_| Error::ArtifactNotFound(name.to_string()))?;
        // The function pointer is only valid as long as `library` stays
        // loaded; we hand both out together so the caller can't drop one
        // without the other.
        let entry: ArtifactEntry = *symbol;
        Ok(ResolvedEntry::Native(entry, library))
    }
}

/// Per-task cache of already-resolved `CALL` targets (§4.4,
/// `globalCallCallback`'s resolution cache, cleared by
/// `globalCallCleanup` at task end — modeled here by simply dropping the
/// cache with the task). Bounded the way every other per-task table is
/// (§9): once full, a new name is rejected with [`Error::CapacityExceeded`]
/// rather than evicting an older entry, since a resolved `CALL` target
/// must stay valid for the rest of the task.
pub struct CallCache {
    capacity: usize,
    resolved: HashMap<String, CachedEntry>,
}

#[derive(Clone)]
enum CachedEntry {
    Native(ArtifactEntry, Arc<Library>),
    DsnTiar,
    XmlGenerate,
}

impl CallCache {
    pub fn new(capacity: usize) -> Self {
        CallCache { capacity, resolved: HashMap::new() }
    }

    pub fn resolve(&mut self, loader: &ArtifactLoader, name: &str) -> Result<ResolvedEntry> {
        if let Some(cached) = self.resolved.get(name) {
            return Ok(match cached.clone() {
                CachedEntry::Native(f, lib) => ResolvedEntry::Native(f, lib),
                CachedEntry::DsnTiar => ResolvedEntry::DsnTiar,
                CachedEntry::XmlGenerate => ResolvedEntry::XmlGenerate,
            });
        }

        if self.resolved.len() >= self.capacity {
            return Err(Error::CapacityExceeded("call resolution cache"));
        }

        let resolved = loader.resolve(name)?;
        let cached = match &resolved {
            ResolvedEntry::Native(f, lib) => CachedEntry::Native(*f, Arc::clone(lib)),
            ResolvedEntry::DsnTiar => CachedEntry::DsnTiar,
            ResolvedEntry::XmlGenerate => CachedEntry::XmlGenerate,
        };
        self.resolved.insert(name.to_string(), cached);
        Ok(resolved)
    }
}
