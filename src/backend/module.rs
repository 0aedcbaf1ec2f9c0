//! Loading backends from shared objects
//!
//! A backend module is a shared object built against the same version of Kiln and
//! the same compiler as the compositor. It exports an entry point returning the boxed
//! backend:
//!
//! ```ignore
//! #[no_mangle]
//! pub fn kiln_graphics_backend() -> Box<dyn kiln::backend::GraphicsBackend> {
//!     Box::new(MyDrmBackend::new())
//! }
//! ```
//!
//! Input modules export `kiln_input_backend` the same way.

use std::path::Path;

use libloading::{Library, Symbol};
use tracing::{debug, info};

use super::{BackendError, GraphicsBackend, InputBackend, Loaded};

/// Symbol exported by graphics backend modules
pub const GRAPHICS_BACKEND_SYMBOL: &[u8] = b"kiln_graphics_backend\0";
/// Symbol exported by input backend modules
pub const INPUT_BACKEND_SYMBOL: &[u8] = b"kiln_input_backend\0";

type GraphicsBackendEntry = unsafe fn() -> Box<dyn GraphicsBackend>;
type InputBackendEntry = unsafe fn() -> Box<dyn InputBackend>;

fn open(path: &Path) -> Result<Library, BackendError> {
    debug!(path = %path.display(), "Opening backend module");
    // SAFETY: loading a library runs its initializers. Backend modules are trusted code
    // chosen by the compositor author.
    unsafe { Library::new(path) }.map_err(|err| BackendError::Module {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

fn symbol_error(path: &Path, err: libloading::Error) -> BackendError {
    BackendError::Module {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Load a graphics backend from the shared object at `path`
pub fn load_graphics_backend(path: impl AsRef<Path>) -> Result<Loaded<dyn GraphicsBackend>, BackendError> {
    let path = path.as_ref();
    let library = open(path)?;
    // SAFETY: the entry point signature is part of the module contract documented above.
    let backend = unsafe {
        let entry: Symbol<'_, GraphicsBackendEntry> = library
            .get(GRAPHICS_BACKEND_SYMBOL)
            .map_err(|err| symbol_error(path, err))?;
        entry()
    };
    info!(path = %path.display(), backend = backend.name(), "Loaded graphics backend");
    Ok(Loaded::from_module(backend, library))
}

/// Load an input backend from the shared object at `path`
pub fn load_input_backend(path: impl AsRef<Path>) -> Result<Loaded<dyn InputBackend>, BackendError> {
    let path = path.as_ref();
    let library = open(path)?;
    // SAFETY: see `load_graphics_backend`.
    let backend = unsafe {
        let entry: Symbol<'_, InputBackendEntry> = library
            .get(INPUT_BACKEND_SYMBOL)
            .map_err(|err| symbol_error(path, err))?;
        entry()
    };
    info!(path = %path.display(), backend = backend.name(), "Loaded input backend");
    Ok(Loaded::from_module(backend, library))
}
