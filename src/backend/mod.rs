//! Backend (rendering/input) helpers
//!
//! Kiln never talks to a GPU driver or an input driver directly. Instead the
//! [`Compositor`](crate::compositor::Compositor) drives two backend objects:
//!
//! - a [`GraphicsBackend`], responsible for the outputs (connectors, swap chains,
//!   repaints) and for the GPU objects backing [`RenderBuffer`](renderer::RenderBuffer)s;
//! - an [`InputBackend`], injecting keyboard/pointer/touch events into the
//!   [`Seat`](crate::wayland::seat::Seat).
//!
//! Both can either be handed over directly (see
//! [`Compositor::set_graphics_backend`](crate::compositor::Compositor::set_graphics_backend))
//! or loaded from a shared object at runtime, see the [`module`] submodule.
//!
//! ## Thread affinity
//!
//! Outputs may be rendered from their own threads, each with its own GL context. GPU
//! handles returned by [`GraphicsBackend::create_framebuffer`] are therefore only valid
//! on the thread that created them and must be destroyed there as well. This is what the
//! deferred destruction queue of [`RenderContext`](renderer::RenderContext) is for.

use std::{
    fmt,
    ops::{Deref, DerefMut},
};

use drm_fourcc::DrmFourcc;

use crate::{
    output::Output,
    utils::{Buffer, Size},
    wayland::seat::{InputEvent, Seat},
};

#[cfg(feature = "backend_module")]
pub mod module;
pub mod renderer;
#[cfg(any(test, feature = "backend_test"))]
pub mod test;

/// Error returned by backend operations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend failed to initialize
    #[error("Backend initialization failed: {0}")]
    Initialization(String),
    /// The output could not be driven by this backend
    #[error("Output {0} could not be initialized")]
    Output(String),
    /// Allocating a GPU resource failed
    #[error("Failed to allocate GPU resource: {0}")]
    Allocation(String),
    /// The backend module could not be loaded
    #[error("Failed to load backend module {path}: {reason}")]
    Module {
        /// Path of the shared object
        path: String,
        /// Loader error message
        reason: String,
    },
}

/// A texture allocated by the graphics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// A framebuffer object allocated by the graphics backend
///
/// Framebuffer ids are thread-affine, see the [module level documentation](self).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// Interface of a graphics backend
///
/// All methods take `&self`: the backend is shared between the main thread and the
/// render threads of the outputs.
pub trait GraphicsBackend: Send + Sync + fmt::Debug {
    /// Name of the backend, used for logging
    fn name(&self) -> &str;

    /// Initialize the backend. Called once during [`Compositor::start`](crate::compositor::Compositor::start).
    fn initialize(&self) -> Result<(), BackendError>;

    /// Release every resource of the backend
    fn uninitialize(&self);

    /// The outputs currently connected to this backend
    ///
    /// They are not used by the compositor until added with
    /// [`Compositor::add_output`](crate::compositor::Compositor::add_output).
    fn outputs(&self) -> Vec<Output>;

    /// Start driving an output (create its swap chain, render thread, ...)
    ///
    /// The backend reports the swap chain layout through
    /// [`Output::set_buffers_count`].
    fn initialize_output(&self, output: &Output) -> Result<(), BackendError>;

    /// Stop driving an output
    fn uninitialize_output(&self, output: &Output);

    /// Schedule a new frame for an output, returns `false` if the output is not driven
    fn repaint_output(&self, output: &Output) -> bool;

    /// Allocate a texture of the given size on the calling thread's context
    fn create_texture(&self, size: Size<i32, Buffer>, format: DrmFourcc) -> Result<TextureId, BackendError>;

    /// Create a framebuffer object on the calling thread's context rendering into `texture`
    fn create_framebuffer(&self, texture: TextureId) -> Result<FramebufferId, BackendError>;

    /// Destroy a texture. Must be called from the thread that created it.
    fn destroy_texture(&self, texture: TextureId);

    /// Destroy a framebuffer object. Must be called from the thread that created it.
    fn destroy_framebuffer(&self, framebuffer: FramebufferId);

    /// DMA-buf formats importable by this backend
    fn dma_formats(&self) -> Vec<DrmFourcc> {
        Vec::new()
    }
}

/// Interface of an input backend
pub trait InputBackend: Send + fmt::Debug {
    /// Name of the backend, used for logging
    fn name(&self) -> &str;

    /// Initialize the backend, announcing its capabilities on `seat`
    fn initialize(&mut self, seat: &mut Seat) -> Result<(), BackendError>;

    /// Release the devices of this backend
    fn uninitialize(&mut self, seat: &mut Seat);

    /// Hand every pending input event to `sink`
    ///
    /// Called from the dispatch step of each loop iteration.
    fn dispatch(&mut self, sink: &mut dyn FnMut(InputEvent)) {
        let _ = sink;
    }
}

/// A backend object together with the shared object it was loaded from, if any
///
/// The backend is always dropped before the library is unloaded.
pub struct Loaded<B: ?Sized> {
    backend: Box<B>,
    #[cfg(feature = "backend_module")]
    _library: Option<libloading::Library>,
}

impl<B: ?Sized> Loaded<B> {
    /// Wrap a backend living in the current executable
    pub fn new(backend: Box<B>) -> Self {
        Loaded {
            backend,
            #[cfg(feature = "backend_module")]
            _library: None,
        }
    }

    #[cfg(feature = "backend_module")]
    pub(crate) fn from_module(backend: Box<B>, library: libloading::Library) -> Self {
        Loaded {
            backend,
            _library: Some(library),
        }
    }
}

impl<B: ?Sized> Deref for Loaded<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.backend
    }
}

impl<B: ?Sized> DerefMut for Loaded<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: ?Sized + fmt::Debug> fmt::Debug for Loaded<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loaded")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl GraphicsBackend for Loaded<dyn GraphicsBackend> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn initialize(&self) -> Result<(), BackendError> {
        self.backend.initialize()
    }

    fn uninitialize(&self) {
        self.backend.uninitialize()
    }

    fn outputs(&self) -> Vec<Output> {
        self.backend.outputs()
    }

    fn initialize_output(&self, output: &Output) -> Result<(), BackendError> {
        self.backend.initialize_output(output)
    }

    fn uninitialize_output(&self, output: &Output) {
        self.backend.uninitialize_output(output)
    }

    fn repaint_output(&self, output: &Output) -> bool {
        self.backend.repaint_output(output)
    }

    fn create_texture(&self, size: Size<i32, Buffer>, format: DrmFourcc) -> Result<TextureId, BackendError> {
        self.backend.create_texture(size, format)
    }

    fn create_framebuffer(&self, texture: TextureId) -> Result<FramebufferId, BackendError> {
        self.backend.create_framebuffer(texture)
    }

    fn destroy_texture(&self, texture: TextureId) {
        self.backend.destroy_texture(texture)
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferId) {
        self.backend.destroy_framebuffer(framebuffer)
    }

    fn dma_formats(&self) -> Vec<DrmFourcc> {
        self.backend.dma_formats()
    }
}

impl InputBackend for Loaded<dyn InputBackend> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn initialize(&mut self, seat: &mut Seat) -> Result<(), BackendError> {
        self.backend.initialize(seat)
    }

    fn uninitialize(&mut self, seat: &mut Seat) {
        self.backend.uninitialize(seat)
    }

    fn dispatch(&mut self, sink: &mut dyn FnMut(InputEvent)) {
        self.backend.dispatch(sink)
    }
}
