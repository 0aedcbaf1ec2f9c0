//! Framebuffer abstraction and GPU resource bookkeeping
//!
//! Anything pixels can be composited into implements [`Framebuffer`]: the swap chain
//! of an [`Output`](crate::output::Output) (through
//! [`OutputFramebuffer`](crate::output::OutputFramebuffer)) as well as off-screen
//! [`RenderBuffer`]s that can later be sampled as textures.
//!
//! GPU objects are owned by the thread whose context created them. Kiln never frees
//! them synchronously: they are pushed onto the destruction queue of the shared
//! [`RenderContext`], and every thread drains its own share of the queue with
//! [`RenderContext::collect_garbage`]. The main loop does so once per iteration, render
//! threads should do so at the start of every frame.

use std::{
    fmt,
    sync::{Arc, Mutex},
    thread::{self, ThreadId},
};

use tracing::trace;

use crate::utils::{Buffer, Logical, Rectangle, Size, Transform};

use super::{FramebufferId, GraphicsBackend, TextureId};

mod render_buffer;

pub use self::render_buffer::RenderBuffer;

/// Something that can be rendered into
pub trait Framebuffer {
    /// Buffer to surface scale factor, never smaller than [`MIN_SCALE`](crate::utils::MIN_SCALE)
    fn scale(&self) -> f64;

    /// Size of the framebuffer in buffer pixels
    fn size_b(&self) -> Size<i32, Buffer>;

    /// Position and size of the framebuffer in the global logical space
    fn rect(&self) -> Rectangle<i32, Logical>;

    /// Backend handle to bind when rendering from the calling thread
    ///
    /// `0` designates the default framebuffer of the current context.
    fn id(&self) -> u32;

    /// Number of buffers of the swap chain
    fn buffers_count(&self) -> u32;

    /// Index of the buffer that will be rendered next
    fn current_buffer_index(&self) -> u32;

    /// Damage hint for the upcoming frame
    ///
    /// `None` means the whole framebuffer is to be considered damaged.
    fn set_framebuffer_damage(&self, damage: Option<&[Rectangle<i32, Buffer>]>);

    /// Transform applied when presenting the framebuffer
    fn transform(&self) -> Transform;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GpuResource {
    Texture(TextureId),
    Framebuffer(FramebufferId),
}

#[derive(Debug)]
struct PendingDestruction {
    thread: ThreadId,
    resource: GpuResource,
}

struct ContextInner {
    backend: Arc<dyn GraphicsBackend>,
    pending: Mutex<Vec<PendingDestruction>>,
}

/// Shared handle to the graphics backend and its deferred destruction queue
#[derive(Clone)]
pub struct RenderContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.inner.backend.name())
            .field("pending", &self.inner.pending.lock().unwrap().len())
            .finish()
    }
}

impl RenderContext {
    /// Create a new context around a graphics backend
    pub fn new(backend: Arc<dyn GraphicsBackend>) -> RenderContext {
        RenderContext {
            inner: Arc::new(ContextInner {
                backend,
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The graphics backend of this context
    pub fn backend(&self) -> &Arc<dyn GraphicsBackend> {
        &self.inner.backend
    }

    pub(crate) fn schedule_texture_destruction(&self, thread: ThreadId, texture: TextureId) {
        self.schedule(thread, GpuResource::Texture(texture));
    }

    pub(crate) fn schedule_framebuffer_destruction(&self, thread: ThreadId, framebuffer: FramebufferId) {
        self.schedule(thread, GpuResource::Framebuffer(framebuffer));
    }

    fn schedule(&self, thread: ThreadId, resource: GpuResource) {
        trace!(?thread, ?resource, "Scheduling GPU resource destruction");
        self.inner
            .pending
            .lock()
            .unwrap()
            .push(PendingDestruction { thread, resource });
    }

    /// Number of resources waiting to be destroyed, all threads included
    pub fn pending_destructions(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    /// Destroy every queued resource owned by the calling thread
    ///
    /// Returns the number of destroyed resources.
    pub fn collect_garbage(&self) -> usize {
        let current = thread::current().id();
        let owned = {
            let mut pending = self.inner.pending.lock().unwrap();
            let (owned, others): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|entry| entry.thread == current);
            *pending = others;
            owned
        };

        // framebuffers first, they reference the textures
        for entry in owned.iter() {
            if let GpuResource::Framebuffer(framebuffer) = entry.resource {
                self.inner.backend.destroy_framebuffer(framebuffer);
            }
        }
        for entry in owned.iter() {
            if let GpuResource::Texture(texture) = entry.resource {
                self.inner.backend.destroy_texture(texture);
            }
        }

        if !owned.is_empty() {
            trace!(count = owned.len(), "Collected GPU garbage");
        }
        owned.len()
    }
}
