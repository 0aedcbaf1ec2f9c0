use std::{
    collections::HashMap,
    sync::Mutex,
    thread::{self, ThreadId},
};

use drm_fourcc::DrmFourcc;
use tracing::{debug, error};

use crate::{
    backend::{FramebufferId, TextureId},
    utils::{clamp_scale, Buffer, Logical, Point, Rectangle, Size, Transform},
};

use super::{Framebuffer, RenderContext};

#[derive(Debug, Default)]
struct GpuState {
    // thread which created the texture, and the texture
    texture: Option<(ThreadId, TextureId)>,
    framebuffers: HashMap<ThreadId, FramebufferId>,
}

/// An off-screen framebuffer that can be used as a texture source
///
/// The backing texture is allocated on first use, and every thread binding the
/// render buffer through [`Framebuffer::id`] gets its own framebuffer object, created
/// lazily in the context of that thread.
#[derive(Debug)]
pub struct RenderBuffer {
    ctx: RenderContext,
    format: DrmFourcc,
    size: Size<i32, Buffer>,
    scale: f64,
    rect: Rectangle<i32, Logical>,
    gpu: Mutex<GpuState>,
}

impl RenderBuffer {
    /// Create a new render buffer of the given size
    ///
    /// With `alpha` the backing texture uses [`DrmFourcc::Argb8888`], otherwise
    /// [`DrmFourcc::Xrgb8888`]. No GPU object is allocated before the first call to
    /// [`Framebuffer::id`].
    pub fn new(ctx: &RenderContext, size: Size<i32, Buffer>, alpha: bool) -> RenderBuffer {
        let format = if alpha {
            DrmFourcc::Argb8888
        } else {
            DrmFourcc::Xrgb8888
        };
        let mut buffer = RenderBuffer {
            ctx: ctx.clone(),
            format,
            size: (1, 1).into(),
            scale: 1.0,
            rect: Rectangle::from_loc_and_size((0, 0), (1, 1)),
            gpu: Mutex::new(GpuState::default()),
        };
        buffer.set_size_b(size);
        buffer
    }

    /// Pixel format of the backing texture
    pub fn format(&self) -> DrmFourcc {
        self.format
    }

    /// Resize the render buffer
    ///
    /// Non-positive dimensions are clamped to `1`. Setting the current size does nothing,
    /// otherwise every GPU object of the buffer is scheduled for destruction and will be
    /// recreated on the next [`Framebuffer::id`] call.
    pub fn set_size_b(&mut self, size: Size<i32, Buffer>) {
        let size = Size::from((size.w.max(1), size.h.max(1)));
        if size == self.size {
            return;
        }

        self.size = size;
        self.update_rect_size();
        self.release_gpu_objects();
    }

    /// Set the scale factor, clamped to [`MIN_SCALE`](crate::utils::MIN_SCALE)
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = clamp_scale(scale);
        self.update_rect_size();
    }

    /// Move the render buffer in the global logical space
    pub fn set_pos(&mut self, pos: Point<i32, Logical>) {
        self.rect.loc = pos;
    }

    /// The backing texture, if it was already allocated
    pub fn texture(&self) -> Option<TextureId> {
        self.gpu.lock().unwrap().texture.map(|(_, texture)| texture)
    }

    /// Number of threads currently holding a framebuffer object for this buffer
    pub fn threads_count(&self) -> usize {
        self.gpu.lock().unwrap().framebuffers.len()
    }

    fn update_rect_size(&mut self) {
        self.rect.size = self.size.to_logical(self.scale);
    }

    fn release_gpu_objects(&self) {
        let mut gpu = self.gpu.lock().unwrap();
        for (thread, framebuffer) in gpu.framebuffers.drain() {
            self.ctx.schedule_framebuffer_destruction(thread, framebuffer);
        }
        if let Some((thread, texture)) = gpu.texture.take() {
            self.ctx.schedule_texture_destruction(thread, texture);
        }
    }

    fn allocate(&self, gpu: &mut GpuState, thread: ThreadId) -> Result<FramebufferId, crate::backend::BackendError> {
        let backend = self.ctx.backend();
        let texture = match gpu.texture {
            Some((_, texture)) => texture,
            None => {
                let texture = backend.create_texture(self.size, self.format)?;
                gpu.texture = Some((thread, texture));
                texture
            }
        };
        let framebuffer = backend.create_framebuffer(texture)?;
        debug!(?thread, ?framebuffer, size = ?self.size, "Allocated render buffer framebuffer");
        gpu.framebuffers.insert(thread, framebuffer);
        Ok(framebuffer)
    }
}

impl Framebuffer for RenderBuffer {
    fn scale(&self) -> f64 {
        self.scale
    }

    fn size_b(&self) -> Size<i32, Buffer> {
        self.size
    }

    fn rect(&self) -> Rectangle<i32, Logical> {
        self.rect
    }

    fn id(&self) -> u32 {
        let thread = thread::current().id();
        let mut gpu = self.gpu.lock().unwrap();
        if let Some(framebuffer) = gpu.framebuffers.get(&thread) {
            return framebuffer.0;
        }

        match self.allocate(&mut gpu, thread) {
            Ok(framebuffer) => framebuffer.0,
            Err(err) => {
                error!(?err, "Failed to allocate render buffer");
                0
            }
        }
    }

    fn buffers_count(&self) -> u32 {
        1
    }

    fn current_buffer_index(&self) -> u32 {
        0
    }

    fn set_framebuffer_damage(&self, _damage: Option<&[Rectangle<i32, Buffer>]>) {}

    fn transform(&self) -> Transform {
        Transform::Normal
    }
}

impl Drop for RenderBuffer {
    fn drop(&mut self) {
        self.release_gpu_objects();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::backend::test::DummyGraphicsBackend;

    fn context() -> (Arc<DummyGraphicsBackend>, RenderContext) {
        let backend = Arc::new(DummyGraphicsBackend::default());
        let ctx = RenderContext::new(backend.clone());
        (backend, ctx)
    }

    #[test]
    fn format_follows_alpha() {
        let (_, ctx) = context();
        assert_eq!(RenderBuffer::new(&ctx, (8, 8).into(), true).format(), DrmFourcc::Argb8888);
        assert_eq!(RenderBuffer::new(&ctx, (8, 8).into(), false).format(), DrmFourcc::Xrgb8888);
    }

    #[test]
    fn size_is_clamped() {
        let (_, ctx) = context();
        let mut buffer = RenderBuffer::new(&ctx, (0, -5).into(), true);
        assert_eq!(buffer.size_b(), Size::from((1, 1)));
        buffer.set_size_b((-1, 30).into());
        assert_eq!(buffer.size_b(), Size::from((1, 30)));
    }

    #[test]
    fn id_is_lazy_and_per_thread() {
        let (backend, ctx) = context();
        let buffer = Arc::new(RenderBuffer::new(&ctx, (64, 64).into(), true));
        assert_eq!(backend.created_framebuffers(), 0);
        assert!(buffer.texture().is_none());

        let id = buffer.id();
        assert_ne!(id, 0);
        assert_eq!(buffer.id(), id);
        assert_eq!(backend.created_textures(), 1);
        assert_eq!(backend.created_framebuffers(), 1);

        let other = {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.id()).join().unwrap()
        };
        assert_ne!(other, id);
        assert_eq!(buffer.threads_count(), 2);
        // the texture is shared between threads
        assert_eq!(backend.created_textures(), 1);
    }

    #[test]
    fn unchanged_size_is_a_noop() {
        let (backend, ctx) = context();
        let mut buffer = RenderBuffer::new(&ctx, (64, 32).into(), true);
        let id = buffer.id();

        buffer.set_size_b((64, 32).into());
        assert_eq!(buffer.threads_count(), 1);
        assert_eq!(buffer.id(), id);
        assert_eq!(ctx.pending_destructions(), 0);
        assert_eq!(backend.created_framebuffers(), 1);
    }

    #[test]
    fn resize_clears_every_thread_handle() {
        let (backend, ctx) = context();
        let mut buffer = RenderBuffer::new(&ctx, (64, 32).into(), true);
        buffer.id();
        let texture = buffer.texture();
        assert!(texture.is_some());

        buffer.set_size_b((128, 32).into());
        assert_eq!(buffer.threads_count(), 0);
        assert!(buffer.texture().is_none());
        assert_eq!(ctx.pending_destructions(), 2);
        // nothing is freed before the owning thread collects
        assert_eq!(backend.destroyed_framebuffers(), 0);

        assert_eq!(ctx.collect_garbage(), 2);
        assert_eq!(backend.destroyed_framebuffers(), 1);
        assert_eq!(backend.destroyed_textures(), 1);

        buffer.id();
        assert_eq!(backend.created_textures(), 2);
    }

    #[test]
    fn rect_follows_scale_and_position() {
        let (_, ctx) = context();
        let mut buffer = RenderBuffer::new(&ctx, (300, 150).into(), false);
        buffer.set_scale(2.0);
        buffer.set_pos((10, 20).into());
        assert_eq!(buffer.rect(), Rectangle::from_loc_and_size((10, 20), (150, 75)));

        buffer.set_scale(0.0);
        assert_eq!(buffer.scale(), 0.25);
        assert_eq!(buffer.rect().size, Size::from((1200, 600)));
        assert_eq!(buffer.transform(), Transform::Normal);
        assert_eq!(buffer.buffers_count(), 1);
        assert_eq!(buffer.current_buffer_index(), 0);
    }

    #[test]
    fn drop_schedules_destruction() {
        let (backend, ctx) = context();
        let buffer = RenderBuffer::new(&ctx, (16, 16).into(), true);
        buffer.id();
        drop(buffer);
        assert_eq!(ctx.pending_destructions(), 2);
        ctx.collect_garbage();
        assert_eq!(backend.destroyed_textures(), 1);
    }
}
