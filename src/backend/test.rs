//! In-process backends for tests
//!
//! [`DummyGraphicsBackend`] hands out fake GPU handles and counts them, and drives
//! the outputs it was configured with without touching any hardware.
//! [`DummyInputBackend`] replays the events pushed into it.
#![allow(missing_docs)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use drm_fourcc::DrmFourcc;

use super::{BackendError, FramebufferId, GraphicsBackend, InputBackend, TextureId};
use crate::{
    output::Output,
    utils::{Buffer, Size},
    wayland::seat::{Capabilities, InputEvent, Seat},
};

#[derive(Debug, Default)]
pub struct DummyGraphicsBackend {
    outputs: Mutex<Vec<Output>>,
    dma_formats: Vec<DrmFourcc>,
    fail_initialize: AtomicBool,
    fail_output: AtomicBool,
    initialized: AtomicBool,
    next_handle: AtomicUsize,
    created_textures: AtomicUsize,
    created_framebuffers: AtomicUsize,
    destroyed_textures: AtomicUsize,
    destroyed_framebuffers: AtomicUsize,
    initialized_outputs: Mutex<Vec<String>>,
    uninitialized_outputs: Mutex<Vec<String>>,
    repaints: AtomicUsize,
}

impl DummyGraphicsBackend {
    pub fn with_outputs(outputs: Vec<Output>) -> DummyGraphicsBackend {
        DummyGraphicsBackend {
            outputs: Mutex::new(outputs),
            ..Default::default()
        }
    }

    pub fn with_dma_formats(mut self, formats: Vec<DrmFourcc>) -> DummyGraphicsBackend {
        self.dma_formats = formats;
        self
    }

    pub fn fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    pub fn fail_output_initialization(&self, fail: bool) {
        self.fail_output.store(fail, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn created_textures(&self) -> usize {
        self.created_textures.load(Ordering::SeqCst)
    }

    pub fn created_framebuffers(&self) -> usize {
        self.created_framebuffers.load(Ordering::SeqCst)
    }

    pub fn destroyed_textures(&self) -> usize {
        self.destroyed_textures.load(Ordering::SeqCst)
    }

    pub fn destroyed_framebuffers(&self) -> usize {
        self.destroyed_framebuffers.load(Ordering::SeqCst)
    }

    pub fn initialized_outputs(&self) -> Vec<String> {
        self.initialized_outputs.lock().unwrap().clone()
    }

    pub fn uninitialized_outputs(&self) -> Vec<String> {
        self.uninitialized_outputs.lock().unwrap().clone()
    }

    pub fn repaints(&self) -> usize {
        self.repaints.load(Ordering::SeqCst)
    }

    fn handle(&self) -> u32 {
        self.next_handle.fetch_add(1, Ordering::SeqCst) as u32 + 1
    }
}

impl GraphicsBackend for DummyGraphicsBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(BackendError::Initialization("dummy failure".into()));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn uninitialize(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }

    fn outputs(&self) -> Vec<Output> {
        self.outputs.lock().unwrap().clone()
    }

    fn initialize_output(&self, output: &Output) -> Result<(), BackendError> {
        if self.fail_output.load(Ordering::SeqCst) {
            return Err(BackendError::Output(output.name()));
        }
        output.set_buffers_count(2);
        self.initialized_outputs.lock().unwrap().push(output.name());
        Ok(())
    }

    fn uninitialize_output(&self, output: &Output) {
        self.uninitialized_outputs.lock().unwrap().push(output.name());
    }

    fn repaint_output(&self, output: &Output) -> bool {
        self.repaints.fetch_add(1, Ordering::SeqCst);
        output.is_initialized()
    }

    fn create_texture(&self, _size: Size<i32, Buffer>, _format: DrmFourcc) -> Result<TextureId, BackendError> {
        self.created_textures.fetch_add(1, Ordering::SeqCst);
        Ok(TextureId(self.handle()))
    }

    fn create_framebuffer(&self, _texture: TextureId) -> Result<FramebufferId, BackendError> {
        self.created_framebuffers.fetch_add(1, Ordering::SeqCst);
        Ok(FramebufferId(self.handle()))
    }

    fn destroy_texture(&self, _texture: TextureId) {
        self.destroyed_textures.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy_framebuffer(&self, _framebuffer: FramebufferId) {
        self.destroyed_framebuffers.fetch_add(1, Ordering::SeqCst);
    }

    fn dma_formats(&self) -> Vec<DrmFourcc> {
        self.dma_formats.clone()
    }
}

/// Handle to push events into a [`DummyInputBackend`] owned by a compositor
#[derive(Debug, Clone, Default)]
pub struct InputInjector {
    queue: Arc<Mutex<VecDeque<InputEvent>>>,
}

impl InputInjector {
    pub fn push(&self, event: InputEvent) {
        self.queue.lock().unwrap().push_back(event);
    }
}

#[derive(Debug)]
pub struct DummyInputBackend {
    queue: Arc<Mutex<VecDeque<InputEvent>>>,
    capabilities: Capabilities,
    fail_initialize: bool,
}

impl Default for DummyInputBackend {
    fn default() -> Self {
        DummyInputBackend {
            queue: Arc::default(),
            capabilities: Capabilities::all(),
            fail_initialize: false,
        }
    }
}

impl DummyInputBackend {
    pub fn failing() -> DummyInputBackend {
        DummyInputBackend {
            fail_initialize: true,
            ..Default::default()
        }
    }

    pub fn injector(&self) -> InputInjector {
        InputInjector {
            queue: self.queue.clone(),
        }
    }
}

impl InputBackend for DummyInputBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn initialize(&mut self, seat: &mut Seat) -> Result<(), BackendError> {
        if self.fail_initialize {
            return Err(BackendError::Initialization("dummy failure".into()));
        }
        seat.set_capabilities(self.capabilities);
        Ok(())
    }

    fn uninitialize(&mut self, seat: &mut Seat) {
        seat.set_capabilities(Capabilities::empty());
    }

    fn dispatch(&mut self, sink: &mut dyn FnMut(InputEvent)) {
        let events: Vec<_> = self.queue.lock().unwrap().drain(..).collect();
        for event in events {
            sink(event);
        }
    }
}
