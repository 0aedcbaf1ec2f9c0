//! Output
//!
//! An [`Output`] is a display driven by the graphics backend. It is a cheap, cloneable
//! handle that can be moved to the render thread of the display: every clone refers to
//! the same output, and two handles compare equal if they refer to the same output.
//!
//! The backend reports the outputs it found with
//! [`GraphicsBackend::outputs`](crate::backend::GraphicsBackend::outputs), and the
//! compositor starts using them once they are added with
//! [`Compositor::add_output`](crate::compositor::Compositor::add_output).
//!
//! ```
//! use kiln::output::{Mode, Output, PhysicalProperties, Subpixel};
//! use kiln::utils::{Size, Transform};
//!
//! let output = Output::new(
//!     "DP-1",
//!     PhysicalProperties {
//!         size: (600, 340).into(),
//!         subpixel: Subpixel::HorizontalRgb,
//!         make: "Screens Inc".into(),
//!         model: "Monitor Ultra".into(),
//!     },
//!     Mode { size: (2560, 1440).into(), refresh: 60_000 },
//! );
//! output.set_transform(Transform::_90);
//! output.set_scale(1.5);
//! assert_eq!(output.rect().size, Size::from((960, 1707)));
//! ```

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, instrument};

use crate::{
    backend::renderer::{Framebuffer, RenderBuffer, RenderContext},
    utils::{clamp_scale, Buffer, Logical, Physical, Point, Rectangle, Size, Transform},
    wayland::global::GlobalId,
};

crate::utils::ids::handle_id!(
    /// Process-unique identifier of an [`Output`]
    OutputId
);

/// An output mode
///
/// A possible combination of dimensions and refresh rate for an output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mode {
    /// The size of the mode, in pixels
    pub size: Size<i32, Physical>,
    /// The refresh rate in millihertz
    pub refresh: i32,
}

/// Subpixel geometry information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Subpixel {
    /// Unknown subpixel geometry
    #[default]
    Unknown,
    /// No subpixel geometry
    None,
    /// Red, green, blue from left to right
    HorizontalRgb,
    /// Blue, green, red from left to right
    HorizontalBgr,
    /// Red, green, blue from top to bottom
    VerticalRgb,
    /// Blue, green, red from top to bottom
    VerticalBgr,
}

/// The physical properties of an output
#[derive(Debug, Clone, Default)]
pub struct PhysicalProperties {
    /// The size of the monitor, in millimeters
    pub size: Size<i32, Physical>,
    /// The subpixel geometry
    pub subpixel: Subpixel,
    /// Textual representation of the make
    pub make: String,
    /// Textual representation of the model
    pub model: String,
}

/// Lifecycle of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputState {
    /// Not driven by the backend
    #[default]
    Uninitialized,
    /// Being initialized by the backend
    PendingInitialize,
    /// Driven by the backend, contents are rendered into it
    Initialized,
    /// Being released by the backend
    PendingUninitialize,
}

struct Inner {
    name: String,
    physical: PhysicalProperties,
    mode: Mode,
    scale: f64,
    transform: Transform,
    position: Point<i32, Logical>,
    state: OutputState,
    buffers_count: u32,
    current_buffer: u32,
    damage: Option<Vec<Rectangle<i32, Buffer>>>,
    repaint_requested: bool,
    oversampling: Option<RenderBuffer>,
    global: Option<GlobalId>,
}

impl Inner {
    fn size_b(&self) -> Size<i32, Buffer> {
        self.mode.size.to_buffer(self.transform)
    }

    fn rect(&self) -> Rectangle<i32, Logical> {
        Rectangle::new(self.position, self.size_b().to_logical(self.scale))
    }

    fn uses_fractional_scale(&self) -> bool {
        self.scale.fract() != 0.0
    }

    // The oversampling buffer renders at the next integer scale and is downscaled on
    // presentation.
    fn update_oversampling(&mut self) {
        let scale = self.scale;
        let fractional = self.uses_fractional_scale();
        let logical = self.rect();
        if let Some(buffer) = self.oversampling.as_mut() {
            let factor = if fractional { scale.ceil() } else { scale };
            buffer.set_scale(factor);
            buffer.set_size_b(
                (
                    (logical.size.w as f64 * factor).round() as i32,
                    (logical.size.h as f64 * factor).round() as i32,
                )
                    .into(),
            );
            buffer.set_pos(logical.loc);
        }
    }
}

/// A display driven by the graphics backend
#[derive(Clone)]
pub struct Output {
    id: OutputId,
    inner: Arc<Mutex<Inner>>,
}

impl PartialEq for Output {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Output {}

impl std::hash::Hash for Output {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Output")
            .field("id", &self.id)
            .field("name", &inner.name)
            .field("mode", &inner.mode)
            .field("scale", &inner.scale)
            .field("position", &inner.position)
            .field("state", &inner.state)
            .finish_non_exhaustive()
    }
}

impl Output {
    /// Create a new output in the [`OutputState::Uninitialized`] state
    pub fn new(name: impl Into<String>, physical: PhysicalProperties, mode: Mode) -> Output {
        Output {
            id: OutputId::next(),
            inner: Arc::new(Mutex::new(Inner {
                name: name.into(),
                physical,
                mode,
                scale: 1.0,
                transform: Transform::Normal,
                position: Point::default(),
                state: OutputState::Uninitialized,
                buffers_count: 1,
                current_buffer: 0,
                damage: None,
                repaint_requested: false,
                oversampling: None,
                global: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Identifier of this output
    pub fn id(&self) -> OutputId {
        self.id
    }

    /// Name of the output, e.g. `DP-1`
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Physical properties of the output
    pub fn physical_properties(&self) -> PhysicalProperties {
        self.lock().physical.clone()
    }

    /// Current mode of the output
    pub fn current_mode(&self) -> Mode {
        self.lock().mode
    }

    /// Change the current mode of the output
    pub fn set_mode(&self, mode: Mode) {
        let mut inner = self.lock();
        inner.mode = mode;
        inner.update_oversampling();
    }

    /// Scale factor of the output
    pub fn scale(&self) -> f64 {
        self.lock().scale
    }

    /// Change the scale factor of the output, clamped to [`MIN_SCALE`](crate::utils::MIN_SCALE)
    ///
    /// The compositor's global scale is only updated when outputs are added or removed.
    #[instrument(level = "debug", skip(self), fields(output = %self.id))]
    pub fn set_scale(&self, scale: f64) {
        let mut inner = self.lock();
        inner.scale = clamp_scale(scale);
        inner.update_oversampling();
        debug!(scale = inner.scale, "Output scale changed");
    }

    /// Whether the scale factor of the output is not an integer
    pub fn uses_fractional_scale(&self) -> bool {
        self.lock().uses_fractional_scale()
    }

    /// Transform of the output
    pub fn transform(&self) -> Transform {
        self.lock().transform
    }

    /// Change the transform of the output
    pub fn set_transform(&self, transform: Transform) {
        let mut inner = self.lock();
        inner.transform = transform;
        inner.update_oversampling();
    }

    /// Position of the output in the global logical space
    pub fn position(&self) -> Point<i32, Logical> {
        self.lock().position
    }

    /// Move the output in the global logical space
    pub fn set_position(&self, position: Point<i32, Logical>) {
        let mut inner = self.lock();
        inner.position = position;
        inner.update_oversampling();
    }

    /// Size of the output framebuffer in buffer pixels, after applying the transform
    pub fn size_b(&self) -> Size<i32, Buffer> {
        self.lock().size_b()
    }

    /// Area of the global logical space covered by the output
    pub fn rect(&self) -> Rectangle<i32, Logical> {
        self.lock().rect()
    }

    /// Horizontal pixel density of the output, `0` if the physical size is unknown
    pub fn dpi(&self) -> u32 {
        let inner = self.lock();
        if inner.physical.size.w <= 0 {
            return 0;
        }
        let inches = inner.physical.size.w as f64 / 25.4;
        (inner.mode.size.w as f64 / inches).round() as u32
    }

    /// Lifecycle state of the output
    pub fn state(&self) -> OutputState {
        self.lock().state
    }

    pub(crate) fn set_state(&self, state: OutputState) {
        self.lock().state = state;
    }

    /// Whether the output is driven by the backend
    pub fn is_initialized(&self) -> bool {
        self.state() == OutputState::Initialized
    }

    /// Set the number of buffers of the swap chain, reported by the backend
    pub fn set_buffers_count(&self, count: u32) {
        let mut inner = self.lock();
        inner.buffers_count = count.max(1);
        inner.current_buffer = inner.current_buffer.min(inner.buffers_count - 1);
    }

    /// Set the index of the buffer rendered next, reported by the backend
    pub fn set_current_buffer_index(&self, index: u32) {
        let mut inner = self.lock();
        inner.current_buffer = index % inner.buffers_count;
    }

    /// Take the damage hint set for the upcoming frame
    pub fn take_framebuffer_damage(&self) -> Option<Vec<Rectangle<i32, Buffer>>> {
        self.lock().damage.take()
    }

    /// Ask the backend to render a new frame
    pub fn request_repaint(&self) {
        self.lock().repaint_requested = true;
    }

    /// Consume a pending repaint request, used by the render thread
    pub fn take_repaint_request(&self) -> bool {
        std::mem::take(&mut self.lock().repaint_requested)
    }

    /// Render fractionally scaled frames at the next integer scale into an intermediate
    /// buffer
    pub fn set_fractional_oversampling(&self, ctx: &RenderContext, enabled: bool) {
        let mut inner = self.lock();
        match (enabled, inner.oversampling.is_some()) {
            (true, false) => {
                inner.oversampling = Some(RenderBuffer::new(ctx, inner.size_b(), false));
                inner.update_oversampling();
            }
            (false, true) => inner.oversampling = None,
            _ => {}
        }
    }

    /// Whether fractional oversampling is enabled
    pub fn fractional_oversampling(&self) -> bool {
        self.lock().oversampling.is_some()
    }

    pub(crate) fn global(&self) -> Option<GlobalId> {
        self.lock().global
    }

    pub(crate) fn set_global(&self, global: Option<GlobalId>) {
        self.lock().global = global;
    }

    /// The framebuffer of this output
    pub fn framebuffer(&self) -> OutputFramebuffer {
        OutputFramebuffer { output: self.clone() }
    }
}

/// The framebuffer of an [`Output`], as seen by the renderer
#[derive(Debug, Clone)]
pub struct OutputFramebuffer {
    output: Output,
}

impl OutputFramebuffer {
    /// The output this framebuffer belongs to
    pub fn output(&self) -> &Output {
        &self.output
    }
}

impl Framebuffer for OutputFramebuffer {
    fn scale(&self) -> f64 {
        self.output.scale()
    }

    fn size_b(&self) -> Size<i32, Buffer> {
        self.output.size_b()
    }

    fn rect(&self) -> Rectangle<i32, Logical> {
        self.output.rect()
    }

    fn id(&self) -> u32 {
        let inner = self.output.lock();
        match inner.oversampling.as_ref() {
            Some(buffer) if inner.uses_fractional_scale() => buffer.id(),
            _ => 0,
        }
    }

    fn buffers_count(&self) -> u32 {
        self.output.lock().buffers_count
    }

    fn current_buffer_index(&self) -> u32 {
        self.output.lock().current_buffer
    }

    fn set_framebuffer_damage(&self, damage: Option<&[Rectangle<i32, Buffer>]>) {
        self.output.lock().damage = damage.map(<[_]>::to_vec);
    }

    fn transform(&self) -> Transform {
        self.output.transform()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::test::DummyGraphicsBackend;

    fn output(w: i32, h: i32) -> Output {
        Output::new(
            "test",
            PhysicalProperties {
                size: (527, 296).into(),
                ..Default::default()
            },
            Mode {
                size: (w, h).into(),
                refresh: 60_000,
            },
        )
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = output(1920, 1080);
        let b = output(1920, 1080);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn rect_follows_mode_scale_and_transform() {
        let output = output(1920, 1080);
        output.set_position((100, 0).into());
        assert_eq!(output.rect(), Rectangle::from_loc_and_size((100, 0), (1920, 1080)));

        output.set_scale(2.0);
        assert_eq!(output.rect().size, Size::from((960, 540)));

        output.set_transform(Transform::_270);
        assert_eq!(output.size_b(), Size::from((1080, 1920)));
        assert_eq!(output.rect().size, Size::from((540, 960)));

        output.set_scale(-3.0);
        assert_eq!(output.scale(), 0.25);
    }

    #[test]
    fn dpi_from_physical_size() {
        assert_eq!(output(1920, 1080).dpi(), 93);
        let unknown = Output::new(
            "virtual",
            PhysicalProperties::default(),
            Mode {
                size: (800, 600).into(),
                refresh: 0,
            },
        );
        assert_eq!(unknown.dpi(), 0);
    }

    #[test]
    fn framebuffer_reflects_output() {
        let output = output(1920, 1080);
        output.set_buffers_count(3);
        output.set_current_buffer_index(4);
        let fb = output.framebuffer();
        assert_eq!(fb.buffers_count(), 3);
        assert_eq!(fb.current_buffer_index(), 1);
        assert_eq!(fb.id(), 0);

        let damage = [Rectangle::from_loc_and_size((0, 0), (10, 10))];
        fb.set_framebuffer_damage(Some(&damage));
        assert_eq!(output.take_framebuffer_damage(), Some(damage.to_vec()));
        assert_eq!(output.take_framebuffer_damage(), None);
    }

    #[test]
    fn oversampling_only_for_fractional_scales() {
        let backend = Arc::new(DummyGraphicsBackend::default());
        let ctx = RenderContext::new(backend);
        let output = output(1920, 1080);
        output.set_fractional_oversampling(&ctx, true);

        let fb = output.framebuffer();
        assert_eq!(fb.id(), 0);

        output.set_scale(1.5);
        assert_ne!(fb.id(), 0);

        output.set_fractional_oversampling(&ctx, false);
        assert_eq!(fb.id(), 0);
        assert_eq!(ctx.pending_destructions(), 2);
    }
}
