//! Pointer cursor state
//!
//! The [`Cursor`] follows the pointer position and displays either a client surface
//! (set through `wl_pointer.set_cursor`) or the default image of the compositor. It
//! tracks the outputs it overlaps, so that only those are repainted when it moves or
//! when its image changes.
//!
//! The image is refreshed at most once per loop iteration, by
//! [`Cursor::texture_update`].

use tracing::trace;

use crate::{
    output::Output,
    utils::{Logical, Point, Rectangle, Size},
    wayland::compositor::SurfaceId,
};

/// Default size of the cursor image
pub const DEFAULT_CURSOR_SIZE: i32 = 24;

/// The pointer cursor
#[derive(Debug)]
pub struct Cursor {
    position: Point<f64, Logical>,
    hotspot: Point<i32, Logical>,
    size: Size<i32, Logical>,
    surface: Option<SurfaceId>,
    visible: bool,
    texture_dirty: bool,
    moved: bool,
    texture_updates: u64,
    intersected: Vec<Output>,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            position: Point::default(),
            hotspot: Point::default(),
            size: Size::from((DEFAULT_CURSOR_SIZE, DEFAULT_CURSOR_SIZE)),
            surface: None,
            visible: true,
            texture_dirty: true,
            moved: false,
            texture_updates: 0,
            intersected: Vec::new(),
        }
    }
}

impl Cursor {
    /// Position of the pointer in the global logical space
    pub fn position(&self) -> Point<f64, Logical> {
        self.position
    }

    /// Move the cursor
    pub fn set_position(&mut self, position: Point<f64, Logical>) {
        if self.position != position {
            self.position = position;
            self.moved = true;
        }
    }

    /// Hotspot of the current image
    pub fn hotspot(&self) -> Point<i32, Logical> {
        self.hotspot
    }

    /// Surface used as cursor image, `None` for the default image
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    /// Use a client surface as cursor image
    pub fn set_surface(&mut self, surface: Option<SurfaceId>, hotspot: Point<i32, Logical>) {
        trace!(?surface, ?hotspot, "Cursor image changed");
        self.surface = surface;
        self.hotspot = hotspot;
        self.texture_dirty = true;
    }

    /// Set the size of the cursor image
    pub fn set_size(&mut self, size: Size<i32, Logical>) {
        self.size = Size::from((size.w.max(1), size.h.max(1)));
        self.texture_dirty = true;
    }

    /// Whether the cursor is displayed
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show or hide the cursor
    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.visible = visible;
            self.moved = true;
        }
    }

    /// Area covered by the cursor image
    pub fn rect(&self) -> Rectangle<i32, Logical> {
        Rectangle::new(self.position.to_i32_round() - self.hotspot, self.size)
    }

    /// The image needs to be uploaded again
    pub fn mark_texture_dirty(&mut self) {
        self.texture_dirty = true;
    }

    /// Number of image uploads done so far
    pub fn texture_updates(&self) -> u64 {
        self.texture_updates
    }

    /// Outputs the cursor overlaps
    pub fn intersected_outputs(&self) -> &[Output] {
        &self.intersected
    }

    /// Refresh the image and the overlapped outputs
    ///
    /// Outputs the cursor entered, left, or whose image changed get a repaint request.
    /// Returns `true` if the image was uploaded again.
    pub fn texture_update(&mut self, outputs: &[Output]) -> bool {
        let rect = self.rect();
        let intersected: Vec<Output> = outputs
            .iter()
            .filter(|output| self.visible && output.is_initialized() && output.rect().overlaps(rect))
            .cloned()
            .collect();

        let updated = self.texture_dirty;
        if self.moved || updated {
            for output in self.intersected.iter().chain(intersected.iter()) {
                output.request_repaint();
            }
        }
        self.intersected = intersected;
        self.moved = false;

        if updated {
            self.texture_dirty = false;
            self.texture_updates += 1;
        }
        updated
    }

    /// Drop every reference to an output
    pub(crate) fn forget_output(&mut self, output: &Output) {
        self.intersected.retain(|o| o != output);
    }

    /// Drop every reference to a surface
    pub(crate) fn forget_surface(&mut self, surface: SurfaceId) {
        if self.surface == Some(surface) {
            self.surface = None;
            self.texture_dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Mode, OutputState, PhysicalProperties};

    fn output(x: i32) -> Output {
        let output = Output::new(
            format!("OUT-{x}"),
            PhysicalProperties::default(),
            Mode {
                size: (100, 100).into(),
                refresh: 60_000,
            },
        );
        output.set_position((x, 0).into());
        output.set_state(OutputState::Initialized);
        output
    }

    #[test]
    fn intersected_outputs_follow_the_cursor() {
        let outputs = vec![output(0), output(100)];
        let mut cursor = Cursor::default();
        cursor.set_position((10.0, 10.0).into());
        assert!(cursor.texture_update(&outputs));
        assert_eq!(cursor.intersected_outputs(), &outputs[..1]);

        // straddling both outputs
        cursor.set_position((90.0, 10.0).into());
        assert!(!cursor.texture_update(&outputs));
        assert_eq!(cursor.intersected_outputs().len(), 2);
        assert!(outputs[1].take_repaint_request());

        cursor.forget_output(&outputs[0]);
        assert_eq!(cursor.intersected_outputs(), &outputs[1..]);
    }

    #[test]
    fn image_is_uploaded_once_per_change() {
        let mut cursor = Cursor::default();
        assert!(cursor.texture_update(&[]));
        assert!(!cursor.texture_update(&[]));

        let surface = SurfaceId::next();
        cursor.set_surface(Some(surface), (4, 4).into());
        assert!(cursor.texture_update(&[]));
        cursor.forget_surface(surface);
        assert_eq!(cursor.surface(), None);
        assert!(cursor.texture_update(&[]));
        assert_eq!(cursor.texture_updates(), 3);
    }
}
