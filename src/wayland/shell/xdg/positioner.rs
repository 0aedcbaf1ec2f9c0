//! Popup placement
//!
//! A [`Positioner`] is the immutable description of where a client wants its popup,
//! relative to the window geometry of the parent: an anchor rectangle, an anchor edge
//! on that rectangle, a gravity, an offset, and a set of adjustments the compositor may
//! apply when the resulting rectangle does not fit into the target area.
//!
//! Adjustments are tried in the order mandated by `xdg_positioner`: flip, then slide,
//! then resize, independently per axis. A flip is only kept if it removes the
//! constraint on its axis.

use wayland_protocols::xdg::shell::server::xdg_positioner::{Anchor, ConstraintAdjustment, Gravity};

use crate::utils::{Logical, Point, Rectangle, Serial, Size};

/// The state of a positioner, as set by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Positioner {
    /// Requested size of the popup
    pub rect_size: Size<i32, Logical>,
    /// Rectangle of the parent the popup is anchored to
    pub anchor_rect: Rectangle<i32, Logical>,
    /// Edges defining the anchor point
    pub anchor_edges: Anchor,
    /// Direction the popup extends to from the anchor point
    pub gravity: Gravity,
    /// Adjustments allowed if the popup would be constrained
    pub constraint_adjustment: ConstraintAdjustment,
    /// Offset from the anchor point
    pub offset: Point<i32, Logical>,
    /// Whether the popup should be reconstrained when the parent moves
    pub reactive: bool,
    /// Parent size the client expects the popup to be placed against
    pub parent_size: Option<Size<i32, Logical>>,
    /// Configure of the parent the positioner was created for
    pub parent_configure: Option<Serial>,
}

impl Default for Positioner {
    fn default() -> Self {
        Positioner {
            rect_size: Default::default(),
            anchor_rect: Default::default(),
            anchor_edges: Anchor::None,
            gravity: Gravity::None,
            constraint_adjustment: ConstraintAdjustment::empty(),
            offset: Default::default(),
            reactive: false,
            parent_size: None,
            parent_configure: None,
        }
    }
}

// -1 for left/top, 1 for right/bottom, 0 when centered on that axis
type Direction = (i32, i32);

fn anchor_direction(anchor: Anchor) -> Direction {
    match anchor {
        Anchor::Top => (0, -1),
        Anchor::Bottom => (0, 1),
        Anchor::Left => (-1, 0),
        Anchor::Right => (1, 0),
        Anchor::TopLeft => (-1, -1),
        Anchor::BottomLeft => (-1, 1),
        Anchor::TopRight => (1, -1),
        Anchor::BottomRight => (1, 1),
        _ => (0, 0),
    }
}

fn anchor_from_direction(direction: Direction) -> Anchor {
    match direction {
        (0, -1) => Anchor::Top,
        (0, 1) => Anchor::Bottom,
        (-1, 0) => Anchor::Left,
        (1, 0) => Anchor::Right,
        (-1, -1) => Anchor::TopLeft,
        (-1, 1) => Anchor::BottomLeft,
        (1, -1) => Anchor::TopRight,
        (1, 1) => Anchor::BottomRight,
        _ => Anchor::None,
    }
}

fn gravity_direction(gravity: Gravity) -> Direction {
    match gravity {
        Gravity::Top => (0, -1),
        Gravity::Bottom => (0, 1),
        Gravity::Left => (-1, 0),
        Gravity::Right => (1, 0),
        Gravity::TopLeft => (-1, -1),
        Gravity::BottomLeft => (-1, 1),
        Gravity::TopRight => (1, -1),
        Gravity::BottomRight => (1, 1),
        _ => (0, 0),
    }
}

fn gravity_from_direction(direction: Direction) -> Gravity {
    match direction {
        (0, -1) => Gravity::Top,
        (0, 1) => Gravity::Bottom,
        (-1, 0) => Gravity::Left,
        (1, 0) => Gravity::Right,
        (-1, -1) => Gravity::TopLeft,
        (-1, 1) => Gravity::BottomLeft,
        (1, -1) => Gravity::TopRight,
        (1, 1) => Gravity::BottomRight,
        _ => Gravity::None,
    }
}

// How far the popup sticks out of the target on each side, positive when constrained
#[derive(Debug, Clone, Copy)]
struct Overflow {
    left: i32,
    right: i32,
    top: i32,
    bottom: i32,
}

impl Overflow {
    fn compute(target: Rectangle<i32, Logical>, popup: Rectangle<i32, Logical>) -> Overflow {
        Overflow {
            left: target.loc.x - popup.loc.x,
            right: (popup.loc.x + popup.size.w) - (target.loc.x + target.size.w),
            top: target.loc.y - popup.loc.y,
            bottom: (popup.loc.y + popup.size.h) - (target.loc.y + target.size.h),
        }
    }

    fn horizontal(&self) -> bool {
        self.left > 0 || self.right > 0
    }

    fn vertical(&self) -> bool {
        self.top > 0 || self.bottom > 0
    }
}

impl Positioner {
    /// Whether the positioner is complete: both the popup size and the anchor rectangle
    /// must have a non-zero area
    pub fn is_valid(&self) -> bool {
        self.rect_size.w > 0 && self.rect_size.h > 0 && self.anchor_rect.size.w > 0 && self.anchor_rect.size.h > 0
    }

    /// The point of the anchor rectangle the popup is positioned against
    pub fn anchor_point(&self) -> Point<i32, Logical> {
        let (dx, dy) = anchor_direction(self.anchor_edges);
        let rect = self.anchor_rect;
        let x = match dx {
            -1 => 0,
            1 => rect.size.w,
            _ => rect.size.w / 2,
        };
        let y = match dy {
            -1 => 0,
            1 => rect.size.h,
            _ => rect.size.h / 2,
        };
        rect.loc + Point::from((x, y))
    }

    /// Placement of the popup relative to its parent, ignoring any constraint
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        let (gx, gy) = gravity_direction(self.gravity);
        let size = self.rect_size;
        let mut loc = self.anchor_point() + self.offset;
        loc.x -= match gx {
            -1 => size.w,
            1 => 0,
            _ => size.w / 2,
        };
        loc.y -= match gy {
            -1 => size.h,
            1 => 0,
            _ => size.h / 2,
        };
        Rectangle::new(loc, size)
    }

    fn flipped_x(&self) -> Positioner {
        let (ax, ay) = anchor_direction(self.anchor_edges);
        let (gx, gy) = gravity_direction(self.gravity);
        Positioner {
            anchor_edges: anchor_from_direction((-ax, ay)),
            gravity: gravity_from_direction((-gx, gy)),
            ..*self
        }
    }

    fn flipped_y(&self) -> Positioner {
        let (ax, ay) = anchor_direction(self.anchor_edges);
        let (gx, gy) = gravity_direction(self.gravity);
        Positioner {
            anchor_edges: anchor_from_direction((ax, -ay)),
            gravity: gravity_from_direction((gx, -gy)),
            ..*self
        }
    }

    /// Placement of the popup relative to its parent, adjusted to fit into `target`
    ///
    /// `target` is expressed relative to the parent as well, usually the union of the
    /// outputs minus the position of the parent.
    pub fn unconstrained_geometry(&self, target: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
        let adjustments = self.constraint_adjustment;
        let mut positioner = *self;
        let mut geo = positioner.geometry();
        let mut overflow = Overflow::compute(target, geo);

        if overflow.horizontal() && adjustments.contains(ConstraintAdjustment::FlipX) {
            let flipped = positioner.flipped_x();
            let flipped_geo = flipped.geometry();
            let flipped_overflow = Overflow::compute(target, flipped_geo);
            if !flipped_overflow.horizontal() {
                positioner = flipped;
                geo = flipped_geo;
                overflow = flipped_overflow;
            }
        }

        if overflow.vertical() && adjustments.contains(ConstraintAdjustment::FlipY) {
            let flipped = positioner.flipped_y();
            let flipped_geo = flipped.geometry();
            let flipped_overflow = Overflow::compute(target, flipped_geo);
            if !flipped_overflow.vertical() {
                geo = flipped_geo;
                overflow = flipped_overflow;
            }
        }

        // Sliding keeps the top left corner visible, so that resizing can fix the rest.
        if overflow.horizontal() && adjustments.contains(ConstraintAdjustment::SlideX) {
            if overflow.left > 0 {
                geo.loc.x += overflow.left;
            } else {
                geo.loc.x -= overflow.right.min(-overflow.left);
            }
            overflow = Overflow::compute(target, geo);
        }

        if overflow.vertical() && adjustments.contains(ConstraintAdjustment::SlideY) {
            if overflow.top > 0 {
                geo.loc.y += overflow.top;
            } else {
                geo.loc.y -= overflow.bottom.min(-overflow.top);
            }
            overflow = Overflow::compute(target, geo);
        }

        if overflow.right > 0 && overflow.right < geo.size.w && adjustments.contains(ConstraintAdjustment::ResizeX) {
            geo.size.w -= overflow.right;
        }
        if overflow.left > 0 && overflow.left < geo.size.w && adjustments.contains(ConstraintAdjustment::ResizeX) {
            geo.loc.x += overflow.left;
            geo.size.w -= overflow.left;
        }

        if overflow.bottom > 0
            && overflow.bottom < geo.size.h
            && adjustments.contains(ConstraintAdjustment::ResizeY)
        {
            geo.size.h -= overflow.bottom;
        }
        if overflow.top > 0 && overflow.top < geo.size.h && adjustments.contains(ConstraintAdjustment::ResizeY) {
            geo.loc.y += overflow.top;
            geo.size.h -= overflow.top;
        }

        geo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positioner(size: (i32, i32), anchor_rect: Rectangle<i32, Logical>) -> Positioner {
        Positioner {
            rect_size: size.into(),
            anchor_rect,
            ..Default::default()
        }
    }

    #[test]
    fn validity() {
        let anchor = Rectangle::from_loc_and_size((0, 0), (10, 10));
        assert!(positioner((100, 50), anchor).is_valid());
        assert!(!positioner((0, 50), anchor).is_valid());
        assert!(!positioner((100, 50), Rectangle::from_loc_and_size((0, 0), (0, 10))).is_valid());
        assert!(!Positioner::default().is_valid());
    }

    #[test]
    fn centered_by_default() {
        let p = positioner((100, 50), Rectangle::from_loc_and_size((0, 0), (200, 100)));
        assert_eq!(p.anchor_point(), Point::from((100, 50)));
        assert_eq!(p.geometry(), Rectangle::from_loc_and_size((50, 25), (100, 50)));
    }

    #[test]
    fn menu_placement() {
        let p = Positioner {
            anchor_edges: Anchor::BottomLeft,
            gravity: Gravity::BottomRight,
            offset: (0, 2).into(),
            ..positioner((150, 300), Rectangle::from_loc_and_size((10, 0), (40, 20)))
        };
        assert_eq!(p.geometry(), Rectangle::from_loc_and_size((10, 22), (150, 300)));
    }

    #[test]
    fn flip_when_it_removes_the_constraint() {
        let target = Rectangle::from_loc_and_size((0, 0), (500, 500));
        let p = Positioner {
            anchor_edges: Anchor::BottomRight,
            gravity: Gravity::BottomRight,
            constraint_adjustment: ConstraintAdjustment::FlipX | ConstraintAdjustment::FlipY,
            ..positioner((100, 100), Rectangle::from_loc_and_size((400, 420), (50, 50)))
        };
        // would land at (450, 470), past both edges
        assert_eq!(
            p.unconstrained_geometry(target),
            Rectangle::from_loc_and_size((300, 320), (100, 100))
        );
    }

    #[test]
    fn slide_then_resize() {
        let target = Rectangle::from_loc_and_size((0, 0), (300, 200));
        let p = Positioner {
            anchor_edges: Anchor::BottomLeft,
            gravity: Gravity::BottomRight,
            constraint_adjustment: ConstraintAdjustment::SlideX | ConstraintAdjustment::ResizeY,
            ..positioner((100, 150), Rectangle::from_loc_and_size((250, 100), (20, 20)))
        };
        let geo = p.unconstrained_geometry(target);
        assert_eq!(geo.loc, Point::from((200, 120)));
        assert_eq!(geo.size, Size::from((100, 80)));
    }

    #[test]
    fn no_adjustment_leaves_geometry_untouched() {
        let target = Rectangle::from_loc_and_size((0, 0), (100, 100));
        let p = Positioner {
            anchor_edges: Anchor::BottomRight,
            gravity: Gravity::BottomRight,
            ..positioner((100, 100), Rectangle::from_loc_and_size((90, 90), (10, 10)))
        };
        assert_eq!(p.unconstrained_geometry(target), p.geometry());
    }
}
