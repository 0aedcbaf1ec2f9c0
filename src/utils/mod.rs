//! Various utilities functions and types

mod geometry;
pub(crate) mod ids;
mod serial;

pub use self::geometry::{
    clamp_scale, Buffer, Coordinate, Logical, Physical, Point, Rectangle, Size, Transform, MIN_SCALE,
};
pub use self::serial::{Serial, SerialCounter};

/// This resource has been destroyed and can no longer be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("This resource has been destroyed and can no longer be used.")]
pub struct DeadResource;
