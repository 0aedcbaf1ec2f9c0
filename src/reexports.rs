//! Reexports of crates, that are part of the public api, for convenience

pub use drm_fourcc;
#[cfg(feature = "backend_module")]
pub use libloading;
pub use wayland_protocols;
#[cfg(feature = "wayland_frontend")]
pub use wayland_server;
