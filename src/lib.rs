#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # Kiln: a Wayland compositor core
//!
//! This crate provides the core of a Wayland compositor: client and global
//! bookkeeping, surfaces and their roles, the `xdg_shell` popups and toplevels, the
//! seat with its focus and Drag'n'Drop state, outputs and the cursor. Drawing and
//! input devices are left to pluggable backends.
//!
//! ## Structure of the crate
//!
//! - [`compositor`] contains the [`Compositor`](compositor::Compositor) itself, its
//!   lifecycle and main loop, and the [`CompositorHandler`](compositor::CompositorHandler)
//!   hooks a compositor customizes its behavior with.
//! - [`backend`] defines the graphics and input backend interfaces, and how backends
//!   are loaded from shared objects.
//! - [`wayland`] contains the protocol state of the clients.
//! - [`output`] and [`cursor`] describe what the graphics backend draws on.
//!
//! ## Threads
//!
//! The compositor runs on a single thread, its main loop. Outputs may be rendered from
//! their own threads: [`Output`](output::Output) is shareable, and render threads
//! synchronize with the main loop through the
//! [render lock](compositor::Compositor::render_lock).
//!
//! ### Logging
//!
//! Kiln makes extensive use of [`tracing`] for its internal logging.
//!
//! For release builds it is recommended to limit the log level during compile time.
//! This can be done by adding a dependency to [`tracing`] and enabling the corresponding features.
//! For example to enable `trace` messages for debug builds, but limit release builds to `debug` add
//! the following in your binary crate `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```

use std::any::Any;

pub mod backend;
pub mod compositor;
pub mod cursor;
pub mod output;
pub mod utils;
pub mod wayland;

pub mod reexports;

/// Data a compositor attaches to the objects created by clients
///
/// See [`CompositorHandler::create_object_request`](compositor::CompositorHandler::create_object_request).
pub type UserData = Box<dyn Any + Send>;
