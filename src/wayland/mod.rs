//! Protocol-related state
//!
//! This module contains the state the compositor keeps for its clients, split by
//! protocol area:
//!
//! - [`client`]: connections, their event queues and input history;
//! - [`global`]: the globals advertised to clients;
//! - [`compositor`]: surfaces, their roles and the surface tree;
//! - [`shell`]: the `xdg_shell` toplevels and popups;
//! - [`seat`]: input focus, grabs and Drag'n'Drop;
//! - [`socket`]: the transport clients connect through, and [`request`] the requests
//!   it delivers.
//!
//! Every operation is a method of [`Compositor`](crate::compositor::Compositor), the
//! modules only group them.

pub mod client;
pub mod compositor;
pub mod global;
pub mod request;
pub mod seat;
pub mod shell;
pub mod socket;
