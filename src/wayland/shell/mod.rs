//! Shell protocols
//!
//! A shell gives a meaning to surfaces: windows, menus, tooltips. Kiln implements the
//! `xdg_shell` protocol in the [`xdg`] module, the current standard for desktop
//! applications.

pub mod xdg;
