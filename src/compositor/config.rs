use std::path::PathBuf;

/// Default graphics backend module, loaded when none was set
pub const DEFAULT_GRAPHICS_BACKEND: &str = "/usr/lib/kiln/backends/libkiln_graphics_drm.so";
/// Default input backend module, loaded when none was set
pub const DEFAULT_INPUT_BACKEND: &str = "/usr/lib/kiln/backends/libkiln_input_libinput.so";

/// Configuration of a [`Compositor`](super::Compositor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositorConfig {
    /// Name of the listening socket, the first free `wayland-N` if `None`
    pub socket_name: Option<String>,
    /// Name of the seat advertised to clients
    pub seat_name: String,
    /// Graphics backend module loaded when none was set
    pub default_graphics_backend: PathBuf,
    /// Input backend module loaded when none was set
    pub default_input_backend: PathBuf,
    /// Version of `xdg_wm_base` assumed for clients that did not bind it
    pub xdg_wm_base_version: u32,
    /// Number of input events remembered per client for serial validation
    pub input_history: usize,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        CompositorConfig {
            socket_name: None,
            seat_name: "seat0".into(),
            default_graphics_backend: PathBuf::from(DEFAULT_GRAPHICS_BACKEND),
            default_input_backend: PathBuf::from(DEFAULT_INPUT_BACKEND),
            xdg_wm_base_version: 6,
            input_history: 32,
        }
    }
}

impl CompositorConfig {
    /// Default configuration, overridden by the environment
    ///
    /// - `KILN_SOCKET`: name of the listening socket
    /// - `KILN_SEAT`: name of the seat
    /// - `KILN_GRAPHICS_BACKEND`, `KILN_INPUT_BACKEND`: paths of the default backend modules
    pub fn from_env() -> CompositorConfig {
        let mut config = CompositorConfig::default();
        if let Ok(name) = std::env::var("KILN_SOCKET") {
            config.socket_name = Some(name);
        }
        if let Ok(name) = std::env::var("KILN_SEAT") {
            config.seat_name = name;
        }
        if let Ok(path) = std::env::var("KILN_GRAPHICS_BACKEND") {
            config.default_graphics_backend = path.into();
        }
        if let Ok(path) = std::env::var("KILN_INPUT_BACKEND") {
            config.default_input_backend = path.into();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn environment_overrides_defaults() {
        std::env::set_var("KILN_SEAT", "seat-test");
        let config = CompositorConfig::from_env();
        std::env::remove_var("KILN_SEAT");
        assert_eq!(config.seat_name, "seat-test");
        assert_eq!(config.xdg_wm_base_version, 6);
        assert_eq!(config.default_input_backend, PathBuf::from(DEFAULT_INPUT_BACKEND));
    }
}
