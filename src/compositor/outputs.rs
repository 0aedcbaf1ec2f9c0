use tracing::{debug, info, warn};

use super::Compositor;
use crate::{
    backend::BackendError,
    output::{Output, OutputState},
    utils::{Logical, Rectangle},
    wayland::{compositor::SurfaceId, global::GlobalError, global::GlobalKind},
};

/// Errors of [`Compositor::add_output`]
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The compositor has no initialized graphics backend
    #[error("No graphics backend is initialized")]
    NoBackend,
    /// The graphics backend could not drive the output
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The `wl_output` global could not be created
    #[error(transparent)]
    Global(#[from] GlobalError),
}

impl Compositor {
    /// The outputs driven by the compositor, in the order they were added
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Start driving an output
    ///
    /// The graphics backend initializes it, then a `wl_output` global is advertised.
    /// Adding an output twice does nothing.
    pub fn add_output(&mut self, output: &Output) -> Result<(), OutputError> {
        if self.outputs.contains(output) {
            return Ok(());
        }
        let Some(graphics) = self.graphics.clone().filter(|_| self.graphics_initialized) else {
            warn!(output = %output.name(), "Cannot add an output without graphics backend");
            return Err(OutputError::NoBackend);
        };

        self.outputs.push(output.clone());
        output.set_state(OutputState::PendingInitialize);
        if let Err(err) = graphics.initialize_output(output) {
            warn!(output = %output.name(), %err, "Failed to initialize output");
            self.remove_output(output);
            return Err(err.into());
        }
        output.set_state(OutputState::Initialized);
        self.update_global_scale();

        match self.create_global(GlobalKind::Output(output.id())) {
            Ok(global) => output.set_global(Some(global)),
            Err(err) => {
                self.remove_output(output);
                return Err(err.into());
            }
        }

        self.update_all_surface_outputs();
        output.request_repaint();
        info!(output = %output.name(), rect = ?output.rect(), "Output added");
        Ok(())
    }

    /// Stop driving an output
    ///
    /// Surfaces leave it, clients forget their bindings and its global is removed.
    pub fn remove_output(&mut self, output: &Output) {
        let Some(index) = self.outputs.iter().position(|o| o == output) else {
            return;
        };

        output.set_state(OutputState::PendingUninitialize);
        if let Some(graphics) = self.graphics.as_ref() {
            graphics.uninitialize_output(output);
        }
        output.set_state(OutputState::Uninitialized);

        let surfaces: Vec<SurfaceId> = self.surfaces.stacking_order().to_vec();
        for surface in surfaces {
            self.send_output_leave(surface, output);
        }
        self.outputs.remove(index);

        for client in self.clients.values_mut() {
            client.strip_output(output.id());
        }
        if let Some(global) = output.global() {
            self.remove_global(global);
            output.set_global(None);
        }

        self.update_global_scale();
        self.cursor.forget_output(output);
        info!(output = %output.name(), "Output removed");
    }

    /// Largest integer scale of the outputs, rounded up, 1 without outputs
    ///
    /// Clients not supporting fractional scaling should render at this scale.
    pub fn global_scale(&self) -> i32 {
        self.global_scale
    }

    fn update_global_scale(&mut self) {
        let scale = self
            .outputs
            .iter()
            .map(|output| output.scale().ceil() as i32)
            .max()
            .unwrap_or(1);
        if scale != self.global_scale {
            debug!(old = self.global_scale, new = scale, "Global scale changed");
            self.global_scale = scale;
        }
    }

    /// Smallest rectangle containing every initialized output
    pub fn outputs_bounding_box(&self) -> Rectangle<i32, Logical> {
        self.outputs
            .iter()
            .filter(|output| output.is_initialized())
            .map(Output::rect)
            .reduce(Rectangle::merge)
            .unwrap_or_default()
    }

    /// Ask every output to render a new frame
    pub fn repaint_all_outputs(&self) {
        for output in &self.outputs {
            output.request_repaint();
        }
    }

    pub(super) fn repaint_requested_outputs(&self) {
        let Some(graphics) = self.graphics.as_ref() else {
            return;
        };
        for output in self.outputs.iter().filter(|output| output.is_initialized()) {
            if output.take_repaint_request() && !graphics.repaint_output(output) {
                debug!(output = %output.name(), "Repaint request not honored");
            }
        }
    }

    /// Recompute the outputs every surface overlaps
    pub fn update_all_surface_outputs(&mut self) {
        let surfaces: Vec<SurfaceId> = self.surfaces.stacking_order().to_vec();
        for surface in surfaces {
            self.update_surface_outputs(surface);
        }
    }
}
