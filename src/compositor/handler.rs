use tracing::trace;

use super::Compositor;
use crate::{
    wayland::{
        client::{ClientId, RecordedEvent},
        compositor::SurfaceId,
        global::{GlobalError, GlobalId},
        shell::xdg::{PopupId, Positioner, ToplevelId},
    },
    UserData,
};

/// An object whose creation or destruction is reported to the [`CompositorHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    /// A `wl_surface`
    Surface(SurfaceId),
    /// An `xdg_popup`
    Popup(PopupId),
    /// An `xdg_toplevel`
    Toplevel(ToplevelId),
}

/// Hooks of the compositor
///
/// Every method has a default implementation, override the ones you need. Hooks are
/// called with the compositor, and may call back into it. A hook triggered from within
/// another hook is not forwarded to the handler: the default behavior applies.
pub trait CompositorHandler {
    /// The compositor finished starting
    ///
    /// This is the place to add the outputs reported by the graphics backend.
    fn initialized(&mut self, _compositor: &mut Compositor) {}

    /// The compositor is about to release its backends
    fn uninitialized(&mut self, _compositor: &mut Compositor) {}

    /// Create the globals advertised to clients
    ///
    /// Defaults to [`Compositor::create_default_globals`]. An error aborts the start.
    fn create_globals_request(&mut self, compositor: &mut Compositor) -> Result<(), GlobalError> {
        compositor.create_default_globals()
    }

    /// Whether `global` is advertised to and can be bound by `client`
    fn globals_filter(&mut self, _compositor: &mut Compositor, _client: ClientId, _global: GlobalId) -> bool {
        true
    }

    /// A client created an object, return the data to attach to it
    fn create_object_request(&mut self, _object: ObjectRef) -> Option<UserData> {
        None
    }

    /// An object is about to be destroyed, it is still fully usable
    fn on_anticipated_object_destruction(&mut self, _compositor: &mut Compositor, _object: ObjectRef) {}

    /// A popup needs a placement
    ///
    /// Queue one with [`Compositor::configure_popup`]. If nothing is queued the popup
    /// is placed with [`Compositor::calculate_unconstrained_rect`].
    fn popup_configure_request(&mut self, _compositor: &mut Compositor, _popup: PopupId, _positioner: Positioner) {}

    /// A popup asked for the keyboard grab, following `event`
    ///
    /// The popup is dismissed if the keyboard grab is not given to its surface.
    /// Defaults to granting it.
    fn popup_grab_keyboard_request(&mut self, compositor: &mut Compositor, popup: PopupId, event: &RecordedEvent) {
        trace!(%popup, serial = ?event.serial, "Granting popup keyboard grab");
        let surface = compositor.shell().popup(popup).and_then(|popup| popup.surface());
        if surface.is_some() {
            compositor.set_keyboard_grab(surface);
        }
    }

    /// A surface was moved to the top of the stacking order
    fn surface_raised(&mut self, _compositor: &mut Compositor, _surface: SurfaceId) {}
}

/// A handler keeping every default behavior
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandler;

impl CompositorHandler for DefaultHandler {}
