//! Seat handling
//!
//! The [`Seat`] groups the input devices of the compositor. It tracks which surface
//! has the keyboard focus, which surface is hovered by the pointer, and which surface
//! holds the keyboard grab, as requested by popups through `xdg_popup.grab`.
//!
//! Input backends hand their events to
//! [`Compositor::dispatch_input_event`](crate::compositor::Compositor::dispatch_input_event),
//! which routes them to the focused clients. Every event carrying a serial is
//! recorded in the history of the receiving client, so that requests quoting the
//! serial later on can be validated.

use bitflags::bitflags;
use tracing::{debug, trace};

use crate::{
    compositor::Compositor,
    utils::{Logical, Point},
    wayland::{
        client::ClientEvent,
        compositor::{roles::Role, SurfaceId},
    },
};

mod dnd;

pub use self::dnd::{DndAction, DndManager, DndState, DROP_TIMEOUT_ITERATIONS};

bitflags! {
    /// Input capabilities of a seat
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// The seat has a pointer
        const POINTER = 1;
        /// The seat has a keyboard
        const KEYBOARD = 2;
        /// The seat has a touch screen
        const TOUCH = 4;
    }
}

/// State of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    /// Key is released
    Released,
    /// Key is pressed
    Pressed,
}

/// State of a button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    /// Button is released
    Released,
    /// Button is pressed
    Pressed,
}

/// An event produced by an input backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A key changed state
    Keyboard {
        /// Linux key code
        key: u32,
        /// New state of the key
        state: KeyState,
        /// Timestamp in milliseconds
        time: u32,
    },
    /// The pointer moved to an absolute position
    PointerMotion {
        /// New position in the global logical space
        location: Point<f64, Logical>,
        /// Timestamp in milliseconds
        time: u32,
    },
    /// A pointer button changed state
    PointerButton {
        /// Linux button code
        button: u32,
        /// New state of the button
        state: ButtonState,
        /// Timestamp in milliseconds
        time: u32,
    },
    /// A touch point appeared
    TouchDown {
        /// Touch point
        slot: i32,
        /// Position in the global logical space
        location: Point<f64, Logical>,
        /// Timestamp in milliseconds
        time: u32,
    },
    /// A touch point disappeared
    TouchUp {
        /// Touch point
        slot: i32,
        /// Timestamp in milliseconds
        time: u32,
    },
}

/// The input devices of the compositor
#[derive(Debug)]
pub struct Seat {
    name: String,
    capabilities: Capabilities,
    keyboard_focus: Option<SurfaceId>,
    keyboard_grab: Option<SurfaceId>,
    pointer_focus: Option<SurfaceId>,
    pointer_location: Point<f64, Logical>,
    touch_focus: Vec<(i32, SurfaceId)>,
    dnd: DndManager,
    initialized: bool,
}

impl Seat {
    pub(crate) fn new(name: impl Into<String>) -> Seat {
        Seat {
            name: name.into(),
            capabilities: Capabilities::empty(),
            keyboard_focus: None,
            keyboard_grab: None,
            pointer_focus: None,
            pointer_location: Point::default(),
            touch_focus: Vec::new(),
            dnd: DndManager::default(),
            initialized: false,
        }
    }

    /// Name of the seat, advertised to clients
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capabilities announced by the input backend
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Set the capabilities of the seat, called by input backends
    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        debug!(seat = %self.name, ?capabilities, "Seat capabilities changed");
        self.capabilities = capabilities;
    }

    /// Surface with the keyboard focus
    pub fn keyboard_focus(&self) -> Option<SurfaceId> {
        self.keyboard_focus
    }

    /// Surface holding the keyboard grab
    pub fn keyboard_grab(&self) -> Option<SurfaceId> {
        self.keyboard_grab
    }

    /// Give the keyboard grab to a surface, or release it
    ///
    /// While a grab is held, keyboard events are only delivered to the grabbing surface.
    pub fn set_keyboard_grab(&mut self, surface: Option<SurfaceId>) {
        trace!(?surface, "Keyboard grab changed");
        self.keyboard_grab = surface;
    }

    /// Surface hovered by the pointer
    pub fn pointer_focus(&self) -> Option<SurfaceId> {
        self.pointer_focus
    }

    /// Position of the pointer in the global logical space
    pub fn pointer_location(&self) -> Point<f64, Logical> {
        self.pointer_location
    }

    /// Drag'n'Drop state of the seat
    pub fn dnd(&self) -> &DndManager {
        &self.dnd
    }

    pub(crate) fn dnd_mut(&mut self) -> &mut DndManager {
        &mut self.dnd
    }

    pub(crate) fn initialize(&mut self) {
        self.initialized = true;
    }

    pub(crate) fn uninitialize(&mut self) {
        self.initialized = false;
        self.keyboard_focus = None;
        self.keyboard_grab = None;
        self.pointer_focus = None;
        self.touch_focus.clear();
        self.dnd = DndManager::default();
    }

    /// Whether the seat was initialized by a started compositor
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Compositor {
    /// Give the keyboard focus to a surface, sending leave and enter events
    pub fn set_keyboard_focus(&mut self, surface: Option<SurfaceId>) {
        let previous = self.seat.keyboard_focus;
        if previous == surface {
            return;
        }
        if let Some(previous) = previous {
            let serial = self.serials.next_serial();
            self.send_to_surface_client(previous, ClientEvent::KeyboardLeave { surface: previous, serial });
        }
        self.seat.keyboard_focus = surface.filter(|surface| self.surfaces.contains(*surface));
        if let Some(focus) = self.seat.keyboard_focus {
            let serial = self.serials.next_serial();
            self.send_to_surface_client(focus, ClientEvent::KeyboardEnter { surface: focus, serial });
        }
    }

    /// Give the keyboard grab, and thus the keyboard focus, to a surface
    pub fn set_keyboard_grab(&mut self, surface: Option<SurfaceId>) {
        self.seat.set_keyboard_grab(surface);
        if surface.is_some() {
            self.set_keyboard_focus(surface);
        }
    }

    /// Topmost mapped surface under a point of the global logical space
    pub fn surface_at(&self, location: Point<f64, Logical>) -> Option<SurfaceId> {
        self.surfaces
            .stacking_order()
            .iter()
            .rev()
            .copied()
            .find(|id| {
                self.surfaces.get(*id).is_some_and(|data| {
                    data.is_mapped()
                        && !matches!(data.role(), Some(Role::Cursor) | Some(Role::DndIcon))
                        && data.geometry().to_f64().contains(location)
                })
            })
    }

    pub(crate) fn set_pointer_focus(&mut self, surface: Option<SurfaceId>) {
        let previous = self.seat.pointer_focus;
        if previous == surface {
            return;
        }
        if let Some(previous) = previous {
            let serial = self.serials.next_serial();
            self.send_to_surface_client(previous, ClientEvent::PointerLeave { surface: previous, serial });
        }
        self.seat.pointer_focus = surface;
        if let Some(focus) = surface {
            let serial = self.serials.next_serial();
            let location = self.seat.pointer_location
                - self
                    .surfaces
                    .get(focus)
                    .map(|data| data.position().to_f64())
                    .unwrap_or_default();
            self.send_to_surface_client(
                focus,
                ClientEvent::PointerEnter {
                    surface: focus,
                    serial,
                    location,
                },
            );
        }
        self.seat.dnd.set_focus(surface);
    }

    /// Route an input event to the focused clients
    pub fn dispatch_input_event(&mut self, event: InputEvent) {
        trace!(?event, "Input event");
        match event {
            InputEvent::Keyboard { key, state, time } => {
                let Some(target) = self.seat.keyboard_grab.or(self.seat.keyboard_focus) else {
                    return;
                };
                let serial = self.serials.next_serial();
                self.record_surface_event(target, serial, event);
                self.send_to_surface_client(
                    target,
                    ClientEvent::Key {
                        serial,
                        key,
                        state,
                        time,
                    },
                );
            }
            InputEvent::PointerMotion { location, .. } => {
                self.seat.pointer_location = location;
                self.cursor.set_position(location);
                let focus = self.surface_at(location);
                self.set_pointer_focus(focus);
            }
            InputEvent::PointerButton { button, state, time } => {
                if state == ButtonState::Released && self.seat.dnd.state() == DndState::Dragging {
                    self.drop_dnd();
                    return;
                }
                let focus = self.seat.pointer_focus;
                if state == ButtonState::Pressed {
                    self.dismiss_popups_outside(focus);
                }
                let Some(focus) = focus else {
                    return;
                };
                let serial = self.serials.next_serial();
                self.record_surface_event(focus, serial, event);
                self.send_to_surface_client(
                    focus,
                    ClientEvent::PointerButton {
                        serial,
                        button,
                        state,
                        time,
                    },
                );
                if state == ButtonState::Pressed && self.seat.keyboard_grab.is_none() {
                    self.set_keyboard_focus(Some(focus));
                }
            }
            InputEvent::TouchDown { slot, location, .. } => {
                let Some(focus) = self.surface_at(location) else {
                    return;
                };
                self.seat.touch_focus.retain(|(s, _)| *s != slot);
                self.seat.touch_focus.push((slot, focus));
                let serial = self.serials.next_serial();
                self.record_surface_event(focus, serial, event);
                self.send_to_surface_client(
                    focus,
                    ClientEvent::TouchDown {
                        surface: focus,
                        serial,
                        slot,
                    },
                );
            }
            InputEvent::TouchUp { slot, .. } => {
                let Some(index) = self.seat.touch_focus.iter().position(|(s, _)| *s == slot) else {
                    return;
                };
                let (_, focus) = self.seat.touch_focus.remove(index);
                let serial = self.serials.next_serial();
                self.record_surface_event(focus, serial, event);
                self.send_to_surface_client(focus, ClientEvent::TouchUp { serial, slot });
            }
        }
    }

    fn record_surface_event(&mut self, surface: SurfaceId, serial: crate::utils::Serial, event: InputEvent) {
        if let Some(client) = self.surface_client(surface).and_then(|id| self.clients.get_mut(&id)) {
            client.record_event(serial, event);
        }
    }

    // A press outside of the grabbing popup chain dismisses the whole chain.
    fn dismiss_popups_outside(&mut self, focus: Option<SurfaceId>) {
        let Some(grab) = self.seat.keyboard_grab else {
            return;
        };
        let Some(root) = self.root_popup_of(grab) else {
            return;
        };
        let root_surface = self.shell.popup(root).and_then(|popup| popup.surface());
        let inside = focus
            .zip(root_surface)
            .is_some_and(|(focus, root_surface)| self.surfaces.is_ancestor(root_surface, focus));
        if !inside {
            self.dismiss_popup(root);
        }
    }

    fn drop_dnd(&mut self) {
        match self.seat.dnd.drop_data() {
            Some(destination) => {
                self.send_to_surface_client(destination, ClientEvent::DndDrop { surface: destination });
            }
            None => self.notify_dnd_cancelled(),
        }
    }

    pub(crate) fn notify_dnd_cancelled(&mut self) {
        if let Some(source) = self.seat.dnd.source().and_then(|id| self.clients.get_mut(&id)) {
            source.send(ClientEvent::DataSourceCancelled);
        }
    }

    /// Start a drag from `origin`, quoting the serial of the pointer button press
    ///
    /// Returns `false` if the serial is unknown to the client or a drag is already
    /// in progress.
    pub fn start_drag(&mut self, origin: SurfaceId, icon: Option<SurfaceId>, serial: crate::utils::Serial) -> bool {
        let Some(client) = self.surface_client(origin) else {
            return false;
        };
        let valid = self
            .clients
            .get(&client)
            .and_then(|client| client.find_event_by_serial(serial))
            .is_some_and(|recorded| matches!(recorded.event, InputEvent::PointerButton { .. } | InputEvent::TouchDown { .. }));
        if !valid {
            debug!(%origin, "Drag request with invalid serial");
            return false;
        }
        if let Some(icon) = icon {
            if let Some(data) = self.surfaces.get_mut(icon) {
                if let Err(err) = data.role.set_pending(Role::DndIcon) {
                    self.post_role_error(icon, err);
                    return false;
                }
            }
        }
        self.seat.dnd.start(client, origin, icon)
    }

    /// The drop destination requested the data
    pub fn dnd_data_requested(&mut self) -> bool {
        self.seat.dnd.data_requested()
    }

    /// Cancel the current Drag'n'Drop operation
    pub fn cancel_dnd(&mut self) {
        if self.seat.dnd.is_active() {
            self.notify_dnd_cancelled();
            self.seat.dnd.cancel();
        }
    }
}
