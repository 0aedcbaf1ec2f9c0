//! Client connections
//!
//! Every connection to the compositor is represented by a [`Client`]. Besides the
//! globals it bound, a client keeps:
//!
//! - the history of the last input events it was sent, so that requests quoting a
//!   serial (`xdg_popup.grab`, `wl_data_device.start_drag`, ...) can be validated
//!   with [`Client::find_event_by_serial`];
//! - the queue of events waiting to be written by the transport on the next flush;
//! - a sticky protocol error: once a client violated the protocol every further event
//!   is dropped and the transport disconnects it on the next flush.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::{
    output::OutputId,
    utils::{Logical, Point, Rectangle, Serial, Size},
    wayland::{
        compositor::SurfaceId,
        global::GlobalId,
        seat::{ButtonState, InputEvent, KeyState},
        shell::xdg::{PopupId, ToplevelId},
    },
    UserData,
};

crate::utils::ids::handle_id!(
    /// Identifier of a client connection
    ClientId
);

/// A fatal protocol error posted on a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    /// Interface of the object the error is posted on
    pub interface: &'static str,
    /// Interface specific error code
    pub code: u32,
    /// Human readable description
    pub message: String,
}

/// An event queued for a client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A global was advertised
    Global {
        /// The global
        global: GlobalId,
        /// Its interface
        interface: &'static str,
        /// Its version
        version: u32,
    },
    /// A global was removed
    GlobalRemove {
        /// The removed global
        global: GlobalId,
    },
    /// A surface entered an output
    OutputEnter {
        /// The surface
        surface: SurfaceId,
        /// The output
        output: OutputId,
    },
    /// A surface left an output
    OutputLeave {
        /// The surface
        surface: SurfaceId,
        /// The output
        output: OutputId,
    },
    /// `xdg_surface.configure`
    XdgSurfaceConfigure {
        /// The surface being configured
        surface: SurfaceId,
        /// Serial to acknowledge
        serial: Serial,
    },
    /// `xdg_toplevel.configure`
    ToplevelConfigure {
        /// The toplevel
        toplevel: ToplevelId,
        /// Suggested size, `0x0` lets the client decide
        size: Size<i32, Logical>,
        /// Whether the toplevel is activated
        activated: bool,
    },
    /// `xdg_toplevel.close`
    ToplevelClose {
        /// The toplevel
        toplevel: ToplevelId,
    },
    /// `xdg_popup.configure`
    PopupConfigure {
        /// The popup
        popup: PopupId,
        /// Placement relative to the parent
        geometry: Rectangle<i32, Logical>,
    },
    /// `xdg_popup.repositioned`
    PopupRepositioned {
        /// The popup
        popup: PopupId,
        /// Token of the reposition request
        token: u32,
    },
    /// `xdg_popup.popup_done`
    PopupDone {
        /// The dismissed popup
        popup: PopupId,
    },
    /// `wl_keyboard.enter`
    KeyboardEnter {
        /// Focused surface
        surface: SurfaceId,
        /// Event serial
        serial: Serial,
    },
    /// `wl_keyboard.leave`
    KeyboardLeave {
        /// Surface losing the focus
        surface: SurfaceId,
        /// Event serial
        serial: Serial,
    },
    /// `wl_keyboard.key`
    Key {
        /// Event serial
        serial: Serial,
        /// Key code
        key: u32,
        /// Key state
        state: KeyState,
        /// Timestamp in milliseconds
        time: u32,
    },
    /// `wl_pointer.enter`
    PointerEnter {
        /// Hovered surface
        surface: SurfaceId,
        /// Event serial
        serial: Serial,
        /// Position relative to the surface
        location: Point<f64, Logical>,
    },
    /// `wl_pointer.leave`
    PointerLeave {
        /// Surface the pointer left
        surface: SurfaceId,
        /// Event serial
        serial: Serial,
    },
    /// `wl_pointer.button`
    PointerButton {
        /// Event serial
        serial: Serial,
        /// Button code
        button: u32,
        /// Button state
        state: ButtonState,
        /// Timestamp in milliseconds
        time: u32,
    },
    /// `wl_touch.down`
    TouchDown {
        /// Touched surface
        surface: SurfaceId,
        /// Event serial
        serial: Serial,
        /// Touch point
        slot: i32,
    },
    /// `wl_touch.up`
    TouchUp {
        /// Event serial
        serial: Serial,
        /// Touch point
        slot: i32,
    },
    /// `wl_data_device.drop`
    DndDrop {
        /// Surface the data was dropped on
        surface: SurfaceId,
    },
    /// `wl_data_source.cancelled`
    DataSourceCancelled,
    /// The client is disconnected with this error
    ProtocolError(ProtocolError),
}

/// An input event sent to a client, together with its serial
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Serial the event was sent with
    pub serial: Serial,
    /// The event
    pub event: InputEvent,
}

/// A client connection
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    history: VecDeque<RecordedEvent>,
    history_capacity: usize,
    advertised_globals: Vec<GlobalId>,
    bound_globals: Vec<GlobalId>,
    output_globals: Vec<OutputId>,
    queue: Vec<ClientEvent>,
    error: Option<ProtocolError>,
    pub(crate) wm_base_version: u32,
    pub(crate) user_data: Option<UserData>,
}

impl Client {
    pub(crate) fn new(id: ClientId, history_capacity: usize, wm_base_version: u32) -> Client {
        Client {
            id,
            history: VecDeque::with_capacity(history_capacity),
            history_capacity: history_capacity.max(1),
            advertised_globals: Vec::new(),
            bound_globals: Vec::new(),
            output_globals: Vec::new(),
            queue: Vec::new(),
            error: None,
            wm_base_version,
            user_data: None,
        }
    }

    /// Identifier of the client
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Version of `xdg_wm_base` bound by the client
    pub fn wm_base_version(&self) -> u32 {
        self.wm_base_version
    }

    /// Data attached by [`CompositorHandler::create_object_request`](crate::compositor::CompositorHandler::create_object_request)
    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    pub(crate) fn record_event(&mut self, serial: Serial, event: InputEvent) {
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(RecordedEvent { serial, event });
    }

    /// Find one of the last input events sent to this client by its serial
    pub fn find_event_by_serial(&self, serial: Serial) -> Option<&RecordedEvent> {
        self.history.iter().rev().find(|recorded| recorded.serial == serial)
    }

    /// Whether the global was advertised to the client
    pub fn was_advertised(&self, global: GlobalId) -> bool {
        self.advertised_globals.contains(&global)
    }

    pub(crate) fn advertise_global(&mut self, global: GlobalId, interface: &'static str, version: u32) {
        self.advertised_globals.push(global);
        self.send(ClientEvent::Global {
            global,
            interface,
            version,
        });
    }

    /// Tell the client a global is gone, returns `false` if it was never advertised
    pub(crate) fn retract_global(&mut self, global: GlobalId) -> bool {
        let Some(index) = self.advertised_globals.iter().position(|advertised| *advertised == global) else {
            return false;
        };
        self.advertised_globals.remove(index);
        self.send(ClientEvent::GlobalRemove { global });
        true
    }

    /// Globals bound by the client
    pub fn bound_globals(&self) -> &[GlobalId] {
        &self.bound_globals
    }

    pub(crate) fn bind_global(&mut self, global: GlobalId) {
        if !self.bound_globals.contains(&global) {
            self.bound_globals.push(global);
        }
    }

    pub(crate) fn unbind_global(&mut self, global: GlobalId) {
        self.bound_globals.retain(|bound| *bound != global);
    }

    /// Outputs whose global the client bound
    pub fn output_globals(&self) -> &[OutputId] {
        &self.output_globals
    }

    pub(crate) fn bind_output(&mut self, output: OutputId) {
        if !self.output_globals.contains(&output) {
            self.output_globals.push(output);
        }
    }

    /// Remove the binding of an output global, returns `false` if there was none
    pub(crate) fn strip_output(&mut self, output: OutputId) -> bool {
        let len = self.output_globals.len();
        self.output_globals.retain(|bound| *bound != output);
        self.output_globals.len() != len
    }

    /// Queue an event for this client
    ///
    /// Events sent after a protocol error are dropped.
    pub fn send(&mut self, event: ClientEvent) {
        if self.error.is_some() {
            return;
        }
        self.queue.push(event);
    }

    /// Post a fatal protocol error, the client is disconnected on the next flush
    ///
    /// Only the first error is kept.
    pub fn post_error(&mut self, interface: &'static str, code: u32, message: impl Into<String>) {
        if self.error.is_some() {
            return;
        }
        let error = ProtocolError {
            interface,
            code,
            message: message.into(),
        };
        warn!(client = %self.id, interface, code, message = %error.message, "Protocol error");
        self.queue.push(ClientEvent::ProtocolError(error.clone()));
        self.error = Some(error);
    }

    /// The protocol error posted on this client, if any
    pub fn protocol_error(&self) -> Option<&ProtocolError> {
        self.error.as_ref()
    }

    /// Events waiting to be flushed
    pub fn pending_events(&self) -> &[ClientEvent] {
        &self.queue
    }

    pub(crate) fn take_events(&mut self) -> Vec<ClientEvent> {
        if !self.queue.is_empty() {
            debug!(client = %self.id, count = self.queue.len(), "Flushing client events");
        }
        std::mem::take(&mut self.queue)
    }
}
