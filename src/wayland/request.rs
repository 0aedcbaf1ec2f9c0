//! Typed client requests
//!
//! Transports decode the wire protocol into [`Request`] values, which the compositor
//! applies with [`Compositor::handle_request`]. Objects created by a request carry the
//! identifier chosen by the transport, so that later requests can reference them.
//!
//! Requests on objects of another client are protocol errors, as are requests on
//! objects that do not exist. Requests referencing an object that died in the
//! meantime are ignored, the client could not know yet.

use tracing::{debug, trace};

use crate::{
    compositor::Compositor,
    utils::{Buffer, Logical, Point, Rectangle, Serial, Size},
    wayland::{
        client::ClientId,
        compositor::SurfaceId,
        global::{GlobalId, GlobalKind},
        shell::xdg::{PopupId, Positioner, ShellSurface, ToplevelId},
    },
};

// wl_display.error.invalid_object
const INVALID_OBJECT: u32 = 0;

/// A request sent by a client
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `wl_compositor.create_surface`
    CreateSurface {
        /// Identifier of the new surface
        id: SurfaceId,
    },
    /// `wl_surface.attach`, `None` detaches the buffer
    Attach {
        /// The surface
        surface: SurfaceId,
        /// Size of the attached buffer
        buffer: Option<Size<i32, Buffer>>,
    },
    /// `wl_surface.damage_buffer`
    Damage {
        /// The surface
        surface: SurfaceId,
        /// Damaged area
        damage: Rectangle<i32, Buffer>,
    },
    /// `wl_surface.commit`
    Commit {
        /// The surface
        surface: SurfaceId,
    },
    /// `wl_surface.destroy`
    DestroySurface {
        /// The surface
        surface: SurfaceId,
    },
    /// `wl_subcompositor.get_subsurface`
    GetSubsurface {
        /// The surface becoming a subsurface
        surface: SurfaceId,
        /// Its parent
        parent: SurfaceId,
    },
    /// `wl_subsurface.set_position`
    SetSubsurfacePosition {
        /// The subsurface
        surface: SurfaceId,
        /// Position relative to the parent
        location: Point<i32, Logical>,
    },
    /// `wl_pointer.set_cursor`
    SetCursor {
        /// Cursor image, `None` hides the cursor
        surface: Option<SurfaceId>,
        /// Hotspot of the image
        hotspot: Point<i32, Logical>,
    },
    /// `xdg_surface.get_toplevel`
    GetToplevel {
        /// Identifier of the new toplevel
        id: ToplevelId,
        /// The surface
        surface: SurfaceId,
    },
    /// `xdg_toplevel.destroy`
    ToplevelDestroy {
        /// The toplevel
        toplevel: ToplevelId,
    },
    /// `xdg_surface.get_popup`
    GetPopup {
        /// Identifier of the new popup
        id: PopupId,
        /// The surface
        surface: SurfaceId,
        /// Parent shell surface
        parent: SurfaceId,
        /// Placement rules
        positioner: Positioner,
    },
    /// `xdg_popup.grab`
    PopupGrab {
        /// The popup
        popup: PopupId,
        /// Serial of the input event triggering the grab
        serial: Serial,
    },
    /// `xdg_popup.reposition`
    PopupReposition {
        /// The popup
        popup: PopupId,
        /// New placement rules
        positioner: Positioner,
        /// Token echoed by `xdg_popup.repositioned`
        token: u32,
    },
    /// `xdg_popup.destroy`
    PopupDestroy {
        /// The popup
        popup: PopupId,
    },
    /// `xdg_surface.ack_configure`
    AckConfigure {
        /// The surface
        surface: SurfaceId,
        /// Acknowledged serial
        serial: Serial,
    },
    /// `wl_registry.bind`
    BindGlobal {
        /// The global
        global: GlobalId,
        /// Requested version
        version: u32,
    },
    /// `wl_data_device.start_drag`
    StartDrag {
        /// Surface the drag starts from
        origin: SurfaceId,
        /// Icon following the pointer
        icon: Option<SurfaceId>,
        /// Serial of the button press starting the drag
        serial: Serial,
    },
    /// `wl_data_offer.receive` on a dropped offer
    DataReceive,
}

impl Compositor {
    /// Apply a request sent by `client`
    pub fn handle_request(&mut self, client: ClientId, request: Request) {
        if !self.clients.contains_key(&client) {
            debug!(%client, "Request from an unknown client");
            return;
        }
        trace!(%client, ?request, "Client request");
        match request {
            Request::CreateSurface { id } => {
                if self.surfaces.contains(id) {
                    self.invalid_object(client, "wl_compositor", "surface id already in use");
                } else if let Err(err) = self.create_surface_with_id(client, id) {
                    debug!(%client, ?err, "Failed to create surface");
                }
            }
            Request::Attach { surface, buffer } => {
                if self.owns_surface(client, surface) {
                    let _ = self.attach(surface, buffer);
                }
            }
            Request::Damage { surface, damage } => {
                if self.owns_surface(client, surface) {
                    let _ = self.damage_surface(surface, damage);
                }
            }
            Request::Commit { surface } => {
                if self.owns_surface(client, surface) {
                    let _ = self.commit(surface);
                }
            }
            Request::DestroySurface { surface } => {
                if self.owns_surface(client, surface) {
                    self.destroy_surface(surface);
                }
            }
            Request::GetSubsurface { surface, parent } => {
                if self.owns_surface(client, surface) && self.owns_surface(client, parent) {
                    if let Err(err) = self.get_subsurface(surface, parent) {
                        debug!(%surface, %parent, %err, "get_subsurface refused");
                    }
                }
            }
            Request::SetSubsurfacePosition { surface, location } => {
                if self.owns_surface(client, surface) {
                    let _ = self.set_subsurface_location(surface, location);
                }
            }
            Request::SetCursor { surface, hotspot } => {
                if surface.map_or(true, |surface| self.owns_surface(client, surface)) {
                    if let Err(err) = self.set_cursor_surface(surface, hotspot) {
                        debug!(?surface, %err, "set_cursor refused");
                    }
                }
            }
            Request::GetToplevel { id, surface } => {
                if self.owns_surface(client, surface) {
                    if let Err(err) = self.get_toplevel_with_id(surface, id) {
                        debug!(%surface, %err, "get_toplevel refused");
                    }
                }
            }
            Request::ToplevelDestroy { toplevel } => {
                if self.owns_shell_surface(client, ShellSurface::Toplevel(toplevel)) {
                    self.destroy_toplevel(toplevel);
                }
            }
            Request::GetPopup {
                id,
                surface,
                parent,
                positioner,
            } => {
                if self.owns_surface(client, surface) && self.owns_surface(client, parent) {
                    if let Err(err) = self.get_popup_with_id(surface, parent, positioner, id) {
                        debug!(%surface, %err, "get_popup refused");
                    }
                }
            }
            Request::PopupGrab { popup, serial } => {
                if self.owns_shell_surface(client, ShellSurface::Popup(popup)) {
                    let _ = self.grab_popup(popup, serial);
                }
            }
            Request::PopupReposition {
                popup,
                positioner,
                token,
            } => {
                if self.owns_shell_surface(client, ShellSurface::Popup(popup)) {
                    let _ = self.reposition_popup(popup, positioner, token);
                }
            }
            Request::PopupDestroy { popup } => {
                if self.owns_shell_surface(client, ShellSurface::Popup(popup)) {
                    self.destroy_popup(popup);
                }
            }
            Request::AckConfigure { surface, serial } => {
                if self.owns_surface(client, surface) {
                    let _ = self.ack_configure(surface, serial);
                }
            }
            Request::BindGlobal { global, version } => self.bind_global(client, global, version),
            Request::StartDrag { origin, icon, serial } => {
                if self.owns_surface(client, origin) && icon.map_or(true, |icon| self.owns_surface(client, icon)) {
                    self.start_drag(origin, icon, serial);
                }
            }
            Request::DataReceive => {
                self.dnd_data_requested();
            }
        }
    }

    fn bind_global(&mut self, client: ClientId, global: GlobalId, version: u32) {
        // requests sent before the client got the removal notice
        if self.globals.is_retired(global) {
            trace!(%client, %global, "Ignoring bind of a removed global");
            return;
        }
        let Some((kind, max_version)) = self.globals.get(global).map(|g| (g.kind(), g.version())) else {
            self.invalid_object(client, "wl_registry", "unknown global");
            return;
        };
        if version == 0 || version > max_version {
            self.invalid_object(client, "wl_registry", "unsupported global version");
            return;
        }
        let allowed = self.with_handler(|handler, compositor| handler.globals_filter(compositor, client, global));
        if !allowed {
            self.invalid_object(client, "wl_registry", "global not advertised to this client");
            return;
        }
        let Some(data) = self.clients.get_mut(&client) else {
            return;
        };
        data.bind_global(global);
        match kind {
            GlobalKind::Output(output) => data.bind_output(output),
            GlobalKind::XdgWmBase => data.wm_base_version = version,
            _ => {}
        }
        debug!(%client, %global, interface = kind.interface(), version, "Global bound");
    }

    // Surfaces that died are silently skipped, surfaces of other clients or never
    // created are protocol errors
    fn owns_surface(&mut self, client: ClientId, surface: SurfaceId) -> bool {
        match self.surface_client(surface) {
            Some(owner) if owner == client => true,
            Some(_) => {
                self.invalid_object(client, "wl_surface", "surface of another client");
                false
            }
            None => false,
        }
    }

    fn owns_shell_surface(&mut self, client: ClientId, object: ShellSurface) -> bool {
        let surfaces = match object {
            ShellSurface::Popup(popup) => self
                .shell
                .popup(popup)
                .map(|popup| [popup.surface(), Some(popup.parent())]),
            ShellSurface::Toplevel(toplevel) => self
                .shell
                .toplevel(toplevel)
                .map(|toplevel| [toplevel.surface(), None]),
        };
        let Some(surfaces) = surfaces else {
            return false;
        };
        let owner = surfaces
            .into_iter()
            .flatten()
            .find_map(|surface| self.surface_client(surface));
        match owner {
            Some(owner) if owner != client => {
                self.invalid_object(client, "xdg_surface", "shell surface of another client");
                false
            }
            _ => true,
        }
    }

    fn invalid_object(&mut self, client: ClientId, interface: &'static str, message: &str) {
        if let Some(client) = self.clients.get_mut(&client) {
            client.post_error(interface, INVALID_OBJECT, message);
        }
    }
}
