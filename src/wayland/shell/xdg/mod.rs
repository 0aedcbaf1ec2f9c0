//! Shell surfaces of the `xdg_shell` protocol
//!
//! `xdg_shell` gives two roles to surfaces: toplevels (windows) and popups (menus,
//! tooltips, dropdowns). The role objects are kept in the [`XdgShellState`] owned by
//! the compositor, surfaces only reference them through [`ToplevelId`] and
//! [`PopupId`].
//!
//! Shell surfaces follow a configure/acknowledge handshake: the first commit of the
//! surface must not carry a buffer, the compositor answers it with a configure
//! sequence ending with `xdg_surface.configure(serial)`, and the client must
//! acknowledge that serial before it can attach a buffer. The surface is mapped on
//! the first commit with a buffer after the acknowledgement.
//!
//! Popup specific logic lives in the `popup` submodule, placement logic in
//! [`positioner`].

use indexmap::IndexMap;
use tracing::{debug, trace};
use wayland_protocols::xdg::shell::server::{xdg_surface, xdg_wm_base};

use crate::{
    compositor::{Compositor, ObjectRef},
    utils::{DeadResource, Logical, Serial, Size},
    wayland::{
        client::ClientEvent,
        compositor::{roles::AlreadyHasRole, roles::Role, SurfaceId},
    },
    UserData,
};

mod popup;
pub mod positioner;

pub use self::popup::{PopupFlags, PopupRole, PopupState};
pub use self::positioner::Positioner;

crate::utils::ids::handle_id!(
    /// Identifier of an `xdg_popup`
    PopupId
);

crate::utils::ids::handle_id!(
    /// Identifier of an `xdg_toplevel`
    ToplevelId
);

/// A shell role object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellSurface {
    /// A popup
    Popup(PopupId),
    /// A toplevel
    Toplevel(ToplevelId),
}

/// Errors of shell requests
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// The object no longer exists
    #[error(transparent)]
    DeadResource(#[from] DeadResource),
    /// The surface already has a role
    #[error(transparent)]
    AlreadyHasRole(#[from] AlreadyHasRole),
    /// The positioner is incomplete
    #[error("The positioner has a zero sized rectangle or anchor rectangle")]
    InvalidPositioner,
    /// The parent of a popup is not a shell surface
    #[error("The parent of a popup must be an xdg_toplevel or an xdg_popup")]
    InvalidParent,
    /// A buffer was committed before the surface was configured
    #[error("A buffer was committed before the configure was acknowledged")]
    UnconfiguredBuffer,
    /// An acknowledged serial was never sent
    #[error("Serial {0:?} was never sent to this surface")]
    InvalidSerial(Serial),
    /// A popup was mapped or destroyed out of order
    #[error("Only the topmost popup may be mapped or destroyed")]
    NotTheTopmostPopup,
}

/// Lifecycle of a toplevel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToplevelState {
    /// Waiting for the initial commit
    #[default]
    Created,
    /// The initial configure was sent, waiting for its acknowledgement
    PendingConfigure,
    /// A configure was acknowledged
    Configured,
    /// The toplevel is displayed
    Mapped,
}

/// The `xdg_toplevel` role object
#[derive(Debug)]
pub struct ToplevelRole {
    id: ToplevelId,
    pub(crate) surface: Option<SurfaceId>,
    state: ToplevelState,
    size: Size<i32, Logical>,
    activated: bool,
    last_configure: Option<Serial>,
    pub(crate) user_data: Option<UserData>,
}

impl ToplevelRole {
    /// Identifier of the toplevel
    pub fn id(&self) -> ToplevelId {
        self.id
    }

    /// The surface of the toplevel, `None` once it was destroyed
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    /// Lifecycle state
    pub fn state(&self) -> ToplevelState {
        self.state
    }

    /// Size suggested by the last configure, `0x0` lets the client decide
    pub fn size(&self) -> Size<i32, Logical> {
        self.size
    }

    /// Whether the last configure activated the toplevel
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Data attached by the host
    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }
}

/// The shell role objects of the compositor
#[derive(Debug, Default)]
pub struct XdgShellState {
    pub(crate) popups: IndexMap<PopupId, PopupRole>,
    toplevels: IndexMap<ToplevelId, ToplevelRole>,
}

impl XdgShellState {
    /// Look up a popup
    pub fn popup(&self, popup: PopupId) -> Option<&PopupRole> {
        self.popups.get(&popup)
    }

    /// Live popups, in creation order
    pub fn popups(&self) -> impl Iterator<Item = &PopupRole> {
        self.popups.values()
    }

    /// Look up a toplevel
    pub fn toplevel(&self, toplevel: ToplevelId) -> Option<&ToplevelRole> {
        self.toplevels.get(&toplevel)
    }

    /// Live toplevels, in creation order
    pub fn toplevels(&self) -> impl Iterator<Item = &ToplevelRole> {
        self.toplevels.values()
    }

    pub(crate) fn popup_mut(&mut self, popup: PopupId) -> Option<&mut PopupRole> {
        self.popups.get_mut(&popup)
    }

    /// Clears the back-reference of a role object whose surface died
    pub(crate) fn forget_surface(&mut self, object: ShellSurface) {
        match object {
            ShellSurface::Popup(popup) => {
                if let Some(popup) = self.popups.get_mut(&popup) {
                    popup.surface = None;
                }
            }
            ShellSurface::Toplevel(toplevel) => {
                if let Some(toplevel) = self.toplevels.get_mut(&toplevel) {
                    toplevel.surface = None;
                }
            }
        }
    }
}

impl Compositor {
    /// The shell role objects
    pub fn shell(&self) -> &XdgShellState {
        &self.shell
    }

    /// The shell role object of a surface
    pub fn shell_surface_of(&self, surface: SurfaceId) -> Option<ShellSurface> {
        match self.surfaces.get(surface)?.role()? {
            Role::Popup(popup) => Some(ShellSurface::Popup(*popup)),
            Role::Toplevel(toplevel) => Some(ShellSurface::Toplevel(*toplevel)),
            _ => None,
        }
    }

    pub(crate) fn post_shell_error(&mut self, surface: SurfaceId, err: &ShellError) {
        let (interface, code) = match err {
            ShellError::AlreadyHasRole(_) => ("xdg_wm_base", xdg_wm_base::Error::Role as u32),
            ShellError::InvalidPositioner => ("xdg_wm_base", xdg_wm_base::Error::InvalidPositioner as u32),
            ShellError::InvalidParent => ("xdg_wm_base", xdg_wm_base::Error::InvalidPopupParent as u32),
            ShellError::NotTheTopmostPopup => ("xdg_wm_base", xdg_wm_base::Error::NotTheTopmostPopup as u32),
            ShellError::UnconfiguredBuffer => ("xdg_surface", xdg_surface::Error::UnconfiguredBuffer as u32),
            ShellError::InvalidSerial(_) => ("xdg_surface", xdg_surface::Error::InvalidSerial as u32),
            ShellError::DeadResource(_) => return,
        };
        let message = err.to_string();
        self.post_error_on_surface_client(surface, interface, code, &message);
    }

    /// Give the toplevel role to a surface
    pub fn get_toplevel(&mut self, surface: SurfaceId) -> Result<ToplevelId, ShellError> {
        self.get_toplevel_with_id(surface, ToplevelId::next())
    }

    pub(crate) fn get_toplevel_with_id(&mut self, surface: SurfaceId, id: ToplevelId) -> Result<ToplevelId, ShellError> {
        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        if let Err(err) = data.role.set_pending(Role::Toplevel(id)) {
            let err = ShellError::from(err);
            self.post_shell_error(surface, &err);
            return Err(err);
        }
        let user_data = self.with_handler(|handler, _| handler.create_object_request(ObjectRef::Toplevel(id)));
        self.shell.toplevels.insert(
            id,
            ToplevelRole {
                id,
                surface: Some(surface),
                state: ToplevelState::Created,
                size: Size::default(),
                activated: false,
                last_configure: None,
                user_data,
            },
        );
        debug!(toplevel = %id, %surface, "Toplevel created");
        Ok(id)
    }

    pub(crate) fn commit_toplevel(&mut self, surface: SurfaceId, toplevel: ToplevelId, first_commit: bool) {
        let has_buffer = self.surfaces.get(surface).is_some_and(|data| data.has_buffer());
        let Some(state) = self.shell.toplevels.get(&toplevel).map(ToplevelRole::state) else {
            return;
        };

        if first_commit || state == ToplevelState::Created {
            if has_buffer {
                self.post_shell_error(surface, &ShellError::UnconfiguredBuffer);
                return;
            }
            self.configure_toplevel(toplevel, Size::default(), false);
            return;
        }

        match (state, has_buffer) {
            (ToplevelState::PendingConfigure, true) => {
                self.post_shell_error(surface, &ShellError::UnconfiguredBuffer);
            }
            (ToplevelState::Configured, true) => {
                if let Some(role) = self.shell.toplevels.get_mut(&toplevel) {
                    role.state = ToplevelState::Mapped;
                }
                self.set_mapped(surface, true);
            }
            (ToplevelState::Mapped, false) => {
                if let Some(role) = self.shell.toplevels.get_mut(&toplevel) {
                    role.state = ToplevelState::Configured;
                }
                self.set_mapped(surface, false);
            }
            _ => {}
        }
    }

    /// Send a configure sequence to a toplevel
    ///
    /// Returns the serial the client has to acknowledge, or `None` if the toplevel
    /// has no surface anymore.
    pub fn configure_toplevel(&mut self, toplevel: ToplevelId, size: Size<i32, Logical>, activated: bool) -> Option<Serial> {
        let serial = self.serials.next_serial();
        let role = self.shell.toplevels.get_mut(&toplevel)?;
        let surface = role.surface?;
        role.size = size;
        role.activated = activated;
        role.last_configure = Some(serial);
        if role.state == ToplevelState::Created {
            role.state = ToplevelState::PendingConfigure;
        }
        trace!(%toplevel, ?size, activated, ?serial, "Configuring toplevel");
        self.send_to_surface_client(
            surface,
            ClientEvent::ToplevelConfigure {
                toplevel,
                size,
                activated,
            },
        );
        self.send_to_surface_client(surface, ClientEvent::XdgSurfaceConfigure { surface, serial });
        Some(serial)
    }

    /// Ask a toplevel to close
    pub fn send_toplevel_close(&mut self, toplevel: ToplevelId) {
        if let Some(surface) = self.shell.toplevels.get(&toplevel).and_then(ToplevelRole::surface) {
            self.send_to_surface_client(surface, ClientEvent::ToplevelClose { toplevel });
        }
    }

    /// Destroy an `xdg_toplevel`
    pub fn destroy_toplevel(&mut self, toplevel: ToplevelId) {
        if !self.shell.toplevels.contains_key(&toplevel) {
            return;
        }
        self.with_handler(|handler, compositor| {
            handler.on_anticipated_object_destruction(compositor, ObjectRef::Toplevel(toplevel))
        });
        if let Some(role) = self.shell.toplevels.shift_remove(&toplevel) {
            if let Some(surface) = role.surface {
                self.set_mapped(surface, false);
            }
        }
        debug!(%toplevel, "Toplevel destroyed");
    }

    /// Acknowledge a configure sent to a shell surface
    pub fn ack_configure(&mut self, surface: SurfaceId, serial: Serial) -> Result<(), ShellError> {
        let result = match self.shell_surface_of(surface) {
            Some(ShellSurface::Toplevel(toplevel)) => {
                let role = self.shell.toplevels.get_mut(&toplevel).ok_or(DeadResource)?;
                match role.last_configure {
                    Some(last) if last.is_no_older_than(&serial) => {
                        if role.state == ToplevelState::PendingConfigure {
                            role.state = ToplevelState::Configured;
                        }
                        Ok(())
                    }
                    _ => Err(ShellError::InvalidSerial(serial)),
                }
            }
            Some(ShellSurface::Popup(popup)) => self.ack_popup_configure(popup, serial),
            None => return Err(DeadResource.into()),
        };
        if let Err(err) = &result {
            self.post_shell_error(surface, err);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::test::compositor_with_client;

    #[test]
    fn toplevel_handshake() {
        let (mut compositor, client) = compositor_with_client();
        let surface = compositor.create_surface(client).unwrap();
        let toplevel = compositor.get_toplevel(surface).unwrap();

        compositor.commit(surface).unwrap();
        let state = compositor.shell().toplevel(toplevel).unwrap().state();
        assert_eq!(state, ToplevelState::PendingConfigure);
        let serial = compositor
            .client(client)
            .unwrap()
            .pending_events()
            .iter()
            .find_map(|event| match event {
                ClientEvent::XdgSurfaceConfigure { serial, .. } => Some(*serial),
                _ => None,
            })
            .unwrap();

        compositor.ack_configure(surface, serial).unwrap();
        compositor.attach(surface, Some((100, 100).into())).unwrap();
        compositor.commit(surface).unwrap();
        assert!(compositor.surface(surface).unwrap().is_mapped());

        compositor.attach(surface, None).unwrap();
        compositor.commit(surface).unwrap();
        assert!(!compositor.surface(surface).unwrap().is_mapped());
    }

    #[test]
    fn buffer_before_configure_is_an_error() {
        let (mut compositor, client) = compositor_with_client();
        let surface = compositor.create_surface(client).unwrap();
        compositor.get_toplevel(surface).unwrap();
        compositor.attach(surface, Some((10, 10).into())).unwrap();
        compositor.commit(surface).unwrap();

        let error = compositor.client(client).unwrap().protocol_error().unwrap();
        assert_eq!(error.interface, "xdg_surface");
        assert_eq!(error.code, xdg_surface::Error::UnconfiguredBuffer as u32);
        assert!(!compositor.surface(surface).unwrap().is_mapped());
    }

    #[test]
    fn second_role_is_refused() {
        let (mut compositor, client) = compositor_with_client();
        let surface = compositor.create_surface(client).unwrap();
        compositor.get_toplevel(surface).unwrap();
        assert!(matches!(
            compositor.get_toplevel(surface),
            Err(ShellError::AlreadyHasRole(_))
        ));
        let error = compositor.client(client).unwrap().protocol_error().unwrap();
        assert_eq!(error.code, xdg_wm_base::Error::Role as u32);
    }

    #[test]
    fn destroyed_surface_clears_back_reference() {
        let (mut compositor, client) = compositor_with_client();
        let surface = compositor.create_surface(client).unwrap();
        let toplevel = compositor.get_toplevel(surface).unwrap();
        compositor.destroy_surface(surface);
        assert_eq!(compositor.shell().toplevel(toplevel).unwrap().surface(), None);
        assert!(compositor.configure_toplevel(toplevel, Size::default(), true).is_none());
    }
}
