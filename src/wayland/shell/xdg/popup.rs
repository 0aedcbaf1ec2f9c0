//! `xdg_popup` state machine
//!
//! A popup goes through `Created → PendingConfigure → Configured → Mapped`, and ends
//! either destroyed by its client or dismissed by the compositor. Configurations are
//! queued with [`Compositor::configure_popup`] while the popup accepts them, the
//! latest one wins, and are sent as a single `configure` + `xdg_surface.configure`
//! sequence, preceded by `repositioned` when answering a reposition request.
//!
//! Only the topmost popup of a chain may be mapped or destroyed, violations are
//! reported to the client as `xdg_wm_base.not_the_topmost_popup`. Among the popups of
//! a parent the topmost one is the most recently created one still alive: mapping an
//! older one is an error, whatever the state of the newer one.

use bitflags::bitflags;
use tracing::{debug, trace, warn};
use wayland_protocols::xdg::shell::server::xdg_popup;

use super::{PopupId, Positioner, ShellError};
use crate::{
    compositor::{Compositor, ObjectRef},
    utils::{DeadResource, Logical, Rectangle, Serial},
    wayland::{
        client::ClientEvent,
        compositor::{roles::Role, SurfaceId},
    },
    UserData,
};

bitflags! {
    /// Configuration flags of a popup
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PopupFlags: u8 {
        /// A reposition request is waiting for its configuration
        const HAS_PENDING_REPOSITION = 1;
        /// Configurations are accepted
        const CAN_BE_CONFIGURED = 1 << 1;
        /// A configuration is queued
        const HAS_CONFIGURATION_TO_SEND = 1 << 2;
        /// The popup was dismissed by the compositor
        const DISMISSED = 1 << 3;
    }
}

/// Lifecycle of a popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopupState {
    /// Waiting for the initial commit
    #[default]
    Created,
    /// A configure was sent, waiting for its acknowledgement
    PendingConfigure,
    /// A configure was acknowledged
    Configured,
    /// The popup is displayed
    Mapped,
    /// The popup was dismissed, it is inert until destroyed
    Dismissed,
}

/// The `xdg_popup` role object
#[derive(Debug)]
pub struct PopupRole {
    id: PopupId,
    pub(crate) surface: Option<SurfaceId>,
    parent: SurfaceId,
    positioner: Positioner,
    reposition_token: u32,
    flags: PopupFlags,
    pending_configuration: Option<Rectangle<i32, Logical>>,
    current: Rectangle<i32, Logical>,
    state: PopupState,
    version: u32,
    last_configure: Option<Serial>,
    pub(crate) user_data: Option<UserData>,
}

impl PopupRole {
    /// Identifier of the popup
    pub fn id(&self) -> PopupId {
        self.id
    }

    /// The surface of the popup, `None` once it was destroyed
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    /// Parent surface the popup is placed against
    pub fn parent(&self) -> SurfaceId {
        self.parent
    }

    /// Current positioner
    pub fn positioner(&self) -> &Positioner {
        &self.positioner
    }

    /// Token of the last reposition request
    pub fn reposition_token(&self) -> u32 {
        self.reposition_token
    }

    /// Configuration flags
    pub fn flags(&self) -> PopupFlags {
        self.flags
    }

    /// Queued configuration, not sent yet
    pub fn pending_configuration(&self) -> Option<Rectangle<i32, Logical>> {
        self.pending_configuration
    }

    /// Placement relative to the parent, as last sent to the client
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.current
    }

    /// Lifecycle state
    pub fn state(&self) -> PopupState {
        self.state
    }

    /// Version of the `xdg_wm_base` the popup was created from
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Data attached by the host
    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }
}

impl Compositor {
    /// Give the popup role to `surface`, placed against `parent`
    pub fn get_popup(&mut self, surface: SurfaceId, parent: SurfaceId, positioner: Positioner) -> Result<PopupId, ShellError> {
        self.get_popup_with_id(surface, parent, positioner, PopupId::next())
    }

    pub(crate) fn get_popup_with_id(
        &mut self,
        surface: SurfaceId,
        parent: SurfaceId,
        positioner: Positioner,
        id: PopupId,
    ) -> Result<PopupId, ShellError> {
        let client = self.surface_client(surface).ok_or(DeadResource)?;
        let parent_is_shell_surface = self.shell_surface_of(parent).is_some();
        let error = if !parent_is_shell_surface || self.surfaces.is_ancestor(surface, parent) {
            Some(ShellError::InvalidParent)
        } else if !positioner.is_valid() {
            Some(ShellError::InvalidPositioner)
        } else {
            None
        };
        if let Some(err) = error {
            self.post_shell_error(surface, &err);
            return Err(err);
        }

        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        if let Err(err) = data.role.set_pending(Role::Popup(id)) {
            let err = ShellError::from(err);
            self.post_shell_error(surface, &err);
            return Err(err);
        }
        if self.surfaces.set_parent(surface, parent).is_err() {
            return Err(ShellError::InvalidParent);
        }

        let version = self.clients.get(&client).map(|client| client.wm_base_version()).unwrap_or(1);
        let user_data = self.with_handler(|handler, _| handler.create_object_request(ObjectRef::Popup(id)));
        self.shell.popups.insert(
            id,
            PopupRole {
                id,
                surface: Some(surface),
                parent,
                positioner,
                reposition_token: 0,
                flags: PopupFlags::empty(),
                pending_configuration: None,
                current: Rectangle::default(),
                state: PopupState::Created,
                version,
                last_configure: None,
                user_data,
            },
        );
        debug!(popup = %id, %surface, %parent, version, "Popup created");
        Ok(id)
    }

    pub(crate) fn commit_popup(&mut self, surface: SurfaceId, popup: PopupId, first_commit: bool) {
        let has_buffer = self.surfaces.get(surface).is_some_and(|data| data.has_buffer());
        let Some(state) = self.shell.popup(popup).map(PopupRole::state) else {
            return;
        };

        if first_commit {
            if has_buffer {
                self.post_shell_error(surface, &ShellError::UnconfiguredBuffer);
                return;
            }
            if let Some(role) = self.shell.popup_mut(popup) {
                role.flags.insert(PopupFlags::CAN_BE_CONFIGURED);
            }
            self.request_popup_configuration(popup);
            return;
        }

        match (state, has_buffer) {
            (PopupState::Created | PopupState::PendingConfigure, true) => {
                self.post_shell_error(surface, &ShellError::UnconfiguredBuffer);
            }
            (PopupState::Configured, true) => {
                if let Some(sibling) = self.newer_sibling_popup(popup) {
                    debug!(%popup, %sibling, "Popup mapped below a newer sibling");
                    self.post_shell_error(surface, &ShellError::NotTheTopmostPopup);
                    return;
                }
                if let Some(role) = self.shell.popup_mut(popup) {
                    role.state = PopupState::Mapped;
                }
                self.update_popup_position(popup);
                self.set_mapped(surface, true);
            }
            (PopupState::Mapped, false) => {
                if let Some(role) = self.shell.popup_mut(popup) {
                    role.state = PopupState::Configured;
                }
                self.set_mapped(surface, false);
            }
            _ => {}
        }
    }

    // Runs the configure hook, falls back to the unconstrained placement and sends
    // the resulting configuration.
    fn request_popup_configuration(&mut self, popup: PopupId) {
        let Some(positioner) = self.shell.popup(popup).map(|role| role.positioner) else {
            return;
        };
        self.with_handler(|handler, compositor| handler.popup_configure_request(compositor, popup, positioner));
        let queued = self
            .shell
            .popup(popup)
            .is_some_and(|role| role.flags.contains(PopupFlags::HAS_CONFIGURATION_TO_SEND));
        if !queued {
            let rect = self.calculate_unconstrained_rect(popup, None);
            self.configure_popup(popup, rect);
        }
        self.send_popup_configuration(popup);
    }

    /// Queue a configuration for a popup
    ///
    /// The configuration replaces any queued one. Returns `false` if the popup does
    /// not accept configurations right now.
    pub fn configure_popup(&mut self, popup: PopupId, rect: Rectangle<i32, Logical>) -> bool {
        let Some(role) = self.shell.popup_mut(popup) else {
            return false;
        };
        if !role.flags.contains(PopupFlags::CAN_BE_CONFIGURED) {
            trace!(%popup, "Popup configuration ignored");
            return false;
        }
        role.pending_configuration = Some(rect);
        role.flags.insert(PopupFlags::HAS_CONFIGURATION_TO_SEND);
        true
    }

    /// Send the queued configuration of a popup, if any
    pub(crate) fn send_popup_configuration(&mut self, popup: PopupId) {
        let Some(role) = self.shell.popups.get_mut(&popup) else {
            return;
        };
        if !role.flags.contains(PopupFlags::HAS_CONFIGURATION_TO_SEND) {
            return;
        }
        let Some(surface) = role.surface else {
            return;
        };
        let Some(rect) = role.pending_configuration.take() else {
            return;
        };
        role.flags.remove(PopupFlags::HAS_CONFIGURATION_TO_SEND);
        let reposition = role
            .flags
            .contains(PopupFlags::HAS_PENDING_REPOSITION)
            .then_some(role.reposition_token);
        role.flags.remove(PopupFlags::HAS_PENDING_REPOSITION);
        let serial = self.serials.next_serial();
        role.current = rect;
        role.last_configure = Some(serial);
        if role.state == PopupState::Created {
            role.state = PopupState::PendingConfigure;
        }

        if let Some(token) = reposition {
            self.repositioned(popup, token);
        }
        trace!(%popup, ?rect, ?serial, "Configuring popup");
        self.send_to_surface_client(surface, ClientEvent::PopupConfigure { popup, geometry: rect });
        self.send_to_surface_client(surface, ClientEvent::XdgSurfaceConfigure { surface, serial });
        self.update_popup_position(popup);
    }

    /// Send the queued configurations of every popup
    pub(crate) fn send_popup_configurations(&mut self) {
        let queued: Vec<PopupId> = self
            .shell
            .popups()
            .filter(|role| role.flags.contains(PopupFlags::HAS_CONFIGURATION_TO_SEND))
            .map(PopupRole::id)
            .collect();
        for popup in queued {
            self.send_popup_configuration(popup);
        }
    }

    /// Send `xdg_popup.repositioned`
    ///
    /// Returns `false` and sends nothing if the client bound a version of `xdg_wm_base`
    /// without the event.
    pub fn repositioned(&mut self, popup: PopupId, token: u32) -> bool {
        let Some(role) = self.shell.popup(popup) else {
            return false;
        };
        if role.version < xdg_popup::EVT_REPOSITIONED_SINCE {
            return false;
        }
        let Some(surface) = role.surface else {
            return false;
        };
        self.send_to_surface_client(surface, ClientEvent::PopupRepositioned { popup, token });
        true
    }

    /// Placement of a popup relative to its parent, adjusted to fit into `target`
    ///
    /// `target` is relative to the parent as well. It defaults to the union of the
    /// initialized outputs.
    pub fn calculate_unconstrained_rect(&self, popup: PopupId, target: Option<Rectangle<i32, Logical>>) -> Rectangle<i32, Logical> {
        let Some(role) = self.shell.popup(popup) else {
            return Rectangle::default();
        };
        let target = target.or_else(|| {
            let span = self.outputs_bounding_box();
            if span.is_empty() {
                return None;
            }
            let parent = self
                .surfaces
                .get(role.parent)
                .map(|data| data.position())
                .unwrap_or_default();
            Some(Rectangle::new(span.loc - parent, span.size))
        });
        match target {
            Some(target) => role.positioner.unconstrained_geometry(target),
            None => role.positioner.geometry(),
        }
    }

    /// Handle `xdg_popup.grab`
    pub fn grab_popup(&mut self, popup: PopupId, serial: Serial) -> Result<(), DeadResource> {
        let role = self.shell.popup(popup).ok_or(DeadResource)?;
        let Some(surface) = role.surface else {
            warn!(%popup, "Keyboard grab requested by a popup without surface");
            return Ok(());
        };
        let event = self
            .surface_client(surface)
            .and_then(|client| self.clients.get(&client))
            .and_then(|client| client.find_event_by_serial(serial))
            .cloned();
        let Some(event) = event else {
            debug!(%popup, ?serial, "Grab with an unknown serial");
            self.dismiss_popup(popup);
            return Ok(());
        };

        self.with_handler(|handler, compositor| handler.popup_grab_keyboard_request(compositor, popup, &event));
        if self.seat.keyboard_grab() != Some(surface) {
            debug!(%popup, "Keyboard grab denied");
            self.dismiss_popup(popup);
        }
        Ok(())
    }

    /// Handle `xdg_popup.reposition`
    pub fn reposition_popup(&mut self, popup: PopupId, positioner: Positioner, token: u32) -> Result<(), ShellError> {
        let role = self.shell.popup(popup).ok_or(DeadResource)?;
        if role.version < xdg_popup::REQ_REPOSITION_SINCE {
            warn!(%popup, version = role.version, "Reposition request on an old xdg_popup");
            return Ok(());
        }
        let Some(surface) = role.surface else {
            warn!(%popup, "Reposition request on a popup without surface");
            return Ok(());
        };
        if !positioner.is_valid() {
            let err = ShellError::InvalidPositioner;
            self.post_shell_error(surface, &err);
            return Err(err);
        }

        if let Some(role) = self.shell.popup_mut(popup) {
            role.positioner = positioner;
            role.reposition_token = token;
            role.pending_configuration = None;
            role.flags.remove(PopupFlags::HAS_CONFIGURATION_TO_SEND);
            role.flags
                .insert(PopupFlags::HAS_PENDING_REPOSITION | PopupFlags::CAN_BE_CONFIGURED);
        }
        self.request_popup_configuration(popup);
        Ok(())
    }

    pub(crate) fn ack_popup_configure(&mut self, popup: PopupId, serial: Serial) -> Result<(), ShellError> {
        let role = self.shell.popup_mut(popup).ok_or(DeadResource)?;
        match role.last_configure {
            Some(last) if last.is_no_older_than(&serial) => {
                if role.state == PopupState::PendingConfigure {
                    role.state = PopupState::Configured;
                }
                Ok(())
            }
            _ => Err(ShellError::InvalidSerial(serial)),
        }
    }

    /// Dismiss a popup and its child popups
    pub fn dismiss_popup(&mut self, popup: PopupId) {
        let Some(role) = self.shell.popup(popup) else {
            return;
        };
        if role.flags.contains(PopupFlags::DISMISSED) {
            return;
        }
        let surface = role.surface;

        if let Some(surface) = surface {
            for child in self.child_popups(surface).into_iter().rev() {
                self.dismiss_popup(child);
            }
        }

        if let Some(role) = self.shell.popup_mut(popup) {
            role.flags.insert(PopupFlags::DISMISSED);
            role.flags.remove(PopupFlags::CAN_BE_CONFIGURED | PopupFlags::HAS_CONFIGURATION_TO_SEND);
            role.state = PopupState::Dismissed;
        }
        debug!(%popup, "Popup dismissed");
        if let Some(surface) = surface {
            self.send_to_surface_client(surface, ClientEvent::PopupDone { popup });
            self.release_popup_grab(popup, surface);
            self.set_mapped(surface, false);
        }
    }

    /// Destroy an `xdg_popup`
    pub fn destroy_popup(&mut self, popup: PopupId) {
        if !self.shell.popups.contains_key(&popup) {
            return;
        }
        self.with_handler(|handler, compositor| {
            handler.on_anticipated_object_destruction(compositor, ObjectRef::Popup(popup))
        });
        let Some(surface) = self.shell.popup(popup).and_then(PopupRole::surface) else {
            self.shell.popups.shift_remove(&popup);
            return;
        };

        let mapped_children = self
            .child_popups(surface)
            .into_iter()
            .filter(|child| self.popup_is_mapped(*child))
            .count();
        for _ in 0..mapped_children {
            self.post_shell_error(surface, &ShellError::NotTheTopmostPopup);
        }

        self.release_popup_grab(popup, surface);
        self.set_mapped(surface, false);
        self.surfaces.unlink(surface);
        self.shell.popups.shift_remove(&popup);
        debug!(%popup, "Popup destroyed");
    }

    /// The outermost popup of the popup chain `surface` belongs to
    pub fn root_popup_of(&self, surface: SurfaceId) -> Option<PopupId> {
        let mut root = None;
        let mut current = Some(surface);
        while let Some(surface) = current {
            let data = self.surfaces.get(surface)?;
            match data.role.popup() {
                Ok(popup) => root = Some(popup),
                Err(_) => break,
            }
            current = data.parent();
        }
        root
    }

    fn release_popup_grab(&mut self, popup: PopupId, surface: SurfaceId) {
        if self.seat.keyboard_grab() != Some(surface) {
            return;
        }
        let parent = self.shell.popup(popup).map(PopupRole::parent);
        let parent_is_popup = parent.is_some_and(|parent| self.root_popup_of(parent).is_some());
        if parent_is_popup {
            self.set_keyboard_grab(parent);
        } else {
            self.seat.set_keyboard_grab(None);
            self.set_keyboard_focus(parent);
        }
    }

    fn child_popups(&self, surface: SurfaceId) -> Vec<PopupId> {
        self.surfaces
            .get(surface)
            .map(|data| data.children())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.surfaces.get(*child)?.role.popup().ok())
            .filter(|popup| self.shell.popups.contains_key(popup))
            .collect()
    }

    fn popup_is_mapped(&self, popup: PopupId) -> bool {
        self.shell
            .popup(popup)
            .and_then(PopupRole::surface)
            .and_then(|surface| self.surfaces.get(surface))
            .is_some_and(|data| data.is_mapped())
    }

    // Popups are kept in creation order
    fn newer_sibling_popup(&self, popup: PopupId) -> Option<PopupId> {
        let parent = self.shell.popup(popup)?.parent;
        let created = self.shell.popups.get_index_of(&popup)?;
        self.child_popups(parent)
            .into_iter()
            .find(|sibling| self.shell.popups.get_index_of(sibling).is_some_and(|index| index > created))
    }

    fn update_popup_position(&mut self, popup: PopupId) {
        let Some(role) = self.shell.popup(popup) else {
            return;
        };
        let Some(surface) = role.surface else {
            return;
        };
        let parent = self
            .surfaces
            .get(role.parent)
            .map(|data| data.position())
            .unwrap_or_default();
        let position = parent + role.current.loc;
        // the surface is alive, it is referenced by the popup
        let _ = self.set_surface_position(surface, position);
    }
}

#[cfg(test)]
mod tests {
    use wayland_protocols::xdg::shell::server::{
        xdg_positioner::{Anchor, Gravity},
        xdg_wm_base,
    };

    use super::*;
    use crate::{
        compositor::test::{compositor_with_client, HookCall, RecordingHandler},
        utils::Size,
        wayland::{client::ClientId, seat::InputEvent},
    };

    fn positioner() -> Positioner {
        Positioner {
            rect_size: (50, 20).into(),
            anchor_rect: Rectangle::from_loc_and_size((10, 10), (1, 1)),
            anchor_edges: Anchor::BottomRight,
            gravity: Gravity::BottomRight,
            ..Default::default()
        }
    }

    fn configure_serial(compositor: &Compositor, client: ClientId, surface: SurfaceId) -> Serial {
        compositor
            .client(client)
            .unwrap()
            .pending_events()
            .iter()
            .rev()
            .find_map(|event| match event {
                ClientEvent::XdgSurfaceConfigure { surface: s, serial } if *s == surface => Some(*serial),
                _ => None,
            })
            .unwrap()
    }

    fn mapped_toplevel(compositor: &mut Compositor, client: ClientId) -> SurfaceId {
        let surface = compositor.create_surface(client).unwrap();
        compositor.get_toplevel(surface).unwrap();
        compositor.commit(surface).unwrap();
        let serial = configure_serial(compositor, client, surface);
        compositor.ack_configure(surface, serial).unwrap();
        compositor.attach(surface, Some((200, 200).into())).unwrap();
        compositor.commit(surface).unwrap();
        surface
    }

    fn mapped_popup(compositor: &mut Compositor, client: ClientId, parent: SurfaceId) -> (SurfaceId, PopupId) {
        let surface = compositor.create_surface(client).unwrap();
        let popup = compositor.get_popup(surface, parent, positioner()).unwrap();
        compositor.commit(surface).unwrap();
        let serial = configure_serial(compositor, client, surface);
        compositor.ack_configure(surface, serial).unwrap();
        compositor.attach(surface, Some((50, 20).into())).unwrap();
        compositor.commit(surface).unwrap();
        (surface, popup)
    }

    fn count_configures(compositor: &Compositor, client: ClientId, popup: PopupId) -> usize {
        compositor
            .client(client)
            .unwrap()
            .pending_events()
            .iter()
            .filter(|event| matches!(event, ClientEvent::PopupConfigure { popup: p, .. } if *p == popup))
            .count()
    }

    #[test]
    fn popup_lifecycle() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let (surface, popup) = mapped_popup(&mut compositor, client, parent);

        let role = compositor.shell().popup(popup).unwrap();
        assert_eq!(role.state(), PopupState::Mapped);
        assert_eq!(role.geometry(), Rectangle::from_loc_and_size((11, 11), (50, 20)));
        assert!(compositor.surface(surface).unwrap().is_mapped());
        assert_eq!(compositor.surface(surface).unwrap().parent(), Some(parent));
        assert!(compositor.client(client).unwrap().protocol_error().is_none());
    }

    #[test]
    fn invalid_positioner_is_refused() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let surface = compositor.create_surface(client).unwrap();
        let result = compositor.get_popup(surface, parent, Positioner::default());
        assert!(matches!(result, Err(ShellError::InvalidPositioner)));
        let error = compositor.client(client).unwrap().protocol_error().unwrap();
        assert_eq!(error.code, xdg_wm_base::Error::InvalidPositioner as u32);
    }

    #[test]
    fn every_reposition_sends_one_configure() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let (_, popup) = mapped_popup(&mut compositor, client, parent);
        assert_eq!(count_configures(&compositor, client, popup), 1);

        let mut moved = positioner();
        moved.offset = (5, 0).into();
        for (i, token) in [7, 8, 9].into_iter().enumerate() {
            compositor.reposition_popup(popup, moved, token).unwrap();
            assert_eq!(count_configures(&compositor, client, popup), i + 2);
        }
        assert_eq!(compositor.shell().popup(popup).unwrap().geometry().loc, (16, 11).into());
        assert!(compositor.shell().popup(popup).unwrap().pending_configuration().is_none());
    }

    #[test]
    fn reposition_configure_comes_from_the_hook() {
        let (mut compositor, client) = compositor_with_client();
        compositor.set_handler(RecordingHandler::configuring(Rectangle::from_loc_and_size((1, 2), (3, 4))));
        let parent = mapped_toplevel(&mut compositor, client);
        let (_, popup) = mapped_popup(&mut compositor, client, parent);

        compositor.reposition_popup(popup, positioner(), 1).unwrap();
        assert_eq!(count_configures(&compositor, client, popup), 2);
        assert_eq!(
            compositor.shell().popup(popup).unwrap().geometry(),
            Rectangle::from_loc_and_size((1, 2), (3, 4))
        );
    }

    #[test]
    fn repositioned_depends_on_version() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let (_, popup) = mapped_popup(&mut compositor, client, parent);

        assert!(compositor.repositioned(popup, 42));
        let events = compositor.client(client).unwrap().pending_events();
        assert_eq!(
            events.last(),
            Some(&ClientEvent::PopupRepositioned { popup, token: 42 })
        );

        let (mut compositor, client) = compositor_with_client();
        compositor.client_mut(client).unwrap().wm_base_version = 2;
        let parent = mapped_toplevel(&mut compositor, client);
        let (_, popup) = mapped_popup(&mut compositor, client, parent);
        let before = compositor.client(client).unwrap().pending_events().len();
        assert!(!compositor.repositioned(popup, 42));
        compositor.reposition_popup(popup, positioner(), 3).unwrap();
        assert_eq!(compositor.client(client).unwrap().pending_events().len(), before);
    }

    #[test]
    fn mapping_below_the_topmost_popup_is_an_error() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let older = compositor.create_surface(client).unwrap();
        compositor.get_popup(older, parent, positioner()).unwrap();
        compositor.commit(older).unwrap();
        let serial = configure_serial(&compositor, client, older);
        compositor.ack_configure(older, serial).unwrap();

        // a newer sibling, not even mapped, is the topmost popup
        let newer = compositor.create_surface(client).unwrap();
        compositor.get_popup(newer, parent, positioner()).unwrap();
        compositor.attach(older, Some((50, 20).into())).unwrap();
        compositor.commit(older).unwrap();

        let error = compositor.client(client).unwrap().protocol_error().unwrap();
        assert_eq!(error.interface, "xdg_wm_base");
        assert_eq!(error.code, xdg_wm_base::Error::NotTheTopmostPopup as u32);
        assert!(!compositor.surface(older).unwrap().is_mapped());
    }

    #[test]
    fn newest_popup_maps_above_its_mapped_siblings() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let (first, _) = mapped_popup(&mut compositor, client, parent);
        let (second, popup) = mapped_popup(&mut compositor, client, parent);

        assert!(compositor.client(client).unwrap().protocol_error().is_none());
        assert!(compositor.surface(first).unwrap().is_mapped());
        assert!(compositor.surface(second).unwrap().is_mapped());
        assert_eq!(compositor.shell().popup(popup).unwrap().state(), PopupState::Mapped);
    }

    #[test]
    fn destruction_hook_runs_before_teardown() {
        let (mut compositor, client) = compositor_with_client();
        let handler = RecordingHandler::default();
        compositor.set_handler(handler.clone());
        let parent = mapped_toplevel(&mut compositor, client);
        let (surface, popup) = mapped_popup(&mut compositor, client, parent);

        compositor.destroy_popup(popup);
        assert_eq!(
            handler.calls(),
            vec![HookCall::Destroyed {
                object: ObjectRef::Popup(popup),
                mapped: true,
            }]
        );
        assert!(!compositor.surface(surface).unwrap().is_mapped());
        assert!(compositor.shell().popup(popup).is_none());
    }

    #[test]
    fn destroying_a_popup_with_mapped_children_is_an_error() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let (menu, popup) = mapped_popup(&mut compositor, client, parent);
        mapped_popup(&mut compositor, client, menu);

        compositor.destroy_popup(popup);
        let error = compositor.client(client).unwrap().protocol_error().unwrap();
        assert_eq!(error.code, xdg_wm_base::Error::NotTheTopmostPopup as u32);
        assert!(compositor.shell().popup(popup).is_none());
        assert!(!compositor.surface(menu).unwrap().is_mapped());
    }

    #[test]
    fn grab_with_unknown_serial_dismisses() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let (surface, popup) = mapped_popup(&mut compositor, client, parent);

        compositor.grab_popup(popup, Serial::from(9999)).unwrap();
        let role = compositor.shell().popup(popup).unwrap();
        assert_eq!(role.state(), PopupState::Dismissed);
        assert!(!compositor.surface(surface).unwrap().is_mapped());
        assert!(compositor
            .client(client)
            .unwrap()
            .pending_events()
            .contains(&ClientEvent::PopupDone { popup }));
    }

    #[test]
    fn denied_grab_dismisses() {
        let (mut compositor, client) = compositor_with_client();
        compositor.set_handler(RecordingHandler::denying_grabs());
        let parent = mapped_toplevel(&mut compositor, client);
        let (surface, popup) = mapped_popup(&mut compositor, client, parent);

        let serial = compositor.serials.next_serial();
        compositor.client_mut(client).unwrap().record_event(
            serial,
            InputEvent::PointerButton {
                button: 0x110,
                state: crate::wayland::seat::ButtonState::Pressed,
                time: 0,
            },
        );
        compositor.grab_popup(popup, serial).unwrap();

        assert_eq!(compositor.shell().popup(popup).unwrap().state(), PopupState::Dismissed);
        assert_eq!(compositor.seat().keyboard_grab(), None);
        assert!(!compositor.surface(surface).unwrap().is_mapped());
        assert!(compositor
            .client(client)
            .unwrap()
            .pending_events()
            .contains(&ClientEvent::PopupDone { popup }));
        assert!(compositor.client(client).unwrap().protocol_error().is_none());
    }

    #[test]
    fn idle_iterations_take_no_serial() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        mapped_popup(&mut compositor, client, parent);

        let before = compositor.serials.next_serial();
        compositor.send_popup_configurations();
        compositor.send_popup_configurations();
        let after = compositor.serials.next_serial();
        assert_eq!(after, Serial::from(u32::from(before) + 1));
    }

    #[test]
    fn grab_and_dismiss_chain() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let (menu, popup) = mapped_popup(&mut compositor, client, parent);
        let (submenu, child) = mapped_popup(&mut compositor, client, menu);

        let serial = compositor.serials.next_serial();
        compositor.client_mut(client).unwrap().record_event(
            serial,
            InputEvent::PointerButton {
                button: 0x110,
                state: crate::wayland::seat::ButtonState::Pressed,
                time: 0,
            },
        );
        compositor.grab_popup(popup, serial).unwrap();
        compositor.grab_popup(child, serial).unwrap();
        assert_eq!(compositor.seat().keyboard_grab(), Some(submenu));
        assert_eq!(compositor.root_popup_of(submenu), Some(popup));

        compositor.dismiss_popup(popup);
        let done: Vec<_> = compositor
            .client(client)
            .unwrap()
            .pending_events()
            .iter()
            .filter_map(|event| match event {
                ClientEvent::PopupDone { popup } => Some(*popup),
                _ => None,
            })
            .collect();
        assert_eq!(done, vec![child, popup]);
        assert_eq!(compositor.seat().keyboard_grab(), None);
        assert_eq!(compositor.seat().keyboard_focus(), Some(parent));
    }

    #[test]
    fn configure_is_ignored_before_the_first_commit() {
        let (mut compositor, client) = compositor_with_client();
        let parent = mapped_toplevel(&mut compositor, client);
        let surface = compositor.create_surface(client).unwrap();
        let popup = compositor.get_popup(surface, parent, positioner()).unwrap();
        assert!(!compositor.configure_popup(popup, Rectangle::from_size(Size::from((1, 1)))));
    }
}
