//! Surfaces and their roles
//!
//! Every drawable of a client is a surface. Surfaces are owned by the
//! [`Compositor`], which hands out [`SurfaceId`] handles and keeps the per-surface
//! state in a [`SurfaceTree`].
//!
//! A surface goes through the following life cycle:
//!
//! - it is created without any role, and is never displayed in this state;
//! - a role is requested (see [`roles`]), the role is *pending*;
//! - the next commit makes the role effective, and depending on the role the surface is
//!   mapped once it has a buffer (and was configured, for shell surfaces);
//! - committing without a buffer unmaps it, destroying it unmaps it for good.
//!
//! Buffer and damage state is double-buffered: [`Compositor::attach`] and
//! [`Compositor::damage_surface`] only affect the pending state, which is applied by
//! [`Compositor::commit`].

use tracing::{debug, trace};

use crate::{
    compositor::{Compositor, ObjectRef},
    output::{Output, OutputId},
    utils::{Buffer, DeadResource, Logical, Point, Rectangle, Size},
    wayland::{
        client::{ClientEvent, ClientId},
        shell::xdg::ShellSurface,
    },
    UserData,
};

pub mod roles;
mod tree;

pub use self::tree::{CyclicLink, SurfaceTree};
use self::roles::{AlreadyHasRole, Role, RoleSlot, SubsurfaceRole};

crate::utils::ids::handle_id!(
    /// Identifier of a surface
    SurfaceId
);

/// Errors of surface requests
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// The surface or its client no longer exists
    #[error(transparent)]
    DeadResource(#[from] DeadResource),
    /// The surface already has a role
    #[error(transparent)]
    AlreadyHasRole(#[from] AlreadyHasRole),
    /// The requested parent is a descendant of the surface
    #[error(transparent)]
    CyclicLink(#[from] CyclicLink),
    /// Popup and toplevel roles can only be given by the xdg shell
    #[error("The {0} role is assigned through the xdg shell")]
    ShellRole(&'static str),
}

/// State of a surface
#[derive(Debug)]
pub struct SurfaceData {
    pub(crate) id: SurfaceId,
    pub(crate) client: ClientId,
    pending_buffer: Option<Option<Size<i32, Buffer>>>,
    buffer: Option<Size<i32, Buffer>>,
    pending_damage: Vec<Rectangle<i32, Buffer>>,
    damage: Vec<Rectangle<i32, Buffer>>,
    pub(crate) position: Point<i32, Logical>,
    pub(crate) parent: Option<SurfaceId>,
    pub(crate) children: Vec<SurfaceId>,
    pub(crate) role: RoleSlot,
    pub(crate) mapped: bool,
    pub(crate) outputs: Vec<OutputId>,
    pub(crate) user_data: Option<UserData>,
}

impl SurfaceData {
    pub(crate) fn new(id: SurfaceId, client: ClientId) -> SurfaceData {
        SurfaceData {
            id,
            client,
            pending_buffer: None,
            buffer: None,
            pending_damage: Vec::new(),
            damage: Vec::new(),
            position: Point::default(),
            parent: None,
            children: Vec::new(),
            role: RoleSlot::default(),
            mapped: false,
            outputs: Vec::new(),
            user_data: None,
        }
    }

    /// Identifier of the surface
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Client owning the surface
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Whether a buffer is attached to the current state
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Size of the current buffer
    pub fn buffer_size(&self) -> Option<Size<i32, Buffer>> {
        self.buffer
    }

    /// Damage accumulated by the last commits, in buffer coordinates
    pub fn damage(&self) -> &[Rectangle<i32, Buffer>] {
        &self.damage
    }

    /// Position of the surface in the global logical space
    pub fn position(&self) -> Point<i32, Logical> {
        self.position
    }

    /// Area covered by the surface in the global logical space
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        let size = self.buffer.map(|size| size.to_logical(1.0)).unwrap_or_default();
        Rectangle::new(self.position, size)
    }

    /// Parent of the surface
    pub fn parent(&self) -> Option<SurfaceId> {
        self.parent
    }

    /// Children of the surface, from bottom to top
    pub fn children(&self) -> &[SurfaceId] {
        &self.children
    }

    /// Role of the surface, pending or committed
    pub fn role(&self) -> Option<&Role> {
        self.role.get()
    }

    /// Role slot of the surface
    pub fn role_slot(&self) -> &RoleSlot {
        &self.role
    }

    /// Whether the surface is displayed
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Outputs the surface is visible on
    pub fn outputs(&self) -> &[OutputId] {
        &self.outputs
    }

    /// Data attached by [`CompositorHandler::create_object_request`](crate::compositor::CompositorHandler::create_object_request)
    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }
}

impl Compositor {
    /// The surfaces of the compositor
    pub fn surfaces(&self) -> &SurfaceTree {
        &self.surfaces
    }

    /// Data of a surface
    pub fn surface(&self, surface: SurfaceId) -> Option<&SurfaceData> {
        self.surfaces.get(surface)
    }

    pub(crate) fn surface_client(&self, surface: SurfaceId) -> Option<ClientId> {
        self.surfaces.get(surface).map(|data| data.client)
    }

    pub(crate) fn send_to_surface_client(&mut self, surface: SurfaceId, event: ClientEvent) {
        if let Some(client) = self.surface_client(surface).and_then(|id| self.clients.get_mut(&id)) {
            client.send(event);
        }
    }

    pub(crate) fn post_error_on_surface_client(&mut self, surface: SurfaceId, interface: &'static str, code: u32, message: &str) {
        if let Some(client) = self.surface_client(surface).and_then(|id| self.clients.get_mut(&id)) {
            client.post_error(interface, code, message);
        }
    }

    pub(crate) fn post_role_error(&mut self, surface: SurfaceId, err: AlreadyHasRole) {
        let message = err.to_string();
        self.post_error_on_surface_client(surface, err.interface(), 0, &message);
    }

    /// Create a new surface for a client
    pub fn create_surface(&mut self, client: ClientId) -> Result<SurfaceId, DeadResource> {
        self.create_surface_with_id(client, SurfaceId::next())
    }

    pub(crate) fn create_surface_with_id(&mut self, client: ClientId, id: SurfaceId) -> Result<SurfaceId, DeadResource> {
        if !self.clients.contains_key(&client) {
            return Err(DeadResource);
        }
        self.surfaces.insert(SurfaceData::new(id, client));
        let user_data = self.with_handler(|handler, _| handler.create_object_request(ObjectRef::Surface(id)));
        if let Some(data) = self.surfaces.get_mut(id) {
            data.user_data = user_data;
        }
        trace!(surface = %id, %client, "Surface created");
        Ok(id)
    }

    /// Attach a buffer of the given size to the pending state, or detach the buffer
    pub fn attach(&mut self, surface: SurfaceId, buffer: Option<Size<i32, Buffer>>) -> Result<(), DeadResource> {
        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        data.pending_buffer = Some(buffer);
        Ok(())
    }

    /// Add damage to the pending state
    pub fn damage_surface(&mut self, surface: SurfaceId, damage: Rectangle<i32, Buffer>) -> Result<(), DeadResource> {
        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        data.pending_damage.push(damage);
        Ok(())
    }

    /// Move a surface in the global logical space
    ///
    /// Popups and subsurfaces are positioned relative to their parent by the
    /// compositor, this is meant for toplevels and layer surfaces.
    pub fn set_surface_position(&mut self, surface: SurfaceId, position: Point<i32, Logical>) -> Result<(), DeadResource> {
        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        let delta = position - data.position;
        data.position = position;
        self.move_children(surface, delta);
        self.update_surface_outputs(surface);
        Ok(())
    }

    fn move_children(&mut self, surface: SurfaceId, delta: Point<i32, Logical>) {
        for child in self.surfaces.subtree(surface).into_iter().skip(1) {
            if let Some(data) = self.surfaces.get_mut(child) {
                data.position += delta;
            }
        }
    }

    /// Apply the pending state of a surface
    pub fn commit(&mut self, surface: SurfaceId) -> Result<(), DeadResource> {
        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        if let Some(buffer) = data.pending_buffer.take() {
            data.buffer = buffer;
        }
        let pending_damage = std::mem::take(&mut data.pending_damage);
        data.damage = pending_damage;
        let first_commit = data.role.commit();
        let has_buffer = data.buffer.is_some();
        let role = data.role.get().cloned();
        trace!(%surface, has_buffer, first_commit, role = ?role.as_ref().map(Role::name), "Surface commit");

        match role {
            Some(Role::Popup(popup)) => self.commit_popup(surface, popup, first_commit),
            Some(Role::Toplevel(toplevel)) => self.commit_toplevel(surface, toplevel, first_commit),
            Some(Role::Subsurface(_)) => {
                let parent_mapped = self
                    .surfaces
                    .get(surface)
                    .and_then(|data| data.parent)
                    .and_then(|parent| self.surfaces.get(parent))
                    .is_some_and(SurfaceData::is_mapped);
                self.set_mapped(surface, has_buffer && parent_mapped);
            }
            Some(Role::Cursor) => {
                self.set_mapped(surface, has_buffer);
                if self.cursor.surface() == Some(surface) {
                    self.cursor.mark_texture_dirty();
                }
            }
            Some(_) => self.set_mapped(surface, has_buffer),
            None => {}
        }
        Ok(())
    }

    pub(crate) fn set_mapped(&mut self, surface: SurfaceId, mapped: bool) {
        let Some(data) = self.surfaces.get_mut(surface) else {
            return;
        };
        if data.mapped != mapped {
            debug!(%surface, mapped, "Surface mapping changed");
            data.mapped = mapped;
        }
        self.update_surface_outputs(surface);

        // subsurfaces follow the mapping of their parent
        let children = data_children(&self.surfaces, surface);
        for child in children {
            let Some(child_data) = self.surfaces.get(child) else {
                continue;
            };
            if matches!(child_data.role(), Some(Role::Subsurface(_))) && child_data.role.is_committed() {
                let child_mapped = mapped && child_data.has_buffer();
                self.set_mapped(child, child_mapped);
            }
        }
    }

    /// Make `surface` a subsurface of `parent`
    pub fn get_subsurface(&mut self, surface: SurfaceId, parent: SurfaceId) -> Result<(), SurfaceError> {
        if !self.surfaces.contains(parent) {
            return Err(DeadResource.into());
        }
        if self.surfaces.is_ancestor(surface, parent) {
            return Err(CyclicLink { child: surface, parent }.into());
        }
        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        if let Err(err) = data.role.set_pending(Role::Subsurface(SubsurfaceRole::default())) {
            self.post_role_error(surface, err.clone());
            return Err(err.into());
        }
        self.surfaces.set_parent(surface, parent)?;
        self.update_subsurface_position(surface);
        Ok(())
    }

    /// Set the position of a subsurface relative to its parent
    pub fn set_subsurface_location(&mut self, surface: SurfaceId, location: Point<i32, Logical>) -> Result<(), DeadResource> {
        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        data.role.with_attributes(|role| {
            if let Role::Subsurface(attributes) = role {
                attributes.location = location;
            }
        });
        self.update_subsurface_position(surface);
        Ok(())
    }

    fn update_subsurface_position(&mut self, surface: SurfaceId) {
        let Some(data) = self.surfaces.get(surface) else {
            return;
        };
        let Ok(attributes) = data.role.subsurface() else {
            return;
        };
        let parent_position = data
            .parent
            .and_then(|parent| self.surfaces.get(parent))
            .map(SurfaceData::position)
            .unwrap_or_default();
        let position = parent_position + attributes.location;
        // ignoring the error, the surface exists
        let _ = self.set_surface_position(surface, position);
    }

    /// Give a role to a surface
    ///
    /// Popup and toplevel roles are refused, they are given by
    /// [`Compositor::get_popup`] and [`Compositor::get_toplevel`].
    pub fn give_role(&mut self, surface: SurfaceId, role: Role) -> Result<(), SurfaceError> {
        if matches!(role, Role::Popup(_) | Role::Toplevel(_)) {
            return Err(SurfaceError::ShellRole(role.name()));
        }
        let data = self.surfaces.get_mut(surface).ok_or(DeadResource)?;
        if let Err(err) = data.role.set_pending(role) {
            self.post_role_error(surface, err.clone());
            return Err(err.into());
        }
        Ok(())
    }

    /// Use a surface as the cursor image, or hide the cursor
    pub fn set_cursor_surface(&mut self, surface: Option<SurfaceId>, hotspot: Point<i32, Logical>) -> Result<(), SurfaceError> {
        if let Some(surface) = surface {
            let data = self.surfaces.get(surface).ok_or(DeadResource)?;
            if data.role() != Some(&Role::Cursor) {
                self.give_role(surface, Role::Cursor)?;
            }
        }
        self.cursor.set_surface(surface, hotspot);
        Ok(())
    }

    /// Destroy a surface
    ///
    /// The surface is unlinked from its parent and children, loses its role objects
    /// back-reference, its keyboard and pointer focus, and is forgotten by the cursor.
    pub fn destroy_surface(&mut self, surface: SurfaceId) {
        if !self.surfaces.contains(surface) {
            return;
        }
        self.with_handler(|handler, compositor| {
            handler.on_anticipated_object_destruction(compositor, ObjectRef::Surface(surface))
        });
        let Some(data) = self.surfaces.get(surface) else {
            return;
        };
        let parent = data.parent;
        let role = data.role.get().cloned();
        debug!(%surface, "Destroying surface");

        self.set_mapped(surface, false);
        match role {
            Some(Role::Popup(popup)) => self.shell.forget_surface(ShellSurface::Popup(popup)),
            Some(Role::Toplevel(toplevel)) => self.shell.forget_surface(ShellSurface::Toplevel(toplevel)),
            _ => {}
        }

        if self.seat.keyboard_grab() == Some(surface) {
            self.seat.set_keyboard_grab(parent);
        }
        if self.seat.keyboard_focus() == Some(surface) {
            self.set_keyboard_focus(parent);
        }
        if self.seat.pointer_focus() == Some(surface) {
            self.set_pointer_focus(None);
        }
        self.cursor.forget_surface(surface);
        self.seat.dnd_mut().forget_surface(surface);

        self.surfaces.remove(surface);
    }

    /// Tell a surface it is visible on an output
    pub fn send_output_enter(&mut self, surface: SurfaceId, output: &Output) {
        let output = output.id();
        let Some(data) = self.surfaces.get_mut(surface) else {
            return;
        };
        if data.outputs.contains(&output) {
            return;
        }
        data.outputs.push(output);
        self.send_to_surface_client(surface, ClientEvent::OutputEnter { surface, output });
    }

    /// Tell a surface it is no longer visible on an output
    pub fn send_output_leave(&mut self, surface: SurfaceId, output: &Output) {
        let output = output.id();
        let Some(data) = self.surfaces.get_mut(surface) else {
            return;
        };
        let before = data.outputs.len();
        data.outputs.retain(|id| *id != output);
        if data.outputs.len() != before {
            self.send_to_surface_client(surface, ClientEvent::OutputLeave { surface, output });
        }
    }

    /// Recompute the outputs a surface is visible on, sending enter and leave events
    pub(crate) fn update_surface_outputs(&mut self, surface: SurfaceId) {
        let Some(data) = self.surfaces.get(surface) else {
            return;
        };
        let geometry = data.geometry();
        let mapped = data.mapped;
        let outputs = self.outputs.clone();
        for output in outputs.iter() {
            let visible = mapped && output.is_initialized() && output.rect().overlaps(geometry);
            if visible {
                self.send_output_enter(surface, output);
            } else {
                self.send_output_leave(surface, output);
            }
        }
    }
}

fn data_children(surfaces: &SurfaceTree, surface: SurfaceId) -> Vec<SurfaceId> {
    surfaces
        .get(surface)
        .map(|data| data.children.clone())
        .unwrap_or_default()
}
