//! Tools for handling surface roles
//!
//! In the Wayland protocol, surfaces can have several different roles, which
//! define how they are to be used: popups and toplevels of the xdg shell,
//! subsurfaces, layer surfaces, cursors, lock surfaces and drag-and-drop icons.
//!
//! A surface can have only one role during its whole lifetime. Once a role was
//! requested it is *pending* until the next commit of the surface, which makes it
//! *committed*. Any further role request fails with [`AlreadyHasRole`], even if it
//! names the same role again.
//!
//! Popup and toplevel data live in the shell state, the role only references them.

use std::fmt;

use crate::{
    utils::{Logical, Point},
    wayland::shell::xdg::{PopupId, ToplevelId},
};

/// Attributes of a subsurface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubsurfaceRole {
    /// Position of the subsurface relative to its parent
    pub location: Point<i32, Logical>,
    /// Whether the subsurface is in synchronized mode
    pub sync: bool,
}

/// Layer of a layer surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layer {
    /// Below everything
    Background,
    /// Below windows
    #[default]
    Bottom,
    /// Above windows
    Top,
    /// Above everything, including fullscreen windows
    Overlay,
}

/// Attributes of a layer surface
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LayerRole {
    /// Namespace given by the client
    pub namespace: String,
    /// Layer of the surface
    pub layer: Layer,
    /// Area of the output reserved for the surface, in the direction of its anchor
    pub exclusive_zone: i32,
}

/// The role of a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// An xdg popup
    Popup(PopupId),
    /// An xdg toplevel
    Toplevel(ToplevelId),
    /// A subsurface of another surface
    Subsurface(SubsurfaceRole),
    /// A layer shell surface
    Layer(LayerRole),
    /// The image of the pointer
    Cursor,
    /// A surface displayed while the session is locked
    SessionLock,
    /// The icon of a drag-and-drop operation
    DndIcon,
}

impl Role {
    /// Protocol name of the role
    pub fn name(&self) -> &'static str {
        match self {
            Role::Popup(_) => "xdg_popup",
            Role::Toplevel(_) => "xdg_toplevel",
            Role::Subsurface(_) => "subsurface",
            Role::Layer(_) => "zwlr_layer_surface_v1",
            Role::Cursor => "cursor_image",
            Role::SessionLock => "ext_session_lock_surface_v1",
            Role::DndIcon => "dnd_icon",
        }
    }
}

/// An error type signifying that the surface already has a role and
/// cannot be assigned an other
///
/// Generated if you attempt a role operation on a surface that does
/// not have the role you asked for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Requested to set the {requested} role on a surface which already is a {current}")]
pub struct AlreadyHasRole {
    /// Role the surface already had
    pub current: &'static str,
    /// Role that was requested
    pub requested: &'static str,
}

impl AlreadyHasRole {
    /// Interface of the object the role error is posted on
    ///
    /// Every role-granting interface uses code `0` for its role error.
    pub fn interface(&self) -> &'static str {
        match self.requested {
            "xdg_popup" | "xdg_toplevel" => "xdg_wm_base",
            "subsurface" => "wl_subcompositor",
            "cursor_image" => "wl_pointer",
            "dnd_icon" => "wl_data_device",
            "ext_session_lock_surface_v1" => "ext_session_lock_v1",
            _ => "zwlr_layer_shell_v1",
        }
    }
}

/// An error type signifying that the surface does not have expected role
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Wrong role for surface")]
pub struct WrongRole;

/// The construct-once role slot of a surface
#[derive(Default, Clone, PartialEq, Eq)]
pub struct RoleSlot {
    role: Option<Role>,
    committed: bool,
}

impl fmt::Debug for RoleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.role, self.committed) {
            (None, _) => f.write_str("RoleSlot::Empty"),
            (Some(role), false) => f.debug_tuple("RoleSlot::Pending").field(role).finish(),
            (Some(role), true) => f.debug_tuple("RoleSlot::Committed").field(role).finish(),
        }
    }
}

impl RoleSlot {
    /// Request a role, fails if any role was requested before
    pub fn set_pending(&mut self, role: Role) -> Result<(), AlreadyHasRole> {
        if let Some(current) = self.role.as_ref() {
            return Err(AlreadyHasRole {
                current: current.name(),
                requested: role.name(),
            });
        }
        self.role = Some(role);
        Ok(())
    }

    /// Commit the pending role, returns `true` on the commit making the role effective
    pub fn commit(&mut self) -> bool {
        if self.role.is_some() && !self.committed {
            self.committed = true;
            true
        } else {
            false
        }
    }

    /// The role of the surface, pending or committed
    pub fn get(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    /// Mutable access to the role attributes
    ///
    /// The variant itself cannot be changed through this, only its attributes.
    pub fn with_attributes<T>(&mut self, f: impl FnOnce(&mut Role) -> T) -> Option<T> {
        let role = self.role.as_mut()?;
        let kind = std::mem::discriminant(role);
        let result = f(role);
        debug_assert_eq!(kind, std::mem::discriminant(role), "role variant changed");
        Some(result)
    }

    /// Whether the role was committed
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Whether a role was requested but not committed yet
    pub fn is_pending(&self) -> bool {
        self.role.is_some() && !self.committed
    }

    /// The popup of the surface, if it has the popup role
    pub fn popup(&self) -> Result<PopupId, WrongRole> {
        match self.role {
            Some(Role::Popup(popup)) => Ok(popup),
            _ => Err(WrongRole),
        }
    }

    /// The toplevel of the surface, if it has the toplevel role
    pub fn toplevel(&self) -> Result<ToplevelId, WrongRole> {
        match self.role {
            Some(Role::Toplevel(toplevel)) => Ok(toplevel),
            _ => Err(WrongRole),
        }
    }

    /// The subsurface attributes, if the surface is a subsurface
    pub fn subsurface(&self) -> Result<SubsurfaceRole, WrongRole> {
        match self.role {
            Some(Role::Subsurface(attributes)) => Ok(attributes),
            _ => Err(WrongRole),
        }
    }
}
