//! Globals advertised to clients
//!
//! Every capability of the compositor is advertised as a global. Globals are created
//! through the single factory [`GlobalRegistry::create_global`], keyed by
//! [`GlobalKind`], and advertised to clients in creation order.
//!
//! Creation order carries exactly one requirement: `wp_single_pixel_buffer_manager_v1`
//! can only be created once `wp_viewporter` exists, since single pixel buffers are
//! useless without a way to scale them.
//!
//! Removing a global is a two step process. [`GlobalRegistry::remove_global`] only
//! marks it and queues it, clients are told the global is gone but may still reference
//! it in requests they already sent. Once the removal notice was flushed to the clients
//! ([`GlobalRegistry::removals_flushed`]), the next call to
//! [`GlobalRegistry::process_removed_globals`] really destroys the global. Binding a
//! removed or destroyed global is inert, see [`GlobalRegistry::is_retired`].

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::output::OutputId;

crate::utils::ids::handle_id!(
    /// Identifier of a global
    GlobalId
);

/// The capabilities the compositor can advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalKind {
    /// `wl_compositor`
    Compositor,
    /// `wl_subcompositor`
    Subcompositor,
    /// `wl_shm`
    Shm,
    /// `wl_seat`
    Seat,
    /// `wl_data_device_manager`
    DataDeviceManager,
    /// `wl_output`, one per output
    Output(OutputId),
    /// `xdg_wm_base`
    XdgWmBase,
    /// `zxdg_decoration_manager_v1`
    XdgDecorationManager,
    /// `xdg_activation_v1`
    XdgActivation,
    /// `wp_presentation`
    Presentation,
    /// `zwp_linux_dmabuf_v1`
    LinuxDmaBuf,
    /// `wp_viewporter`
    Viewporter,
    /// `wp_fractional_scale_manager_v1`
    FractionalScaleManager,
    /// `wp_single_pixel_buffer_manager_v1`
    SinglePixelBuffer,
    /// `zwlr_layer_shell_v1`
    LayerShell,
    /// `ext_session_lock_manager_v1`
    SessionLockManager,
    /// `zwp_pointer_gestures_v1`
    PointerGestures,
    /// `zwp_relative_pointer_manager_v1`
    RelativePointerManager,
    /// `zwp_pointer_constraints_v1`
    PointerConstraints,
    /// `wp_content_type_manager_v1`
    ContentTypeManager,
    /// `ext_idle_notifier_v1`
    IdleNotifier,
}

impl GlobalKind {
    /// Protocol interface of the global
    pub fn interface(&self) -> &'static str {
        match self {
            GlobalKind::Compositor => "wl_compositor",
            GlobalKind::Subcompositor => "wl_subcompositor",
            GlobalKind::Shm => "wl_shm",
            GlobalKind::Seat => "wl_seat",
            GlobalKind::DataDeviceManager => "wl_data_device_manager",
            GlobalKind::Output(_) => "wl_output",
            GlobalKind::XdgWmBase => "xdg_wm_base",
            GlobalKind::XdgDecorationManager => "zxdg_decoration_manager_v1",
            GlobalKind::XdgActivation => "xdg_activation_v1",
            GlobalKind::Presentation => "wp_presentation",
            GlobalKind::LinuxDmaBuf => "zwp_linux_dmabuf_v1",
            GlobalKind::Viewporter => "wp_viewporter",
            GlobalKind::FractionalScaleManager => "wp_fractional_scale_manager_v1",
            GlobalKind::SinglePixelBuffer => "wp_single_pixel_buffer_manager_v1",
            GlobalKind::LayerShell => "zwlr_layer_shell_v1",
            GlobalKind::SessionLockManager => "ext_session_lock_manager_v1",
            GlobalKind::PointerGestures => "zwp_pointer_gestures_v1",
            GlobalKind::RelativePointerManager => "zwp_relative_pointer_manager_v1",
            GlobalKind::PointerConstraints => "zwp_pointer_constraints_v1",
            GlobalKind::ContentTypeManager => "wp_content_type_manager_v1",
            GlobalKind::IdleNotifier => "ext_idle_notifier_v1",
        }
    }

    /// Highest version of the global supported by Kiln
    pub fn max_version(&self) -> u32 {
        match self {
            GlobalKind::Compositor => 6,
            GlobalKind::Subcompositor => 1,
            GlobalKind::Shm => 1,
            GlobalKind::Seat => 9,
            GlobalKind::DataDeviceManager => 3,
            GlobalKind::Output(_) => 4,
            GlobalKind::XdgWmBase => 6,
            GlobalKind::XdgDecorationManager => 1,
            GlobalKind::XdgActivation => 1,
            GlobalKind::Presentation => 1,
            GlobalKind::LinuxDmaBuf => 4,
            GlobalKind::Viewporter => 1,
            GlobalKind::FractionalScaleManager => 1,
            GlobalKind::SinglePixelBuffer => 1,
            GlobalKind::LayerShell => 4,
            GlobalKind::SessionLockManager => 1,
            GlobalKind::PointerGestures => 3,
            GlobalKind::RelativePointerManager => 1,
            GlobalKind::PointerConstraints => 1,
            GlobalKind::ContentTypeManager => 1,
            GlobalKind::IdleNotifier => 1,
        }
    }

    fn dependency(&self) -> Option<GlobalKind> {
        match self {
            GlobalKind::SinglePixelBuffer => Some(GlobalKind::Viewporter),
            _ => None,
        }
    }
}

/// A global advertised to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    id: GlobalId,
    kind: GlobalKind,
    version: u32,
    pending_removal: bool,
}

impl Global {
    /// Identifier of the global
    pub fn id(&self) -> GlobalId {
        self.id
    }

    /// Kind of the global
    pub fn kind(&self) -> GlobalKind {
        self.kind
    }

    /// Protocol interface of the global
    pub fn interface(&self) -> &'static str {
        self.kind.interface()
    }

    /// Advertised version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether the global was removed and is waiting to be destroyed
    pub fn is_pending_removal(&self) -> bool {
        self.pending_removal
    }
}

/// Errors of the global registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GlobalError {
    /// The global requires another global which was not created yet
    #[error("{global} requires {requires} to be created first")]
    MissingDependency {
        /// Interface of the requested global
        global: &'static str,
        /// Interface of the missing global
        requires: &'static str,
    },
    /// The requested version is not supported
    #[error("{interface} version {version} is not supported")]
    UnsupportedVersion {
        /// Interface of the requested global
        interface: &'static str,
        /// Requested version
        version: u32,
    },
}

/// The globals of the compositor
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    globals: IndexMap<GlobalId, Global>,
    removed: Vec<RemovedGlobal>,
    destroyed: IndexSet<GlobalId>,
}

#[derive(Debug)]
struct RemovedGlobal {
    id: GlobalId,
    flushed: bool,
}

impl GlobalRegistry {
    /// Create a global of the given kind with its highest supported version
    pub fn create_global(&mut self, kind: GlobalKind) -> Result<GlobalId, GlobalError> {
        self.create_global_with_version(kind, kind.max_version())
    }

    /// Create a global of the given kind
    pub fn create_global_with_version(&mut self, kind: GlobalKind, version: u32) -> Result<GlobalId, GlobalError> {
        if version == 0 || version > kind.max_version() {
            return Err(GlobalError::UnsupportedVersion {
                interface: kind.interface(),
                version,
            });
        }
        if let Some(dependency) = kind.dependency() {
            if self.find(dependency).is_none() {
                return Err(GlobalError::MissingDependency {
                    global: kind.interface(),
                    requires: dependency.interface(),
                });
            }
        }

        let id = GlobalId::next();
        debug!(global = %id, interface = kind.interface(), version, "Creating global");
        self.globals.insert(
            id,
            Global {
                id,
                kind,
                version,
                pending_removal: false,
            },
        );
        Ok(id)
    }

    /// The live global of the given kind, if any
    pub fn find(&self, kind: GlobalKind) -> Option<&Global> {
        self.globals
            .values()
            .find(|global| global.kind == kind && !global.pending_removal)
    }

    /// Look up a global
    pub fn get(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(&id)
    }

    /// Globals in advertisement order, removed ones excluded
    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.globals.values().filter(|global| !global.pending_removal)
    }

    /// Number of globals, including the ones waiting for removal
    pub fn len(&self) -> usize {
        self.globals.len()
    }

    /// Whether there is no global at all
    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    /// Mark a global as removed
    ///
    /// Returns `false` if the global does not exist or was already removed.
    pub fn remove_global(&mut self, id: GlobalId) -> bool {
        match self.globals.get_mut(&id) {
            Some(global) if !global.pending_removal => {
                trace!(global = %id, interface = global.interface(), "Global scheduled for removal");
                global.pending_removal = true;
                self.removed.push(RemovedGlobal { id, flushed: false });
                true
            }
            _ => false,
        }
    }

    /// Number of globals waiting to be destroyed
    pub fn pending_removals(&self) -> usize {
        self.removed.len()
    }

    /// Record that the clients were sent the removal of every queued global
    pub fn removals_flushed(&mut self) {
        for removed in &mut self.removed {
            removed.flushed = true;
        }
    }

    /// Destroy the removed globals whose removal was flushed, returning them
    ///
    /// Globals removed since the last flush stay queued until the next call.
    pub fn process_removed_globals(&mut self) -> Vec<Global> {
        let mut destroyed = Vec::new();
        self.removed.retain(|removed| {
            if !removed.flushed {
                return true;
            }
            if let Some(global) = self.globals.shift_remove(&removed.id) {
                self.destroyed.insert(removed.id);
                destroyed.push(global);
            }
            false
        });
        destroyed
    }

    /// Whether the global was removed, destroyed or not
    ///
    /// Clients may still bind such a global with requests sent before they got the
    /// removal notice.
    pub fn is_retired(&self, id: GlobalId) -> bool {
        self.destroyed.contains(&id) || self.globals.get(&id).is_some_and(Global::is_pending_removal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pixel_buffer_requires_viewporter() {
        let mut registry = GlobalRegistry::default();
        assert_eq!(
            registry.create_global(GlobalKind::SinglePixelBuffer),
            Err(GlobalError::MissingDependency {
                global: "wp_single_pixel_buffer_manager_v1",
                requires: "wp_viewporter",
            })
        );
        registry.create_global(GlobalKind::Viewporter).unwrap();
        assert!(registry.create_global(GlobalKind::SinglePixelBuffer).is_ok());
    }

    #[test]
    fn creation_order_is_advertisement_order() {
        let mut registry = GlobalRegistry::default();
        let kinds = [GlobalKind::Compositor, GlobalKind::Shm, GlobalKind::XdgWmBase];
        for kind in kinds {
            registry.create_global(kind).unwrap();
        }
        let advertised: Vec<_> = registry.iter().map(Global::kind).collect();
        assert_eq!(advertised, kinds);
    }

    #[test]
    fn unsupported_versions_are_rejected() {
        let mut registry = GlobalRegistry::default();
        assert!(registry.create_global_with_version(GlobalKind::XdgWmBase, 7).is_err());
        assert!(registry.create_global_with_version(GlobalKind::XdgWmBase, 0).is_err());
        assert_eq!(
            registry
                .create_global_with_version(GlobalKind::XdgWmBase, 2)
                .map(|id| registry.get(id).unwrap().version()),
            Ok(2)
        );
    }

    #[test]
    fn removal_is_deferred() {
        let mut registry = GlobalRegistry::default();
        let viewporter = registry.create_global(GlobalKind::Viewporter).unwrap();
        let shm = registry.create_global(GlobalKind::Shm).unwrap();

        assert!(registry.remove_global(viewporter));
        assert!(!registry.remove_global(viewporter));
        // still there, but no longer advertised nor usable as a dependency
        assert!(registry.get(viewporter).unwrap().is_pending_removal());
        assert_eq!(registry.iter().count(), 1);
        assert!(registry.create_global(GlobalKind::SinglePixelBuffer).is_err());

        // not destroyed before the removal notice reached the clients
        assert!(registry.process_removed_globals().is_empty());
        assert!(registry.get(viewporter).is_some());

        registry.removals_flushed();
        let removed = registry.process_removed_globals();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), viewporter);
        assert!(registry.get(viewporter).is_none());
        assert!(registry.is_retired(viewporter));
        assert!(!registry.is_retired(shm));
        assert_eq!(registry.iter().next().unwrap().id(), shm);
        assert_eq!(registry.pending_removals(), 0);
    }

    #[test]
    fn removals_after_a_flush_wait_for_the_next_one() {
        let mut registry = GlobalRegistry::default();
        let first = registry.create_global(GlobalKind::Shm).unwrap();
        let second = registry.create_global(GlobalKind::Seat).unwrap();

        registry.remove_global(first);
        registry.removals_flushed();
        registry.remove_global(second);
        let removed: Vec<_> = registry.process_removed_globals().iter().map(Global::id).collect();
        assert_eq!(removed, vec![first]);
        assert!(registry.is_retired(second));
        assert_eq!(registry.pending_removals(), 1);
    }
}
