use std::collections::HashMap;

use tracing::trace;

use super::{SurfaceData, SurfaceId};

/// Error returned when linking a surface to one of its own descendants
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Surface {child} cannot be a child of its descendant {parent}")]
pub struct CyclicLink {
    /// Surface that was to become a child
    pub child: SurfaceId,
    /// Requested parent
    pub parent: SurfaceId,
}

/// All the surfaces of the compositor, and their stacking order
///
/// Surfaces form a forest through their parent links: the parent owns the ordered
/// list of its children, the child only knows its parent id. Every surface can be
/// destroyed independently, destroying a parent orphans its children.
///
/// The stacking order lists every surface, from bottom to top.
#[derive(Debug, Default)]
pub struct SurfaceTree {
    surfaces: HashMap<SurfaceId, SurfaceData>,
    stacking: Vec<SurfaceId>,
}

impl SurfaceTree {
    pub(crate) fn insert(&mut self, data: SurfaceData) {
        let id = data.id;
        self.surfaces.insert(id, data);
        self.stacking.push(id);
    }

    pub(crate) fn remove(&mut self, surface: SurfaceId) -> Option<SurfaceData> {
        self.unlink(surface);
        let data = self.surfaces.remove(&surface)?;
        for child in data.children.iter() {
            if let Some(child) = self.surfaces.get_mut(child) {
                child.parent = None;
            }
        }
        self.stacking.retain(|id| *id != surface);
        Some(data)
    }

    /// Data of a surface
    pub fn get(&self, surface: SurfaceId) -> Option<&SurfaceData> {
        self.surfaces.get(&surface)
    }

    pub(crate) fn get_mut(&mut self, surface: SurfaceId) -> Option<&mut SurfaceData> {
        self.surfaces.get_mut(&surface)
    }

    /// Whether the surface exists
    pub fn contains(&self, surface: SurfaceId) -> bool {
        self.surfaces.contains_key(&surface)
    }

    /// Number of surfaces
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    /// Whether there are no surfaces
    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    /// The surfaces, from bottom to top
    pub fn stacking_order(&self) -> &[SurfaceId] {
        &self.stacking
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut SurfaceData> {
        self.surfaces.values_mut()
    }

    /// Whether `ancestor` is `surface` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: SurfaceId, surface: SurfaceId) -> bool {
        let mut current = Some(surface);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.surfaces.get(&id).and_then(|data| data.parent);
        }
        false
    }

    /// Make `child` the topmost child of `parent`
    ///
    /// Any previous parent link of `child` is removed first.
    pub(crate) fn set_parent(&mut self, child: SurfaceId, parent: SurfaceId) -> Result<(), CyclicLink> {
        if self.is_ancestor(child, parent) {
            return Err(CyclicLink { child, parent });
        }
        self.unlink(child);
        if let Some(data) = self.surfaces.get_mut(&parent) {
            data.children.push(child);
        }
        if let Some(data) = self.surfaces.get_mut(&child) {
            data.parent = Some(parent);
        }
        trace!(%child, %parent, "Linked surface");
        Ok(())
    }

    /// Remove the link between `child` and its parent
    pub(crate) fn unlink(&mut self, child: SurfaceId) {
        let Some(parent) = self.surfaces.get_mut(&child).and_then(|data| data.parent.take()) else {
            return;
        };
        if let Some(data) = self.surfaces.get_mut(&parent) {
            data.children.retain(|id| *id != child);
        }
    }

    /// `surface` and all its descendants, depth-first, children in order
    pub fn subtree(&self, surface: SurfaceId) -> Vec<SurfaceId> {
        let mut result = Vec::new();
        let mut stack = vec![surface];
        while let Some(id) = stack.pop() {
            // the parent links are acyclic, but a surface is never visited twice anyway
            if result.contains(&id) {
                continue;
            }
            result.push(id);
            if let Some(data) = self.surfaces.get(&id) {
                stack.extend(data.children.iter().rev().copied());
            }
        }
        result
    }

    /// Move `surface` and its descendants to the top of the stacking order
    ///
    /// Returns the moved surfaces in their new order.
    pub(crate) fn raise(&mut self, surface: SurfaceId) -> Vec<SurfaceId> {
        if !self.surfaces.contains_key(&surface) {
            return Vec::new();
        }
        let subtree = self.subtree(surface);
        self.stacking.retain(|id| !subtree.contains(id));
        self.stacking.extend(subtree.iter().copied());
        subtree
    }
}
