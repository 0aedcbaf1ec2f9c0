//! Drag'n'Drop session tracking
//!
//! A drag is started by a client from one of its surfaces, follows the pointer focus,
//! and ends with a drop on the focused surface. Once dropped, the destination is
//! expected to ask for the data. Destinations which never do would leave the source
//! waiting forever, so the main loop calls [`DndManager::advance`] once per iteration
//! and the operation is cancelled after [`DROP_TIMEOUT_ITERATIONS`] iterations without
//! a data request.

use tracing::debug;

use crate::wayland::{client::ClientId, compositor::SurfaceId};

/// Loop iterations a destination has to request the dropped data
pub const DROP_TIMEOUT_ITERATIONS: u32 = 3;

/// Enumeration of valid actions of a Drag'n'Drop operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DndAction {
    /// No action
    #[default]
    None,
    /// Data will be copied
    Copy,
    /// Data will be moved
    Move,
    /// User will be asked how to handle the data
    Ask,
}

/// State of the Drag'n'Drop operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DndState {
    /// No operation in progress
    #[default]
    Idle,
    /// The pointer is dragging data
    Dragging,
    /// The data was dropped, waiting for the destination to request it
    Dropped,
    /// The destination requested the data
    Finished,
    /// The operation was cancelled
    Cancelled,
}

/// Drag'n'Drop state of a seat
#[derive(Debug, Default)]
pub struct DndManager {
    state: DndState,
    source: Option<ClientId>,
    origin: Option<SurfaceId>,
    icon: Option<SurfaceId>,
    focus: Option<SurfaceId>,
    action: DndAction,
    iterations_without_request: u32,
}

impl DndManager {
    /// Current state of the operation
    pub fn state(&self) -> DndState {
        self.state
    }

    /// Whether a drag is in progress, dropped data included
    pub fn is_active(&self) -> bool {
        matches!(self.state, DndState::Dragging | DndState::Dropped)
    }

    /// Client providing the data
    pub fn source(&self) -> Option<ClientId> {
        self.source
    }

    /// Surface the drag was started from
    pub fn origin(&self) -> Option<SurfaceId> {
        self.origin
    }

    /// Icon surface following the pointer
    pub fn icon(&self) -> Option<SurfaceId> {
        self.icon
    }

    /// Surface currently hovered by the drag
    pub fn focus(&self) -> Option<SurfaceId> {
        self.focus
    }

    /// Action negotiated with the destination
    pub fn action(&self) -> DndAction {
        self.action
    }

    /// Set the action negotiated with the destination
    pub fn set_action(&mut self, action: DndAction) {
        self.action = action;
    }

    pub(crate) fn start(&mut self, source: ClientId, origin: SurfaceId, icon: Option<SurfaceId>) -> bool {
        if self.is_active() {
            return false;
        }
        debug!(client = %source, %origin, "Drag started");
        *self = DndManager {
            state: DndState::Dragging,
            source: Some(source),
            origin: Some(origin),
            icon,
            focus: Some(origin),
            ..Default::default()
        };
        true
    }

    pub(crate) fn set_focus(&mut self, focus: Option<SurfaceId>) {
        if self.state == DndState::Dragging {
            self.focus = focus;
        }
    }

    /// Drop the data on the focused surface
    ///
    /// Returns the destination, the operation is cancelled if there is none.
    pub(crate) fn drop_data(&mut self) -> Option<SurfaceId> {
        if self.state != DndState::Dragging {
            return None;
        }
        match self.focus {
            Some(focus) => {
                debug!(destination = %focus, "Data dropped");
                self.state = DndState::Dropped;
                self.iterations_without_request = 0;
                Some(focus)
            }
            None => {
                self.cancel();
                None
            }
        }
    }

    /// The destination requested the dropped data
    pub(crate) fn data_requested(&mut self) -> bool {
        if self.state != DndState::Dropped {
            return false;
        }
        self.state = DndState::Finished;
        true
    }

    /// Cancel the operation, returns the source client to notify
    pub(crate) fn cancel(&mut self) -> Option<ClientId> {
        if !self.is_active() {
            return None;
        }
        debug!(source = ?self.source, "Drag cancelled");
        self.state = DndState::Cancelled;
        self.focus = None;
        self.source
    }

    /// Advance the drop timeout by one loop iteration
    ///
    /// Returns the source client to notify if the operation got cancelled.
    pub(crate) fn advance(&mut self) -> Option<ClientId> {
        if self.state != DndState::Dropped {
            return None;
        }
        if self.iterations_without_request < DROP_TIMEOUT_ITERATIONS {
            self.iterations_without_request += 1;
        }
        if self.iterations_without_request >= DROP_TIMEOUT_ITERATIONS {
            return self.cancel();
        }
        None
    }

    pub(crate) fn forget_surface(&mut self, surface: SurfaceId) {
        if self.icon == Some(surface) {
            self.icon = None;
        }
        if self.focus == Some(surface) {
            self.focus = None;
        }
        if self.origin == Some(surface) {
            self.origin = None;
            self.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dropped() -> (DndManager, ClientId) {
        let client = ClientId::next();
        let mut dnd = DndManager::default();
        assert!(dnd.start(client, SurfaceId::next(), None));
        let target = SurfaceId::next();
        dnd.set_focus(Some(target));
        assert_eq!(dnd.drop_data(), Some(target));
        (dnd, client)
    }

    #[test]
    fn drop_is_cancelled_after_three_iterations() {
        let (mut dnd, client) = dropped();
        assert_eq!(dnd.advance(), None);
        assert_eq!(dnd.advance(), None);
        assert_eq!(dnd.state(), DndState::Dropped);
        assert_eq!(dnd.advance(), Some(client));
        assert_eq!(dnd.state(), DndState::Cancelled);
        assert_eq!(dnd.advance(), None);
    }

    #[test]
    fn requesting_data_finishes_the_drop() {
        let (mut dnd, _) = dropped();
        dnd.advance();
        assert!(dnd.data_requested());
        for _ in 0..5 {
            assert_eq!(dnd.advance(), None);
        }
        assert_eq!(dnd.state(), DndState::Finished);
    }

    #[test]
    fn drop_without_focus_cancels() {
        let mut dnd = DndManager::default();
        dnd.start(ClientId::next(), SurfaceId::next(), None);
        dnd.set_focus(None);
        assert_eq!(dnd.drop_data(), None);
        assert_eq!(dnd.state(), DndState::Cancelled);
    }

    #[test]
    fn only_one_drag_at_a_time() {
        let mut dnd = DndManager::default();
        assert!(dnd.start(ClientId::next(), SurfaceId::next(), None));
        assert!(!dnd.start(ClientId::next(), SurfaceId::next(), None));
    }
}
