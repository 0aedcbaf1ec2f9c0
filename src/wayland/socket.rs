//! Client transports
//!
//! The compositor does not decode the wire protocol itself. A [`Transport`] accepts
//! client connections, turns what clients send into typed [`Request`]s, and delivers
//! the [`ClientEvent`]s queued by the compositor. The main loop polls the descriptors
//! returned by [`Transport::poll_fds`], then calls [`Transport::dispatch`] and
//! [`Transport::flush`] once per iteration.
//!
//! Two transports are provided:
//!
//! - [`WaylandTransport`] listens on a `wayland-N` socket of `XDG_RUNTIME_DIR` and
//!   drives the connections with a [`wayland_server::Display`]. Clients that get a
//!   protocol error are killed with it. It only carries connections, flushes and
//!   kills: no global is registered on the display, so a client connecting through
//!   it sees an empty registry and none of its requests reach the compositor.
//! - [`MemoryTransport`], an in-process transport whose clients are driven through a
//!   cloneable handle, used by tests and by embedders running clients in-process.

use std::{
    collections::{HashMap, VecDeque},
    fmt, io,
    os::fd::BorrowedFd,
    sync::{Arc, Mutex},
};

use tracing::trace;

use crate::wayland::{
    client::{ClientEvent, ClientId},
    request::Request,
};

#[cfg(feature = "wayland_frontend")]
pub use self::wire::WaylandTransport;

/// Something happening on a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A client connected
    ClientConnected(ClientId),
    /// A client disconnected, or was disconnected
    ClientDisconnected(ClientId),
    /// A client sent a request
    Request {
        /// The sending client
        client: ClientId,
        /// The request
        request: Request,
    },
}

/// Errors of a transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening socket could not be created
    #[cfg(feature = "wayland_frontend")]
    #[error("Failed to bind the listening socket: {0}")]
    Bind(#[from] wayland_server::BindError),
    /// The display could not be created
    #[error("Failed to create the display: {0}")]
    Display(String),
    /// The transport was used before being initialized
    #[error("The transport is not initialized")]
    NotInitialized,
    /// An IO error on a client connection
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A source of clients and their requests
pub trait Transport: fmt::Debug {
    /// Start accepting clients
    fn initialize(&mut self) -> Result<(), TransportError>;

    /// Descriptors the main loop waits on before dispatching
    fn poll_fds(&self) -> Vec<BorrowedFd<'_>>;

    /// Accept new clients and read their requests
    fn dispatch(&mut self) -> Result<Vec<TransportEvent>, TransportError>;

    /// Queue events for a client
    ///
    /// A [`ClientEvent::ProtocolError`] disconnects the client.
    fn send(&mut self, client: ClientId, events: Vec<ClientEvent>);

    /// Write the queued events to the clients
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Disconnect every client and stop accepting new ones
    fn shutdown(&mut self);
}

#[derive(Debug, Default)]
struct MemoryState {
    initialized: bool,
    fail_initialize: bool,
    incoming: VecDeque<TransportEvent>,
    sent: HashMap<ClientId, Vec<ClientEvent>>,
    connected: Vec<ClientId>,
    disconnected: Vec<ClientId>,
}

/// An in-process transport
///
/// Every clone refers to the same transport: hand one to the compositor and keep
/// another one to act as the clients.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create a new transport
    pub fn new() -> MemoryTransport {
        MemoryTransport::default()
    }

    /// Make the next [`Transport::initialize`] fail
    pub fn fail_initialize(&self, fail: bool) {
        self.state.lock().unwrap().fail_initialize = fail;
    }

    /// Whether the transport was initialized and not shut down since
    pub fn is_initialized(&self) -> bool {
        self.state.lock().unwrap().initialized
    }

    /// Connect a new client
    pub fn connect(&self) -> ClientId {
        let client = ClientId::next();
        let mut state = self.state.lock().unwrap();
        state.connected.push(client);
        state.incoming.push_back(TransportEvent::ClientConnected(client));
        client
    }

    /// Disconnect a client
    pub fn disconnect(&self, client: ClientId) {
        let mut state = self.state.lock().unwrap();
        if let Some(index) = state.connected.iter().position(|id| *id == client) {
            state.connected.remove(index);
            state.disconnected.push(client);
            state.incoming.push_back(TransportEvent::ClientDisconnected(client));
        }
    }

    /// Send a request on behalf of a client
    pub fn push(&self, client: ClientId, request: Request) {
        self.state
            .lock()
            .unwrap()
            .incoming
            .push_back(TransportEvent::Request { client, request });
    }

    /// Take the events flushed to a client so far
    pub fn take_sent(&self, client: ClientId) -> Vec<ClientEvent> {
        self.state.lock().unwrap().sent.remove(&client).unwrap_or_default()
    }

    /// Whether a client was disconnected, by itself or by a protocol error
    pub fn is_disconnected(&self, client: ClientId) -> bool {
        self.state.lock().unwrap().disconnected.contains(&client)
    }
}

impl Transport for MemoryTransport {
    fn initialize(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_initialize {
            return Err(TransportError::Display("in-memory transport refused to start".into()));
        }
        state.initialized = true;
        Ok(())
    }

    fn poll_fds(&self) -> Vec<BorrowedFd<'_>> {
        Vec::new()
    }

    fn dispatch(&mut self) -> Result<Vec<TransportEvent>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(TransportError::NotInitialized);
        }
        Ok(state.incoming.drain(..).collect())
    }

    fn send(&mut self, client: ClientId, events: Vec<ClientEvent>) {
        let mut state = self.state.lock().unwrap();
        if state.disconnected.contains(&client) {
            return;
        }
        let killed = events
            .iter()
            .any(|event| matches!(event, ClientEvent::ProtocolError(_)));
        state.sent.entry(client).or_default().extend(events);
        if killed {
            trace!(%client, "Disconnecting client after a protocol error");
            state.connected.retain(|id| *id != client);
            state.disconnected.push(client);
            state.incoming.push_back(TransportEvent::ClientDisconnected(client));
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.initialized = false;
        let connected = std::mem::take(&mut state.connected);
        state.disconnected.extend(connected);
        state.incoming.clear();
    }
}

#[cfg(feature = "wayland_frontend")]
mod wire {
    use std::{
        collections::HashMap,
        os::fd::{AsFd, BorrowedFd, OwnedFd},
        sync::{Arc, Mutex},
    };

    use tracing::{debug, info, trace, warn};
    use wayland_server::{
        backend::{protocol::ProtocolError, ClientData, DisconnectReason},
        Display, ListeningSocket,
    };

    use super::{Transport, TransportError, TransportEvent};
    use crate::wayland::client::{ClientEvent, ClientId};

    #[derive(Debug, Default)]
    struct WireState;

    #[derive(Debug)]
    struct WireClient {
        id: ClientId,
        disconnected: Arc<Mutex<Vec<ClientId>>>,
    }

    impl ClientData for WireClient {
        fn initialized(&self, _client_id: wayland_server::backend::ClientId) {}

        fn disconnected(&self, _client_id: wayland_server::backend::ClientId, reason: DisconnectReason) {
            debug!(client = %self.id, ?reason, "Client disconnected");
            self.disconnected.lock().unwrap().push(self.id);
        }
    }

    /// Transport over a Wayland socket
    pub struct WaylandTransport {
        socket_name: Option<String>,
        socket: Option<ListeningSocket>,
        display: Option<Display<WireState>>,
        display_fd: Option<OwnedFd>,
        state: WireState,
        clients: HashMap<ClientId, wayland_server::Client>,
        disconnected: Arc<Mutex<Vec<ClientId>>>,
    }

    impl std::fmt::Debug for WaylandTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("WaylandTransport")
                .field("socket_name", &self.socket_name())
                .field("clients", &self.clients.len())
                .finish_non_exhaustive()
        }
    }

    impl WaylandTransport {
        /// Create a transport listening on `socket_name`, or on the first free
        /// `wayland-N` socket if `None`
        pub fn new(socket_name: Option<String>) -> WaylandTransport {
            WaylandTransport {
                socket_name,
                socket: None,
                display: None,
                display_fd: None,
                state: WireState,
                clients: HashMap::new(),
                disconnected: Arc::default(),
            }
        }

        /// Name of the listening socket, once bound
        pub fn socket_name(&self) -> Option<String> {
            self.socket
                .as_ref()
                .and_then(|socket| socket.socket_name())
                .map(|name| name.to_string_lossy().into_owned())
        }
    }

    impl Transport for WaylandTransport {
        fn initialize(&mut self) -> Result<(), TransportError> {
            let socket = match self.socket_name.as_deref() {
                Some(name) => ListeningSocket::bind(name)?,
                // wayland-0 is skipped, clients falling back to it would reach the
                // wrong compositor
                None => ListeningSocket::bind_auto("wayland", 1..33)?,
            };
            let mut display =
                Display::<WireState>::new().map_err(|err| TransportError::Display(format!("{err:?}")))?;
            let display_fd = display.backend().poll_fd().try_clone_to_owned()?;
            info!(name = ?socket.socket_name(), "Listening for clients");
            self.socket = Some(socket);
            self.display = Some(display);
            self.display_fd = Some(display_fd);
            Ok(())
        }

        fn poll_fds(&self) -> Vec<BorrowedFd<'_>> {
            let mut fds = Vec::with_capacity(2);
            if let Some(socket) = self.socket.as_ref() {
                fds.push(socket.as_fd());
            }
            if let Some(fd) = self.display_fd.as_ref() {
                fds.push(fd.as_fd());
            }
            fds
        }

        fn dispatch(&mut self) -> Result<Vec<TransportEvent>, TransportError> {
            let (Some(socket), Some(display)) = (self.socket.as_ref(), self.display.as_mut()) else {
                return Err(TransportError::NotInitialized);
            };
            let mut events = Vec::new();

            while let Some(stream) = socket.accept()? {
                let id = ClientId::next();
                let data = Arc::new(WireClient {
                    id,
                    disconnected: self.disconnected.clone(),
                });
                match display.handle().insert_client(stream, data) {
                    Ok(client) => {
                        debug!(client = %id, "New client connected");
                        self.clients.insert(id, client);
                        events.push(TransportEvent::ClientConnected(id));
                    }
                    Err(err) => warn!(?err, "Failed to insert client"),
                }
            }

            display.dispatch_clients(&mut self.state)?;

            for id in self.disconnected.lock().unwrap().drain(..) {
                if self.clients.remove(&id).is_some() {
                    events.push(TransportEvent::ClientDisconnected(id));
                }
            }
            Ok(events)
        }

        fn send(&mut self, client: ClientId, events: Vec<ClientEvent>) {
            let Some(display) = self.display.as_ref() else {
                return;
            };
            for event in events {
                match event {
                    ClientEvent::ProtocolError(error) => {
                        if let Some(wire_client) = self.clients.get(&client) {
                            wire_client.kill(
                                &display.handle(),
                                ProtocolError {
                                    code: error.code,
                                    object_id: 1,
                                    object_interface: error.interface.into(),
                                    message: error.message,
                                },
                            );
                        }
                    }
                    event => trace!(%client, ?event, "Event without wire encoding"),
                }
            }
        }

        fn flush(&mut self) -> Result<(), TransportError> {
            match self.display.as_mut() {
                Some(display) => Ok(display.flush_clients()?),
                None => Err(TransportError::NotInitialized),
            }
        }

        fn shutdown(&mut self) {
            if let Some(display) = self.display.as_ref() {
                let handle = display.handle();
                for client in self.clients.values() {
                    handle
                        .backend_handle()
                        .kill_client(client.id(), DisconnectReason::ConnectionClosed);
                }
            }
            self.clients.clear();
            self.display_fd = None;
            self.display = None;
            self.socket = None;
        }
    }
}
