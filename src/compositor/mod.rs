//! The compositor
//!
//! [`Compositor`] owns the whole client-visible state: clients, globals, surfaces and
//! their roles, the seat, the cursor and the outputs. It drives two backends (see
//! [`backend`](crate::backend)) and a [`Transport`] the clients connect through.
//!
//! ## Lifecycle
//!
//! A compositor is created [`Uninitialized`](CompositorState::Uninitialized), configured
//! with its backends and its [`CompositorHandler`], then started:
//!
//! ```no_run
//! use std::time::Duration;
//! use kiln::compositor::{Compositor, CompositorConfig};
//!
//! let mut compositor = Compositor::new(CompositorConfig::from_env());
//! // without backends set, the default modules of the configuration are loaded
//! compositor.start().expect("Failed to start the compositor");
//! while compositor.state() == kiln::compositor::CompositorState::Initialized {
//!     compositor.process_loop(Some(Duration::from_millis(16))).unwrap();
//! }
//! ```
//!
//! Only one compositor can run in a process at a time: [`Compositor::start`] fails with
//! [`StartError::AlreadyRunning`] while another one is started. A failed start rolls
//! every step back, the compositor can be started again afterwards.
//!
//! ## The main loop
//!
//! Every call to [`Compositor::process_loop`] runs one iteration: it waits for the
//! transport, then, holding the [render lock](Compositor::render_lock), destroys the
//! globals removed during the previous iteration, collects the GPU garbage of the main
//! thread, advances the Drag'n'Drop drop timeout, dispatches client requests and input
//! events, flushes the clients and refreshes the cursor.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use indexmap::IndexMap;
use rustix::event::{PollFd, PollFlags};
use tracing::{debug, error, info, info_span, trace, warn};

use crate::{
    backend::{renderer::RenderContext, BackendError, GraphicsBackend, InputBackend},
    cursor::Cursor,
    output::Output,
    utils::SerialCounter,
    wayland::{
        client::{Client, ClientId},
        compositor::{roles::Role, SurfaceId, SurfaceTree},
        global::{GlobalError, GlobalId, GlobalKind, GlobalRegistry},
        seat::Seat,
        shell::xdg::XdgShellState,
        socket::{Transport, TransportError, TransportEvent},
    },
};

mod config;
mod handler;
mod outputs;

pub use self::config::{CompositorConfig, DEFAULT_GRAPHICS_BACKEND, DEFAULT_INPUT_BACKEND};
pub use self::handler::{CompositorHandler, DefaultHandler, ObjectRef};
pub use self::outputs::OutputError;

static INSTANCE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Lifecycle of a [`Compositor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositorState {
    /// Not started
    #[default]
    Uninitialized,
    /// [`Compositor::start`] is running
    Initializing,
    /// Started, the main loop can run
    Initialized,
    /// Releasing the backends
    Uninitializing,
    /// [`Compositor::finish`] was called, the compositor cannot be started again
    Finished,
}

/// Errors of [`Compositor::start`]
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// Another compositor is running in this process
    #[error("Another compositor is already running in this process")]
    AlreadyRunning,
    /// The compositor is not in the [`Uninitialized`](CompositorState::Uninitialized) state
    #[error("The compositor cannot be started from the {0:?} state")]
    InvalidState(CompositorState),
    /// No transport was set, and none is built in
    #[error("No transport was set")]
    NoTransport,
    /// The transport failed to initialize
    #[error("Failed to initialize the transport: {0}")]
    Transport(#[from] TransportError),
    /// The globals could not be created
    #[error("Failed to create the globals: {0}")]
    Globals(#[from] GlobalError),
    /// The graphics backend failed to load or initialize
    #[error("Graphics backend: {0}")]
    Graphics(#[source] BackendError),
    /// The input backend failed to load or initialize
    #[error("Input backend: {0}")]
    Input(#[source] BackendError),
}

/// Errors of [`Compositor::process_loop`]
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The compositor is not started
    #[error("The compositor is not running")]
    NotRunning,
    /// Waiting on the transport failed
    #[error("Failed to poll the transport: {0}")]
    Poll(#[from] std::io::Error),
    /// The transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The compositor
pub struct Compositor {
    config: CompositorConfig,
    state: CompositorState,
    handler: Option<Box<dyn CompositorHandler>>,
    transport: Option<Box<dyn Transport>>,
    graphics: Option<Arc<dyn GraphicsBackend>>,
    render_context: Option<RenderContext>,
    input: Option<Box<dyn InputBackend>>,
    pub(crate) globals: GlobalRegistry,
    pub(crate) clients: IndexMap<ClientId, Client>,
    pub(crate) surfaces: SurfaceTree,
    pub(crate) shell: XdgShellState,
    pub(crate) seat: Seat,
    pub(crate) cursor: Cursor,
    pub(crate) outputs: Vec<Output>,
    pub(crate) serials: SerialCounter,
    global_scale: i32,
    render_lock: Arc<Mutex<()>>,
    claimed: bool,
    transport_initialized: bool,
    graphics_initialized: bool,
    input_initialized: bool,
}

impl fmt::Debug for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compositor")
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("graphics", &self.graphics)
            .field("input", &self.input)
            .field("clients", &self.clients.len())
            .field("surfaces", &self.surfaces.len())
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl Compositor {
    /// Create a new compositor
    pub fn new(config: CompositorConfig) -> Compositor {
        let seat = Seat::new(config.seat_name.clone());
        Compositor {
            config,
            state: CompositorState::Uninitialized,
            handler: Some(Box::new(DefaultHandler)),
            transport: None,
            graphics: None,
            render_context: None,
            input: None,
            globals: GlobalRegistry::default(),
            clients: IndexMap::new(),
            surfaces: SurfaceTree::default(),
            shell: XdgShellState::default(),
            seat,
            cursor: Cursor::default(),
            outputs: Vec::new(),
            serials: SerialCounter::new(),
            global_scale: 1,
            render_lock: Arc::new(Mutex::new(())),
            claimed: false,
            transport_initialized: false,
            graphics_initialized: false,
            input_initialized: false,
        }
    }

    /// Configuration of the compositor
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> CompositorState {
        self.state
    }

    /// Set the hooks of the compositor
    pub fn set_handler(&mut self, handler: impl CompositorHandler + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Set the transport clients connect through, before starting
    ///
    /// If none is set, [`start`](Compositor::start) listens on a Wayland socket.
    pub fn set_transport(&mut self, transport: impl Transport + 'static) {
        if self.transport_initialized {
            warn!("Cannot replace the transport of a started compositor");
            return;
        }
        self.transport = Some(Box::new(transport));
    }

    /// Set the graphics backend, before starting
    pub fn set_graphics_backend(&mut self, backend: Arc<dyn GraphicsBackend>) {
        if self.graphics_initialized {
            warn!("Cannot replace the graphics backend of a started compositor");
            return;
        }
        self.graphics = Some(backend);
    }

    /// Set the input backend, before starting
    pub fn set_input_backend(&mut self, backend: Box<dyn InputBackend>) {
        if self.input_initialized {
            warn!("Cannot replace the input backend of a started compositor");
            return;
        }
        self.input = Some(backend);
    }

    /// The graphics backend
    pub fn graphics_backend(&self) -> Option<&Arc<dyn GraphicsBackend>> {
        self.graphics.as_ref()
    }

    /// The render context of the graphics backend, once started
    pub fn render_context(&self) -> Option<&RenderContext> {
        self.render_context.as_ref()
    }

    /// Lock serializing the main loop with the render threads of the outputs
    ///
    /// The main loop holds it while it processes client requests. Render threads must
    /// hold it while reading compositor state.
    pub fn render_lock(&self) -> Arc<Mutex<()>> {
        self.render_lock.clone()
    }

    /// The seat
    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    /// The cursor
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// The cursor, mutably
    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    /// A connected client
    pub fn client(&self, client: ClientId) -> Option<&Client> {
        self.clients.get(&client)
    }

    pub(crate) fn client_mut(&mut self, client: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&client)
    }

    /// The connected clients, in connection order
    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    /// Run `f` with the handler
    ///
    /// The handler is moved out while `f` runs, nested calls get a [`DefaultHandler`].
    pub(crate) fn with_handler<T>(&mut self, f: impl FnOnce(&mut dyn CompositorHandler, &mut Compositor) -> T) -> T {
        let Some(mut handler) = self.handler.take() else {
            return f(&mut DefaultHandler, self);
        };
        let result = f(handler.as_mut(), self);
        // a handler set from within the hook replaces this one
        if self.handler.is_none() {
            self.handler = Some(handler);
        }
        result
    }

    /// Start the compositor
    ///
    /// Initializes, in order, the transport, the seat, the graphics backend, the globals
    /// and the input backend, then calls [`CompositorHandler::initialized`]. Backends that
    /// were not set are loaded from the default modules of the configuration.
    ///
    /// On failure everything is rolled back, and the compositor is left
    /// [`Uninitialized`](CompositorState::Uninitialized).
    pub fn start(&mut self) -> Result<(), StartError> {
        let span = info_span!("compositor_start");
        let _guard = span.enter();

        if self.state != CompositorState::Uninitialized {
            warn!(state = ?self.state, "Compositor cannot be started");
            return Err(StartError::InvalidState(self.state));
        }
        if INSTANCE_CLAIMED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            error!("Another compositor is already running");
            return Err(StartError::AlreadyRunning);
        }
        self.claimed = true;
        self.state = CompositorState::Initializing;

        if let Err(err) = self.initialize() {
            error!(%err, "Failed to start the compositor");
            self.uninitialize();
            return Err(err);
        }

        self.state = CompositorState::Initialized;
        info!("Compositor initialized");
        self.with_handler(|handler, compositor| handler.initialized(compositor));
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), StartError> {
        self.initialize_transport()?;
        self.seat.initialize();
        self.initialize_graphics()?;
        // after the graphics backend, the default globals depend on its DMA formats
        self.with_handler(|handler, compositor| handler.create_globals_request(compositor))?;
        self.initialize_input()?;
        debug!(seat = %self.seat.name(), "Seat initialized");
        Ok(())
    }

    fn initialize_transport(&mut self) -> Result<(), StartError> {
        if self.transport.is_none() {
            #[cfg(feature = "wayland_frontend")]
            {
                let transport = crate::wayland::socket::WaylandTransport::new(self.config.socket_name.clone());
                self.transport = Some(Box::new(transport));
            }
        }
        let transport = self.transport.as_mut().ok_or(StartError::NoTransport)?;
        transport.initialize()?;
        self.transport_initialized = true;
        Ok(())
    }

    fn initialize_graphics(&mut self) -> Result<(), StartError> {
        if self.graphics.is_none() {
            self.graphics = Some(self.load_default_graphics_backend()?);
        }
        let Some(graphics) = self.graphics.clone() else {
            return Err(StartError::Graphics(BackendError::Initialization(
                "no graphics backend".into(),
            )));
        };
        graphics.initialize().map_err(StartError::Graphics)?;
        self.graphics_initialized = true;
        self.render_context = Some(RenderContext::new(graphics.clone()));
        info!(backend = graphics.name(), "Graphics backend initialized");
        Ok(())
    }

    #[cfg(feature = "backend_module")]
    fn load_default_graphics_backend(&self) -> Result<Arc<dyn GraphicsBackend>, StartError> {
        let loaded = crate::backend::module::load_graphics_backend(&self.config.default_graphics_backend)
            .map_err(StartError::Graphics)?;
        Ok(Arc::new(loaded))
    }

    #[cfg(not(feature = "backend_module"))]
    fn load_default_graphics_backend(&self) -> Result<Arc<dyn GraphicsBackend>, StartError> {
        Err(StartError::Graphics(BackendError::Initialization(
            "no graphics backend set, and module loading is disabled".into(),
        )))
    }

    fn initialize_input(&mut self) -> Result<(), StartError> {
        if self.input.is_none() {
            warn!(
                path = %self.config.default_input_backend.display(),
                "No input backend set, loading the default one"
            );
            self.input = Some(self.load_default_input_backend()?);
        }
        let Some(input) = self.input.as_mut() else {
            return Err(StartError::Input(BackendError::Initialization("no input backend".into())));
        };
        input.initialize(&mut self.seat).map_err(StartError::Input)?;
        self.input_initialized = true;
        info!(backend = input.name(), "Input backend initialized");
        Ok(())
    }

    #[cfg(feature = "backend_module")]
    fn load_default_input_backend(&self) -> Result<Box<dyn InputBackend>, StartError> {
        let loaded =
            crate::backend::module::load_input_backend(&self.config.default_input_backend).map_err(StartError::Input)?;
        Ok(Box::new(loaded))
    }

    #[cfg(not(feature = "backend_module"))]
    fn load_default_input_backend(&self) -> Result<Box<dyn InputBackend>, StartError> {
        Err(StartError::Input(BackendError::Initialization(
            "no input backend set, and module loading is disabled".into(),
        )))
    }

    // Single rollback path, for failed starts as well as for finish and drop
    fn uninitialize(&mut self) {
        let was_running = self.state == CompositorState::Initialized;
        self.state = CompositorState::Uninitializing;
        if was_running {
            self.with_handler(|handler, compositor| handler.uninitialized(compositor));
        }

        for output in self.outputs.clone().iter().rev() {
            self.remove_output(output);
        }
        let clients: Vec<ClientId> = self.clients.keys().copied().collect();
        for client in clients {
            self.remove_client(client);
        }
        self.globals = GlobalRegistry::default();

        if self.input_initialized {
            if let Some(input) = self.input.as_mut() {
                input.uninitialize(&mut self.seat);
            }
            self.input_initialized = false;
        }
        self.seat.uninitialize();

        if let Some(context) = self.render_context.take() {
            context.collect_garbage();
        }
        if self.graphics_initialized {
            if let Some(graphics) = self.graphics.as_ref() {
                graphics.uninitialize();
            }
            self.graphics_initialized = false;
        }

        if self.transport_initialized {
            if let Some(transport) = self.transport.as_mut() {
                transport.shutdown();
            }
            self.transport_initialized = false;
        }

        if self.claimed {
            INSTANCE_CLAIMED.store(false, Ordering::SeqCst);
            self.claimed = false;
        }
        self.state = CompositorState::Uninitialized;
        debug!("Compositor uninitialized");
    }

    /// Stop the compositor for good
    ///
    /// Releases the outputs, the clients and the backends. The compositor cannot be
    /// started again.
    pub fn finish(&mut self) {
        if self.state == CompositorState::Finished {
            return;
        }
        info!("Finishing the compositor");
        self.uninitialize();
        self.state = CompositorState::Finished;
    }

    /// Run one iteration of the main loop
    ///
    /// Waits up to `timeout` for the transport to become readable, `None` waits
    /// forever. Returns the number of client requests dispatched.
    pub fn process_loop(&mut self, timeout: Option<Duration>) -> Result<usize, LoopError> {
        if self.state != CompositorState::Initialized {
            return Err(LoopError::NotRunning);
        }
        self.poll(timeout)?;

        let render_lock = self.render_lock.clone();
        let _guard = render_lock.lock().unwrap();

        self.process_removed_globals();
        if let Some(context) = self.render_context.as_ref() {
            context.collect_garbage();
        }
        if self.seat.dnd_mut().advance().is_some() {
            self.notify_dnd_cancelled();
        }

        let dispatched = self.dispatch()?;
        self.send_popup_configurations();
        self.flush_clients()?;

        self.cursor.texture_update(&self.outputs);
        self.repaint_requested_outputs();
        Ok(dispatched)
    }

    fn poll(&self, timeout: Option<Duration>) -> Result<(), LoopError> {
        let Some(transport) = self.transport.as_ref() else {
            return Ok(());
        };
        let fds = transport.poll_fds();
        if fds.is_empty() {
            return Ok(());
        }
        let mut poll_fds: Vec<PollFd<'_>> = fds
            .into_iter()
            .map(|fd| PollFd::from_borrowed_fd(fd, PollFlags::IN))
            .collect();
        let timeout = timeout.map_or(-1, |timeout| timeout.as_millis().min(i32::MAX as u128) as i32);
        match rustix::event::poll(&mut poll_fds, timeout) {
            Ok(_) | Err(rustix::io::Errno::INTR) => Ok(()),
            Err(err) => Err(LoopError::Poll(err.into())),
        }
    }

    fn dispatch(&mut self) -> Result<usize, LoopError> {
        let events = match self.transport.as_mut() {
            Some(transport) => transport.dispatch()?,
            None => Vec::new(),
        };

        let mut requests = 0;
        for event in events {
            match event {
                TransportEvent::ClientConnected(client) => {
                    self.add_client_with_id(client);
                }
                TransportEvent::ClientDisconnected(client) => self.remove_client(client),
                TransportEvent::Request { client, request } => {
                    requests += 1;
                    self.handle_request(client, request);
                }
            }
        }

        if let Some(mut input) = self.input.take() {
            let mut events = Vec::new();
            input.dispatch(&mut |event| events.push(event));
            self.input = Some(input);
            for event in events {
                self.dispatch_input_event(event);
            }
        }
        Ok(requests)
    }

    /// Hand the queued events of every client to the transport
    ///
    /// Clients that got a protocol error are removed.
    pub fn flush_clients(&mut self) -> Result<(), TransportError> {
        let mut errored = Vec::new();
        for client in self.clients.values_mut() {
            let events = client.take_events();
            if client.protocol_error().is_some() {
                errored.push(client.id());
            }
            if events.is_empty() {
                continue;
            }
            if let Some(transport) = self.transport.as_mut() {
                transport.send(client.id(), events);
            }
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.flush()?;
        }
        self.globals.removals_flushed();
        for client in errored {
            self.remove_client(client);
        }
        Ok(())
    }

    /// Add a client living in the compositor process
    ///
    /// Clients connecting through the transport are added automatically.
    pub fn add_client(&mut self) -> ClientId {
        self.add_client_with_id(ClientId::next())
    }

    pub(crate) fn add_client_with_id(&mut self, id: ClientId) -> ClientId {
        let client = Client::new(id, self.config.input_history, self.config.xdg_wm_base_version);
        self.clients.insert(id, client);
        debug!(client = %id, "Client added");
        let globals: Vec<GlobalId> = self.globals.iter().map(|global| global.id()).collect();
        for global in globals {
            self.advertise_global(id, global);
        }
        id
    }

    /// Remove a client and destroy all its objects
    pub fn remove_client(&mut self, client: ClientId) {
        if !self.clients.contains_key(&client) {
            return;
        }
        let surfaces: Vec<SurfaceId> = self
            .surfaces
            .stacking_order()
            .iter()
            .rev()
            .copied()
            .filter(|surface| self.surface_client(*surface) == Some(client))
            .collect();
        for surface in surfaces {
            match self.surfaces.get(surface).and_then(|data| data.role()).cloned() {
                Some(Role::Popup(popup)) => self.destroy_popup(popup),
                Some(Role::Toplevel(toplevel)) => self.destroy_toplevel(toplevel),
                _ => {}
            }
            self.destroy_surface(surface);
        }
        if self.seat.dnd().source() == Some(client) {
            self.seat.dnd_mut().cancel();
        }
        self.clients.shift_remove(&client);
        debug!(%client, "Client removed");
    }

    /// The globals of the compositor
    pub fn globals(&self) -> &GlobalRegistry {
        &self.globals
    }

    /// Create a global and advertise it to the clients
    pub fn create_global(&mut self, kind: GlobalKind) -> Result<GlobalId, GlobalError> {
        let global = self.globals.create_global(kind)?;
        let clients: Vec<ClientId> = self.clients.keys().copied().collect();
        for client in clients {
            self.advertise_global(client, global);
        }
        Ok(global)
    }

    fn advertise_global(&mut self, client: ClientId, global: GlobalId) {
        let Some((interface, version)) = self.globals.get(global).map(|g| (g.interface(), g.version())) else {
            return;
        };
        if !self.with_handler(|handler, compositor| handler.globals_filter(compositor, client, global)) {
            trace!(%client, %global, interface, "Global filtered out");
            return;
        }
        if let Some(client) = self.clients.get_mut(&client) {
            client.advertise_global(global, interface, version);
        }
    }

    /// Remove a global
    ///
    /// The clients it was advertised to are told right away. The global is destroyed
    /// by the first loop iteration starting after that notice was flushed.
    pub fn remove_global(&mut self, global: GlobalId) -> bool {
        if !self.globals.remove_global(global) {
            return false;
        }
        for client in self.clients.values_mut() {
            client.retract_global(global);
        }
        true
    }

    pub(crate) fn process_removed_globals(&mut self) {
        for global in self.globals.process_removed_globals() {
            for client in self.clients.values_mut() {
                client.unbind_global(global.id());
            }
            trace!(global = %global.id(), interface = global.interface(), "Global destroyed");
        }
    }

    /// Create the globals advertised by default
    ///
    /// `zwp_linux_dmabuf_v1` is only created if the graphics backend supports DMA
    /// formats.
    pub fn create_default_globals(&mut self) -> Result<(), GlobalError> {
        let dma = self
            .graphics
            .as_ref()
            .is_some_and(|graphics| !graphics.dma_formats().is_empty());
        let kinds = [
            Some(GlobalKind::Compositor),
            Some(GlobalKind::Shm),
            Some(GlobalKind::Seat),
            Some(GlobalKind::RelativePointerManager),
            Some(GlobalKind::PointerConstraints),
            Some(GlobalKind::PointerGestures),
            Some(GlobalKind::DataDeviceManager),
            Some(GlobalKind::Subcompositor),
            Some(GlobalKind::XdgWmBase),
            Some(GlobalKind::XdgDecorationManager),
            Some(GlobalKind::FractionalScaleManager),
            dma.then_some(GlobalKind::LinuxDmaBuf),
            Some(GlobalKind::Presentation),
            Some(GlobalKind::SessionLockManager),
            Some(GlobalKind::Viewporter),
            Some(GlobalKind::LayerShell),
            Some(GlobalKind::SinglePixelBuffer),
            Some(GlobalKind::ContentTypeManager),
            Some(GlobalKind::IdleNotifier),
        ];
        for kind in kinds.into_iter().flatten() {
            self.create_global(kind)?;
        }
        Ok(())
    }

    /// Move a surface and its descendants to the top of the stacking order
    ///
    /// Subsurfaces are stacked with their parent: raising one raises its parent.
    pub fn raise_surface(&mut self, surface: SurfaceId) {
        let Some(data) = self.surfaces.get(surface) else {
            return;
        };
        if matches!(data.role(), Some(Role::Subsurface(_))) {
            if let Some(parent) = data.parent() {
                self.raise_surface(parent);
            }
            return;
        }
        for raised in self.surfaces.raise(surface) {
            self.with_handler(|handler, compositor| handler.surface_raised(compositor, raised));
        }
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        if self.claimed {
            self.uninitialize();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serial_test::serial;

    use super::{test::*, *};
    use crate::{
        backend::test::{DummyGraphicsBackend, DummyInputBackend},
        output::{Mode, PhysicalProperties},
        utils::Rectangle,
        wayland::{
            client::ClientEvent,
            request::Request,
            seat::DndState,
            socket::MemoryTransport,
        },
    };

    fn output(name: &str, x: i32, scale: f64) -> Output {
        let output = Output::new(
            name,
            PhysicalProperties::default(),
            Mode {
                size: (1920, 1080).into(),
                refresh: 60_000,
            },
        );
        output.set_position((x, 0).into());
        output.set_scale(scale);
        output
    }

    fn started(
        backend: Arc<DummyGraphicsBackend>,
        handler: RecordingHandler,
    ) -> (Compositor, MemoryTransport) {
        let transport = MemoryTransport::new();
        let mut compositor = Compositor::new(CompositorConfig::default());
        compositor.set_transport(transport.clone());
        compositor.set_graphics_backend(backend);
        compositor.set_input_backend(Box::new(DummyInputBackend::default()));
        compositor.set_handler(handler);
        compositor.start().unwrap();
        (compositor, transport)
    }

    #[test]
    #[serial]
    fn outputs_added_on_initialization_span_both_screens() {
        let backend = Arc::new(DummyGraphicsBackend::with_outputs(vec![
            output("DP-1", 0, 1.0),
            output("DP-2", 1920, 1.0),
        ]));
        let handler = RecordingHandler::adding_outputs();
        let (mut compositor, transport) = started(backend.clone(), handler.clone());

        assert_eq!(compositor.state(), CompositorState::Initialized);
        assert!(compositor.seat().is_initialized());
        assert_eq!(compositor.outputs().len(), 2);
        assert_eq!(compositor.outputs_bounding_box(), Rectangle::from_loc_and_size((0, 0), (3840, 1080)));
        assert_eq!(compositor.global_scale(), 1);
        assert_eq!(backend.initialized_outputs(), vec!["DP-1".to_string(), "DP-2".to_string()]);
        assert_eq!(handler.calls().first(), Some(&HookCall::Initialized));

        compositor.finish();
        assert_eq!(compositor.state(), CompositorState::Finished);
        assert!(!backend.is_initialized());
        assert!(!transport.is_initialized());
        assert_eq!(backend.uninitialized_outputs().len(), 2);
        assert!(handler.calls().contains(&HookCall::Uninitialized));
        assert!(matches!(compositor.start(), Err(StartError::InvalidState(CompositorState::Finished))));
    }

    #[test]
    #[serial]
    fn one_compositor_per_process() {
        let (mut first, _) = started(Arc::new(DummyGraphicsBackend::default()), RecordingHandler::default());

        let mut second = Compositor::new(CompositorConfig::default());
        second.set_transport(MemoryTransport::new());
        second.set_graphics_backend(Arc::new(DummyGraphicsBackend::default()));
        second.set_input_backend(Box::new(DummyInputBackend::default()));
        assert!(matches!(second.start(), Err(StartError::AlreadyRunning)));
        assert_eq!(second.state(), CompositorState::Uninitialized);

        first.finish();
        second.start().unwrap();
        assert!(matches!(second.start(), Err(StartError::InvalidState(CompositorState::Initialized))));
    }

    #[test]
    #[serial]
    fn failed_start_rolls_back() {
        let backend = Arc::new(DummyGraphicsBackend::default());
        let transport = MemoryTransport::new();
        let mut compositor = Compositor::new(CompositorConfig::default());
        compositor.set_transport(transport.clone());
        compositor.set_graphics_backend(backend.clone());
        compositor.set_input_backend(Box::new(DummyInputBackend::failing()));
        let handler = RecordingHandler::default();
        compositor.set_handler(handler.clone());

        assert!(matches!(compositor.start(), Err(StartError::Input(_))));
        assert_eq!(compositor.state(), CompositorState::Uninitialized);
        assert!(!backend.is_initialized());
        assert!(!transport.is_initialized());
        assert!(compositor.globals().is_empty());
        assert!(!compositor.seat().is_initialized());
        assert!(handler.calls().is_empty());

        // the instance claim was released
        compositor.set_input_backend(Box::new(DummyInputBackend::default()));
        compositor.start().unwrap();
        assert!(backend.is_initialized());
    }

    #[test]
    #[serial]
    fn dma_buf_global_follows_the_backend() {
        let (compositor, _) = started(Arc::new(DummyGraphicsBackend::default()), RecordingHandler::default());
        assert!(compositor.globals().find(GlobalKind::LinuxDmaBuf).is_none());
        assert!(compositor.globals().find(GlobalKind::SinglePixelBuffer).is_some());
        drop(compositor);

        let backend = DummyGraphicsBackend::default().with_dma_formats(vec![drm_fourcc::DrmFourcc::Argb8888]);
        let (compositor, _) = started(Arc::new(backend), RecordingHandler::default());
        assert!(compositor.globals().find(GlobalKind::LinuxDmaBuf).is_some());
    }

    #[test]
    #[serial]
    fn output_sequences_keep_the_list_and_scale_exact() {
        let backend = Arc::new(DummyGraphicsBackend::default());
        let (mut compositor, transport) = started(backend.clone(), RecordingHandler::default());
        let client = transport.connect();
        compositor.process_loop(Some(Duration::ZERO)).unwrap();

        let first = output("DP-1", 0, 1.0);
        let second = output("DP-2", 1920, 2.0);
        compositor.add_output(&first).unwrap();
        compositor.add_output(&second).unwrap();
        assert_eq!(compositor.global_scale(), 2);

        // duplicate add is a successful no-op
        compositor.add_output(&second).unwrap();
        assert_eq!(compositor.outputs(), &[first.clone(), second.clone()]);
        assert_eq!(backend.initialized_outputs().len(), 2);

        let global = compositor.globals().find(GlobalKind::Output(second.id())).unwrap().id();
        transport.push(client, Request::BindGlobal { global, version: 4 });
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        assert_eq!(compositor.client(client).unwrap().output_globals(), &[second.id()]);

        compositor.remove_output(&second);
        assert_eq!(compositor.outputs(), &[first.clone()]);
        assert_eq!(compositor.global_scale(), 1);
        assert!(compositor.client(client).unwrap().output_globals().is_empty());
        assert_eq!(second.state(), crate::output::OutputState::Uninitialized);
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        assert!(compositor.globals().get(global).is_some());
        assert!(transport
            .take_sent(client)
            .contains(&ClientEvent::GlobalRemove { global }));
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        assert!(compositor.globals().get(global).is_none());

        compositor.remove_output(&first);
        assert!(compositor.outputs().is_empty());
        assert_eq!(compositor.global_scale(), 1);
        assert_eq!(compositor.outputs_bounding_box(), Rectangle::default());
    }

    #[test]
    #[serial]
    fn late_binds_of_a_removed_output_are_ignored() {
        let (mut compositor, transport) = started(Arc::new(DummyGraphicsBackend::default()), RecordingHandler::default());
        let client = transport.connect();
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        let hotplugged = output("DP-2", 0, 1.0);
        compositor.add_output(&hotplugged).unwrap();
        let global = compositor.globals().find(GlobalKind::Output(hotplugged.id())).unwrap().id();

        // the client binds the output before learning it was unplugged
        compositor.remove_output(&hotplugged);
        transport.push(client, Request::BindGlobal { global, version: 4 });
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        let sent = transport.take_sent(client);
        assert!(sent.contains(&ClientEvent::GlobalRemove { global }));
        assert!(!sent.iter().any(|event| matches!(event, ClientEvent::ProtocolError(_))));
        assert!(compositor.client(client).unwrap().output_globals().is_empty());
        assert!(compositor.globals().get(global).is_some());

        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        assert!(compositor.globals().get(global).is_none());
        transport.push(client, Request::BindGlobal { global, version: 4 });
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        assert!(!transport.is_disconnected(client));
        assert!(compositor.client(client).unwrap().protocol_error().is_none());
        assert!(compositor.client(client).unwrap().bound_globals().is_empty());
    }

    #[test]
    #[serial]
    fn output_bound_twice_leaves_no_stale_binding() {
        let (mut compositor, transport) = started(Arc::new(DummyGraphicsBackend::default()), RecordingHandler::default());
        let client = transport.connect();
        let display = output("DP-1", 0, 1.0);
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        compositor.add_output(&display).unwrap();
        let global = compositor.globals().find(GlobalKind::Output(display.id())).unwrap().id();

        transport.push(client, Request::BindGlobal { global, version: 4 });
        transport.push(client, Request::BindGlobal { global, version: 3 });
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        assert_eq!(compositor.client(client).unwrap().output_globals(), &[display.id()]);

        compositor.remove_output(&display);
        assert!(compositor.client(client).unwrap().output_globals().is_empty());
    }

    #[test]
    #[serial]
    fn failing_output_is_not_kept() {
        let backend = Arc::new(DummyGraphicsBackend::default());
        let (mut compositor, _) = started(backend.clone(), RecordingHandler::default());
        backend.fail_output_initialization(true);
        let output = output("HDMI-A-1", 0, 1.0);
        assert!(compositor.add_output(&output).is_err());
        assert!(compositor.outputs().is_empty());
        assert_eq!(backend.uninitialized_outputs(), vec!["HDMI-A-1".to_string()]);
        assert!(compositor.globals().find(GlobalKind::Output(output.id())).is_none());
    }

    #[test]
    #[serial]
    fn dropped_data_is_cancelled_after_three_iterations() {
        let (mut compositor, transport) = started(Arc::new(DummyGraphicsBackend::default()), RecordingHandler::default());
        let client = transport.connect();
        compositor.process_loop(Some(Duration::ZERO)).unwrap();

        let origin = compositor.create_surface(client).unwrap();
        let target = compositor.create_surface(client).unwrap();
        assert!(compositor.seat.dnd_mut().start(client, origin, None));
        compositor.seat.dnd_mut().set_focus(Some(target));
        assert_eq!(compositor.seat.dnd_mut().drop_data(), Some(target));

        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        assert_eq!(compositor.seat().dnd().state(), DndState::Dropped);
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        assert_eq!(compositor.seat().dnd().state(), DndState::Cancelled);
        assert!(transport.take_sent(client).contains(&ClientEvent::DataSourceCancelled));
    }

    #[test]
    #[serial]
    fn errored_clients_are_disconnected_on_flush() {
        let (mut compositor, transport) = started(Arc::new(DummyGraphicsBackend::default()), RecordingHandler::default());
        let client = transport.connect();
        compositor.process_loop(Some(Duration::ZERO)).unwrap();
        let surface = SurfaceId::next();
        transport.push(client, Request::CreateSurface { id: surface });
        transport.push(client, Request::CreateSurface { id: surface });
        assert_eq!(compositor.process_loop(Some(Duration::ZERO)).unwrap(), 2);

        assert!(transport.is_disconnected(client));
        assert!(compositor.client(client).is_none());
        assert!(compositor.surface(surface).is_none());
    }

    #[test]
    fn raising_a_subsurface_raises_its_parent() {
        let (mut compositor, client) = compositor_with_client();
        let handler = RecordingHandler::default();
        compositor.set_handler(handler.clone());
        let parent = compositor.create_surface(client).unwrap();
        let other = compositor.create_surface(client).unwrap();
        let child = compositor.create_surface(client).unwrap();
        compositor.get_subsurface(child, parent).unwrap();

        compositor.raise_surface(child);
        assert_eq!(compositor.surfaces().stacking_order(), &[other, parent, child]);
        assert_eq!(
            handler.calls(),
            vec![HookCall::Raised(parent), HookCall::Raised(child)]
        );
    }

    #[test]
    fn nested_hooks_use_the_default_handler() {
        let (mut compositor, _) = compositor_with_client();
        let handler = RecordingHandler::default();
        compositor.set_handler(handler.clone());
        let raised = compositor.with_handler(|_, compositor| {
            let surface = SurfaceId::next();
            compositor.with_handler(|handler, compositor| handler.surface_raised(compositor, surface));
            surface
        });
        assert!(handler.calls().is_empty());
        compositor.with_handler(|handler, compositor| handler.surface_raised(compositor, raised));
        assert_eq!(handler.calls(), vec![HookCall::Raised(raised)]);
    }

    #[test]
    fn globals_are_advertised_through_the_filter() {
        let (mut compositor, client) = compositor_with_client();
        compositor.set_handler(RecordingHandler::hiding(GlobalKind::Viewporter));
        compositor.create_global(GlobalKind::Compositor).unwrap();
        compositor.create_global(GlobalKind::Viewporter).unwrap();
        let late = compositor.add_client();

        for client in [client, late] {
            let interfaces: Vec<_> = compositor
                .client(client)
                .unwrap()
                .pending_events()
                .iter()
                .filter_map(|event| match event {
                    ClientEvent::Global { interface, .. } => Some(*interface),
                    _ => None,
                })
                .collect();
            assert_eq!(interfaces, vec!["wl_compositor"]);
        }
    }

    #[test]
    fn removal_is_only_sent_where_the_global_was_advertised() {
        let (mut compositor, client) = compositor_with_client();
        compositor.set_handler(RecordingHandler::hiding(GlobalKind::Viewporter));
        let shm = compositor.create_global(GlobalKind::Shm).unwrap();
        let viewporter = compositor.create_global(GlobalKind::Viewporter).unwrap();

        assert!(compositor.remove_global(viewporter));
        assert!(compositor.remove_global(shm));
        let removed: Vec<_> = compositor
            .client(client)
            .unwrap()
            .pending_events()
            .iter()
            .filter_map(|event| match event {
                ClientEvent::GlobalRemove { global } => Some(*global),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec![shm]);
    }
}
