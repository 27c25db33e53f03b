//! The toplevel window and its protocol glue
//!
//! `Window` owns the compositor connection, the event queue and a
//! [`WindowState`], which receives every event through the `Dispatch`
//! impls below. Protocol-free decisions are delegated:
//!
//! - [`GlobalRegistry`] decides what can be bound,
//! - [`SurfaceState`] runs the configure handshake and fullscreen policy,
//! - [`InputTranslator`] turns keyboard/pointer traffic into [`InputEvent`]s,
//! - [`BufferPool`] hands out framebuffers and tracks releases.
//!
//! Each bound proxy has exactly one owner here and is destroyed when the
//! window is dropped.

pub mod cursor;
pub mod surface;

pub use cursor::{resolve_cursor_size, CursorImage, DEFAULT_CURSOR_SIZE};
pub use surface::{Acknowledge, DecorationState, ShellRequest, SurfacePhase, SurfaceState};

use log::{debug, info, trace, warn};
use wayland_client::{
    delegate_noop,
    protocol::{
        wl_buffer::{self, WlBuffer},
        wl_compositor::WlCompositor,
        wl_keyboard::{self, WlKeyboard},
        wl_pointer::{self, WlPointer},
        wl_registry::{self, WlRegistry},
        wl_seat::{self, WlSeat},
        wl_shm::{self, WlShm},
        wl_shm_pool::WlShmPool,
        wl_surface::WlSurface,
    },
    Connection, Dispatch, EventQueue, QueueHandle, WEnum,
};
use wayland_protocols::xdg::{
    decoration::zv1::client::{
        zxdg_decoration_manager_v1::ZxdgDecorationManagerV1,
        zxdg_toplevel_decoration_v1::{self, ZxdgToplevelDecorationV1},
    },
    shell::client::{
        xdg_surface::{self, XdgSurface},
        xdg_toplevel::{self, XdgToplevel},
        xdg_wm_base::{self, XdgWmBase},
    },
};

use crate::error::{Result, WindowError};
use crate::event_loop::{self, WaylandTransport};
use crate::handler::{ScrollAxis, Size, WindowHandler};
use crate::input::{InputEvent, InputTranslator, KeyState};
use crate::protocol::{self, names, GlobalRegistry};
use crate::shm::{BufferPool, CommitTarget, PoolProxy, PoolStats, ShmAllocator, WaylandShm};

/// Construction-time window settings
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOptions {
    pub title: String,
    pub app_id: String,
    /// Every committed size is at least this large
    pub min_size: Size,
    /// Ask the decoration manager for compositor-drawn chrome
    pub server_side_decorations: bool,
    pub cursor_name: String,
    /// `None` defers to `XCURSOR_SIZE`
    pub cursor_size: Option<u32>,
    pub cursor_theme: Option<String>,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            title: "Hello Wayland".to_string(),
            app_id: "hello-wayland".to_string(),
            min_size: Size::new(800, 600),
            server_side_decorations: true,
            cursor_name: "default".to_string(),
            cursor_size: None,
            cursor_theme: None,
        }
    }
}

/// Whether a seat device must be created, released or left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceChange {
    Acquire,
    Release,
    Keep,
}

fn device_change(advertised: bool, held: bool) -> DeviceChange {
    match (advertised, held) {
        (true, false) => DeviceChange::Acquire,
        (false, true) => DeviceChange::Release,
        _ => DeviceChange::Keep,
    }
}

/// Known capability bits of a seat; bits this client does not know are dropped
fn seat_capabilities(capabilities: WEnum<wl_seat::Capability>) -> wl_seat::Capability {
    match capabilities {
        WEnum::Value(capabilities) => capabilities,
        WEnum::Unknown(raw) => {
            debug!("seat capabilities {:#x} include unknown bits", raw);
            wl_seat::Capability::from_bits_truncate(raw)
        }
    }
}

/// One bound `wl_seat` and the devices we hold on it
struct Seat {
    global_id: u32,
    seat: WlSeat,
    keyboard: Option<WlKeyboard>,
    pointer: Option<WlPointer>,
}

impl Seat {
    fn new(global_id: u32, seat: WlSeat) -> Self {
        Self {
            global_id,
            seat,
            keyboard: None,
            pointer: None,
        }
    }

    fn update_capabilities(&mut self, capabilities: wl_seat::Capability, qh: &QueueHandle<WindowState>) {
        let has_pointer = capabilities.contains(wl_seat::Capability::Pointer);
        match device_change(has_pointer, self.pointer.is_some()) {
            DeviceChange::Acquire => {
                debug!("🖱️ seat {} gained a pointer", self.global_id);
                self.pointer = Some(self.seat.get_pointer(qh, ()));
            }
            DeviceChange::Release => {
                debug!("🖱️ seat {} lost its pointer", self.global_id);
                if let Some(pointer) = self.pointer.take() {
                    pointer.release();
                }
            }
            DeviceChange::Keep => {}
        }

        let has_keyboard = capabilities.contains(wl_seat::Capability::Keyboard);
        match device_change(has_keyboard, self.keyboard.is_some()) {
            DeviceChange::Acquire => {
                debug!("⌨️ seat {} gained a keyboard", self.global_id);
                self.keyboard = Some(self.seat.get_keyboard(qh, ()));
            }
            DeviceChange::Release => {
                debug!("⌨️ seat {} lost its keyboard", self.global_id);
                if let Some(keyboard) = self.keyboard.take() {
                    keyboard.release();
                }
            }
            DeviceChange::Keep => {}
        }
    }

    fn release(self) {
        if let Some(keyboard) = self.keyboard {
            keyboard.release();
        }
        if let Some(pointer) = self.pointer {
            pointer.release();
        }
        self.seat.release();
    }
}

/// Proxies that exist once the globals are bound
struct Shell {
    _compositor: WlCompositor,
    wm_base: XdgWmBase,
    decoration_manager: Option<ZxdgDecorationManagerV1>,
    surface: WlSurface,
    xdg_surface: XdgSurface,
    toplevel: XdgToplevel,
    toplevel_decoration: Option<ZxdgToplevelDecorationV1>,
    pool: BufferPool<WaylandShm<WindowState>>,
    cursor: Option<CursorImage>,
}

impl Shell {
    fn apply(&self, request: ShellRequest) {
        debug!("🖥️ {:?}", request);
        match request {
            ShellRequest::SetFullscreen => self.toplevel.set_fullscreen(None),
            ShellRequest::UnsetFullscreen => self.toplevel.unset_fullscreen(),
        }
    }

    /// Destroy in dependency order: roles before their surfaces, buffers
    /// after the surface that showed them, globals last
    fn destroy(mut self, seats: Vec<Seat>) {
        if let Some(decoration) = self.toplevel_decoration.take() {
            decoration.destroy();
        }
        self.toplevel.destroy();
        self.xdg_surface.destroy();
        self.surface.destroy();
        if let Some(cursor) = self.cursor.take() {
            cursor.destroy();
        }
        self.pool.clear();
        for seat in seats {
            seat.release();
        }
        if let Some(manager) = self.decoration_manager.take() {
            manager.destroy();
        }
        self.wm_base.destroy();
    }
}

/// Everything the event queue dispatches into
pub struct WindowState {
    registry: GlobalRegistry,
    wl_registry: WlRegistry,
    handler: Box<dyn WindowHandler>,
    input: InputTranslator,
    surface: SurfaceState,
    seats: Vec<Seat>,
    shell: Option<Shell>,
}

impl WindowState {
    fn apply(&self, request: Option<ShellRequest>) {
        if let (Some(request), Some(shell)) = (request, self.shell.as_ref()) {
            shell.apply(request);
        }
    }

    fn deliver(&mut self, events: Vec<InputEvent>) {
        for event in events {
            let request = route_input(event, self.handler.as_mut(), &mut self.surface);
            self.apply(request);
        }
    }
}

/// Forward one translated event to the application
///
/// Returns the toplevel request a fullscreen toggle resolved to, if any.
pub(crate) fn route_input(
    event: InputEvent,
    handler: &mut dyn WindowHandler,
    surface: &mut SurfaceState,
) -> Option<ShellRequest> {
    match event {
        InputEvent::KeyDown { keysym, modifiers } => handler.on_key_down(keysym, modifiers),
        InputEvent::KeyUp { keysym, modifiers } => handler.on_key_up(keysym, modifiers),
        InputEvent::Text(text) => handler.on_text(&text),
        InputEvent::ToggleFullscreen => return surface.toggle_fullscreen(),
        InputEvent::PointerEnter { serial, x, y } => {
            trace!("pointer entered at ({}, {}) serial {}", x, y, serial)
        }
        InputEvent::PointerLeave => trace!("pointer left"),
        InputEvent::PointerMotion { x, y } => handler.on_pointer_motion(x, y),
        InputEvent::PointerButton {
            button,
            pressed,
            x,
            y,
        } => {
            handler.on_pointer_button(button, pressed, x, y);
            if button == protocol::BTN_LEFT {
                if pressed {
                    handler.on_pointer_click(x, y);
                } else {
                    handler.on_pointer_release(x, y);
                }
            }
        }
        InputEvent::PointerAxis { axis, value } => handler.on_scroll(axis, value),
    }
    None
}

/// Let `handler` draw one frame at the committed size and present it on
/// `target`
///
/// Returns whether a frame was committed. Nothing is drawn before the first
/// configure is acknowledged, or once the window is closing.
pub fn render_frame<A, T>(
    surface: &SurfaceState,
    pool: &mut BufferPool<A>,
    target: &T,
    handler: &mut dyn WindowHandler,
) -> Result<bool>
where
    A: ShmAllocator,
    T: CommitTarget<<A::Pool as PoolProxy>::Buffer>,
{
    if !surface.can_render() {
        trace!("render skipped in {:?}", surface.phase());
        return Ok(false);
    }

    let size = surface.actual_size();
    let mut buffer = pool.acquire(size)?;
    pool.draw(&mut buffer, size, |canvas, size| handler.on_render(canvas, size))?;
    pool.submit(buffer, target);
    Ok(true)
}

/// A single xdg toplevel drawn through shared memory
pub struct Window {
    conn: Connection,
    queue: EventQueue<WindowState>,
    state: WindowState,
}

impl Window {
    /// Connect to `$WAYLAND_DISPLAY`, bind the globals and create the toplevel
    pub fn new(options: &WindowOptions, handler: Box<dyn WindowHandler>) -> Result<Self> {
        let conn = Connection::connect_to_env()?;
        let mut queue = conn.new_event_queue();
        let qh = queue.handle();
        let wl_registry = conn.display().get_registry(&qh, ());

        let mut state = WindowState {
            registry: GlobalRegistry::new(),
            wl_registry,
            handler,
            input: InputTranslator::new(),
            surface: SurfaceState::new(options.min_size),
            seats: Vec::new(),
            shell: None,
        };

        // Every initially advertised global is recorded once this returns
        queue.roundtrip(&mut state)?;
        state.registry.mark_synced();
        info!("📋 {} globals advertised", state.registry.len());

        let registry = &state.registry;
        let wl_registry = &state.wl_registry;
        let compositor: WlCompositor =
            registry.bind(wl_registry, &qh, protocol::WL_COMPOSITOR_VERSION, ())?;
        let shm: WlShm = registry.bind(wl_registry, &qh, protocol::WL_SHM_VERSION, ())?;
        let wm_base: XdgWmBase = registry.bind(wl_registry, &qh, protocol::XDG_WM_BASE_VERSION, ())?;
        let decoration_manager = match registry.bind::<ZxdgDecorationManagerV1, _, _>(
            wl_registry,
            &qh,
            protocol::XDG_DECORATION_VERSION,
            (),
        ) {
            Ok(manager) => Some(manager),
            Err(WindowError::MissingInterface { .. }) => {
                info!("no {}, decorations unavailable", names::XDG_DECORATION_MANAGER);
                None
            }
            Err(e) => return Err(e),
        };
        state.seats = registry
            .bind_all::<WlSeat, _, _>(wl_registry, &qh, protocol::WL_SEAT_VERSION, || ())?
            .into_iter()
            .map(|(id, seat)| Seat::new(id, seat))
            .collect();
        if state.seats.is_empty() {
            warn!("⚠️ no {} advertised, input is unavailable", names::WL_SEAT);
        }

        let cursor_size = resolve_cursor_size(
            options.cursor_size,
            std::env::var("XCURSOR_SIZE").ok().as_deref(),
        );
        let cursor = CursorImage::load(
            &conn,
            &compositor,
            &shm,
            &qh,
            options.cursor_theme.as_deref(),
            &options.cursor_name,
            cursor_size,
        );

        let surface = compositor.create_surface(&qh, ());
        let xdg_surface = wm_base.get_xdg_surface(&surface, &qh, ());
        let toplevel = xdg_surface.get_toplevel(&qh, ());
        toplevel.set_min_size(options.min_size.width, options.min_size.height);
        toplevel.set_title(options.title.clone());
        toplevel.set_app_id(options.app_id.clone());

        let toplevel_decoration = decoration_manager.as_ref().map(|manager| {
            let decoration = manager.get_toplevel_decoration(&toplevel, &qh, ());
            decoration.set_mode(if options.server_side_decorations {
                zxdg_toplevel_decoration_v1::Mode::ServerSide
            } else {
                zxdg_toplevel_decoration_v1::Mode::ClientSide
            });
            decoration
        });

        let shell = Shell {
            _compositor: compositor,
            wm_base,
            decoration_manager,
            surface,
            xdg_surface,
            toplevel,
            toplevel_decoration,
            pool: BufferPool::new(WaylandShm::new(shm, qh.clone())),
            cursor,
        };
        if let Some(request) = state.surface.startup(shell.decoration_manager.is_some()) {
            shell.apply(request);
        }
        shell.surface.commit();
        state.shell = Some(shell);

        info!("🪟 window '{}' created", options.title);
        Ok(Self { conn, queue, state })
    }

    /// Run one read/dispatch/flush iteration; blocks until events arrive
    pub fn poll_events(&mut self) -> Result<usize> {
        let mut transport = WaylandTransport::new(&self.conn, &mut self.queue, &mut self.state);
        event_loop::pump(&mut transport)
    }

    /// Draw and commit one frame at the committed size
    ///
    /// Does nothing until the first configure is acknowledged, or once the
    /// window is closing.
    pub fn render(&mut self) -> Result<()> {
        let state = &mut self.state;
        let Some(shell) = state.shell.as_mut() else {
            return Ok(());
        };
        render_frame(
            &state.surface,
            &mut shell.pool,
            &shell.surface,
            state.handler.as_mut(),
        )?;
        Ok(())
    }

    /// The compositor asked the window to close
    pub fn should_close(&self) -> bool {
        self.state.surface.should_close()
    }

    pub fn surface(&self) -> &SurfaceState {
        &self.state.surface
    }

    pub fn registry(&self) -> &GlobalRegistry {
        &self.state.registry
    }

    pub fn pool_stats(&self) -> Option<&PoolStats> {
        self.state.shell.as_ref().map(|shell| shell.pool.stats())
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.state.surface.finish_close();
        let seats = std::mem::take(&mut self.state.seats);
        match self.state.shell.take() {
            Some(shell) => {
                debug!("🧹 tearing down window ({:?})", shell.pool.stats());
                shell.destroy(seats);
            }
            None => seats.into_iter().for_each(Seat::release),
        }
        if let Err(e) = self.conn.flush() {
            debug!("final flush failed: {}", e);
        }
        info!("👋 window closed");
    }
}

impl Dispatch<WlRegistry, ()> for WindowState {
    fn event(
        state: &mut Self,
        wl_registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                state.registry.record(name, &interface, version);
                // Seats plugged in later are bound as they appear
                if state.registry.is_synced()
                    && interface == names::WL_SEAT
                    && version >= protocol::WL_SEAT_VERSION
                {
                    let seat = wl_registry.bind::<WlSeat, _, _>(name, protocol::WL_SEAT_VERSION, qh, ());
                    state.seats.push(Seat::new(name, seat));
                }
            }
            wl_registry::Event::GlobalRemove { name } => {
                state.registry.remove(name);
                if let Some(index) = state.seats.iter().position(|s| s.global_id == name) {
                    state.seats.swap_remove(index).release();
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlShm, ()> for WindowState {
    fn event(_: &mut Self, _: &WlShm, event: wl_shm::Event, _: &(), _: &Connection, _: &QueueHandle<Self>) {
        if let wl_shm::Event::Format { format } = event {
            trace!("shm format {:?}", format);
        }
    }
}

impl Dispatch<WlBuffer, ()> for WindowState {
    fn event(
        state: &mut Self,
        buffer: &WlBuffer,
        event: wl_buffer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            match state.shell.as_mut() {
                Some(shell) => {
                    shell.pool.on_released(buffer);
                }
                None => debug!("buffer release after teardown ignored"),
            }
        }
    }
}

impl Dispatch<XdgWmBase, ()> for WindowState {
    fn event(
        _: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            trace!("ping {}", serial);
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<XdgSurface, ()> for WindowState {
    fn event(
        state: &mut Self,
        xdg_surface: &XdgSurface,
        event: xdg_surface::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            let ack = state.surface.surface_configure(serial);
            xdg_surface.ack_configure(ack.serial);
            if let Some(size) = ack.size {
                state.handler.on_configure(size);
            }
        }
    }
}

/// Whether an `xdg_toplevel.configure` state array contains `fullscreen`
fn states_contain_fullscreen(states: &[u8]) -> bool {
    states
        .chunks_exact(4)
        .filter_map(|chunk| chunk.try_into().ok().map(u32::from_ne_bytes))
        .any(|value| matches!(xdg_toplevel::State::try_from(value), Ok(xdg_toplevel::State::Fullscreen)))
}

impl Dispatch<XdgToplevel, ()> for WindowState {
    fn event(
        state: &mut Self,
        _: &XdgToplevel,
        event: xdg_toplevel::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure {
                width,
                height,
                states,
            } => {
                state
                    .surface
                    .toplevel_configure(Size::new(width, height), states_contain_fullscreen(&states));
            }
            xdg_toplevel::Event::Close => state.surface.request_close(),
            _ => {}
        }
    }
}

impl Dispatch<ZxdgToplevelDecorationV1, ()> for WindowState {
    fn event(
        state: &mut Self,
        _: &ZxdgToplevelDecorationV1,
        event: zxdg_toplevel_decoration_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let zxdg_toplevel_decoration_v1::Event::Configure { mode } = event {
            let mode = match mode {
                WEnum::Value(zxdg_toplevel_decoration_v1::Mode::ServerSide) => {
                    DecorationState::ServerSide
                }
                _ => DecorationState::ClientSide,
            };
            let request = state.surface.decoration_configure(mode);
            state.apply(request);
        }
    }
}

impl Dispatch<WlSeat, ()> for WindowState {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_seat::Event::Capabilities { capabilities } => {
                let capabilities = seat_capabilities(capabilities);
                if let Some(entry) = state.seats.iter_mut().find(|s| &s.seat == seat) {
                    entry.update_capabilities(capabilities, qh);
                }
            }
            wl_seat::Event::Name { name } => info!("💺 seat '{}'", name),
            _ => {}
        }
    }
}

impl Dispatch<WlKeyboard, ()> for WindowState {
    fn event(
        state: &mut Self,
        _: &WlKeyboard,
        event: wl_keyboard::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                // `fd` is closed when the translator drops it
                if let Err(e) = state.input.keymap(format, fd, size) {
                    warn!("⚠️ keyboard input disabled: {}", e);
                }
            }
            wl_keyboard::Event::Enter { serial, .. } => trace!("keyboard focus gained ({})", serial),
            wl_keyboard::Event::Leave { serial, .. } => trace!("keyboard focus lost ({})", serial),
            wl_keyboard::Event::Key {
                key,
                state: key_state,
                ..
            } => {
                let key_state = match key_state {
                    WEnum::Value(wl_keyboard::KeyState::Pressed) => KeyState::Pressed,
                    WEnum::Value(wl_keyboard::KeyState::Released) => KeyState::Released,
                    other => {
                        trace!("key {} in state {:?} ignored", key, other);
                        return;
                    }
                };
                let events = state.input.key(key, key_state);
                state.deliver(events);
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => state
                .input
                .modifiers(mods_depressed, mods_latched, mods_locked, group),
            wl_keyboard::Event::RepeatInfo { rate, delay } => state.input.repeat_info(rate, delay),
            _ => {}
        }
    }
}

impl Dispatch<WlPointer, ()> for WindowState {
    fn event(
        state: &mut Self,
        pointer: &WlPointer,
        event: wl_pointer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let translated = match event {
            wl_pointer::Event::Enter {
                serial,
                surface_x,
                surface_y,
                ..
            } => {
                if let Some(cursor) = state.shell.as_ref().and_then(|s| s.cursor.as_ref()) {
                    cursor.attach_to(pointer, serial);
                }
                state.input.pointer_enter(serial, surface_x, surface_y)
            }
            wl_pointer::Event::Leave { .. } => state.input.pointer_leave(),
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => state.input.pointer_motion(surface_x, surface_y),
            wl_pointer::Event::Button {
                button,
                state: button_state,
                ..
            } => {
                let pressed = matches!(button_state, WEnum::Value(wl_pointer::ButtonState::Pressed));
                state.input.pointer_button(button, pressed)
            }
            wl_pointer::Event::Axis { axis, value, .. } => {
                let axis = match axis {
                    WEnum::Value(wl_pointer::Axis::HorizontalScroll) => ScrollAxis::Horizontal,
                    _ => ScrollAxis::Vertical,
                };
                state.input.pointer_axis(axis, value)
            }
            _ => return,
        };
        state.deliver(vec![translated]);
    }
}

delegate_noop!(WindowState: WlCompositor);
delegate_noop!(WindowState: WlShmPool);
delegate_noop!(WindowState: ignore WlSurface);
delegate_noop!(WindowState: ZxdgDecorationManagerV1);
