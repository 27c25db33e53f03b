//! Toplevel surface lifecycle
//!
//! `SurfaceState` is the protocol-free half of the window: it decides what
//! the configure/acknowledge handshake, decoration negotiation and
//! fullscreen policy mean, and returns the requests the window has to send.
//!
//! ```text
//! Unconfigured ──ack──► Configured ──close──► Closing ──teardown──► Closed
//!       └─────────────────────close──────────────┘
//! ```

use log::{debug, info};

use crate::handler::Size;

/// Where the surface is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    /// Created, never acknowledged; nothing may be drawn
    Unconfigured,
    Configured,
    /// The compositor asked us to close; no new frames
    Closing,
    /// Resources torn down
    Closed,
}

/// Outcome of decoration negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationState {
    Unknown,
    ClientSide,
    ServerSide,
}

/// A request the window must send on the toplevel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellRequest {
    SetFullscreen,
    UnsetFullscreen,
}

/// Result of a surface configure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledge {
    /// Serial to pass to `ack_configure`
    pub serial: u32,
    /// Newly committed size, `None` once closing
    pub size: Option<Size>,
}

/// Surface lifecycle, size handshake and fullscreen intent
#[derive(Debug, Clone)]
pub struct SurfaceState {
    phase: SurfacePhase,
    min_size: Size,
    requested: Size,
    actual: Size,
    decoration: DecorationState,
    has_decoration_manager: bool,
    fullscreen: bool,
    last_serial: Option<u32>,
}

impl SurfaceState {
    pub fn new(min_size: Size) -> Self {
        Self {
            phase: SurfacePhase::Unconfigured,
            min_size,
            requested: Size::default(),
            actual: min_size,
            decoration: DecorationState::Unknown,
            has_decoration_manager: false,
            fullscreen: false,
            last_serial: None,
        }
    }

    /// Requests to send before the initial commit
    ///
    /// Without a decoration manager nothing will ever draw window chrome, so
    /// the surface goes fullscreen unconditionally.
    pub fn startup(&mut self, has_decoration_manager: bool) -> Option<ShellRequest> {
        self.has_decoration_manager = has_decoration_manager;
        if has_decoration_manager {
            return None;
        }
        info!("🖥️ no decoration manager, forcing fullscreen");
        self.fullscreen = true;
        Some(ShellRequest::SetFullscreen)
    }

    /// `xdg_toplevel.configure`: cache the proposal, apply nothing yet
    ///
    /// `(0, 0)` means the compositor has no preference.
    pub fn toplevel_configure(&mut self, requested: Size, fullscreen: bool) {
        debug!("📐 toplevel proposes {} (fullscreen: {})", requested, fullscreen);
        self.requested = requested;
        self.fullscreen = fullscreen;
    }

    /// `xdg_surface.configure`: acknowledge `serial` and commit the cached size
    pub fn surface_configure(&mut self, serial: u32) -> Acknowledge {
        if let Some(previous) = self.last_serial {
            if serial <= previous {
                debug!("configure serial {} after {}", serial, previous);
            }
        }
        self.last_serial = Some(serial);

        let size = match self.phase {
            SurfacePhase::Unconfigured | SurfacePhase::Configured => {
                self.actual = self.requested.clamp_min(self.min_size);
                if self.phase == SurfacePhase::Unconfigured {
                    info!("✅ surface configured at {}", self.actual);
                }
                self.phase = SurfacePhase::Configured;
                Some(self.actual)
            }
            SurfacePhase::Closing | SurfacePhase::Closed => None,
        };

        Acknowledge { serial, size }
    }

    /// `zxdg_toplevel_decoration_v1.configure`
    ///
    /// Client-side decorations mean we draw none, so fall back to
    /// fullscreen like a missing manager does.
    pub fn decoration_configure(&mut self, mode: DecorationState) -> Option<ShellRequest> {
        debug!("🎨 decoration mode {:?}", mode);
        self.decoration = mode;
        if mode != DecorationState::ServerSide && !self.fullscreen {
            self.fullscreen = true;
            return Some(ShellRequest::SetFullscreen);
        }
        None
    }

    /// Flip fullscreen; ignored unless the compositor draws decorations
    pub fn toggle_fullscreen(&mut self) -> Option<ShellRequest> {
        if self.decoration != DecorationState::ServerSide || self.should_close() {
            debug!(
                "fullscreen toggle ignored ({:?}, {:?})",
                self.decoration, self.phase
            );
            return None;
        }
        self.fullscreen = !self.fullscreen;
        Some(if self.fullscreen {
            ShellRequest::SetFullscreen
        } else {
            ShellRequest::UnsetFullscreen
        })
    }

    /// `xdg_toplevel.close`
    pub fn request_close(&mut self) {
        if matches!(
            self.phase,
            SurfacePhase::Unconfigured | SurfacePhase::Configured
        ) {
            info!("👋 close requested");
            self.phase = SurfacePhase::Closing;
        }
    }

    /// Teardown finished
    pub fn finish_close(&mut self) {
        self.phase = SurfacePhase::Closed;
    }

    /// Frames may only be produced once configured and before closing
    pub fn can_render(&self) -> bool {
        self.phase == SurfacePhase::Configured
    }

    pub fn should_close(&self) -> bool {
        matches!(self.phase, SurfacePhase::Closing | SurfacePhase::Closed)
    }

    pub fn phase(&self) -> SurfacePhase {
        self.phase
    }

    pub fn actual_size(&self) -> Size {
        self.actual
    }

    pub fn requested_size(&self) -> Size {
        self.requested
    }

    pub fn min_size(&self) -> Size {
        self.min_size
    }

    pub fn decoration(&self) -> DecorationState {
        self.decoration
    }

    pub fn has_decoration_manager(&self) -> bool {
        self.has_decoration_manager
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
}
