//! # hello-wayland Client Library
//!
//! A minimal Wayland client core: it negotiates globals with the
//! compositor, opens one xdg-shell toplevel, draws into shared-memory
//! buffers and translates keyboard/pointer input through xkbcommon.
//!
//! ## Architecture
//!
//! - `protocol`: interface names, desired versions and the global registry
//! - `shm`: sealed shared-memory regions and the framebuffer pool
//! - `input`: keymap compilation and keyboard/pointer translation
//! - `window`: the toplevel surface state machine and protocol glue
//! - `event_loop`: the read/dispatch/flush driver
//! - `handler`: callbacks into the application
//! - `config`: configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hello_wayland::{HelloConfig, Window, WindowHandler};
//!
//! struct Quiet;
//! impl WindowHandler for Quiet {}
//!
//! fn main() -> hello_wayland::Result<()> {
//!     let config = HelloConfig::default();
//!     let mut window = Window::new(&config.window_options(), Box::new(Quiet))?;
//!     while !window.should_close() {
//!         window.poll_events()?;
//!         window.render()?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event_loop;
pub mod handler;
pub mod input;
pub mod protocol;
pub mod shm;
pub mod window;

// Re-export main types for easy access
pub use config::HelloConfig;
pub use error::{Result, WindowError};
pub use handler::{Keysym, Modifiers, ScrollAxis, Size, WindowHandler};
pub use input::{InputEvent, InputTranslator};
pub use protocol::GlobalRegistry;
pub use shm::{BufferPool, PoolStats};
pub use window::{SurfaceState, Window, WindowOptions};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
