//! Error taxonomy for the Wayland client core
//!
//! Every failure here is fatal to the window: a compositor connection has no
//! degraded mode. The only locally recovered conditions (flush would-block,
//! stale buffer releases) never become a `WindowError`.

use std::io;
use thiserror::Error;
use wayland_backend::client::WaylandError;
use wayland_client::{ConnectError, DispatchError};

/// Errors surfaced by the window, its buffer pool and the event loop
#[derive(Debug, Error)]
pub enum WindowError {
    /// No compositor could be reached
    #[error("no Wayland display found: {0}")]
    Connect(#[from] ConnectError),

    /// A required global is absent, or advertised below the version we need
    #[error("required global `{name}` (version >= {min_version}) is not advertised")]
    MissingInterface { name: String, min_version: u32 },

    /// Malformed or out-of-order protocol traffic; terminates the loop
    #[error("Wayland protocol error: {0}")]
    Protocol(String),

    /// Shared memory could not be created, sized or mapped
    #[error("shared memory allocation failed: {0}")]
    ResourceExhaustion(#[source] io::Error),

    /// The compositor sent a keymap we could not compile
    #[error("keymap compilation failed: {0}")]
    Keymap(String),

    /// Socket-level failure on the compositor connection
    #[error("I/O error on the compositor connection: {0}")]
    Io(#[source] io::Error),
}

impl WindowError {
    /// Build a `MissingInterface` error for `name` at `min_version`
    pub fn missing(name: &str, min_version: u32) -> Self {
        WindowError::MissingInterface {
            name: name.to_string(),
            min_version,
        }
    }

    /// Whether this error came from the protocol layer itself
    pub fn is_protocol(&self) -> bool {
        matches!(self, WindowError::Protocol(_))
    }
}

impl From<WaylandError> for WindowError {
    fn from(err: WaylandError) -> Self {
        match err {
            WaylandError::Io(e) => WindowError::Io(e),
            WaylandError::Protocol(e) => WindowError::Protocol(e.to_string()),
        }
    }
}

impl From<DispatchError> for WindowError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Backend(e) => e.into(),
            other => WindowError::Protocol(other.to_string()),
        }
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, WindowError>;
