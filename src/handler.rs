//! Application-facing callback surface
//!
//! The window invokes these synchronously from inside the event loop's
//! dispatch phase (and from `Window::render` for `on_render`). Every method
//! has an empty default so applications only implement what they care about.

use std::fmt;

/// Bytes per XRGB8888 pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// An xkb keysym value (e.g. `0xff0d` for Return)
pub type Keysym = u32;

/// Surface dimensions in buffer pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Component-wise maximum against `min`
    pub fn clamp_min(self, min: Size) -> Size {
        Size {
            width: self.width.max(min.width),
            height: self.height.max(min.height),
        }
    }

    /// Row stride in bytes for XRGB8888, saturating at `i32::MAX`
    pub fn stride(&self) -> i32 {
        self.width.saturating_mul(BYTES_PER_PIXEL as i32)
    }

    /// Total pixel bytes needed for this size; non-positive extents need none
    pub fn byte_len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(BYTES_PER_PIXEL)
    }

    /// Pixel bytes as `wl_shm` can express them: `None` when the stride or
    /// the total length does not fit the protocol's `int` arguments
    pub fn checked_byte_len(&self) -> Option<usize> {
        if self.is_empty() {
            return Some(0);
        }
        let len = self
            .width
            .checked_mul(BYTES_PER_PIXEL as i32)?
            .checked_mul(self.height)?;
        usize::try_from(len).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Modifier snapshot taken when a key event is translated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
}

/// Scroll axis reported by `on_scroll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

/// Callbacks from the window into the application
pub trait WindowHandler {
    /// A configure was acknowledged; `size` is the committed (clamped) size
    fn on_configure(&mut self, _size: Size) {}

    fn on_key_down(&mut self, _keysym: Keysym, _modifiers: Modifiers) {}

    fn on_key_up(&mut self, _keysym: Keysym, _modifiers: Modifiers) {}

    /// Text produced by a key press (never empty)
    fn on_text(&mut self, _text: &str) {}

    /// Left button pressed at surface-local coordinates
    fn on_pointer_click(&mut self, _x: f64, _y: f64) {}

    /// Left button released at surface-local coordinates
    fn on_pointer_release(&mut self, _x: f64, _y: f64) {}

    /// Any button, raw evdev code
    fn on_pointer_button(&mut self, _button: u32, _pressed: bool, _x: f64, _y: f64) {}

    fn on_pointer_motion(&mut self, _x: f64, _y: f64) {}

    fn on_scroll(&mut self, _axis: ScrollAxis, _value: f64) {}

    /// Fill `canvas` (XRGB8888, `size.stride()` bytes per row) for the next frame
    fn on_render(&mut self, _canvas: &mut [u8], _size: Size) {}
}
