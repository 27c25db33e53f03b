//! Pointer cursor image
//!
//! The cursor is loaded once from an XCursor theme and attached to its own
//! surface; every `wl_pointer.enter` points the compositor at that surface.

use log::{debug, warn};
use wayland_client::{
    protocol::{wl_compositor::WlCompositor, wl_pointer::WlPointer, wl_shm::WlShm, wl_surface::WlSurface},
    Connection, Dispatch, QueueHandle,
};
use wayland_cursor::CursorTheme;

/// Cursor size when neither the configuration nor `XCURSOR_SIZE` says otherwise
pub const DEFAULT_CURSOR_SIZE: u32 = 16;

/// Pick the cursor size: configured value, then `XCURSOR_SIZE`, then the default
pub fn resolve_cursor_size(configured: Option<u32>, xcursor_size: Option<&str>) -> u32 {
    if let Some(size) = configured {
        return size;
    }
    xcursor_size
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|size| *size > 0)
        .unwrap_or(DEFAULT_CURSOR_SIZE)
}

/// A loaded cursor: its surface, the theme owning its buffer, and the hotspot
pub struct CursorImage {
    surface: WlSurface,
    // Owns the wl_buffer attached to `surface`
    _theme: CursorTheme,
    hotspot: (i32, i32),
}

impl CursorImage {
    /// Load `name` from `theme` (or the default theme) at `size`
    ///
    /// Returns `None` when the theme or the cursor is unavailable; the
    /// compositor then keeps whatever cursor it shows by default.
    pub fn load<D>(
        conn: &Connection,
        compositor: &WlCompositor,
        shm: &WlShm,
        qh: &QueueHandle<D>,
        theme: Option<&str>,
        name: &str,
        size: u32,
    ) -> Option<Self>
    where
        D: Dispatch<WlSurface, ()> + 'static,
    {
        let loaded = match theme {
            Some(theme_name) => CursorTheme::load_from_name(conn, shm.clone(), theme_name, size),
            None => CursorTheme::load(conn, shm.clone(), size),
        };
        let mut cursor_theme = match loaded {
            Ok(cursor_theme) => cursor_theme,
            Err(e) => {
                warn!("⚠️ cursor theme unavailable: {}", e);
                return None;
            }
        };

        let surface = compositor.create_surface(qh, ());
        let hotspot = {
            let Some(cursor) = cursor_theme.get_cursor(name) else {
                warn!("⚠️ cursor '{}' not found in theme", name);
                surface.destroy();
                return None;
            };
            let image = &cursor[0];
            let (x, y) = image.hotspot();
            surface.attach(Some(&**image), 0, 0);
            (x as i32, y as i32)
        };
        surface.commit();

        debug!("🖱️ cursor '{}' loaded at size {}, hotspot {:?}", name, size, hotspot);
        Some(Self {
            surface,
            _theme: cursor_theme,
            hotspot,
        })
    }

    /// Show this cursor while `pointer` is over our surface
    pub fn attach_to(&self, pointer: &WlPointer, serial: u32) {
        pointer.set_cursor(serial, Some(&self.surface), self.hotspot.0, self.hotspot.1);
    }

    pub fn hotspot(&self) -> (i32, i32) {
        self.hotspot
    }

    pub fn destroy(self) {
        self.surface.destroy();
    }
}
