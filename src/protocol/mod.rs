//! Protocol negotiation: interface names, desired versions and the registry
//!
//! Versions are the lowest ones that carry what the window needs, so that the
//! widest range of compositors is supported:
//!
//! - `wl_compositor` 4: universal support and `damage_buffer`
//! - `wl_seat` 7: universal support; 8 moves to `axis_value120` (no Weston)
//! - `wl_shm` 1: only known version
//! - `xdg_wm_base` 2: universal support; 3+ only adds popup/bounds features
//! - `zxdg_decoration_manager_v1` 1: only known version

pub mod registry;

pub use registry::{GlobalInterface, GlobalRegistry};

/// Interface names as advertised by the compositor
pub mod names {
    pub const WL_COMPOSITOR: &str = "wl_compositor";
    pub const WL_SEAT: &str = "wl_seat";
    pub const WL_SHM: &str = "wl_shm";
    pub const XDG_WM_BASE: &str = "xdg_wm_base";
    pub const XDG_DECORATION_MANAGER: &str = "zxdg_decoration_manager_v1";
}

pub const WL_COMPOSITOR_VERSION: u32 = 4;
pub const WL_SEAT_VERSION: u32 = 7;
pub const WL_SHM_VERSION: u32 = 1;
pub const XDG_WM_BASE_VERSION: u32 = 2;
pub const XDG_DECORATION_VERSION: u32 = 1;

/// Offset between evdev keycodes (wl_keyboard) and XKB keycodes.
/// X11 reserved codes 0-7, so XKB keycodes start at 8.
pub const EVDEV_TO_XKB_KEYCODE_OFFSET: u32 = 8;

/// `BTN_LEFT` from linux/input-event-codes.h
pub const BTN_LEFT: u32 = 0x110;
