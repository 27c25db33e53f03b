//! Keyboard and pointer translation
//!
//! Turns raw `wl_keyboard`/`wl_pointer` traffic into a small event
//! vocabulary the window forwards to the application:
//! keycodes become keysyms and text, modifier masks become a
//! `Modifiers` snapshot, and pointer buttons carry the last known
//! surface-local position.

pub mod keymap;

pub use keymap::{KeyboardState, XkbKeyboard};

use log::{debug, warn};
use std::os::fd::OwnedFd;
use wayland_client::{protocol::wl_keyboard::KeymapFormat, WEnum};
use xkbcommon::xkb;

use crate::error::Result;
use crate::handler::{Keysym, Modifiers, ScrollAxis};
use crate::protocol::EVDEV_TO_XKB_KEYCODE_OFFSET;

/// XK_Return
pub const KEY_RETURN: Keysym = 0xff0d;

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

/// Translated input, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown { keysym: Keysym, modifiers: Modifiers },
    KeyUp { keysym: Keysym, modifiers: Modifiers },
    /// Text typed by a key press; never empty
    Text(String),
    /// Alt+Return: ask the surface to flip fullscreen
    ToggleFullscreen,
    PointerEnter { serial: u32, x: f64, y: f64 },
    PointerLeave,
    PointerMotion { x: f64, y: f64 },
    PointerButton { button: u32, pressed: bool, x: f64, y: f64 },
    PointerAxis { axis: ScrollAxis, value: f64 },
}

/// Owns the compiled keymap and the pointer position
pub struct InputTranslator {
    context: xkb::Context,
    keyboard: Option<Box<dyn KeyboardState>>,
    keymap_generation: u64,
    pointer_position: (f64, f64),
    repeat_info: Option<(i32, i32)>,
}

impl InputTranslator {
    pub fn new() -> Self {
        Self {
            context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            keyboard: None,
            keymap_generation: 0,
            pointer_position: (0.0, 0.0),
            repeat_info: None,
        }
    }

    /// Handle `wl_keyboard.keymap`; returns whether a new keymap was installed
    ///
    /// Unknown formats are ignored. A keymap that fails to compile drops the
    /// previous one: its keysyms no longer describe the compositor's layout.
    pub fn keymap(&mut self, format: WEnum<KeymapFormat>, fd: OwnedFd, size: u32) -> Result<bool> {
        match format {
            WEnum::Value(KeymapFormat::XkbV1) => {
                match XkbKeyboard::from_fd(&self.context, fd, size) {
                    Ok(keyboard) => {
                        self.install_keyboard(Box::new(keyboard));
                        Ok(true)
                    }
                    Err(e) => {
                        self.keyboard = None;
                        Err(e)
                    }
                }
            }
            other => {
                warn!("⚠️ ignoring keymap in unsupported format {:?}", other);
                Ok(false)
            }
        }
    }

    /// Replace the keyboard state wholesale
    pub fn install_keyboard(&mut self, keyboard: Box<dyn KeyboardState>) {
        self.keyboard = Some(keyboard);
        self.keymap_generation += 1;
        debug!("⌨️ keymap generation {}", self.keymap_generation);
    }

    /// Number of keymaps installed so far
    pub fn keymap_generation(&self) -> u64 {
        self.keymap_generation
    }

    pub fn has_keymap(&self) -> bool {
        self.keyboard.is_some()
    }

    /// Handle `wl_keyboard.modifiers`
    pub fn modifiers(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        if let Some(keyboard) = self.keyboard.as_mut() {
            keyboard.update_mask(depressed, latched, locked, group);
        }
    }

    /// Current modifier snapshot; all clear without a keymap
    pub fn active_modifiers(&self) -> Modifiers {
        self.keyboard
            .as_ref()
            .map(|k| k.modifiers())
            .unwrap_or_default()
    }

    /// Handle `wl_keyboard.key` for an evdev keycode
    pub fn key(&mut self, key: u32, state: KeyState) -> Vec<InputEvent> {
        let Some(keyboard) = self.keyboard.as_ref() else {
            debug!("key {} before any keymap, dropped", key);
            return Vec::new();
        };

        let Some(keycode) = key.checked_add(EVDEV_TO_XKB_KEYCODE_OFFSET) else {
            debug!("key {} has no xkb keycode, dropped", key);
            return Vec::new();
        };
        let modifiers = keyboard.modifiers();
        let keysyms = keyboard.key_syms(keycode);
        let mut events = Vec::with_capacity(keysyms.len() + 1);

        match state {
            KeyState::Pressed => {
                for keysym in keysyms {
                    events.push(InputEvent::KeyDown { keysym, modifiers });
                    if keysym == KEY_RETURN {
                        if modifiers.alt {
                            events.push(InputEvent::ToggleFullscreen);
                        } else {
                            events.push(InputEvent::Text("\n".to_string()));
                        }
                    }
                }

                let text = keyboard.key_utf8(keycode);
                if !text.is_empty() {
                    events.push(InputEvent::Text(text));
                }
            }
            KeyState::Released => {
                events.extend(
                    keysyms
                        .into_iter()
                        .map(|keysym| InputEvent::KeyUp { keysym, modifiers }),
                );
            }
        }

        events
    }

    /// Handle `wl_keyboard.repeat_info`; recorded, repeat itself is not modelled
    pub fn repeat_info(&mut self, rate: i32, delay: i32) {
        debug!("⌨️ repeat info: {} keys/s after {} ms", rate, delay);
        self.repeat_info = Some((rate, delay));
    }

    pub fn repeat_settings(&self) -> Option<(i32, i32)> {
        self.repeat_info
    }

    pub fn pointer_enter(&mut self, serial: u32, x: f64, y: f64) -> InputEvent {
        self.pointer_position = (x, y);
        InputEvent::PointerEnter { serial, x, y }
    }

    pub fn pointer_leave(&mut self) -> InputEvent {
        InputEvent::PointerLeave
    }

    pub fn pointer_motion(&mut self, x: f64, y: f64) -> InputEvent {
        self.pointer_position = (x, y);
        InputEvent::PointerMotion { x, y }
    }

    /// Button transition at the last entered/moved-to position
    pub fn pointer_button(&mut self, button: u32, pressed: bool) -> InputEvent {
        let (x, y) = self.pointer_position;
        InputEvent::PointerButton {
            button,
            pressed,
            x,
            y,
        }
    }

    pub fn pointer_axis(&mut self, axis: ScrollAxis, value: f64) -> InputEvent {
        InputEvent::PointerAxis { axis, value }
    }

    pub fn pointer_position(&self) -> (f64, f64) {
        self.pointer_position
    }
}

impl Default for InputTranslator {
    fn default() -> Self {
        Self::new()
    }
}
