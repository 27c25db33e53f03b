//! Keymap compilation and modifier state
//!
//! `KeyboardState` is the seam between the translator and the keymap
//! compiler. `XkbKeyboard` is the xkbcommon implementation; it is rebuilt
//! from scratch on every `wl_keyboard.keymap` event and never patched.

use log::debug;
use memmap2::MmapOptions;
use std::fs::File;
use std::os::fd::OwnedFd;
use xkbcommon::xkb;

use crate::error::{Result, WindowError};
use crate::handler::{Keysym, Modifiers};

/// Resolved keyboard layout plus live modifier state
pub trait KeyboardState {
    /// Apply a `wl_keyboard.modifiers` event; any bit pattern is accepted
    fn update_mask(&mut self, depressed: u32, latched: u32, locked: u32, group: u32);

    /// Keysyms produced by an XKB keycode under the current state
    fn key_syms(&self, keycode: u32) -> Vec<Keysym>;

    /// UTF-8 text produced by an XKB keycode; empty when none
    fn key_utf8(&self, keycode: u32) -> String;

    /// Effective Alt/Control/Shift
    fn modifiers(&self) -> Modifiers;
}

/// xkbcommon keymap + state with modifier indices resolved once
pub struct XkbKeyboard {
    keymap: xkb::Keymap,
    state: xkb::State,
    alt: xkb::ModIndex,
    ctrl: xkb::ModIndex,
    shift: xkb::ModIndex,
}

impl XkbKeyboard {
    /// Compile an XKB text-v1 keymap
    pub fn from_string(context: &xkb::Context, source: String) -> Result<Self> {
        let keymap = xkb::Keymap::new_from_string(
            context,
            source,
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| WindowError::Keymap("xkbcommon rejected the keymap".into()))?;
        Ok(Self::from_keymap(keymap))
    }

    /// Map and compile the keymap the compositor shared through `fd`
    pub fn from_fd(context: &xkb::Context, fd: OwnedFd, size: u32) -> Result<Self> {
        let file = File::from(fd);
        // SAFETY: the compositor hands out a read-only, private copy of the
        // keymap; we only read it and drop the mapping before returning.
        let map = unsafe { MmapOptions::new().len(size as usize).map_copy_read_only(&file) }
            .map_err(|e| WindowError::Keymap(format!("cannot map keymap: {}", e)))?;

        let text = map.split(|&b| b == 0).next().unwrap_or(&[]);
        let source = String::from_utf8(text.to_vec())
            .map_err(|e| WindowError::Keymap(format!("keymap is not UTF-8: {}", e)))?;
        Self::from_string(context, source)
    }

    fn from_keymap(keymap: xkb::Keymap) -> Self {
        let state = xkb::State::new(&keymap);
        let alt = keymap.mod_get_index(xkb::MOD_NAME_ALT);
        let ctrl = keymap.mod_get_index(xkb::MOD_NAME_CTRL);
        let shift = keymap.mod_get_index(xkb::MOD_NAME_SHIFT);
        debug!(
            "⌨️ keymap compiled: {} modifiers, alt index {}",
            keymap.num_mods(),
            alt
        );
        Self {
            keymap,
            state,
            alt,
            ctrl,
            shift,
        }
    }

    pub fn keymap(&self) -> &xkb::Keymap {
        &self.keymap
    }

    fn is_active(&self, index: xkb::ModIndex) -> bool {
        index != xkb::MOD_INVALID
            && self
                .state
                .mod_index_is_active(index, xkb::STATE_MODS_EFFECTIVE)
    }
}

impl KeyboardState for XkbKeyboard {
    fn update_mask(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        self.state
            .update_mask(depressed, latched, locked, 0, 0, group);
    }

    fn key_syms(&self, keycode: u32) -> Vec<Keysym> {
        self.state
            .key_get_syms(xkb::Keycode::new(keycode))
            .iter()
            .map(|sym| sym.raw())
            .collect()
    }

    fn key_utf8(&self, keycode: u32) -> String {
        self.state.key_get_utf8(xkb::Keycode::new(keycode))
    }

    fn modifiers(&self) -> Modifiers {
        Modifiers {
            alt: self.is_active(self.alt),
            ctrl: self.is_active(self.ctrl),
            shift: self.is_active(self.shift),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Self-contained keymap: no include files needed
    const MINIMAL_KEYMAP: &str = r#"
xkb_keymap {
    xkb_keycodes "minimal" {
        minimum = 8;
        maximum = 255;
        <RTRN> = 36;
        <AC01> = 38;
        <LALT> = 64;
    };
    xkb_types "minimal" {
        type "ONE_LEVEL" {
            modifiers = none;
            level_name[Level1] = "Any";
        };
    };
    xkb_compatibility "minimal" {
        interpret Alt_L {
            action = SetMods(modifiers = Mod1);
        };
    };
    xkb_symbols "minimal" {
        key <RTRN> { [ Return ] };
        key <AC01> { [ a ] };
        key <LALT> { [ Alt_L ] };
        modifier_map Mod1 { <LALT> };
    };
};
"#;

    /// Mod1 is the fourth real modifier
    const MOD1_MASK: u32 = 1 << 3;

    fn compile() -> XkbKeyboard {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        XkbKeyboard::from_string(&context, MINIMAL_KEYMAP.to_string()).unwrap()
    }

    #[test]
    fn test_minimal_keymap_resolves_keysyms_and_text() {
        let keyboard = compile();
        assert_eq!(keyboard.key_syms(38), vec![0x61]);
        assert_eq!(keyboard.key_utf8(38), "a");
        assert_eq!(keyboard.key_syms(36), vec![0xff0d]);
        assert!(keyboard.key_syms(200).is_empty());
        assert_eq!(keyboard.key_utf8(200), "");
    }

    #[test]
    fn test_modifier_mask_drives_alt() {
        let mut keyboard = compile();
        assert!(!keyboard.modifiers().alt);

        keyboard.update_mask(MOD1_MASK, 0, 0, 0);
        assert!(keyboard.modifiers().alt);
        assert!(!keyboard.modifiers().ctrl);

        keyboard.update_mask(0, 0, 0, 0);
        assert!(!keyboard.modifiers().alt);
    }

    #[test]
    fn test_garbage_keymap_is_rejected() {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let result = XkbKeyboard::from_string(&context, "xkb_keymap { nonsense".into());
        assert!(matches!(result, Err(WindowError::Keymap(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_keymap_from_shared_fd() {
        use std::io::Write;
        let mut file = tempfile::tempfile().unwrap();
        let mut blob = MINIMAL_KEYMAP.as_bytes().to_vec();
        blob.push(0);
        file.write_all(&blob).unwrap();

        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keyboard =
            XkbKeyboard::from_fd(&context, OwnedFd::from(file), blob.len() as u32).unwrap();
        assert_eq!(keyboard.key_utf8(38), "a");
    }
}
