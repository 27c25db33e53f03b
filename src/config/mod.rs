//! Configuration management for hello-wayland
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files: window identity and size limits, the pointer cursor,
//! and the demo renderer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::handler::Size;
use crate::window::WindowOptions;

/// Default configuration location, `~` expanded at load time
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/hello-wayland/config.toml";

/// Largest cursor size accepted from the configuration
pub const MAX_CURSOR_SIZE: u32 = 256;

/// Main configuration struct containing all settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HelloConfig {
    /// Toplevel window settings
    #[serde(default)]
    pub window: WindowConfig,

    /// Pointer cursor settings
    #[serde(default)]
    pub cursor: CursorConfig,

    /// Demo renderer settings
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title shown by the compositor
    pub title: String,

    /// Application id used for desktop-file matching
    pub app_id: String,

    /// Minimum width in pixels; the committed size never goes below it
    pub min_width: i32,

    /// Minimum height in pixels
    pub min_height: i32,

    /// Ask for compositor-drawn decorations. When false (or refused) the
    /// window falls back to fullscreen.
    pub server_side_decorations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CursorConfig {
    /// Cursor name within the theme
    pub name: String,

    /// Cursor size; unset means `XCURSOR_SIZE`, then 16
    pub size: Option<u32>,

    /// XCursor theme name; unset means the default theme
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Per-frame colour increment of the demo fill
    pub color_step: u8,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hello Wayland".to_string(),
            app_id: "hello-wayland".to_string(),
            min_width: 800,
            min_height: 600,
            server_side_decorations: true,
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            size: None,
            theme: None,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { color_step: 1 }
    }
}

/// Expand a leading `~` to `$HOME`
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl HelloConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: HelloConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.window.min_width <= 0 || self.window.min_height <= 0 {
            anyhow::bail!(
                "Invalid minimum size {}x{}: both dimensions must be positive",
                self.window.min_width,
                self.window.min_height
            );
        }

        if self.window.title.trim().is_empty() {
            anyhow::bail!("Invalid title: must not be empty");
        }

        if let Some(size) = self.cursor.size {
            if size == 0 || size > MAX_CURSOR_SIZE {
                anyhow::bail!(
                    "Invalid cursor size {}: must be between 1 and {}",
                    size,
                    MAX_CURSOR_SIZE
                );
            }
        }

        if self.render.color_step == 0 {
            anyhow::bail!("Invalid color_step: must be at least 1");
        }

        Ok(())
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = expand_home(path.as_ref())?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        fs::write(&path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Merge a partial configuration into this one
    /// Sections of the partial config that differ from the defaults win
    pub fn merge_partial(mut self, partial: HelloConfig) -> Self {
        let default_config = HelloConfig::default();

        if partial.window != default_config.window {
            self.window = partial.window;
        }
        if partial.cursor != default_config.cursor {
            self.cursor = partial.cursor;
        }
        if partial.render != default_config.render {
            self.render = partial.render;
        }

        self
    }

    /// Construction options for the window
    pub fn window_options(&self) -> WindowOptions {
        WindowOptions {
            title: self.window.title.clone(),
            app_id: self.window.app_id.clone(),
            min_size: Size::new(self.window.min_width, self.window.min_height),
            server_side_decorations: self.window.server_side_decorations,
            cursor_name: self.cursor.name.clone(),
            cursor_size: self.cursor.size,
            cursor_theme: self.cursor.theme.clone(),
        }
    }
}

#[cfg(test)]
mod tests;
