//! # hello-wayland
//!
//! Opens one window, fills it with a slowly pulsing grey, echoes typed text
//! to stdout and reports left clicks. Alt+Return toggles fullscreen when the
//! compositor draws the window decorations.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::io::{self, Write};

use hello_wayland::config::DEFAULT_CONFIG_PATH;
use hello_wayland::{HelloConfig, Keysym, Modifiers, Size, Window, WindowHandler};

#[derive(Parser)]
#[command(name = "hello-wayland")]
#[command(about = "A minimal shared-memory Wayland client")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the window title
    #[arg(short, long)]
    title: Option<String>,
}

/// Grey level bouncing between 0 and 255
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColorCycle {
    value: u8,
    step: u8,
    ascending: bool,
}

impl ColorCycle {
    fn new(step: u8) -> Self {
        Self {
            value: u8::MAX,
            step: step.max(1),
            ascending: false,
        }
    }

    /// Current level, then advance one frame
    fn next_value(&mut self) -> u8 {
        let current = self.value;
        if self.ascending {
            self.value = self.value.saturating_add(self.step);
            if self.value == u8::MAX {
                self.ascending = false;
            }
        } else {
            self.value = self.value.saturating_sub(self.step);
            if self.value == u8::MIN {
                self.ascending = true;
            }
        }
        current
    }
}

struct HelloHandler {
    color: ColorCycle,
}

impl HelloHandler {
    fn echo(text: &str) {
        let mut stdout = io::stdout().lock();
        // A closed stdout is not worth stopping the window for
        let _ = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush());
    }
}

impl WindowHandler for HelloHandler {
    fn on_configure(&mut self, size: Size) {
        info!("📐 configured at {}", size);
    }

    fn on_key_down(&mut self, keysym: Keysym, modifiers: Modifiers) {
        log::debug!("key down {:#x} {:?}", keysym, modifiers);
    }

    fn on_text(&mut self, text: &str) {
        Self::echo(text);
    }

    fn on_pointer_click(&mut self, _x: f64, _y: f64) {
        Self::echo("click\n");
    }

    fn on_pointer_release(&mut self, _x: f64, _y: f64) {
        Self::echo("release\n");
    }

    fn on_render(&mut self, canvas: &mut [u8], _size: Size) {
        canvas.fill(self.color.next_value());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting hello-wayland");
    info!("📄 Version: {}", hello_wayland::VERSION);

    // Load configuration
    let mut config = match HelloConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            HelloConfig::default()
        }
    };

    // Override config with CLI flags
    if let Some(title) = cli.title {
        config.window.title = title;
    }
    config.validate().context("Invalid configuration")?;

    let handler = HelloHandler {
        color: ColorCycle::new(config.render.color_step),
    };
    let mut window = Window::new(&config.window_options(), Box::new(handler))
        .context("Failed to create window")?;

    while !window.should_close() {
        window.poll_events().context("Event loop failed")?;
        window.render().context("Rendering failed")?;
    }

    if let Some(stats) = window.pool_stats() {
        info!("📊 framebuffer pool: {:?}", stats);
    }
    Ok(())
}
