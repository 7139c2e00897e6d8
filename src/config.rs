// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a missing or partial config.toml is fine.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Preferred present mode; FIFO is used when the surface lacks it
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: MAX_FRAMES_IN_FLIGHT,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    /// Send log output to this file instead of stderr
    pub log_file: Option<String>,
    pub show_fps: bool,
    /// Log adapter, queue family and surface details at info level
    pub dump_device_info: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            log_file: None,
            show_fps: true,
            dump_device_info: false,
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory.
    ///
    /// Runs before the logger exists, so a load failure is handed back
    /// alongside the defaults for the caller to report.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default("config.toml")
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the preferred present mode as a Vulkan enum
    pub fn preferred_present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::MAILBOX
            }
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.max(1)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.debug
            .log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.frames_in_flight(), MAX_FRAMES_IN_FLIGHT);
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert!(config.debug.log_file.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            title = "quad"

            [graphics]
            present_mode = "FIFO"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "quad");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_mailbox() {
        let config = Config::from_toml_str("[graphics]\npresent_mode = \"vsync-ish\"").unwrap();
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        let config = Config::from_toml_str("[graphics]\nmax_frames_in_flight = 0").unwrap();
        assert_eq!(config.frames_in_flight(), 1);
    }

    #[test]
    fn log_level_parses_and_defaults() {
        let config = Config::from_toml_str("[debug]\nlog_level = \"debug\"").unwrap();
        assert_eq!(config.log_level(), log::LevelFilter::Debug);

        let config = Config::from_toml_str("[debug]\nlog_level = \"loud\"").unwrap();
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(Config::from_toml_str("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults_with_error() {
        let path = std::env::temp_dir().join(format!("vk-quad-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = \"wide\"").unwrap();

        let (config, error) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 800);
        let error = error.expect("malformed config should report an error");
        assert!(format!("{:#}", error).contains("Failed to parse config file"));
    }

    #[test]
    fn valid_file_loads_without_error() {
        let path = std::env::temp_dir().join(format!("vk-quad-ok-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = 1024").unwrap();

        let (config, error) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(error.is_none());
        assert_eq!(config.window.width, 1024);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert_eq!(config.window.title, "Vulkan");
    }
}
