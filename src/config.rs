//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`TRELLIS_SECTION__KEY`)

use figment::{Figment, providers::{Format, Toml, Env}};
use serde::{Serialize, Deserialize};
use std::path::Path;

use trellis_core::{CameraOptions, DprRange, EventSettings, Frameloop, PointerPrefix, RootConfig, Vec3};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // TRELLIS_WINDOW__TITLE=Test -> window.title = "Test"
        figment = figment.merge(Env::prefixed("TRELLIS_").split("__"));

        figment.extract().map_err(ConfigError::from)
    }

    /// Options for the canvas root
    ///
    /// Text options are parsed here so a bad value is reported before any
    /// window exists.
    pub fn root_config(&self) -> Result<RootConfig, ConfigError> {
        let canvas = &self.canvas;
        let frameloop: Frameloop = canvas.frameloop.parse().map_err(ConfigError::Invalid)?;
        let prefix: PointerPrefix = canvas.events.prefix.parse().map_err(ConfigError::Invalid)?;
        let config = RootConfig {
            frameloop,
            dpr: 0.0,
            dpr_range: DprRange {
                min: canvas.dpr[0],
                max: canvas.dpr[1],
            },
            camera: CameraOptions {
                kind: canvas.camera.kind.clone(),
                fov: canvas.camera.fov,
                near: canvas.camera.near,
                far: canvas.camera.far,
                zoom: canvas.camera.zoom,
                position: Vec3::from_array(canvas.camera.position),
                manual: canvas.camera.manual,
            },
            events: EventSettings {
                enabled: canvas.events.enabled,
                priority: canvas.events.priority,
                prefix,
                click_threshold: canvas.events.click_threshold,
            },
            flat: canvas.flat,
            legacy: false,
            ..Default::default()
        };
        config.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    /// Logical width in pixels
    pub width: u32,
    /// Logical height in pixels
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "trellis".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
        }
    }
}

/// Canvas (root) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// `always`, `demand` or `never`
    pub frameloop: String,
    /// Device pixel ratio bounds `[min, max]`
    pub dpr: [f32; 2],
    /// Skip tone mapping
    pub flat: bool,
    pub camera: CameraConfig,
    pub events: EventsConfig,
    /// RON scene mounted at startup
    pub scene: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            frameloop: "always".to_string(),
            dpr: [1.0, 2.0],
            flat: false,
            camera: CameraConfig::default(),
            events: EventsConfig::default(),
            scene: "scenes/playground.ron".to_string(),
        }
    }
}

/// Default camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// `perspective` or `orthographic`
    pub kind: String,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Orthographic zoom
    pub zoom: f32,
    pub position: [f32; 3],
    /// Keep the frustum when the window resizes
    pub manual: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let options = CameraOptions::default();
        Self {
            kind: options.kind,
            fov: options.fov,
            near: options.near,
            far: options.far,
            zoom: options.zoom,
            position: options.position.to_array(),
            manual: options.manual,
        }
    }
}

/// Pointer event configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub enabled: bool,
    /// `offset`, `client`, `page`, `layer` or `screen`
    pub prefix: String,
    pub priority: i32,
    /// Pixels of travel after which a click counts as a drag
    pub click_threshold: f32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        let settings = EventSettings::default();
        Self {
            enabled: settings.enabled,
            prefix: "offset".to_string(),
            priority: settings.priority,
            click_threshold: settings.click_threshold,
        }
    }
}

/// Physics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Run the physics worker at all
    pub enabled: bool,
    /// Gravity acceleration [x, y, z]
    pub gravity: [f32; 3],
    /// Fixed step in seconds
    pub step: f32,
    pub max_sub_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gravity: [0.0, -9.81, 0.0],
            step: 1.0 / 60.0,
            max_sub_steps: 10,
        }
    }
}

impl PhysicsConfig {
    /// Convert to the simulation's configuration
    pub fn to_physics_config(&self) -> trellis_physics::PhysicsConfig {
        trellis_physics::PhysicsConfig {
            gravity: Vec3::from_array(self.gravity),
            fixed_step: self.step,
            max_sub_steps: self.max_sub_steps,
        }
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Log every pointer event that reaches a handler
    pub trace_events: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            trace_events: false,
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub enum ConfigError {
    /// A source could not be read or merged
    Load(String),
    /// Values were read but make no sense together
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Load(e.to_string())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "Configuration error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.physics.gravity[1], -9.81);
        assert_eq!(config.canvas.events.prefix, "offset");
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("title"));
        assert!(toml.contains("click_threshold"));
        assert!(toml.contains("gravity"));
    }

    #[test]
    fn test_default_root_config_is_valid() {
        let root = AppConfig::default().root_config().unwrap();
        assert_eq!(root.frameloop, Frameloop::Always);
        assert_eq!(root.events.prefix, PointerPrefix::Offset);
        assert_eq!(root.camera.position, Vec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn test_bad_text_options_are_rejected() {
        let mut config = AppConfig::default();
        config.canvas.frameloop = "sometimes".to_string();
        assert!(matches!(config.root_config(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.canvas.events.prefix = "movement".to_string();
        assert!(config.root_config().is_err());

        let mut config = AppConfig::default();
        config.canvas.camera.kind = "fisheye".to_string();
        assert!(config.root_config().is_err());
    }

    #[test]
    fn test_physics_conversion() {
        let mut config = PhysicsConfig::default();
        config.gravity = [0.0, -20.0, 0.0];
        let physics = config.to_physics_config();
        assert_eq!(physics.gravity, Vec3::new(0.0, -20.0, 0.0));
        assert_eq!(physics.max_sub_steps, 10);
    }
}
