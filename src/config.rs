//! Configuration management for middleclick
//!
//! Every field is optional in the TOML file; missing values fall back to
//! the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::MiddleClickError;

/// When a recognized gesture produces the button press
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Press after the debounce window, drag while held, release on lift
    #[default]
    Hold,
    /// Click (press + release) when a short touch lifts
    Tap,
}

/// Which host facility receives synthesized events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectorBackend {
    /// uinput via the ydotoold daemon, works on Wayland
    #[default]
    Ydotool,
    /// X11 XTest extension
    Xtest,
}

/// Gesture recognizer tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Number of fingers that make up the gesture
    pub finger_count: usize,

    /// Minimum hold before the press fires
    pub debounce_ms: u64,

    /// Maximum gap between the first and last finger touching down
    pub coalesce_window_ms: u64,

    /// Maximum centroid travel during the debounce window (normalized)
    pub drift_tolerance: f32,

    /// Maximum distance of any finger from the centroid (normalized)
    pub max_spread: f32,

    /// Pixels per normalized unit of centroid travel while dragging
    pub pointer_speed: f32,

    pub trigger: TriggerMode,

    /// Longest touch still counted as a tap in tap mode
    pub max_tap_ms: u64,
}

impl GestureConfig {
    pub const DEFAULT_FINGER_COUNT: usize = 3;
    pub const DEFAULT_DEBOUNCE_MS: u64 = 30;
    pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 80;
    pub const DEFAULT_DRIFT_TOLERANCE: f32 = 0.05;
    pub const DEFAULT_MAX_SPREAD: f32 = 0.5;
    pub const DEFAULT_POINTER_SPEED: f32 = 1500.0;
    pub const DEFAULT_MAX_TAP_MS: u64 = 500;

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn max_tap(&self) -> Duration {
        Duration::from_millis(self.max_tap_ms)
    }

    /// Set the number of fingers
    pub fn with_finger_count(mut self, count: usize) -> Self {
        self.finger_count = count;
        self
    }

    /// Set the debounce window
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Set the drift tolerance
    pub fn with_drift_tolerance(mut self, tolerance: f32) -> Self {
        self.drift_tolerance = tolerance;
        self
    }

    /// Set the trigger mode
    pub fn with_trigger(mut self, trigger: TriggerMode) -> Self {
        self.trigger = trigger;
        self
    }

    /// Set the drag speed
    pub fn with_pointer_speed(mut self, speed: f32) -> Self {
        self.pointer_speed = speed;
        self
    }

    fn validate(&self) -> Result<(), MiddleClickError> {
        if !(2..=5).contains(&self.finger_count) {
            return Err(MiddleClickError::Config(format!(
                "gesture.finger_count must be between 2 and 5, got {}",
                self.finger_count
            )));
        }
        if !(self.drift_tolerance > 0.0 && self.drift_tolerance <= 1.0) {
            return Err(MiddleClickError::Config(
                "gesture.drift_tolerance must be in (0, 1]".to_string(),
            ));
        }
        if !(self.max_spread > 0.0) {
            return Err(MiddleClickError::Config(
                "gesture.max_spread must be positive".to_string(),
            ));
        }
        if !(self.pointer_speed >= 0.0) {
            return Err(MiddleClickError::Config(
                "gesture.pointer_speed must not be negative".to_string(),
            ));
        }
        if self.trigger == TriggerMode::Tap && self.max_tap_ms < self.debounce_ms {
            return Err(MiddleClickError::Config(
                "gesture.max_tap_ms must be at least gesture.debounce_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            finger_count: Self::DEFAULT_FINGER_COUNT,
            debounce_ms: Self::DEFAULT_DEBOUNCE_MS,
            coalesce_window_ms: Self::DEFAULT_COALESCE_WINDOW_MS,
            drift_tolerance: Self::DEFAULT_DRIFT_TOLERANCE,
            max_spread: Self::DEFAULT_MAX_SPREAD,
            pointer_speed: Self::DEFAULT_POINTER_SPEED,
            trigger: TriggerMode::default(),
            max_tap_ms: Self::DEFAULT_MAX_TAP_MS,
        }
    }
}

/// Device lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Only monitor built-in trackpads
    pub builtin_only: bool,

    /// Upper bound on a single native start/stop call
    pub device_timeout_ms: u64,

    /// Delay before a requested restart runs; later requests replace it
    pub restart_delay_ms: u64,

    /// How often to look for hardware while none is registered (0 = never)
    pub rescan_interval_secs: u64,
}

impl DeviceConfig {
    pub const DEFAULT_DEVICE_TIMEOUT_MS: u64 = 1000;
    pub const DEFAULT_RESTART_DELAY_MS: u64 = 500;
    pub const DEFAULT_RESCAN_INTERVAL_SECS: u64 = 5;

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn rescan_interval(&self) -> Option<Duration> {
        (self.rescan_interval_secs > 0).then(|| Duration::from_secs(self.rescan_interval_secs))
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            builtin_only: false,
            device_timeout_ms: Self::DEFAULT_DEVICE_TIMEOUT_MS,
            restart_delay_ms: Self::DEFAULT_RESTART_DELAY_MS,
            rescan_interval_secs: Self::DEFAULT_RESCAN_INTERVAL_SECS,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by RUST_LOG
    pub level: String,
    pub json: bool,
    /// Write daily-rotated files here instead of stdout
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            json: false,
            directory: None,
        }
    }
}

/// Configuration for the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial value of the click-synthesis mode
    pub enabled: bool,

    pub injector: InjectorBackend,

    pub gesture: GestureConfig,

    pub device: DeviceConfig,

    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            injector: InjectorBackend::default(),
            gesture: GestureConfig::default(),
            device: DeviceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Default config file name, looked up in the working directory
    pub const DEFAULT_PATH: &'static str = "middleclick.toml";

    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MiddleClickError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MiddleClickError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text; fields left out keep their defaults
    pub fn from_toml(content: &str) -> Result<Self, MiddleClickError> {
        toml::from_str(content)
            .map_err(|e| MiddleClickError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Write the default configuration as TOML
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<(), MiddleClickError> {
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| MiddleClickError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| MiddleClickError::Config(format!("Failed to write config: {}", e)))
    }

    pub fn validate(&self) -> Result<(), MiddleClickError> {
        self.gesture.validate()?;
        if self.device.device_timeout_ms == 0 {
            return Err(MiddleClickError::Config(
                "device.device_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the initial mode
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replace the gesture tunables
    pub fn with_gesture(mut self, gesture: GestureConfig) -> Self {
        self.gesture = gesture;
        self
    }

    /// Choose the injection backend
    pub fn with_injector(mut self, injector: InjectorBackend) -> Self {
        self.injector = injector;
        self
    }

    /// Set the bound on native device calls
    pub fn with_device_timeout_ms(mut self, ms: u64) -> Self {
        self.device.device_timeout_ms = ms;
        self
    }
}
