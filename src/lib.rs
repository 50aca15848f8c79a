//! middleclick - three-finger tap to middle-click for trackpads
//!
//! This library provides components for:
//! - Contact frame sources (multitouch devices, evdev on Linux)
//! - Device lifecycle (registration, restart after wake or hot-plug)
//! - Gesture recognition (N-finger hold, drag and tap)
//! - Event synthesis (middle button down/up and relative motion)

pub mod config;
pub mod contact;
pub mod controller;
#[cfg(target_os = "linux")]
pub mod evdev_source;
pub mod frame_source;
pub mod gesture;
pub mod input_simulator;
pub mod lifecycle;
pub mod logging;
pub mod mode;
pub mod registry;
pub mod synthesizer;

pub use config::{Config, GestureConfig, InjectorBackend, TriggerMode};
pub use contact::{Contact, ContactPhase, DeviceId, DeviceInfo, Frame, Point};
pub use controller::Controller;
pub use frame_source::{ContactFrameSource, FrameCallback};
pub use gesture::{Decision, GesturePhase, GestureRecognizer};
pub use input_simulator::{create_injector, InputInjector, XTestInjector, YdotoolInjector};
pub use lifecycle::{RestartScheduler, RestartTrigger};
pub use mode::ModeController;
pub use registry::{DeviceRegistry, StartReport};
pub use synthesizer::{DecisionEvent, DecisionSink, EventSynthesizer, SynthesizerHandle};

use thiserror::Error;

/// Main error type for middleclick
#[derive(Error, Debug)]
pub enum MiddleClickError {
    #[error("Failed to enumerate contact devices: {0}")]
    DeviceEnumeration(String),

    #[error("Failed to register frame callback for {device}: {reason}")]
    CallbackRegistration { device: String, reason: String },

    #[error("Failed to inject input event: {0}")]
    Injection(String),

    #[error("Gesture invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Permission denied - add user to 'input' group")]
    PermissionDenied,

    #[error("Channel error: {0}")]
    Channel(String),
}

pub type Result<T, E = MiddleClickError> = std::result::Result<T, E>;
