//! Application-facing facade
//!
//! Wires a frame source to per-device recognizers and a single injection
//! thread, and exposes the handful of operations the surrounding app uses.

use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::contact::DeviceInfo;
use crate::frame_source::ContactFrameSource;
use crate::input_simulator::InputInjector;
use crate::mode::ModeController;
use crate::registry::{DeviceRegistry, StartReport};
use crate::synthesizer::{DecisionEvent, EventSynthesizer, SynthesizerHandle};
use crate::MiddleClickError;

pub struct Controller {
    // Field order matters: the registry queues its final ButtonUps before
    // the synthesizer thread is shut down.
    registry: DeviceRegistry,
    synth: SynthesizerHandle,
    mode: Arc<ModeController>,
}

impl Controller {
    pub fn new<I: InputInjector>(
        source: Arc<dyn ContactFrameSource>,
        injector: I,
        config: &Config,
    ) -> Result<Self, MiddleClickError> {
        config.validate()?;
        Self::with_synthesizer(source, EventSynthesizer::new(injector), config)
    }

    /// Use a pre-built synthesizer, e.g. one with explicit invariant strictness
    pub fn with_synthesizer<I: InputInjector>(
        source: Arc<dyn ContactFrameSource>,
        synth: EventSynthesizer<I>,
        config: &Config,
    ) -> Result<Self, MiddleClickError> {
        let synth = SynthesizerHandle::spawn(synth)?;
        let mode = Arc::new(ModeController::new(config.enabled));
        let registry = DeviceRegistry::new(source, Arc::clone(&mode), synth.sink(), config);

        info!(
            "Controller ready ({} fingers, {:?} trigger, click synthesis {})",
            config.gesture.finger_count,
            config.gesture.trigger,
            if config.enabled { "on" } else { "off" }
        );
        Ok(Self {
            registry,
            synth,
            mode,
        })
    }

    pub fn start(&self) -> StartReport {
        self.registry.start()
    }

    pub fn restart_devices(&self) -> StartReport {
        self.registry.restart_devices()
    }

    /// Enable or disable click synthesis
    ///
    /// Disabling releases any gesture currently holding the button.
    pub fn set_mode(&self, enabled: bool) {
        let previous = self.mode.set(enabled);
        if previous && !enabled {
            self.registry.release_all();
        }
    }

    pub fn get_mode(&self) -> bool {
        self.mode.is_enabled()
    }

    pub fn device_count(&self) -> usize {
        self.registry.device_count()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.registry.devices()
    }

    /// Read-only stream of every applied decision
    pub fn subscribe(&self) -> Receiver<DecisionEvent> {
        self.synth.subscribe()
    }

    /// Wait until every decision queued so far has been injected
    pub fn sync(&self, timeout: Duration) -> Result<(), MiddleClickError> {
        self.synth.sync(timeout)
    }

    /// Stop all devices; held gestures are released first
    pub fn stop(&self) {
        self.registry.stop();
    }
}
