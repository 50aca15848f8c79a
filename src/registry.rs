//! Device registry
//!
//! Owns the set of monitored devices and the gesture state bound to each.
//! Membership only changes inside `start`, `restart_devices` and `stop`,
//! all of which hold the membership lock for their whole duration.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{Config, GestureConfig};
use crate::contact::{DeviceInfo, Frame};
use crate::frame_source::{ContactFrameSource, FrameCallback};
use crate::gesture::GestureRecognizer;
use crate::mode::ModeController;
use crate::synthesizer::DecisionSink;
use crate::MiddleClickError;

/// Value passed to `start_device`; 0 requests normal frame delivery
const DEVICE_START_MODE: i32 = 0;

/// Outcome of a discovery pass
#[derive(Debug, Default)]
pub struct StartReport {
    pub registered: Vec<DeviceInfo>,
    pub failed: Vec<(DeviceInfo, MiddleClickError)>,
    pub enumeration_error: Option<MiddleClickError>,
}

/// Recognizer plus the flag that fences it off during teardown
struct GestureSlot {
    recognizer: GestureRecognizer,
    retired: bool,
}

struct RegisteredDevice {
    info: DeviceInfo,
    slot: Arc<Mutex<GestureSlot>>,
}

pub struct DeviceRegistry {
    source: Arc<dyn ContactFrameSource>,
    devices: Mutex<Vec<RegisteredDevice>>,
    mode: Arc<ModeController>,
    sink: DecisionSink,
    gesture: GestureConfig,
    builtin_only: bool,
    timeout: Duration,
}

impl DeviceRegistry {
    pub fn new(
        source: Arc<dyn ContactFrameSource>,
        mode: Arc<ModeController>,
        sink: DecisionSink,
        config: &Config,
    ) -> Self {
        Self {
            source,
            devices: Mutex::new(Vec::new()),
            mode,
            sink,
            gesture: config.gesture.clone(),
            builtin_only: config.device.builtin_only,
            timeout: config.device.device_timeout(),
        }
    }

    /// Discover devices and begin frame delivery
    ///
    /// Never fails: enumeration and per-device errors are logged and
    /// returned in the report.
    pub fn start(&self) -> StartReport {
        let mut devices = self.lock_devices();
        if !devices.is_empty() {
            info!("Registry already running, restarting devices");
            self.teardown(&mut devices);
        }
        self.discover(&mut devices)
    }

    /// Tear every device down (releasing held gestures) and rediscover
    pub fn restart_devices(&self) -> StartReport {
        let mut devices = self.lock_devices();
        info!("Restarting {} multitouch device(s)...", devices.len());
        self.teardown(&mut devices);
        let report = self.discover(&mut devices);
        info!("Devices restarted");
        report
    }

    /// Stop monitoring every device
    pub fn stop(&self) {
        let mut devices = self.lock_devices();
        if devices.is_empty() {
            return;
        }
        info!("Stopping multitouch monitoring...");
        self.teardown(&mut devices);
    }

    pub fn device_count(&self) -> usize {
        self.lock_devices().len()
    }

    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.lock_devices().iter().map(|d| d.info.clone()).collect()
    }

    /// Force-release every held gesture, e.g. after the mode was disabled
    pub fn release_all(&self) {
        for device in self.lock_devices().iter() {
            let mut slot = lock(&device.slot);
            if let Some(up) = slot.recognizer.flush() {
                info!("{}: releasing held gesture", device.info);
                self.sink.submit(device.info.id, up);
            }
        }
    }

    fn lock_devices(&self) -> MutexGuard<'_, Vec<RegisteredDevice>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn discover(&self, devices: &mut Vec<RegisteredDevice>) -> StartReport {
        let mut report = StartReport::default();

        let found = match self.source.discover_devices() {
            Ok(found) => found,
            Err(e) => {
                error!("Device enumeration failed: {}", e);
                report.enumeration_error = Some(e);
                return report;
            }
        };
        if found.is_empty() {
            warn!("No multitouch devices found");
        }

        for info in found {
            if self.builtin_only && !info.built_in {
                info!("Skipping external device {}", info);
                continue;
            }
            match self.register(info.clone()) {
                Ok(device) => {
                    info!(
                        "Monitoring {}{}",
                        device.info,
                        if device.info.built_in { " (built-in)" } else { "" }
                    );
                    report.registered.push(info);
                    devices.push(device);
                }
                Err(e) => {
                    warn!("Dropping {}: {}", info, e);
                    report.failed.push((info, e));
                }
            }
        }

        info!("Found {} multitouch device(s)", devices.len());
        report
    }

    fn register(&self, info: DeviceInfo) -> Result<RegisteredDevice, MiddleClickError> {
        let slot = Arc::new(Mutex::new(GestureSlot {
            recognizer: GestureRecognizer::new(info.id, self.gesture.clone()),
            retired: false,
        }));

        let callback = self.frame_callback(Arc::clone(&slot));
        let started = self
            .bounded(&info, "register", move |source, device| {
                source.register_frame_callback(device, callback)
            })
            .and_then(|()| {
                self.bounded(&info, "start", |source, device| {
                    source.start_device(device, DEVICE_START_MODE)
                })
            });

        if let Err(e) = started {
            // A call that timed out may still install the callback later;
            // the retired slot keeps it silent either way.
            lock(&slot).retired = true;
            if let Err(unregister) = self.bounded(&info, "unregister", |source, device| {
                source.unregister_frame_callback(device)
            }) {
                debug!("{}: unregister after failed registration: {}", info, unregister);
            }
            return Err(e);
        }

        Ok(RegisteredDevice { info, slot })
    }

    fn frame_callback(&self, slot: Arc<Mutex<GestureSlot>>) -> FrameCallback {
        let mode = Arc::clone(&self.mode);
        let sink = self.sink.clone();
        Box::new(move |frame: Frame| {
            let mut slot = lock(&slot);
            if slot.retired {
                return;
            }
            // Decisions are queued under the slot lock so a concurrent
            // force-release cannot overtake them.
            let device = slot.recognizer.device();
            for decision in slot.recognizer.process(&frame, mode.is_enabled()) {
                sink.submit(device, decision);
            }
        })
    }

    fn teardown(&self, devices: &mut Vec<RegisteredDevice>) {
        for device in devices.drain(..) {
            {
                let mut slot = lock(&device.slot);
                slot.retired = true;
                if let Some(up) = slot.recognizer.flush() {
                    info!("{}: releasing held gesture before teardown", device.info);
                    self.sink.submit(device.info.id, up);
                }
            }

            if let Err(e) = self.bounded(&device.info, "stop", |source, info| source.stop_device(info)) {
                warn!("{}: stop failed: {}", device.info, e);
            }
            if let Err(e) = self.bounded(&device.info, "unregister", |source, info| {
                source.unregister_frame_callback(info)
            }) {
                warn!("{}: unregister failed: {}", device.info, e);
            }
            debug!("{} unregistered", device.info);
        }
    }

    /// Run a native call with an upper bound on how long we wait for it
    ///
    /// A call that overruns keeps running on its helper thread; the device
    /// is reported as failed.
    fn bounded<F>(&self, device: &DeviceInfo, what: &'static str, call: F) -> Result<(), MiddleClickError>
    where
        F: FnOnce(&dyn ContactFrameSource, &DeviceInfo) -> Result<(), MiddleClickError> + Send + 'static,
    {
        let registration_error = |reason: String| MiddleClickError::CallbackRegistration {
            device: device.to_string(),
            reason,
        };

        let (tx, rx) = crossbeam_channel::bounded(1);
        let source = Arc::clone(&self.source);
        let info = device.clone();
        thread::Builder::new()
            .name(format!("middleclick-{}", what))
            .spawn(move || {
                let _ = tx.send(call(source.as_ref(), &info));
            })
            .map_err(|e| registration_error(format!("{}: {}", what, e)))?;

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ MiddleClickError::CallbackRegistration { .. })) => Err(e),
            Ok(Err(e)) => Err(registration_error(format!("{}: {}", what, e))),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(registration_error(format!(
                "{} timed out after {:?}",
                what, self.timeout
            ))),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(registration_error(format!("{} aborted", what)))
            }
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock(slot: &Mutex<GestureSlot>) -> MutexGuard<'_, GestureSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
