//! middleclick - three-finger tap to middle-click for Linux trackpads
//!
//! Watches every multitouch touchpad and turns an N-finger press into a
//! middle-button press, with drag support while the fingers stay down.

use middleclick::MiddleClickError;

#[cfg(target_os = "linux")]
fn main() -> Result<(), MiddleClickError> {
    daemon::run()
}

#[cfg(not(target_os = "linux"))]
fn main() -> Result<(), MiddleClickError> {
    let _guard = middleclick::logging::init_logging("info", false, None)?;
    tracing::error!("middleclick reads touchpads through evdev and only runs on Linux");
    Err(MiddleClickError::DeviceEnumeration(
        "no contact frame source for this platform".to_string(),
    ))
}

#[cfg(target_os = "linux")]
mod daemon {
    use middleclick::evdev_source::EvdevFrameSource;
    use middleclick::input_simulator::create_injector;
    use middleclick::{logging, Config, Controller, Decision, MiddleClickError, RestartScheduler};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tracing::{debug, error, info, warn};

    /// Parse `[--write-default] [CONFIG]`
    fn load_config() -> Result<(Config, Option<PathBuf>), MiddleClickError> {
        let mut write_default = false;
        let mut path = None;
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--write-default" => write_default = true,
                _ => path = Some(PathBuf::from(arg)),
            }
        }
        let path: PathBuf = path.unwrap_or_else(|| Config::DEFAULT_PATH.into());

        if write_default {
            Config::write_default(&path)?;
            eprintln!("Wrote default configuration to {}", path.display());
        }
        if path.exists() {
            Ok((Config::from_file(&path)?, Some(path)))
        } else {
            Ok((Config::default(), None))
        }
    }

    pub fn run() -> Result<(), MiddleClickError> {
        let (config, loaded_from) = load_config()?;
        let _guard = logging::init_logging(
            &config.logging.level,
            config.logging.json,
            config.logging.directory.clone(),
        )?;

        info!("middleclick starting...");
        match &loaded_from {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => warn!("No {} found, using defaults", Config::DEFAULT_PATH),
        }
        info!(
            "Config: {} fingers, debounce={}ms, trigger={:?}, injector={:?}",
            config.gesture.finger_count,
            config.gesture.debounce_ms,
            config.gesture.trigger,
            config.injector
        );

        // Set up Ctrl+C handler for graceful shutdown
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown signal received");
            running_clone.store(false, Ordering::SeqCst);
        })
        .expect("Failed to set Ctrl+C handler");

        let injector = match create_injector(config.injector) {
            Ok(injector) => injector,
            Err(MiddleClickError::PermissionDenied) => {
                error!("Permission denied. Please add your user to the 'input' group:");
                error!("  sudo usermod -aG input $USER");
                error!("Then logout and login again.");
                return Err(MiddleClickError::PermissionDenied);
            }
            Err(e) => return Err(e),
        };

        let source = Arc::new(EvdevFrameSource::new());
        let controller = Arc::new(Controller::new(source.clone(), injector, &config)?);

        let scheduler = {
            let controller = Arc::clone(&controller);
            RestartScheduler::new(move || {
                let report = controller.restart_devices();
                if !report.failed.is_empty() {
                    warn!("{} device(s) failed to restart", report.failed.len());
                }
            })?
        };
        let trigger = scheduler.trigger();
        let restart_delay = config.device.restart_delay();
        source.on_device_lost(move |device| {
            info!("{} disappeared, restarting devices", device);
            trigger.schedule(restart_delay);
        });

        let report = controller.start();
        if let Some(MiddleClickError::PermissionDenied) = report.enumeration_error {
            error!("Cannot open /dev/input. Add your user to the 'input' group:");
            error!("  sudo usermod -aG input $USER");
        }
        info!("Monitoring {} touchpad(s)", controller.device_count());
        info!("Press Ctrl+C to exit");

        let decisions = controller.subscribe();
        let rescan = config.device.rescan_interval();
        let mut last_scan = Instant::now();

        while running.load(Ordering::SeqCst) {
            match decisions.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => match event.decision {
                    Decision::ButtonDown => info!("{}: middle button down", event.device),
                    Decision::ButtonUp => info!("{}: middle button up", event.device),
                    Decision::Move { dx, dy } => debug!("{}: drag {},{}", event.device, dx, dy),
                },
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    warn!("Event synthesizer disconnected");
                    break;
                }
            }

            if let Some(interval) = rescan {
                if controller.device_count() == 0 && last_scan.elapsed() >= interval {
                    debug!("No touchpads, rescanning");
                    scheduler.schedule(Duration::ZERO);
                    last_scan = Instant::now();
                }
            }
        }

        info!("middleclick shutting down...");
        drop(scheduler);
        controller.stop();
        Ok(())
    }
}
