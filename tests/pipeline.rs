//! End-to-end tests: scripted frames in, injected pointer events out

use middleclick::{
    Config, Contact, ContactFrameSource, ContactPhase, Controller, Decision, DeviceId, DeviceInfo,
    Frame, FrameCallback, InputInjector, MiddleClickError, Point,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injected {
    Down,
    Up,
    Move(i32, i32),
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Injected>>>,
}

impl Recorder {
    fn take(&self) -> Vec<Injected> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl InputInjector for Recorder {
    fn button_down(&mut self) -> Result<(), MiddleClickError> {
        self.events.lock().unwrap().push(Injected::Down);
        Ok(())
    }

    fn button_up(&mut self) -> Result<(), MiddleClickError> {
        self.events.lock().unwrap().push(Injected::Up);
        Ok(())
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), MiddleClickError> {
        self.events.lock().unwrap().push(Injected::Move(dx, dy));
        Ok(())
    }
}

/// Delivers frames synchronously from the test thread
#[derive(Default)]
struct ScriptedSource {
    devices: Mutex<Vec<DeviceInfo>>,
    callbacks: Mutex<HashMap<DeviceId, FrameCallback>>,
    stopped: Mutex<Vec<DeviceId>>,
}

impl ScriptedSource {
    fn new(ids: &[u32]) -> Arc<Self> {
        let source = Self::default();
        source.set_devices(ids);
        Arc::new(source)
    }

    fn set_devices(&self, ids: &[u32]) {
        *self.devices.lock().unwrap() = ids
            .iter()
            .map(|&id| DeviceInfo {
                id: DeviceId(id),
                name: format!("trackpad {}", id),
                built_in: id == 1,
            })
            .collect();
    }

    fn deliver(&self, frame: Frame) {
        if let Some(callback) = self.callbacks.lock().unwrap().get_mut(&frame.device) {
            callback(frame);
        }
    }
}

impl ContactFrameSource for ScriptedSource {
    fn discover_devices(&self) -> Result<Vec<DeviceInfo>, MiddleClickError> {
        Ok(self.devices.lock().unwrap().clone())
    }

    fn register_frame_callback(
        &self,
        device: &DeviceInfo,
        callback: FrameCallback,
    ) -> Result<(), MiddleClickError> {
        self.callbacks.lock().unwrap().insert(device.id, callback);
        Ok(())
    }

    fn unregister_frame_callback(&self, device: &DeviceInfo) -> Result<(), MiddleClickError> {
        self.callbacks.lock().unwrap().remove(&device.id);
        Ok(())
    }

    fn start_device(&self, _device: &DeviceInfo, _mode: i32) -> Result<(), MiddleClickError> {
        Ok(())
    }

    fn stop_device(&self, device: &DeviceInfo) -> Result<(), MiddleClickError> {
        self.stopped.lock().unwrap().push(device.id);
        Ok(())
    }
}

struct Rig {
    source: Arc<ScriptedSource>,
    recorder: Recorder,
    controller: Controller,
}

impl Rig {
    fn new(ids: &[u32]) -> Self {
        Self::with_config(ids, Config::default())
    }

    fn with_config(ids: &[u32], config: Config) -> Self {
        let source = ScriptedSource::new(ids);
        let recorder = Recorder::default();
        let controller = Controller::new(source.clone(), recorder.clone(), &config).unwrap();
        controller.start();
        Self {
            source,
            recorder,
            controller,
        }
    }

    /// `fingers` contacts with ids 1..=fingers, shifted right by `dx`
    fn touch(&self, device: u32, ms: u64, fingers: u32, dx: f32) {
        let timestamp = Duration::from_millis(ms);
        let contacts = (1..=fingers)
            .map(|id| Contact {
                id,
                position: Point::new(0.3 + id as f32 * 0.05 + dx, 0.5),
                velocity: Point::default(),
                size: 1.0,
                phase: ContactPhase::Stationary,
                frame_index: ms,
                timestamp,
            })
            .collect();
        self.source.deliver(Frame {
            device: DeviceId(device),
            timestamp,
            frame_index: ms,
            contacts,
        });
    }

    fn injected(&self) -> Vec<Injected> {
        self.controller.sync(Duration::from_secs(2)).unwrap();
        self.recorder.take()
    }
}

#[test]
fn hold_drag_release() {
    let rig = Rig::new(&[1]);
    rig.touch(1, 0, 3, 0.0);
    rig.touch(1, 10, 3, 0.0);
    assert!(rig.injected().is_empty());

    rig.touch(1, 40, 3, 0.0);
    for step in 1..=3 {
        rig.touch(1, 40 + step * 10, 3, step as f32 * 0.01);
    }
    rig.touch(1, 90, 2, 0.03);

    // queued moves may reach the injector merged
    let injected = rig.injected();
    assert_eq!(injected.first(), Some(&Injected::Down));
    assert_eq!(injected.last(), Some(&Injected::Up));
    let moves: Vec<(i32, i32)> = injected
        .iter()
        .filter_map(|e| match e {
            Injected::Move(dx, dy) => Some((*dx, *dy)),
            _ => None,
        })
        .collect();
    assert!(!moves.is_empty() && moves.len() <= 3);
    assert_eq!(moves.iter().fold((0, 0), |(x, y), (dx, dy)| (x + dx, y + dy)), (45, 0));
    assert_eq!(injected.len(), moves.len() + 2);
}

#[test]
fn touch_shorter_than_debounce_injects_nothing() {
    let rig = Rig::new(&[1]);
    rig.touch(1, 0, 3, 0.0);
    rig.touch(1, 10, 3, 0.0);
    rig.touch(1, 20, 3, 0.0);
    rig.touch(1, 25, 0, 0.0);
    assert!(rig.injected().is_empty());
}

#[test]
fn four_fingers_never_click() {
    let rig = Rig::new(&[1]);
    for ms in (0..600).step_by(10) {
        rig.touch(1, ms, 4, 0.0);
    }
    // dropping to three without lifting everything does not arm either
    for ms in (600..700).step_by(10) {
        rig.touch(1, ms, 3, 0.0);
    }
    assert!(rig.injected().is_empty());
}

#[test]
fn disabling_mode_releases_held_button() {
    let rig = Rig::new(&[1]);
    rig.touch(1, 0, 3, 0.0);
    rig.touch(1, 40, 3, 0.0);
    assert_eq!(rig.injected(), vec![Injected::Down]);

    rig.controller.set_mode(false);
    assert!(!rig.controller.get_mode());
    assert_eq!(rig.injected(), vec![Injected::Up]);

    // fingers still down, mode back on: nothing until they lift
    rig.controller.set_mode(true);
    rig.touch(1, 60, 3, 0.0);
    rig.touch(1, 120, 3, 0.0);
    assert!(rig.injected().is_empty());

    rig.touch(1, 130, 0, 0.0);
    rig.touch(1, 200, 3, 0.0);
    rig.touch(1, 240, 3, 0.0);
    assert_eq!(rig.injected(), vec![Injected::Down]);
}

#[test]
fn frames_while_disabled_produce_nothing() {
    let rig = Rig::with_config(&[1], Config::default().with_enabled(false));
    assert!(!rig.controller.get_mode());
    for ms in (0..200).step_by(10) {
        rig.touch(1, ms, 3, 0.0);
    }
    assert!(rig.injected().is_empty());
}

#[test]
fn restart_releases_then_rediscovers() {
    let rig = Rig::new(&[1]);
    let decisions = rig.controller.subscribe();
    rig.touch(1, 0, 3, 0.0);
    rig.touch(1, 40, 3, 0.0);

    rig.source.set_devices(&[2, 3]);
    let report = rig.controller.restart_devices();
    assert_eq!(report.registered.len(), 2);
    assert_eq!(rig.controller.device_count(), 2);
    assert_eq!(*rig.source.stopped.lock().unwrap(), vec![DeviceId(1)]);
    assert_eq!(rig.injected(), vec![Injected::Down, Injected::Up]);

    let seen: Vec<_> = decisions.try_iter().map(|e| (e.device, e.decision)).collect();
    assert_eq!(
        seen,
        vec![
            (DeviceId(1), Decision::ButtonDown),
            (DeviceId(1), Decision::ButtonUp)
        ]
    );

    // new devices start idle
    rig.touch(2, 100, 3, 0.0);
    assert!(rig.injected().is_empty());
    rig.touch(2, 140, 3, 0.0);
    assert_eq!(rig.injected(), vec![Injected::Down]);
}

#[test]
fn devices_have_independent_streams() {
    let rig = Rig::new(&[1, 2]);
    let decisions = rig.controller.subscribe();

    for ms in (0..=60).step_by(10) {
        rig.touch(1, ms, 3, ms as f32 * 0.001);
        rig.touch(2, ms, 2, 0.0);
    }
    // a third finger joining within the coalescing window still arms
    rig.touch(2, 70, 3, 0.0);
    rig.touch(1, 70, 0, 0.0);
    rig.touch(2, 110, 3, 0.0);
    rig.touch(2, 120, 0, 0.0);
    rig.controller.sync(Duration::from_secs(2)).unwrap();

    let all: Vec<_> = decisions.try_iter().collect();
    let first: Vec<Decision> = all
        .iter()
        .filter(|e| e.device == DeviceId(1))
        .map(|e| e.decision)
        .filter(|d| !matches!(d, Decision::Move { .. }))
        .collect();
    let second: Vec<Decision> = all
        .iter()
        .filter(|e| e.device == DeviceId(2))
        .map(|e| e.decision)
        .collect();

    assert_eq!(first, vec![Decision::ButtonDown, Decision::ButtonUp]);
    assert_eq!(second, vec![Decision::ButtonDown, Decision::ButtonUp]);
}

#[test]
fn overlapping_holds_share_one_native_press() {
    let rig = Rig::new(&[1, 2]);
    rig.touch(1, 0, 3, 0.0);
    rig.touch(1, 40, 3, 0.0);
    rig.touch(2, 0, 3, 0.0);
    rig.touch(2, 40, 3, 0.0);
    rig.touch(1, 50, 0, 0.0);
    assert_eq!(rig.injected(), vec![Injected::Down]);

    rig.touch(2, 50, 0, 0.0);
    assert_eq!(rig.injected(), vec![Injected::Up]);
}

#[test]
fn button_state_alternates_over_noisy_input() {
    let rig = Rig::new(&[1, 2]);
    let decisions = rig.controller.subscribe();

    // xorshift keeps the script deterministic
    let mut seed: u32 = 0x9e37_79b9;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        seed
    };
    for step in 0..2_000u64 {
        let device = 1 + next() % 2;
        let fingers = next() % 5;
        let drift = (next() % 100) as f32 * 0.0005;
        rig.touch(device, step * 7, fingers, drift);
        if step == 1_000 {
            rig.controller.set_mode(false);
            rig.controller.set_mode(true);
        }
    }
    rig.controller.stop();
    rig.controller.sync(Duration::from_secs(2)).unwrap();

    let mut held: HashMap<DeviceId, bool> = HashMap::new();
    for event in decisions.try_iter() {
        let down = held.entry(event.device).or_default();
        match event.decision {
            Decision::ButtonDown => {
                assert!(!*down, "{} pressed twice", event.device);
                *down = true;
            }
            Decision::ButtonUp => {
                assert!(*down, "{} released without press", event.device);
                *down = false;
            }
            Decision::Move { .. } => assert!(*down, "{} moved while up", event.device),
        }
    }
    assert!(held.values().all(|down| !down), "button left held");

    let mut native_down = false;
    for event in rig.recorder.take() {
        match event {
            Injected::Down => {
                assert!(!native_down);
                native_down = true;
            }
            Injected::Up => {
                assert!(native_down);
                native_down = false;
            }
            Injected::Move(..) => assert!(native_down),
        }
    }
    assert!(!native_down);
}

#[test]
fn stop_releases_and_detaches() {
    let rig = Rig::new(&[1]);
    rig.touch(1, 0, 3, 0.0);
    rig.touch(1, 40, 3, 0.0);
    rig.controller.stop();
    assert_eq!(rig.controller.device_count(), 0);
    assert_eq!(rig.injected(), vec![Injected::Down, Injected::Up]);

    rig.touch(1, 80, 0, 0.0);
    assert!(rig.injected().is_empty());
}

#[test]
fn invalid_config_is_rejected() {
    let source = ScriptedSource::new(&[1]);
    let mut config = Config::default();
    config.gesture.finger_count = 0;
    assert!(matches!(
        Controller::new(source, Recorder::default(), &config),
        Err(MiddleClickError::Config(_))
    ));
}
