//! Multitouch contact frames from Linux evdev
//!
//! Touchpads are found under `/dev/input` and read with multitouch protocol
//! B: per-slot `ABS_MT_*` updates are accumulated and emitted as one
//! [`Frame`] at each `SYN_REPORT`. Each started device gets a reader thread
//! that polls its non-blocking fd with a short tick so stop stays bounded.

use evdev::{AbsoluteAxisType, BusType, Device, EventType, PropType};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::contact::{Contact, ContactPhase, DeviceId, DeviceInfo, Frame, Point};
use crate::frame_source::{ContactFrameSource, FrameCallback};
use crate::MiddleClickError;

/// Absolute axis codes used by the slot decoder
mod abs {
    pub const MT_SLOT: u16 = 0x2f;
    pub const MT_TOUCH_MAJOR: u16 = 0x30;
    pub const MT_POSITION_X: u16 = 0x35;
    pub const MT_POSITION_Y: u16 = 0x36;
    pub const MT_TRACKING_ID: u16 = 0x39;
    pub const MT_PRESSURE: u16 = 0x3a;
}

const SYN_REPORT: u16 = 0;
const SYN_DROPPED: u16 = 3;

/// Reader wake-up interval while no input arrives
const POLL_TICK_MS: i32 = 50;
const DEFAULT_SLOTS: usize = 10;
const MAX_SLOTS: usize = 32;

static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

type CallbackSlot = Arc<Mutex<Option<FrameCallback>>>;
type LostHook = Arc<dyn Fn(&DeviceInfo) + Send + Sync>;

struct Reader {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

struct Entry {
    path: PathBuf,
    info: DeviceInfo,
    callback: CallbackSlot,
    reader: Option<Reader>,
}

/// [`ContactFrameSource`] backed by `/dev/input/event*` touchpads
#[derive(Default)]
pub struct EvdevFrameSource {
    entries: Mutex<HashMap<DeviceId, Entry>>,
    on_device_lost: Mutex<Option<LostHook>>,
}

impl EvdevFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the reader thread when a device stops answering
    ///
    /// The hook must not block; scheduling a restart is the intended use.
    pub fn on_device_lost<F>(&self, hook: F)
    where
        F: Fn(&DeviceInfo) + Send + Sync + 'static,
    {
        *self
            .on_device_lost
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<DeviceId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callback_slot(&self, device: &DeviceInfo) -> Result<CallbackSlot, MiddleClickError> {
        self.entries()
            .get(&device.id)
            .map(|entry| Arc::clone(&entry.callback))
            .ok_or_else(|| unknown_device(device))
    }
}

impl ContactFrameSource for EvdevFrameSource {
    fn discover_devices(&self) -> Result<Vec<DeviceInfo>, MiddleClickError> {
        let found: Vec<(PathBuf, Device)> = evdev::enumerate().filter(|(_, d)| is_touchpad(d)).collect();
        if found.is_empty() && !can_read_input_dir() {
            return Err(MiddleClickError::PermissionDenied);
        }

        let mut entries = self.entries();
        let mut present = Vec::with_capacity(found.len());
        for (path, device) in found {
            let existing = entries
                .values()
                .find(|entry| entry.path == path)
                .map(|entry| entry.info.id);
            let id = existing.unwrap_or_else(|| DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed)));

            let bus = device.input_id().bus_type();
            let info = DeviceInfo {
                id,
                name: device.name().unwrap_or("unnamed touchpad").to_string(),
                built_in: bus != BusType::BUS_USB && bus != BusType::BUS_BLUETOOTH,
            };
            debug!("Found touchpad {} at {:?} (bus {:?})", info, path, bus);

            entries.entry(id).or_insert_with(|| Entry {
                path,
                info: info.clone(),
                callback: Arc::new(Mutex::new(None)),
                reader: None,
            });
            present.push(info);
        }

        // Forget vanished devices that are no longer being read
        entries.retain(|id, entry| entry.reader.is_some() || present.iter().any(|info| info.id == *id));
        Ok(present)
    }

    fn register_frame_callback(
        &self,
        device: &DeviceInfo,
        callback: FrameCallback,
    ) -> Result<(), MiddleClickError> {
        let slot = self.callback_slot(device)?;
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
        Ok(())
    }

    fn unregister_frame_callback(&self, device: &DeviceInfo) -> Result<(), MiddleClickError> {
        let slot = self.callback_slot(device)?;
        // The reader holds this lock while delivering, so taking it waits
        // for any frame in flight.
        slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }

    fn start_device(&self, device: &DeviceInfo, _mode: i32) -> Result<(), MiddleClickError> {
        let mut entries = self.entries();
        let entry = entries.get_mut(&device.id).ok_or_else(|| unknown_device(device))?;
        if entry.reader.is_some() {
            return Ok(());
        }

        let opened = Device::open(&entry.path).map_err(|e| open_error(device, e))?;
        set_nonblocking(opened.as_raw_fd()).map_err(|e| open_error(device, e))?;
        if let Err(e) = use_monotonic_clock(opened.as_raw_fd()) {
            warn!("{}: keeping realtime event clock: {}", device, e);
        }
        let decoder = SlotDecoder::for_device(device.id, &opened);

        let stop = Arc::new(AtomicBool::new(false));
        let hook = self
            .on_device_lost
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let reader = ReaderLoop {
            device: opened,
            stop: Arc::clone(&stop),
            dispatch: FrameDispatch {
                info: entry.info.clone(),
                decoder,
                callback: Arc::clone(&entry.callback),
                on_lost: hook,
            },
        };
        let thread = thread::Builder::new()
            .name(format!("middleclick-{}", device.id))
            .spawn(move || reader.run())
            .map_err(|e| open_error(device, e))?;

        entry.reader = Some(Reader { stop, thread });
        info!("Reading {} from {:?}", device, entry.path);
        Ok(())
    }

    fn stop_device(&self, device: &DeviceInfo) -> Result<(), MiddleClickError> {
        let reader = self
            .entries()
            .get_mut(&device.id)
            .and_then(|entry| entry.reader.take());
        if let Some(reader) = reader {
            reader.stop.store(true, Ordering::SeqCst);
            if reader.thread.join().is_err() {
                error!("{}: reader thread panicked", device);
            }
            debug!("{} stopped", device);
        }
        Ok(())
    }
}

fn is_touchpad(device: &Device) -> bool {
    let Some(axes) = device.supported_absolute_axes() else {
        return false;
    };
    axes.contains(AbsoluteAxisType::ABS_MT_SLOT)
        && axes.contains(AbsoluteAxisType::ABS_MT_POSITION_X)
        && axes.contains(AbsoluteAxisType::ABS_MT_POSITION_Y)
        && device.properties().contains(PropType::POINTER)
}

/// False when event nodes exist but none can be opened
fn can_read_input_dir() -> bool {
    let Ok(dir) = std::fs::read_dir("/dev/input") else {
        return true;
    };
    let nodes: Vec<PathBuf> = dir
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("event"))
        .map(|e| e.path())
        .collect();
    nodes.is_empty() || nodes.iter().any(|path| std::fs::File::open(path).is_ok())
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn unknown_device(device: &DeviceInfo) -> MiddleClickError {
    MiddleClickError::CallbackRegistration {
        device: device.to_string(),
        reason: "device not discovered".to_string(),
    }
}

fn open_error(device: &DeviceInfo, e: io::Error) -> MiddleClickError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return MiddleClickError::PermissionDenied;
    }
    MiddleClickError::CallbackRegistration {
        device: device.to_string(),
        reason: e.to_string(),
    }
}

struct ReaderLoop {
    device: Device,
    stop: Arc<AtomicBool>,
    dispatch: FrameDispatch,
}

impl ReaderLoop {
    fn run(mut self) {
        debug!("{}: reader started", self.dispatch.info);
        while !self.stop.load(Ordering::SeqCst) {
            match self.wait_readable() {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => return self.dispatch.lost(e),
            }

            let events = match self.device.fetch_events() {
                Ok(events) => events,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return self.dispatch.lost(e),
            };
            let mut frames = Vec::new();
            for event in events {
                let raw = match event.event_type() {
                    EventType::ABSOLUTE => RawEvent::Abs {
                        code: event.code(),
                        value: event.value(),
                    },
                    EventType::SYNCHRONIZATION if event.code() == SYN_REPORT => {
                        RawEvent::SynReport(event_time(event.timestamp()))
                    }
                    EventType::SYNCHRONIZATION if event.code() == SYN_DROPPED => RawEvent::SynDropped,
                    _ => continue,
                };
                frames.extend(self.dispatch.decoder.push(raw));
            }
            self.dispatch.deliver(frames);
        }
        debug!("{}: reader stopped", self.dispatch.info);
    }

    fn wait_readable(&self) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: self.device.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut fd, 1, POLL_TICK_MS) };
        if ready < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(e);
        }
        if fd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device hung up"));
        }
        Ok(ready > 0)
    }
}

/// Decoder state and the consumers of its frames, apart from the fd
struct FrameDispatch {
    info: DeviceInfo,
    decoder: SlotDecoder,
    callback: CallbackSlot,
    on_lost: Option<LostHook>,
}

impl FrameDispatch {
    fn deliver(&self, frames: Vec<Frame>) {
        if frames.is_empty() {
            return;
        }
        let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = callback.as_mut() {
            for frame in frames {
                callback(frame);
            }
        }
    }

    fn lost(&mut self, e: io::Error) {
        warn!("{}: device lost: {}", self.info, e);
        // Lift every contact so a held gesture is released
        let lifted = self.decoder.reset();
        self.deliver(lifted.into_iter().collect());
        if let Some(hook) = &self.on_lost {
            hook(&self.info);
        }
    }
}

/// `EVIOCSCLOCKID`, `_IOW('E', 0xa0, int)`
const EVIOCSCLOCKID: u32 = 0x4004_45a0;

/// Stamp events with `CLOCK_MONOTONIC` so wall-clock steps cannot bend
/// gesture timing
fn use_monotonic_clock(fd: RawFd) -> io::Result<()> {
    let clock: libc::c_int = libc::CLOCK_MONOTONIC;
    if unsafe { libc::ioctl(fd, EVIOCSCLOCKID as _, &clock) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Raw event time as a duration from the clock's origin
fn event_time(at: SystemTime) -> Duration {
    at.duration_since(UNIX_EPOCH).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RawEvent {
    Abs { code: u16, value: i32 },
    SynReport(Duration),
    SynDropped,
}

/// Value range of one absolute axis
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisRange {
    min: i32,
    max: i32,
}

impl AxisRange {
    fn normalize(self, value: i32) -> f32 {
        let span = (self.max - self.min).max(1) as f32;
        ((value - self.min) as f32 / span).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    tracking_id: Option<i32>,
    x: i32,
    y: i32,
    size: i32,
    /// Position and time reported in the previous frame, if any
    last: Option<(Point, Duration)>,
    /// Tracking id that lifted since the previous frame
    lifted: Option<(i32, Point)>,
}

/// Multitouch protocol B state accumulator
#[derive(Debug)]
struct SlotDecoder {
    device: DeviceId,
    x_range: AxisRange,
    y_range: AxisRange,
    slots: Vec<Slot>,
    current: usize,
    frame_index: u64,
    epoch: Option<Duration>,
    last_timestamp: Duration,
    dropping: bool,
}

impl SlotDecoder {
    fn new(device: DeviceId, x_range: AxisRange, y_range: AxisRange, slots: usize) -> Self {
        Self {
            device,
            x_range,
            y_range,
            slots: vec![Slot::default(); slots.clamp(1, MAX_SLOTS)],
            current: 0,
            frame_index: 0,
            epoch: None,
            last_timestamp: Duration::ZERO,
            dropping: false,
        }
    }

    fn for_device(id: DeviceId, device: &Device) -> Self {
        const UNIT: AxisRange = AxisRange { min: 0, max: 1 };
        let state = match device.get_abs_state() {
            Ok(state) => state,
            Err(e) => {
                warn!("{}: no axis info ({}), positions may be off", id, e);
                return Self::new(id, UNIT, UNIT, DEFAULT_SLOTS);
            }
        };
        let range = |code: u16| {
            state.get(code as usize).map_or(UNIT, |info| AxisRange {
                min: info.minimum,
                max: info.maximum,
            })
        };
        let slots = state
            .get(abs::MT_SLOT as usize)
            .map_or(DEFAULT_SLOTS, |info| (info.maximum + 1).max(1) as usize);
        Self::new(id, range(abs::MT_POSITION_X), range(abs::MT_POSITION_Y), slots)
    }

    /// Feed one event, returning a frame on `SYN_REPORT`
    fn push(&mut self, event: RawEvent) -> Option<Frame> {
        match event {
            RawEvent::SynDropped => {
                debug!("{}: events dropped, resynchronizing", self.device);
                self.dropping = true;
                None
            }
            RawEvent::SynReport(at) if self.dropping => {
                // State after a drop is unknown, so treat every finger as lifted
                self.dropping = false;
                self.last_timestamp = self.relative(at);
                self.reset()
            }
            RawEvent::Abs { .. } if self.dropping => None,
            RawEvent::Abs { code, value } => {
                self.apply(code, value);
                None
            }
            RawEvent::SynReport(at) => {
                let timestamp = self.relative(at);
                Some(self.emit(timestamp))
            }
        }
    }

    fn relative(&mut self, at: Duration) -> Duration {
        let epoch = *self.epoch.get_or_insert(at);
        at.saturating_sub(epoch)
    }

    fn apply(&mut self, code: u16, value: i32) {
        if code == abs::MT_SLOT {
            if value >= 0 && (value as usize) < MAX_SLOTS {
                let index = value as usize;
                if index >= self.slots.len() {
                    self.slots.resize(index + 1, Slot::default());
                }
                self.current = index;
            }
            return;
        }

        let x_range = self.x_range;
        let y_range = self.y_range;
        let Some(slot) = self.slots.get_mut(self.current) else {
            return;
        };
        match code {
            abs::MT_TRACKING_ID if value < 0 => {
                if let Some(id) = slot.tracking_id.take() {
                    let at = Point::new(x_range.normalize(slot.x), y_range.normalize(slot.y));
                    slot.lifted = Some((id, at));
                    slot.last = None;
                }
            }
            abs::MT_TRACKING_ID => {
                if let Some(previous) = slot.tracking_id.replace(value) {
                    if previous != value {
                        let at = Point::new(x_range.normalize(slot.x), y_range.normalize(slot.y));
                        slot.lifted = Some((previous, at));
                        slot.last = None;
                    }
                }
            }
            abs::MT_POSITION_X => slot.x = value,
            abs::MT_POSITION_Y => slot.y = value,
            abs::MT_TOUCH_MAJOR => slot.size = value,
            abs::MT_PRESSURE if slot.size == 0 => slot.size = value,
            _ => {}
        }
    }

    fn emit(&mut self, timestamp: Duration) -> Frame {
        let frame_index = self.frame_index;
        self.frame_index += 1;
        self.last_timestamp = timestamp;

        let mut contacts = Vec::new();
        for slot in &mut self.slots {
            if let Some((id, position)) = slot.lifted.take() {
                contacts.push(Contact {
                    id: id as u32,
                    position,
                    velocity: Point::default(),
                    size: 0.0,
                    phase: ContactPhase::LiftOff,
                    frame_index,
                    timestamp,
                });
            }

            let Some(id) = slot.tracking_id else {
                continue;
            };
            let position = Point::new(self.x_range.normalize(slot.x), self.y_range.normalize(slot.y));
            let (phase, velocity) = match slot.last {
                None => (ContactPhase::Down, Point::default()),
                Some((last, _)) if last == position => (ContactPhase::Stationary, Point::default()),
                Some((last, at)) => {
                    let dt = timestamp.saturating_sub(at).as_secs_f32();
                    let velocity = if dt > 0.0 {
                        Point::new((position.x - last.x) / dt, (position.y - last.y) / dt)
                    } else {
                        Point::default()
                    };
                    (ContactPhase::Moving, velocity)
                }
            };
            slot.last = Some((position, timestamp));

            contacts.push(Contact {
                id: id as u32,
                position,
                velocity,
                size: slot.size as f32,
                phase,
                frame_index,
                timestamp,
            });
        }

        Frame {
            device: self.device,
            timestamp,
            frame_index,
            contacts,
        }
    }

    /// Lift every tracked contact; `None` if nothing was down
    fn reset(&mut self) -> Option<Frame> {
        let mut any = false;
        for slot in &mut self.slots {
            if let Some(id) = slot.tracking_id.take() {
                let at = Point::new(self.x_range.normalize(slot.x), self.y_range.normalize(slot.y));
                slot.lifted = Some((id, at));
                slot.last = None;
                any = true;
            }
        }
        any.then(|| self.emit(self.last_timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: AxisRange = AxisRange { min: 0, max: 1000 };

    fn decoder() -> SlotDecoder {
        SlotDecoder::new(DeviceId(3), RANGE, RANGE, 5)
    }

    fn abs(code: u16, value: i32) -> RawEvent {
        RawEvent::Abs { code, value }
    }

    fn syn(ms: u64) -> RawEvent {
        RawEvent::SynReport(Duration::from_millis(1_000 + ms))
    }

    fn touch(d: &mut SlotDecoder, slot: i32, id: i32, x: i32, y: i32) {
        for event in [
            abs(abs::MT_SLOT, slot),
            abs(abs::MT_TRACKING_ID, id),
            abs(abs::MT_POSITION_X, x),
            abs(abs::MT_POSITION_Y, y),
        ] {
            assert!(d.push(event).is_none());
        }
    }

    fn phases(frame: &Frame) -> Vec<(u32, ContactPhase)> {
        frame.contacts.iter().map(|c| (c.id, c.phase)).collect()
    }

    #[test]
    fn three_fingers_down_in_one_report() {
        let mut d = decoder();
        touch(&mut d, 0, 10, 100, 500);
        touch(&mut d, 1, 11, 500, 500);
        touch(&mut d, 2, 12, 900, 500);

        let frame = d.push(syn(0)).unwrap();
        assert_eq!(frame.device, DeviceId(3));
        assert_eq!(frame.timestamp, Duration::ZERO);
        assert_eq!(frame.active_count(), 3);
        assert_eq!(
            phases(&frame),
            vec![
                (10, ContactPhase::Down),
                (11, ContactPhase::Down),
                (12, ContactPhase::Down)
            ]
        );
        assert_eq!(frame.contacts[1].position, Point::new(0.5, 0.5));
    }

    #[test]
    fn motion_and_lift_off() {
        let mut d = decoder();
        touch(&mut d, 0, 10, 100, 100);
        touch(&mut d, 1, 11, 200, 100);
        d.push(syn(0));

        d.push(abs(abs::MT_SLOT, 0));
        d.push(abs(abs::MT_POSITION_X, 110));
        let frame = d.push(syn(10)).unwrap();
        assert_eq!(
            phases(&frame),
            vec![(10, ContactPhase::Moving), (11, ContactPhase::Stationary)]
        );
        assert_eq!(frame.timestamp, Duration::from_millis(10));
        assert!((frame.contacts[0].velocity.x - 1.0).abs() < 1e-3);

        d.push(abs(abs::MT_SLOT, 1));
        d.push(abs(abs::MT_TRACKING_ID, -1));
        let frame = d.push(syn(20)).unwrap();
        assert_eq!(
            phases(&frame),
            vec![(10, ContactPhase::Stationary), (11, ContactPhase::LiftOff)]
        );
        assert_eq!(frame.active_count(), 1);

        // lift-off is reported for one frame only
        let frame = d.push(syn(30)).unwrap();
        assert_eq!(phases(&frame), vec![(10, ContactPhase::Stationary)]);
    }

    #[test]
    fn reused_slot_with_new_tracking_id_lifts_old_contact() {
        let mut d = decoder();
        touch(&mut d, 0, 10, 100, 100);
        d.push(syn(0));

        d.push(abs(abs::MT_TRACKING_ID, 14));
        let frame = d.push(syn(5)).unwrap();
        assert_eq!(
            phases(&frame),
            vec![(10, ContactPhase::LiftOff), (14, ContactPhase::Down)]
        );
    }

    #[test]
    fn dropped_events_lift_everything() {
        let mut d = decoder();
        touch(&mut d, 0, 10, 100, 100);
        touch(&mut d, 1, 11, 200, 100);
        d.push(syn(0));

        assert!(d.push(RawEvent::SynDropped).is_none());
        assert!(d.push(abs(abs::MT_POSITION_X, 999)).is_none());
        let frame = d.push(syn(40)).unwrap();
        assert_eq!(frame.active_count(), 0);
        assert_eq!(frame.contacts.len(), 2);

        let frame = d.push(syn(50)).unwrap();
        assert!(frame.contacts.is_empty());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut d = decoder();
        touch(&mut d, 0, 1, -50, 1500);
        let frame = d.push(syn(0)).unwrap();
        assert_eq!(frame.contacts[0].position, Point::new(0.0, 1.0));
    }

    #[test]
    fn reset_without_contacts_is_silent() {
        let mut d = decoder();
        assert!(d.reset().is_none());
    }

    #[test]
    fn frame_indices_increase() {
        let mut d = decoder();
        let a = d.push(syn(0)).unwrap();
        let b = d.push(syn(8)).unwrap();
        assert_eq!((a.frame_index, b.frame_index), (0, 1));
    }

    #[test]
    fn lost_device_lifts_contacts_before_hook_runs() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let callback: FrameCallback = {
            let seen = Arc::clone(&seen);
            Box::new(move |frame: Frame| {
                seen.lock().unwrap().push(format!("frame {}", frame.active_count()));
            })
        };
        let hook: LostHook = {
            let seen = Arc::clone(&seen);
            Arc::new(move |info: &DeviceInfo| seen.lock().unwrap().push(format!("lost {}", info.id)))
        };
        let mut dispatch = FrameDispatch {
            info: DeviceInfo {
                id: DeviceId(3),
                name: "pad".to_string(),
                built_in: true,
            },
            decoder: decoder(),
            callback: Arc::new(Mutex::new(Some(callback))),
            on_lost: Some(hook),
        };

        touch(&mut dispatch.decoder, 0, 10, 100, 100);
        touch(&mut dispatch.decoder, 1, 11, 200, 100);
        touch(&mut dispatch.decoder, 2, 12, 300, 100);
        let down = dispatch.decoder.push(syn(0));
        dispatch.deliver(down.into_iter().collect());

        dispatch.lost(io::Error::new(io::ErrorKind::NotConnected, "gone"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["frame 3", "frame 0", "lost dev#3"]
        );
    }

    #[test]
    fn lost_device_without_callback_still_reports() {
        let lost = Arc::new(AtomicU32::new(0));
        let hook: LostHook = {
            let lost = Arc::clone(&lost);
            Arc::new(move |_: &DeviceInfo| {
                lost.fetch_add(1, Ordering::SeqCst);
            })
        };
        let mut dispatch = FrameDispatch {
            info: DeviceInfo {
                id: DeviceId(3),
                name: "pad".to_string(),
                built_in: false,
            },
            decoder: decoder(),
            callback: Arc::new(Mutex::new(None)),
            on_lost: Some(hook),
        };
        touch(&mut dispatch.decoder, 0, 10, 100, 100);
        dispatch.decoder.push(syn(0));

        dispatch.lost(io::Error::new(io::ErrorKind::NotConnected, "gone"));
        assert_eq!(lost.load(Ordering::SeqCst), 1);
        assert!(dispatch.decoder.reset().is_none());
    }

    #[test]
    fn clock_ioctl_matches_kernel_encoding() {
        // _IOC(_IOC_WRITE, 'E', 0xa0, sizeof(int))
        let write = 1u32 << 30;
        let size = (std::mem::size_of::<libc::c_int>() as u32) << 16;
        assert_eq!(EVIOCSCLOCKID, write | size | (u32::from(b'E') << 8) | 0xa0);
    }
}
