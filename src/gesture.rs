//! N-finger middle-click gesture recognition
//!
//! One [`GestureRecognizer`] exists per registered device and only that
//! device's frame stream drives it. The recognizer is a pure state machine
//! over frame timestamps: it never reads the clock and never injects
//! events, it only returns [`Decision`]s.
//!
//! ```text
//! Idle --N fingers together--> Armed --debounce, no drift--> Active
//!   ^                            |                              |
//!   |<---lift / drift / >N ------+                     motion   v
//!   |<----------------- ButtonUp on any lift ------------- Dragging
//! ```

use std::time::Duration;
use tracing::debug;

use crate::config::{GestureConfig, TriggerMode};
use crate::contact::{Contact, DeviceId, Frame, Point};

/// What the synthesizer should do next for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ButtonDown,
    /// Relative pointer motion in pixels
    Move { dx: i32, dy: i32 },
    ButtonUp,
}

/// Externally visible phase of a recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Armed,
    Active,
    Dragging,
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Idle,
    Armed {
        fingers: Vec<u32>,
        anchor_at: Duration,
        anchor: Point,
    },
    Held {
        fingers: Vec<u32>,
        last: Point,
        dragging: bool,
    },
}

/// Per-device gesture state machine
#[derive(Debug)]
pub struct GestureRecognizer {
    device: DeviceId,
    config: GestureConfig,
    state: State,
    /// When each currently active identifier was first seen
    first_seen: Vec<(u32, Duration)>,
    /// Set after a rejected or over-count touch; cleared once every finger lifts
    latched: bool,
    /// Sub-pixel motion not yet emitted
    remainder: (f32, f32),
}

impl GestureRecognizer {
    pub fn new(device: DeviceId, config: GestureConfig) -> Self {
        Self {
            device,
            config,
            state: State::Idle,
            first_seen: Vec::new(),
            latched: false,
            remainder: (0.0, 0.0),
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn phase(&self) -> GesturePhase {
        match &self.state {
            State::Idle => GesturePhase::Idle,
            State::Armed { .. } => GesturePhase::Armed,
            State::Held {
                dragging: false, ..
            } => GesturePhase::Active,
            State::Held { dragging: true, .. } => GesturePhase::Dragging,
        }
    }

    /// True between an emitted `ButtonDown` and its `ButtonUp`
    pub fn is_held(&self) -> bool {
        matches!(self.state, State::Held { .. })
    }

    /// Feed one frame; `enabled` is the current process-wide mode
    pub fn process(&mut self, frame: &Frame, enabled: bool) -> Vec<Decision> {
        let mut out = Vec::new();
        self.track_contacts(frame);

        let active: Vec<&Contact> = frame.active_contacts().collect();
        let count = active.len();
        if count == 0 {
            self.latched = false;
        }

        if !enabled {
            if let Some(up) = self.flush() {
                debug!("{}: mode disabled, releasing", self.device);
                out.push(up);
            }
            return out;
        }

        if count > self.config.finger_count {
            if !self.latched {
                debug!("{}: {} contacts, ignoring touch", self.device, count);
            }
            out.extend(self.release());
            self.state = State::Idle;
            self.latched = true;
            return out;
        }

        match self.state {
            State::Idle => {
                if self.try_arm(frame, &active) {
                    self.step_armed(frame, &active, &mut out);
                }
            }
            State::Armed { .. } => self.step_armed(frame, &active, &mut out),
            State::Held { .. } => self.step_held(&active, &mut out),
        }

        out
    }

    /// Force the gesture back to idle, returning the `ButtonUp` owed if held
    pub fn flush(&mut self) -> Option<Decision> {
        let up = self.release();
        if self.state != State::Idle {
            self.latched = true;
        }
        self.state = State::Idle;
        up
    }

    fn release(&mut self) -> Option<Decision> {
        self.remainder = (0.0, 0.0);
        self.is_held().then_some(Decision::ButtonUp)
    }

    fn track_contacts(&mut self, frame: &Frame) {
        self.first_seen
            .retain(|(id, _)| frame.active_contacts().any(|c| c.id == *id));
        for contact in frame.active_contacts() {
            if !self.first_seen.iter().any(|(id, _)| *id == contact.id) {
                self.first_seen.push((contact.id, frame.timestamp));
            }
        }
    }

    fn try_arm(&mut self, frame: &Frame, active: &[&Contact]) -> bool {
        if self.latched || active.len() != self.config.finger_count {
            return false;
        }

        let (earliest, latest) = self.first_seen.iter().fold(
            (Duration::MAX, Duration::ZERO),
            |(lo, hi), (_, at)| (lo.min(*at), hi.max(*at)),
        );
        if latest.saturating_sub(earliest) > self.config.coalesce_window() {
            return false;
        }

        let anchor = centroid(active);
        if active
            .iter()
            .any(|c| c.position.distance(anchor) > self.config.max_spread)
        {
            debug!("{}: fingers spread too wide", self.device);
            return false;
        }

        debug!("{}: armed with {} fingers", self.device, active.len());
        self.state = State::Armed {
            fingers: finger_ids(active),
            anchor_at: frame.timestamp,
            anchor,
        };
        true
    }

    fn step_armed(&mut self, frame: &Frame, active: &[&Contact], out: &mut Vec<Decision>) {
        let State::Armed {
            fingers,
            anchor_at,
            anchor,
        } = std::mem::replace(&mut self.state, State::Idle)
        else {
            return;
        };
        let elapsed = frame.timestamp.saturating_sub(anchor_at);

        if !same_fingers(&fingers, active) {
            if self.config.trigger == TriggerMode::Tap
                && active.len() < fingers.len()
                && elapsed >= self.config.debounce()
                && elapsed <= self.config.max_tap()
            {
                debug!("{}: tap after {:?}", self.device, elapsed);
                out.push(Decision::ButtonDown);
                out.push(Decision::ButtonUp);
            } else if active.len() >= self.config.finger_count {
                self.latched = true;
            }
            return;
        }

        let centroid = centroid(active);
        if centroid.distance(anchor) > self.config.drift_tolerance {
            debug!("{}: drifted before firing, rejecting", self.device);
            self.latched = true;
            return;
        }

        match self.config.trigger {
            TriggerMode::Hold if elapsed >= self.config.debounce() => {
                debug!("{}: pressing after {:?}", self.device, elapsed);
                out.push(Decision::ButtonDown);
                self.remainder = (0.0, 0.0);
                self.state = State::Held {
                    fingers,
                    last: centroid,
                    dragging: false,
                };
            }
            TriggerMode::Tap if elapsed > self.config.max_tap() => {
                debug!("{}: held too long for a tap", self.device);
                self.latched = true;
            }
            _ => {
                self.state = State::Armed {
                    fingers,
                    anchor_at,
                    anchor,
                };
            }
        }
    }

    fn step_held(&mut self, active: &[&Contact], out: &mut Vec<Decision>) {
        let State::Held {
            fingers,
            last,
            dragging,
        } = std::mem::replace(&mut self.state, State::Idle)
        else {
            return;
        };

        if !same_fingers(&fingers, active) {
            debug!("{}: finger lifted, releasing", self.device);
            out.push(Decision::ButtonUp);
            self.remainder = (0.0, 0.0);
            if active.len() >= self.config.finger_count {
                self.latched = true;
            }
            return;
        }

        let centroid = centroid(active);
        let moved = self.motion(centroid, last, out);
        self.state = State::Held {
            fingers,
            last: centroid,
            dragging: dragging || moved,
        };
    }

    /// Convert centroid travel into whole-pixel moves, carrying the remainder
    fn motion(&mut self, centroid: Point, last: Point, out: &mut Vec<Decision>) -> bool {
        let speed = self.config.pointer_speed;
        let rx = self.remainder.0 + (centroid.x - last.x) * speed;
        let ry = self.remainder.1 + (centroid.y - last.y) * speed;
        let dx = rx.round();
        let dy = ry.round();
        self.remainder = (rx - dx, ry - dy);

        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        out.push(Decision::Move {
            dx: dx as i32,
            dy: dy as i32,
        });
        true
    }
}

fn finger_ids(active: &[&Contact]) -> Vec<u32> {
    let mut ids: Vec<u32> = active.iter().map(|c| c.id).collect();
    ids.sort_unstable();
    ids
}

fn same_fingers(fingers: &[u32], active: &[&Contact]) -> bool {
    active.len() == fingers.len() && finger_ids(active) == fingers
}

fn centroid(active: &[&Contact]) -> Point {
    if active.is_empty() {
        return Point::default();
    }
    let n = active.len() as f32;
    let (sx, sy) = active
        .iter()
        .fold((0.0, 0.0), |(x, y), c| (x + c.position.x, y + c.position.y));
    Point::new(sx / n, sy / n)
}
