//! Contact and frame types shared by sources and the recognizer

use std::fmt;
use std::time::Duration;

/// Process-lifetime identity of a contact-sensing device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev#{}", self.0)
    }
}

/// A discovered contact-sensing device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    /// Built into the machine (as opposed to USB/Bluetooth)
    pub built_in: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.id, self.name)
    }
}

/// Normalized 2D point or vector; x and y in [0,1], y grows downward
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Touch phase of a contact in one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    /// First frame this identifier is seen
    Down,
    Moving,
    Stationary,
    /// Finger left the surface; reported for a single frame
    LiftOff,
}

/// One finger's state in one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub id: u32,
    pub position: Point,
    /// Normalized units per second
    pub velocity: Point,
    pub size: f32,
    pub phase: ContactPhase,
    pub frame_index: u64,
    pub timestamp: Duration,
}

impl Contact {
    pub fn is_active(&self) -> bool {
        self.phase != ContactPhase::LiftOff
    }
}

/// All contacts on one device at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub device: DeviceId,
    /// Monotonic time since the source's epoch
    pub timestamp: Duration,
    pub frame_index: u64,
    pub contacts: Vec<Contact>,
}

impl Frame {
    pub fn active_contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().filter(|c| c.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_contacts().count()
    }
}
