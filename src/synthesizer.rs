//! Event synthesis
//!
//! Decisions from every device stream are queued to a single thread that
//! owns the [`InputInjector`]. The queue preserves per-device FIFO order.
//!
//! The host has one middle button, so the synthesizer tracks which devices
//! currently hold it: the native press is sent when the first holder
//! appears and the native release when the last one leaves.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::contact::DeviceId;
use crate::gesture::Decision;
use crate::input_simulator::InputInjector;
use crate::MiddleClickError;

/// A decision as seen by diagnostic subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionEvent {
    pub device: DeviceId,
    pub decision: Decision,
    pub at: Instant,
}

/// Applies decisions to an injector, guarding the button state
pub struct EventSynthesizer<I> {
    injector: I,
    holders: BTreeSet<DeviceId>,
    strict: bool,
}

impl<I: InputInjector> EventSynthesizer<I> {
    /// Invariant violations panic in debug builds and are suppressed in release
    pub fn new(injector: I) -> Self {
        Self {
            injector,
            holders: BTreeSet::new(),
            strict: cfg!(debug_assertions),
        }
    }

    pub fn with_strict_invariants(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_button_down(&self) -> bool {
        !self.holders.is_empty()
    }

    /// Inject the native event for one decision
    ///
    /// Bookkeeping is updated before the injector runs, so a failed release
    /// never leaves the button believed to be down.
    pub fn apply(&mut self, device: DeviceId, decision: Decision) -> Result<(), MiddleClickError> {
        match decision {
            Decision::ButtonDown => {
                if !self.holders.insert(device) {
                    return self.violation(format!("{} pressed while already holding", device));
                }
                if self.holders.len() > 1 {
                    debug!("{}: button already down for another device", device);
                    return Ok(());
                }
                self.injector.button_down()
            }
            Decision::ButtonUp => {
                if !self.holders.remove(&device) {
                    return self.violation(format!("{} released without a press", device));
                }
                if !self.holders.is_empty() {
                    debug!("{}: button still held by another device", device);
                    return Ok(());
                }
                self.injector.button_up()
            }
            Decision::Move { dx, dy } => {
                if !self.holders.contains(&device) {
                    return self.violation(format!("{} moved without holding", device));
                }
                self.injector.move_relative(dx, dy)
            }
        }
    }

    /// Release the native button if any device still holds it
    pub fn release_all(&mut self) -> Result<(), MiddleClickError> {
        if self.holders.is_empty() {
            return Ok(());
        }
        warn!("Releasing middle button held by {:?}", self.holders);
        self.holders.clear();
        self.injector.button_up()
    }

    fn violation(&self, message: String) -> Result<(), MiddleClickError> {
        if self.strict {
            panic!("gesture invariant violated: {}", message);
        }
        warn!("Suppressed decision: {}", message);
        Err(MiddleClickError::InvariantViolation(message))
    }
}

pub(crate) enum Command {
    Decide(DeviceId, Decision),
    Sync(Sender<()>),
    Shutdown,
}

type Subscribers = Arc<Mutex<Vec<Sender<DecisionEvent>>>>;

/// Cloneable producer end used by device callbacks
#[derive(Clone)]
pub struct DecisionSink {
    tx: Sender<Command>,
}

impl DecisionSink {
    /// A sink whose commands are read directly instead of by a thread
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, Receiver<Command>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    pub fn submit(&self, device: DeviceId, decision: Decision) {
        if self.tx.send(Command::Decide(device, decision)).is_err() {
            warn!("{}: synthesizer stopped, dropping {:?}", device, decision);
        }
    }
}

/// Owns the synthesizer thread
pub struct SynthesizerHandle {
    tx: Sender<Command>,
    subscribers: Subscribers,
    thread: Option<thread::JoinHandle<()>>,
}

impl SynthesizerHandle {
    pub fn spawn<I: InputInjector>(mut synth: EventSynthesizer<I>) -> Result<Self, MiddleClickError> {
        let (tx, rx) = unbounded::<Command>();
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let published = Arc::clone(&subscribers);

        let thread = thread::Builder::new()
            .name("middleclick-synth".to_string())
            .spawn(move || {
                info!("Event synthesizer started");
                let mut pending: Option<Command> = None;
                while let Some(command) = pending.take().or_else(|| rx.recv().ok()) {
                    let command = match command {
                        Command::Decide(device, Decision::Move { dx, dy }) => {
                            let (merged, next) = coalesce_moves(device, dx, dy, &rx);
                            pending = next;
                            Command::Decide(device, merged)
                        }
                        other => other,
                    };
                    match command {
                        Command::Decide(device, decision) => {
                            match synth.apply(device, decision) {
                                Ok(()) | Err(MiddleClickError::InvariantViolation(_)) => {}
                                Err(e) => error!("{}: {}", device, e),
                            }
                            publish(&published, device, decision);
                        }
                        Command::Sync(ack) => {
                            let _ = ack.send(());
                        }
                        Command::Shutdown => break,
                    }
                }
                if let Err(e) = synth.release_all() {
                    error!("Failed to release middle button on shutdown: {}", e);
                }
                info!("Event synthesizer stopped");
            })
            .map_err(|e| MiddleClickError::Channel(format!("Failed to spawn synthesizer: {}", e)))?;

        Ok(Self {
            tx,
            subscribers,
            thread: Some(thread),
        })
    }

    pub fn sink(&self) -> DecisionSink {
        DecisionSink {
            tx: self.tx.clone(),
        }
    }

    /// Receive every decision after it has been applied
    pub fn subscribe(&self) -> Receiver<DecisionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Wait until every decision queued before this call has been applied
    pub fn sync(&self, timeout: Duration) -> Result<(), MiddleClickError> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(Command::Sync(ack_tx))
            .map_err(|_| MiddleClickError::Channel("synthesizer stopped".to_string()))?;
        ack_rx
            .recv_timeout(timeout)
            .map_err(|e| MiddleClickError::Channel(format!("synthesizer sync: {}", e)))
    }
}

impl Drop for SynthesizerHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Synthesizer thread panicked");
            }
        }
    }
}

/// Fold moves from `device` already waiting in the queue into one
///
/// Each injected move may cost a process spawn, so a backlog is drained as
/// a single motion. The first command that cannot be merged is handed back.
fn coalesce_moves(device: DeviceId, dx: i32, dy: i32, rx: &Receiver<Command>) -> (Decision, Option<Command>) {
    let (mut dx, mut dy) = (dx, dy);
    while let Ok(next) = rx.try_recv() {
        match next {
            Command::Decide(from, Decision::Move { dx: x, dy: y }) if from == device => {
                dx = dx.saturating_add(x);
                dy = dy.saturating_add(y);
            }
            other => return (Decision::Move { dx, dy }, Some(other)),
        }
    }
    (Decision::Move { dx, dy }, None)
}

fn publish(subscribers: &Subscribers, device: DeviceId, decision: Decision) {
    let event = DecisionEvent {
        device,
        decision,
        at: Instant::now(),
    };
    subscribers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|tx| tx.send(event).is_ok());
}
