//! Delayed device restarts
//!
//! Wake from sleep and hot-plug tend to arrive in bursts. Each event asks
//! for a restart after a short delay; a newer request replaces a pending
//! one so a burst collapses into a single `restart_devices` call.

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::MiddleClickError;

enum Request {
    Schedule(Duration),
    Cancel,
    Shutdown,
}

/// Runs a restart action on its own thread after a debounce delay
pub struct RestartScheduler {
    tx: Sender<Request>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RestartScheduler {
    pub fn new<F>(mut restart: F) -> Result<Self, MiddleClickError>
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = unbounded::<Request>();

        let thread = thread::Builder::new()
            .name("middleclick-restart".to_string())
            .spawn(move || {
                let mut deadline: Option<Instant> = None;
                loop {
                    let request = match deadline {
                        Some(at) => {
                            match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                                Ok(request) => request,
                                Err(RecvTimeoutError::Timeout) => {
                                    deadline = None;
                                    info!("Running scheduled device restart");
                                    restart();
                                    continue;
                                }
                                Err(RecvTimeoutError::Disconnected) => break,
                            }
                        }
                        None => match rx.recv() {
                            Ok(request) => request,
                            Err(_) => break,
                        },
                    };

                    match request {
                        Request::Schedule(delay) => {
                            if deadline.is_some() {
                                debug!("Replacing pending restart");
                            }
                            deadline = Some(Instant::now() + delay);
                        }
                        Request::Cancel => deadline = None,
                        Request::Shutdown => break,
                    }
                }
                debug!("Restart scheduler stopped");
            })
            .map_err(|e| MiddleClickError::Channel(format!("Failed to spawn restart scheduler: {}", e)))?;

        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// Restart after `delay`, replacing any restart still pending
    pub fn schedule(&self, delay: Duration) {
        debug!("Device restart scheduled in {:?}", delay);
        let _ = self.tx.send(Request::Schedule(delay));
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(Request::Cancel);
    }

    /// A handle that can request restarts from other threads
    pub fn trigger(&self) -> RestartTrigger {
        RestartTrigger {
            tx: self.tx.clone(),
        }
    }
}

impl Drop for RestartScheduler {
    fn drop(&mut self) {
        let _ = self.tx.send(Request::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Restart scheduler thread panicked");
            }
        }
    }
}

/// Cloneable request handle, e.g. for device-lost notifications
#[derive(Clone)]
pub struct RestartTrigger {
    tx: Sender<Request>,
}

impl RestartTrigger {
    pub fn schedule(&self, delay: Duration) {
        let _ = self.tx.send(Request::Schedule(delay));
    }
}
