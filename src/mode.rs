//! Process-wide click synthesis toggle
//!
//! Read on every frame by every device stream, written rarely by the
//! surrounding application. The force-release that must follow a
//! transition to disabled is performed by [`crate::Controller::set_mode`].

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug)]
pub struct ModeController {
    enabled: AtomicBool,
}

impl ModeController {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Store a new value and return the previous one
    pub fn set(&self, enabled: bool) -> bool {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(
                "Click synthesis {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        previous
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_returns_previous_value() {
        let mode = ModeController::new(true);
        assert!(mode.set(false));
        assert!(!mode.is_enabled());
        assert!(!mode.set(false));
        assert!(!mode.set(true));
        assert!(mode.is_enabled());
    }

    #[test]
    fn exactly_one_writer_observes_the_disable_transition() {
        let mode = Arc::new(ModeController::new(true));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mode = Arc::clone(&mode);
                thread::spawn(move || mode.set(false))
            })
            .collect();

        let transitions = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|was_enabled| *was_enabled)
            .count();
        assert_eq!(transitions, 1);
    }
}
