use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default minimum spacing between throttled progress notifications.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(200);

/// Coalesces high-frequency progress notifications.
///
/// At most one notification passes per interval; the rest are dropped.
pub struct ProgressThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Returns `true` if a notification may be sent now, and records it.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        match *last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Forgets the last notification so the next one passes.
    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

/// Whether going from `previous` to `current` percent crosses a `step` boundary.
pub fn crossed_step(previous: u8, current: u8, step: u8) -> bool {
    let step = step.max(1);
    current / step > previous / step
}
