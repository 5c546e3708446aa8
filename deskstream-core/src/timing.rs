//! Recovery timeout gate

use std::time::{Duration, Instant};

/// Default cooldown after a failed resource acquisition
pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_millis(3000);

/// Restartable one-shot gate rate-limiting retries after a failure
///
/// A timeout that was never started reads as elapsed. Checking it never
/// blocks.
#[derive(Debug, Clone)]
pub struct RecoveryTimeout {
    interval: Duration,
    armed_at: Option<Instant>,
}

impl RecoveryTimeout {
    /// Create a gate with the given cooldown
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            armed_at: None,
        }
    }

    /// Cooldown length
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm the gate starting now
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Arm the gate starting at `now`
    pub fn start_at(&mut self, now: Instant) {
        self.armed_at = Some(now);
    }

    /// Whether the cooldown is over
    pub fn is_elapsed(&mut self) -> bool {
        self.elapsed_at(Instant::now())
    }

    /// Whether the cooldown is over at `now`
    ///
    /// Once elapsed, the gate disarms itself.
    pub fn elapsed_at(&mut self, now: Instant) -> bool {
        match self.armed_at {
            None => true,
            Some(armed) if now.saturating_duration_since(armed) >= self.interval => {
                self.armed_at = None;
                true
            }
            Some(_) => false,
        }
    }

    /// Whether the gate is currently armed
    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }
}

impl Default for RecoveryTimeout {
    fn default() -> Self {
        Self::new(DEFAULT_RECOVERY_INTERVAL)
    }
}
