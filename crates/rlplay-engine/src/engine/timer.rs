use std::time::Duration;

/// A single re-arming one-shot timer on a caller-supplied clock.
///
/// Times are offsets from an arbitrary origin chosen by the owner (a manual
/// clock in tests, `Instant::elapsed` in an event loop). The timer never
/// fires on its own: the owner asks for [`Timer::deadline`], waits, and
/// calls [`Timer::fire`].
///
/// Firing disarms the timer. The handler re-arms it only after its own
/// transition is complete, so at most one tick is ever pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Duration>,
}

impl Timer {
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Schedules the next tick `delay` after `now`, replacing any pending one.
    pub fn arm(&mut self, now: Duration, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` when armed and due at `now`.
    #[must_use]
    pub fn is_due(&self, now: Duration) -> bool {
        self.deadline.is_some_and(|at| at <= now)
    }

    /// Takes the pending tick if it is due, returning its scheduled time.
    ///
    /// The scheduled time (not `now`) is what the handler should re-arm from,
    /// so that a late event loop catches up tick by tick without drift.
    pub fn fire(&mut self, now: Duration) -> Option<Duration> {
        if self.is_due(now) {
            self.deadline.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_fire_only_when_due() {
        let mut timer = Timer::new();
        assert_eq!(timer.fire(100 * MS), None);

        timer.arm(Duration::ZERO, 30 * MS);
        assert_eq!(timer.fire(29 * MS), None);
        assert_eq!(timer.fire(45 * MS), Some(30 * MS));
        assert!(!timer.is_armed());
        assert_eq!(timer.fire(45 * MS), None);
    }

    #[test]
    fn test_rearm_replaces_pending_tick() {
        let mut timer = Timer::new();
        timer.arm(Duration::ZERO, 100 * MS);
        timer.arm(10 * MS, 5 * MS);
        assert_eq!(timer.deadline(), Some(15 * MS));
        timer.cancel();
        assert!(!timer.is_due(Duration::MAX));
    }
}
