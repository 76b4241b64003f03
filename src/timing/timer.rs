use std::time::{Duration, Instant};

/// Identifies one armed tick. A token stops being current as soon as the
/// timer is re-armed or cancelled, so a tick that fires late can tell it has
/// been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickToken(u64);

#[derive(Debug, Clone, Copy)]
struct PendingTick {
    token: TickToken,
    due: Instant,
}

/// One-shot, re-armable timer driving the scheduler loop. At most one tick is
/// pending at a time.
#[derive(Debug, Default)]
pub struct TickTimer {
    generation: u64,
    pending: Option<PendingTick>,
}

impl TickTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer to fire `after` from `now`, replacing any pending tick.
    pub fn arm(&mut self, now: Instant, after: Duration) -> TickToken {
        self.generation += 1;
        let token = TickToken(self.generation);
        self.pending = Some(PendingTick {
            token,
            due: now + after,
        });
        token
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
        self.pending = None;
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.map(|p| p.due)
    }

    /// Takes the pending tick if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<TickToken> {
        match self.pending {
            Some(p) if p.due <= now => {
                self.pending = None;
                Some(p.token)
            }
            _ => None,
        }
    }

    pub fn is_current(&self, token: TickToken) -> bool {
        token.0 == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_when_due() {
        let mut timer = TickTimer::new();
        let start = Instant::now();
        let token = timer.arm(start, Duration::from_millis(100));

        assert_eq!(timer.take_due(start), None);
        assert_eq!(timer.take_due(start + Duration::from_millis(100)), Some(token));
        assert!(timer.is_current(token));
        assert!(!timer.is_armed());
        assert_eq!(timer.take_due(start + Duration::from_secs(1)), None);
    }

    #[test]
    fn cancel_invalidates_outstanding_tokens() {
        let mut timer = TickTimer::new();
        let start = Instant::now();
        let token = timer.arm(start, Duration::ZERO);
        timer.cancel();

        assert!(!timer.is_current(token));
        assert_eq!(timer.next_due(), None);
        assert_eq!(timer.take_due(start + Duration::from_secs(1)), None);
    }

    #[test]
    fn rearming_supersedes_the_previous_tick() {
        let mut timer = TickTimer::new();
        let start = Instant::now();
        let first = timer.arm(start, Duration::from_millis(10));
        let second = timer.arm(start, Duration::from_millis(50));

        assert_ne!(first, second);
        assert!(!timer.is_current(first));
        assert_eq!(timer.next_due(), Some(start + Duration::from_millis(50)));
    }
}
