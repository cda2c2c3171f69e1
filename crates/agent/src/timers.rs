use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Every timer the session runtime arms, keyed by purpose. Purposes are
/// mutually exclusive by construction: arming a purpose replaces its previous
/// deadline, and phase transitions clear the whole table in one call, so a
/// timer can never survive the transition that invalidated it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    Debounce,
    Watchdog,
    TypingSuppression,
}

impl TimerPurpose {
    /// Tie-break order when two deadlines coincide.
    fn priority(self) -> u8 {
        match self {
            Self::Debounce => 0,
            Self::TypingSuppression => 1,
            Self::Watchdog => 2,
        }
    }
}

#[derive(Debug, Default)]
pub struct TimerTable {
    deadlines: HashMap<TimerPurpose, Instant>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) a purpose; the previous deadline, if any, is
    /// replaced.
    pub fn arm(&mut self, purpose: TimerPurpose, after: Duration) {
        self.deadlines.insert(purpose, Instant::now() + after);
    }

    pub fn clear(&mut self, purpose: TimerPurpose) -> bool {
        self.deadlines.remove(&purpose).is_some()
    }

    pub fn clear_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_armed(&self, purpose: TimerPurpose) -> bool {
        self.deadlines.contains_key(&purpose)
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// The next timer due, if any. Deterministic under equal deadlines.
    pub fn next_due(&self) -> Option<(TimerPurpose, Instant)> {
        self.deadlines
            .iter()
            .min_by_key(|(purpose, deadline)| (**deadline, purpose.priority()))
            .map(|(purpose, deadline)| (*purpose, *deadline))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{TimerPurpose, TimerTable};

    #[tokio::test(start_paused = true)]
    async fn arming_replaces_previous_deadline() {
        let mut timers = TimerTable::new();
        timers.arm(TimerPurpose::Debounce, Duration::from_secs(2));
        let first = timers.next_due().expect("armed").1;

        timers.arm(TimerPurpose::Debounce, Duration::from_secs(5));
        let second = timers.next_due().expect("re-armed").1;

        assert!(second > first);
    }

    #[tokio::test(start_paused = true)]
    async fn next_due_returns_earliest_purpose() {
        let mut timers = TimerTable::new();
        timers.arm(TimerPurpose::Watchdog, Duration::from_secs(15));
        timers.arm(TimerPurpose::Debounce, Duration::from_secs(2));

        let (purpose, _) = timers.next_due().expect("two timers armed");
        assert_eq!(purpose, TimerPurpose::Debounce);
    }

    #[tokio::test(start_paused = true)]
    async fn equal_deadlines_break_ties_deterministically() {
        let mut timers = TimerTable::new();
        timers.arm(TimerPurpose::Watchdog, Duration::from_secs(3));
        timers.arm(TimerPurpose::TypingSuppression, Duration::from_secs(3));

        let (purpose, _) = timers.next_due().expect("two timers armed");
        assert_eq!(purpose, TimerPurpose::TypingSuppression);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_all_leaves_nothing_armed() {
        let mut timers = TimerTable::new();
        timers.arm(TimerPurpose::Debounce, Duration::from_secs(2));
        timers.arm(TimerPurpose::Watchdog, Duration::from_secs(15));
        timers.arm(TimerPurpose::TypingSuppression, Duration::from_secs(20));

        timers.clear_all();

        assert!(timers.is_empty());
        assert!(timers.next_due().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_reports_whether_a_timer_was_armed() {
        let mut timers = TimerTable::new();
        timers.arm(TimerPurpose::Debounce, Duration::from_secs(2));

        assert!(timers.clear(TimerPurpose::Debounce));
        assert!(!timers.clear(TimerPurpose::Debounce));
    }
}
