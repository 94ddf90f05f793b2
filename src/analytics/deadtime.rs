use crate::windowing::PartitionedState;
use parking_lot::RwLock;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::trace;

/// Per-key dead-time filter.
///
/// The first tuple of a key passes, after which the key is suppressed for
/// `period`. Changing the period shortens or extends the dead time of every
/// key currently suppressed. A zero period passes everything.
pub struct Deadtime<K> {
    period: RwLock<Duration>,
    last_pass: PartitionedState<K, Option<Instant>>,
}

impl<K> Deadtime<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(period: Duration) -> Self {
        Self {
            period: RwLock::new(period),
            last_pass: PartitionedState::new(|| None),
        }
    }

    pub fn period(&self) -> Duration {
        *self.period.read()
    }

    pub fn set_period(&self, period: Duration) {
        *self.period.write() = period;
    }

    /// Whether a tuple for `key` passes now.
    pub fn test(&self, key: &K) -> bool {
        self.test_at(key, Instant::now())
    }

    /// Whether a tuple for `key` passes at `now`. A pass starts a new dead
    /// time for the key.
    pub fn test_at(&self, key: &K, now: Instant) -> bool {
        let period = self.period();
        self.last_pass.with_state(key, |last_pass| {
            let suppressed = match *last_pass {
                Some(passed) => passed.checked_add(period).is_none_or(|until| now < until),
                None => false,
            };
            if suppressed {
                trace!("Key suppressed by dead time");
                return false;
            }
            *last_pass = Some(now);
            true
        })
    }

    /// Forget `key`, so its next tuple passes.
    pub fn reset(&self, key: &K) {
        self.last_pass.remove_state(key);
    }

    /// When `key` passes again, `None` if it is not suppressed.
    pub fn next_pass(&self, key: &K) -> Option<Instant> {
        if !self.last_pass.contains_key(key) {
            return None;
        }
        let next = self.last_pass.get_state(key)?.checked_add(self.period())?;
        (next > Instant::now()).then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tuple_passes_then_suppressed() {
        let deadtime = Deadtime::new(Duration::from_secs(10));
        let start = Instant::now();

        assert!(deadtime.test_at(&"a", start));
        assert!(!deadtime.test_at(&"a", start + Duration::from_secs(1)));
        assert!(!deadtime.test_at(&"a", start + Duration::from_millis(9_999)));
        assert!(deadtime.test_at(&"a", start + Duration::from_secs(10)));
        assert!(!deadtime.test_at(&"a", start + Duration::from_secs(11)));
    }

    #[test]
    fn test_keys_are_independent() {
        let deadtime = Deadtime::new(Duration::from_secs(5));
        let start = Instant::now();

        assert!(deadtime.test_at(&1, start));
        assert!(deadtime.test_at(&2, start + Duration::from_secs(1)));
        assert!(!deadtime.test_at(&1, start + Duration::from_secs(2)));
        assert!(!deadtime.test_at(&2, start + Duration::from_secs(2)));
        assert!(deadtime.test_at(&1, start + Duration::from_secs(5)));
        assert!(!deadtime.test_at(&2, start + Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_period_passes_everything() {
        let deadtime = Deadtime::new(Duration::ZERO);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(deadtime.test_at(&"k", now));
        }
    }

    #[test]
    fn test_set_period_adjusts_active_dead_time() {
        let deadtime = Deadtime::new(Duration::from_secs(60));
        let start = Instant::now();

        assert!(deadtime.test_at(&"a", start));
        assert!(!deadtime.test_at(&"a", start + Duration::from_secs(2)));

        deadtime.set_period(Duration::from_secs(1));
        assert_eq!(deadtime.period(), Duration::from_secs(1));
        assert!(deadtime.test_at(&"a", start + Duration::from_secs(2)));

        deadtime.set_period(Duration::from_secs(30));
        assert!(!deadtime.test_at(&"a", start + Duration::from_secs(20)));
    }

    #[test]
    fn test_reset_and_next_pass() {
        let deadtime = Deadtime::new(Duration::from_secs(3600));
        assert_eq!(deadtime.next_pass(&"a"), None);

        assert!(deadtime.test(&"a"));
        assert!(deadtime.next_pass(&"a").is_some());
        assert!(!deadtime.test(&"a"));

        deadtime.reset(&"a");
        assert_eq!(deadtime.next_pass(&"a"), None);
        assert!(deadtime.test(&"a"));
    }
}
