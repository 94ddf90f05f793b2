use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Ordered storage for the tuples of one partition.
///
/// Containers are only touched while the owning partition is locked.
/// `as_slice` takes `&mut self` so ring buffers can be made contiguous
/// before the contents are handed to processors.
pub trait TupleContainer<T>: Send + 'static {
    /// Append a tuple at the back (newest position).
    fn push(&mut self, tuple: T);

    /// Remove the oldest tuple.
    fn pop_front(&mut self) -> Option<T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Contents oldest first.
    fn as_slice(&mut self) -> &[T];
}

impl<T: Send + 'static> TupleContainer<T> for VecDeque<T> {
    fn push(&mut self, tuple: T) {
        self.push_back(tuple);
    }

    fn pop_front(&mut self) -> Option<T> {
        VecDeque::pop_front(self)
    }

    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn clear(&mut self) {
        VecDeque::clear(self);
    }

    fn as_slice(&mut self) -> &[T] {
        self.make_contiguous()
    }
}

impl<T: Send + 'static> TupleContainer<T> for Vec<T> {
    fn push(&mut self, tuple: T) {
        Vec::push(self, tuple);
    }

    fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            None
        } else {
            Some(self.remove(0))
        }
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn as_slice(&mut self) -> &[T] {
        self
    }
}

/// A container that records the insertion time of each tuple.
///
/// Time based eviction compares these instants against the clock, so no
/// timestamp has to be carried in the tuple itself.
#[derive(Debug, Clone)]
pub struct InsertionTimeList<T> {
    tuples: VecDeque<T>,
    times: VecDeque<Instant>,
}

impl<T> InsertionTimeList<T> {
    pub fn new() -> Self {
        Self {
            tuples: VecDeque::new(),
            times: VecDeque::new(),
        }
    }

    /// Append a tuple stamped with `inserted_at`.
    ///
    /// Stamps must be non-decreasing, eviction only looks at the front.
    pub fn push_at(&mut self, tuple: T, inserted_at: Instant) {
        self.tuples.push_back(tuple);
        self.times.push_back(inserted_at);
    }

    /// Evict every tuple that has been held for at least `span`.
    /// Returns the number of tuples removed.
    pub fn evict_older_than(&mut self, span: Duration) -> usize {
        self.evict_older_than_at(span, Instant::now())
    }

    pub fn evict_older_than_at(&mut self, span: Duration, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some(&inserted_at) = self.times.front() {
            // A span past the range of the clock never expires.
            if inserted_at.checked_add(span).is_none_or(|expiry| expiry > now) {
                break;
            }
            self.tuples.pop_front();
            self.times.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Delay until the oldest tuple reaches `span`, `None` when empty.
    /// `Duration::MAX` when that moment is past the range of the clock.
    pub fn next_evict_delay(&self, span: Duration) -> Option<Duration> {
        self.next_evict_delay_at(span, Instant::now())
    }

    pub fn next_evict_delay_at(&self, span: Duration, now: Instant) -> Option<Duration> {
        self.times
            .front()
            .map(|&inserted_at| match inserted_at.checked_add(span) {
                Some(expiry) => expiry.saturating_duration_since(now),
                None => Duration::MAX,
            })
    }

    pub fn oldest_insertion_time(&self) -> Option<Instant> {
        self.times.front().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.tuples.iter()
    }

    /// Tuples paired with their insertion time, oldest first.
    pub fn iter_timed(&self) -> impl Iterator<Item = (&T, Instant)> {
        self.tuples.iter().zip(self.times.iter().copied())
    }
}

impl<T> Default for InsertionTimeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TupleContainer<T> for InsertionTimeList<T> {
    fn push(&mut self, tuple: T) {
        self.push_at(tuple, Instant::now());
    }

    fn pop_front(&mut self) -> Option<T> {
        self.times.pop_front();
        self.tuples.pop_front()
    }

    fn len(&self) -> usize {
        self.tuples.len()
    }

    fn clear(&mut self) {
        self.tuples.clear();
        self.times.clear();
    }

    fn as_slice(&mut self) -> &[T] {
        self.tuples.make_contiguous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_deque_container() {
        let mut container: VecDeque<i32> = VecDeque::new();
        for i in 0..5 {
            TupleContainer::push(&mut container, i);
        }
        assert_eq!(TupleContainer::pop_front(&mut container), Some(0));
        TupleContainer::push(&mut container, 5);
        assert_eq!(container.as_slice(), &[1, 2, 3, 4, 5]);

        TupleContainer::clear(&mut container);
        assert!(TupleContainer::is_empty(&container));
        assert_eq!(TupleContainer::pop_front(&mut container), None);
    }

    #[test]
    fn test_vec_container_pop_front() {
        let mut container = vec![1, 2, 3];
        assert_eq!(TupleContainer::pop_front(&mut container), Some(1));
        assert_eq!(TupleContainer::len(&container), 2);
        assert_eq!(TupleContainer::as_slice(&mut container), &[2, 3]);
    }

    #[test]
    fn test_insertion_time_list_eviction() {
        let base = Instant::now();
        let mut list = InsertionTimeList::new();
        list.push_at("a", base);
        list.push_at("b", base + Duration::from_millis(400));
        list.push_at("c", base + Duration::from_millis(900));

        let span = Duration::from_secs(1);
        assert_eq!(list.evict_older_than_at(span, base + Duration::from_millis(999)), 0);
        // A tuple exactly `span` old is evicted.
        assert_eq!(list.evict_older_than_at(span, base + Duration::from_secs(1)), 1);
        assert_eq!(list.as_slice(), &["b", "c"]);

        assert_eq!(
            list.next_evict_delay_at(span, base + Duration::from_secs(1)),
            Some(Duration::from_millis(400))
        );
        assert_eq!(
            list.next_evict_delay_at(span, base + Duration::from_secs(5)),
            Some(Duration::ZERO)
        );

        assert_eq!(list.evict_older_than_at(span, base + Duration::from_secs(5)), 2);
        assert!(list.is_empty());
        assert_eq!(list.next_evict_delay(span), None);
    }

    #[test]
    fn test_insertion_time_list_unbounded_span() {
        let base = Instant::now();
        let mut list = InsertionTimeList::new();
        list.push_at(1, base);

        let later = base + Duration::from_secs(3600);
        assert_eq!(list.evict_older_than_at(Duration::MAX, later), 0);
        assert_eq!(list.next_evict_delay_at(Duration::MAX, later), Some(Duration::MAX));
        assert_eq!(TupleContainer::len(&list), 1);
    }

    #[test]
    fn test_insertion_time_list_keeps_times_aligned() {
        let base = Instant::now();
        let mut list = InsertionTimeList::new();
        list.push_at(1, base);
        list.push_at(2, base + Duration::from_millis(10));

        assert_eq!(TupleContainer::pop_front(&mut list), Some(1));
        assert_eq!(
            list.oldest_insertion_time(),
            Some(base + Duration::from_millis(10))
        );
        let timed: Vec<_> = list.iter_timed().map(|(t, _)| *t).collect();
        assert_eq!(timed, vec![2]);
    }
}
