//! Common window policies.
//!
//! A window is configured by four independent policies, each a shared
//! function value invoked with the partition locked:
//!
//! - insertion: decides whether a tuple enters its partition
//! - contents: merges an accepted tuple into the partition contents
//! - eviction: removes tuples, on insert or when a scheduled timer fires
//! - trigger: decides when the registered processors see the contents
//!
//! Closures can be turned into policies with [`insertion`], [`contents`],
//! [`eviction`] and [`trigger`].

use super::container::{InsertionTimeList, TupleContainer};
use super::partition::PartitionContext;
use crate::error::{WindowError, WindowResult};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Why an eviction determiner is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionCause {
    /// Right after a tuple was merged into the partition.
    Insert,
    /// A timer armed through the partition fired, or eviction was requested
    /// through [`super::Partition::evict`].
    Scheduled,
}

pub type InsertionPolicy<T, K, C> =
    Arc<dyn Fn(&PartitionContext<'_, T, K, C>, &T) -> bool + Send + Sync>;

pub type ContentsPolicy<T, K, C> = Arc<dyn Fn(&mut PartitionContext<'_, T, K, C>, T) + Send + Sync>;

pub type EvictionDeterminer<T, K, C> =
    Arc<dyn Fn(&mut PartitionContext<'_, T, K, C>, EvictionCause) -> WindowResult<()> + Send + Sync>;

pub type TriggerPolicy<T, K, C> =
    Arc<dyn Fn(&mut PartitionContext<'_, T, K, C>) -> WindowResult<()> + Send + Sync>;

pub fn insertion<T, K, C, F>(policy: F) -> InsertionPolicy<T, K, C>
where
    F: Fn(&PartitionContext<'_, T, K, C>, &T) -> bool + Send + Sync + 'static,
{
    Arc::new(policy)
}

pub fn contents<T, K, C, F>(policy: F) -> ContentsPolicy<T, K, C>
where
    F: Fn(&mut PartitionContext<'_, T, K, C>, T) + Send + Sync + 'static,
{
    Arc::new(policy)
}

pub fn eviction<T, K, C, F>(policy: F) -> EvictionDeterminer<T, K, C>
where
    F: Fn(&mut PartitionContext<'_, T, K, C>, EvictionCause) -> WindowResult<()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(policy)
}

pub fn trigger<T, K, C, F>(policy: F) -> TriggerPolicy<T, K, C>
where
    F: Fn(&mut PartitionContext<'_, T, K, C>) -> WindowResult<()> + Send + Sync + 'static,
{
    Arc::new(policy)
}

/// Insertion policy that accepts every tuple.
pub fn always_insert<T, K, C>() -> InsertionPolicy<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    insertion(|_, _| true)
}

/// Contents policy that appends the tuple as the newest element.
pub fn append<T, K, C>() -> ContentsPolicy<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    contents(|partition: &mut PartitionContext<'_, T, K, C>, tuple: T| {
        partition.contents_mut().push(tuple)
    })
}

/// Eviction determiner that never removes anything.
pub fn evict_nothing<T, K, C>() -> EvictionDeterminer<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    eviction(|_, _| Ok(()))
}

/// Eviction determiner keeping at most `count` tuples, dropping the oldest.
pub fn evict_oldest_beyond<T, K, C>(count: usize) -> EvictionDeterminer<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    eviction(move |partition: &mut PartitionContext<'_, T, K, C>, _| {
        let contents: &mut C = partition.contents_mut();
        while contents.len() > count {
            contents.pop_front();
        }
        Ok(())
    })
}

/// Time based sliding eviction.
///
/// The first insert into a partition without a pending timer arms one for
/// `span`. When it fires every tuple held for `span` or longer is evicted,
/// the partition is processed even if that leaves it empty, and the timer
/// is rearmed for the next oldest tuple. An emptied partition is retired.
pub fn evict_older_with_process<T, K>(
    span: Duration,
) -> EvictionDeterminer<T, K, InsertionTimeList<T>>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    eviction(
        move |partition: &mut PartitionContext<'_, T, K, InsertionTimeList<T>>,
              cause: EvictionCause| match cause {
            EvictionCause::Insert => {
                if !partition.has_pending_eviction() {
                    partition.schedule_eviction(span)?;
                }
                Ok(())
            }
            EvictionCause::Scheduled => {
                let evicted = partition.contents_mut().evict_older_than(span);
                trace!("Evicted {} expired tuples", evicted);

                // Rearm first so a failing processor cannot strand the remaining tuples.
                if let Some(delay) = partition.contents().next_evict_delay(span) {
                    partition.schedule_eviction(delay)?;
                }
                // An emptied partition retires even when a processor fails.
                let processed = partition.process();
                partition.retire();
                processed
            }
        },
    )
}

/// Time based batch eviction.
///
/// The first insert arms a fixed rate timer with `period`. Every time it
/// fires the partition is processed with whatever accumulated since the
/// last period, possibly nothing, and then cleared.
pub fn evict_all_and_schedule_with_process<T, K, C>(
    period: Duration,
) -> EvictionDeterminer<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    eviction(move |partition: &mut PartitionContext<'_, T, K, C>, cause: EvictionCause| match cause {
        EvictionCause::Insert => {
            if !partition.has_pending_eviction() {
                partition.schedule_periodic_eviction(period)?;
            }
            Ok(())
        }
        EvictionCause::Scheduled => partition.process_and_clear(),
    })
}

/// Trigger policy that processes the partition after every insert.
pub fn process_on_insert<T, K, C>() -> TriggerPolicy<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    trigger(|partition: &mut PartitionContext<'_, T, K, C>| partition.process())
}

/// Trigger policy that processes the partition once it holds `size` tuples
/// and then empties it.
pub fn process_when_full_and_evict<T, K, C>(size: usize) -> TriggerPolicy<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    trigger(move |partition: &mut PartitionContext<'_, T, K, C>| {
        if partition.len() >= size {
            partition.process_and_clear()
        } else {
            Ok(())
        }
    })
}

/// Trigger policy that does nothing, processing is left to the eviction
/// determiner.
pub fn do_nothing<T, K, C>() -> TriggerPolicy<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    trigger(|_| Ok(()))
}

pub(crate) fn validate_size(size: usize) -> WindowResult<usize> {
    if size == 0 {
        return Err(WindowError::InvalidSize { size });
    }
    Ok(size)
}

pub(crate) fn validate_duration(duration: Duration) -> WindowResult<Duration> {
    if duration.is_zero() {
        return Err(WindowError::InvalidDuration { duration });
    }
    Ok(duration)
}
