use super::container::TupleContainer;
use super::policies::EvictionCause;
use super::window::WindowCore;
use crate::error::{WindowError, WindowResult};
use crate::scheduler::{RepeatingTask, ScheduledHandle, Scheduler};
use parking_lot::{Mutex, MutexGuard};
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{error, trace};

/// Mutable state of one partition, only reachable through its lock.
pub(crate) struct PartitionState<C> {
    pub(crate) contents: C,
    timer: Option<ScheduledHandle>,
    // Bumped whenever a timer is armed or cancelled, a firing timer
    // carrying an older value is ignored.
    timer_generation: u64,
    pub(crate) retired: bool,
}

impl<C> PartitionState<C> {
    fn new(contents: C) -> Self {
        Self {
            contents,
            timer: None,
            timer_generation: 0,
            retired: false,
        }
    }

    fn cancel_timer(&mut self) -> u64 {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.timer_generation = self.timer_generation.wrapping_add(1);
        self.timer_generation
    }
}

impl<C> Drop for PartitionState<C> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// The per-key slice of a window: the tuples held for one key plus the
/// bookkeeping of its eviction timer.
///
/// Contents are stable while the partition is locked:
///
/// ```ignore
/// if let Some(partition) = window.partition(&key) {
///     let guard = partition.lock();
///     let snapshot: Vec<_> = guard.contents().iter().cloned().collect();
/// }
/// ```
pub struct Partition<T, K, C> {
    key: K,
    state: Mutex<PartitionState<C>>,
    window: Weak<WindowCore<T, K, C>>,
}

impl<T, K, C> Partition<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    pub(crate) fn new(window: Weak<WindowCore<T, K, C>>, contents: C, key: K) -> Self {
        Self {
            key,
            state: Mutex::new(PartitionState::new(contents)),
            window,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Lock the partition for reading its contents.
    ///
    /// Inserts and timers for this key block until the guard is dropped.
    /// Must not be called from inside a processor of the same window.
    pub fn lock(&self) -> PartitionGuard<'_, C> {
        PartitionGuard {
            state: self.state.lock(),
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PartitionState<C>> {
        self.state.lock()
    }

    /// Invoke the window's processors with the current contents.
    pub fn process(self: &Arc<Self>) -> WindowResult<()> {
        match self.window.upgrade() {
            Some(window) => window
                .with_partition(self, |partition| partition.process())
                .unwrap_or(Ok(())),
            None => Ok(()),
        }
    }

    /// Run the window's eviction determiner as if a timer had fired.
    pub fn evict(self: &Arc<Self>) -> WindowResult<()> {
        match self.window.upgrade() {
            Some(window) => window
                .with_partition(self, |partition| {
                    window.evict_locked(partition, EvictionCause::Scheduled)
                })
                .unwrap_or(Ok(())),
            None => Ok(()),
        }
    }

    fn on_timer(partition: &Weak<Self>, generation: u64, periodic: bool) {
        let Some(partition) = partition.upgrade() else {
            return;
        };
        let Some(window) = partition.window.upgrade() else {
            return;
        };

        let result = window.with_partition(&partition, |context| {
            if context.state.timer_generation != generation {
                trace!("Ignoring superseded eviction timer");
                return Ok(());
            }
            if !periodic {
                context.state.timer = None;
            }
            window.evict_locked(context, EvictionCause::Scheduled)
        });

        if let Some(Err(err)) = result {
            error!("Scheduled eviction failed: {}", err);
        }
    }
}

/// Read access to a locked partition.
pub struct PartitionGuard<'a, C> {
    state: MutexGuard<'a, PartitionState<C>>,
}

impl<C> PartitionGuard<'_, C> {
    pub fn contents(&self) -> &C {
        &self.state.contents
    }

    pub fn has_pending_eviction(&self) -> bool {
        self.state.timer.is_some()
    }

    /// A retired partition has been removed from its window, later tuples
    /// with the same key go to a fresh partition.
    pub fn is_retired(&self) -> bool {
        self.state.retired
    }
}

/// A locked partition as seen by window policies.
pub struct PartitionContext<'a, T, K, C> {
    window: &'a WindowCore<T, K, C>,
    partition: &'a Arc<Partition<T, K, C>>,
    state: &'a mut PartitionState<C>,
}

impl<'a, T, K, C> PartitionContext<'a, T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    pub(crate) fn new(
        window: &'a WindowCore<T, K, C>,
        partition: &'a Arc<Partition<T, K, C>>,
        state: &'a mut PartitionState<C>,
    ) -> Self {
        Self {
            window,
            partition,
            state,
        }
    }

    pub fn key(&self) -> &K {
        &self.partition.key
    }

    /// The partition itself, for policies that arm their own tasks.
    pub fn partition(&self) -> &Arc<Partition<T, K, C>> {
        self.partition
    }

    pub fn contents(&self) -> &C {
        &self.state.contents
    }

    pub fn contents_mut(&mut self) -> &mut C {
        &mut self.state.contents
    }

    pub fn len(&self) -> usize {
        self.state.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.contents.is_empty()
    }

    /// Invoke every registered processor, in registration order, with the
    /// current contents. The first failure stops the remaining processors.
    pub fn process(&mut self) -> WindowResult<()> {
        self.window
            .run_processors(self.state.contents.as_slice(), &self.partition.key)
    }

    /// Swap the contents for an empty container and process the captured
    /// batch. The partition is already empty when the processors run, so a
    /// failing processor cannot leave it half cleared.
    pub fn process_and_clear(&mut self) -> WindowResult<()> {
        let mut batch = std::mem::replace(&mut self.state.contents, self.window.new_container());
        trace!("Processing batch of {} tuples", batch.len());
        self.window
            .run_processors(batch.as_slice(), &self.partition.key)
    }

    pub fn scheduler(&self) -> WindowResult<Arc<dyn Scheduler>> {
        self.window
            .scheduler()
            .ok_or(WindowError::SchedulerNotRegistered)
    }

    pub fn has_pending_eviction(&self) -> bool {
        self.state.timer.is_some()
    }

    /// Arm a one shot eviction after `delay`, replacing any pending timer.
    pub fn schedule_eviction(&mut self, delay: Duration) -> WindowResult<()> {
        let scheduler = self.scheduler()?;
        let generation = self.state.cancel_timer();
        let partition = Arc::downgrade(self.partition);

        let handle = scheduler.schedule(
            delay,
            Box::new(move || Partition::on_timer(&partition, generation, false)),
        )?;
        self.state.timer = Some(handle);
        trace!("Armed eviction timer in {:?}", delay);
        Ok(())
    }

    /// Arm an eviction every `period`, replacing any pending timer.
    pub fn schedule_periodic_eviction(&mut self, period: Duration) -> WindowResult<()> {
        let scheduler = self.scheduler()?;
        let generation = self.state.cancel_timer();
        let partition = Arc::downgrade(self.partition);

        let task: RepeatingTask =
            Arc::new(move || Partition::on_timer(&partition, generation, true));
        let handle = scheduler.schedule_at_fixed_rate(period, period, task)?;
        self.state.timer = Some(handle);
        trace!("Armed periodic eviction every {:?}", period);
        Ok(())
    }

    pub fn cancel_eviction(&mut self) {
        self.state.cancel_timer();
    }

    /// Remove this partition from the window once the current operation
    /// completes. Only an empty partition without a pending timer can be
    /// retired, returns whether it was.
    pub fn retire(&mut self) -> bool {
        if self.state.contents.is_empty() && self.state.timer.is_none() {
            self.state.retired = true;
        }
        self.state.retired
    }
}
