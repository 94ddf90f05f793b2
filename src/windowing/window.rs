use super::container::TupleContainer;
use super::partition::{Partition, PartitionContext, PartitionState};
use super::policies::{
    ContentsPolicy, EvictionCause, EvictionDeterminer, InsertionPolicy, TriggerPolicy,
};
use crate::error::{ProcessorResult, WindowError, WindowResult};
use crate::scheduler::Scheduler;
use dashmap::DashMap;
use parking_lot::{MutexGuard, RwLock};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, trace};

/// Computes the partition key of a tuple.
pub type KeyFunction<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Creates the empty container of a new partition.
pub type ContainerFactory<C> = Arc<dyn Fn() -> C + Send + Sync>;

/// Callback receiving a partition's contents, oldest first, and its key.
pub type PartitionProcessor<T, K> = Arc<dyn Fn(&[T], &K) -> ProcessorResult + Send + Sync>;

pub(crate) struct WindowCore<T, K, C> {
    self_ref: Weak<WindowCore<T, K, C>>,
    partitions: DashMap<K, Arc<Partition<T, K, C>>>,
    insertion_policy: InsertionPolicy<T, K, C>,
    contents_policy: ContentsPolicy<T, K, C>,
    eviction_determiner: EvictionDeterminer<T, K, C>,
    trigger_policy: TriggerPolicy<T, K, C>,
    key_function: KeyFunction<T, K>,
    container_factory: ContainerFactory<C>,
    processors: RwLock<Vec<PartitionProcessor<T, K>>>,
    scheduler: OnceLock<Arc<dyn Scheduler>>,
    requires_scheduler: bool,
}

impl<T, K, C> WindowCore<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    fn partition_for(&self, key: &K) -> Arc<Partition<T, K, C>> {
        if let Some(partition) = self.partitions.get(key) {
            return Arc::clone(partition.value());
        }

        let entry = self.partitions.entry(key.clone()).or_insert_with(|| {
            debug!("Creating partition");
            Arc::new(Partition::new(
                self.self_ref.clone(),
                (self.container_factory)(),
                key.clone(),
            ))
        });
        Arc::clone(entry.value())
    }

    pub(crate) fn new_container(&self) -> C {
        (self.container_factory)()
    }

    pub(crate) fn scheduler(&self) -> Option<Arc<dyn Scheduler>> {
        self.scheduler.get().cloned()
    }

    pub(crate) fn run_processors(&self, tuples: &[T], key: &K) -> WindowResult<()> {
        // Cloned so processors may register further processors.
        let processors = self.processors.read().clone();
        for processor in processors.iter() {
            processor(tuples, key).map_err(WindowError::Processor)?;
        }
        Ok(())
    }

    pub(crate) fn evict_locked(
        &self,
        partition: &mut PartitionContext<'_, T, K, C>,
        cause: EvictionCause,
    ) -> WindowResult<()> {
        (self.eviction_determiner)(partition, cause)
    }

    /// Run `f` with `partition` locked. Returns `None` if the partition was
    /// retired before the lock was acquired.
    pub(crate) fn with_partition<R, F>(&self, partition: &Arc<Partition<T, K, C>>, f: F) -> Option<R>
    where
        F: FnOnce(&mut PartitionContext<'_, T, K, C>) -> R,
    {
        let mut state = partition.lock_state();
        if state.retired {
            return None;
        }
        let result = f(&mut PartitionContext::new(self, partition, &mut state));
        self.release(partition, state);
        Some(result)
    }

    fn insert_locked(
        &self,
        partition: &mut PartitionContext<'_, T, K, C>,
        tuple: T,
    ) -> WindowResult<bool> {
        if !(self.insertion_policy)(partition, &tuple) {
            trace!("Insertion policy rejected tuple");
            return Ok(false);
        }
        (self.contents_policy)(partition, tuple);
        (self.eviction_determiner)(partition, EvictionCause::Insert)?;
        (self.trigger_policy)(partition)?;
        Ok(true)
    }

    // Removal happens before the partition lock is released, so an insert
    // that finds a retired partition can retry and get a fresh one.
    fn release(&self, partition: &Arc<Partition<T, K, C>>, state: MutexGuard<'_, PartitionState<C>>) {
        if state.retired {
            self.partitions
                .remove_if(partition.key(), |_, current| Arc::ptr_eq(current, partition));
            debug!("Retired partition");
        }
        drop(state);
    }
}

/// A partitioned window of tuples.
///
/// Each tuple is routed by the key function to the partition holding all
/// tuples with the same key, and each partition independently maintains the
/// subset of tuples defined by the window's policies. A key function that
/// returns a constant gives an unpartitioned window.
///
/// Partitions are locked individually: inserts for different keys never
/// wait for each other, while inserts, timers and processors for one key
/// are serialized. Processors run synchronously on the inserting thread or
/// the timer thread, with the partition locked, so the slice they receive
/// cannot change under them.
///
/// `Window` is a cheap handle; clones share the same partitions. Dropping
/// the last handle cancels all pending eviction timers.
pub struct Window<T, K, C> {
    core: Arc<WindowCore<T, K, C>>,
}

impl<T, K, C> Clone for Window<T, K, C> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T, K, C> Window<T, K, C>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    C: TupleContainer<T>,
{
    pub(crate) fn from_parts(
        insertion_policy: InsertionPolicy<T, K, C>,
        contents_policy: ContentsPolicy<T, K, C>,
        eviction_determiner: EvictionDeterminer<T, K, C>,
        trigger_policy: TriggerPolicy<T, K, C>,
        key_function: KeyFunction<T, K>,
        container_factory: ContainerFactory<C>,
        requires_scheduler: bool,
    ) -> Self {
        let core = Arc::new_cyclic(|self_ref| WindowCore {
            self_ref: self_ref.clone(),
            partitions: DashMap::new(),
            insertion_policy,
            contents_policy,
            eviction_determiner,
            trigger_policy,
            key_function,
            container_factory,
            processors: RwLock::new(Vec::new()),
            scheduler: OnceLock::new(),
            requires_scheduler,
        });
        Self { core }
    }

    /// Insert a tuple into its partition.
    ///
    /// Runs, with the partition locked: the insertion policy, the contents
    /// policy, the eviction determiner and the trigger policy. Returns
    /// `Ok(false)` when the insertion policy rejected the tuple.
    ///
    /// A failing processor is reported here after the partition has been
    /// left consistent.
    pub fn insert(&self, tuple: T) -> WindowResult<bool> {
        let core = &*self.core;
        if core.requires_scheduler && core.scheduler.get().is_none() {
            return Err(WindowError::SchedulerNotRegistered);
        }

        let key = (core.key_function)(&tuple);
        loop {
            let partition = core.partition_for(&key);
            let mut state = partition.lock_state();
            if state.retired {
                trace!("Partition retired during insert, retrying");
                continue;
            }

            let result = core.insert_locked(
                &mut PartitionContext::new(core, &partition, &mut state),
                tuple,
            );
            core.release(&partition, state);
            return result;
        }
    }

    /// Register a processor invoked whenever the trigger or eviction policy
    /// processes a partition. Processors run in registration order.
    ///
    /// Processors must not lock or insert into the partition that is being
    /// processed.
    pub fn register_partition_processor<F>(&self, processor: F)
    where
        F: Fn(&[T], &K) -> ProcessorResult + Send + Sync + 'static,
    {
        self.core.processors.write().push(Arc::new(processor));
    }

    /// Register the scheduler used by time based policies. Can only be
    /// done once per window.
    pub fn register_scheduler(&self, scheduler: Arc<dyn Scheduler>) -> WindowResult<()> {
        self.core
            .scheduler
            .set(scheduler)
            .map_err(|_| WindowError::SchedulerAlreadyRegistered)
    }

    pub fn scheduler(&self) -> Option<Arc<dyn Scheduler>> {
        self.core.scheduler()
    }

    /// Whether `insert` fails until a scheduler is registered.
    pub fn requires_scheduler(&self) -> bool {
        self.core.requires_scheduler
    }

    /// Key of the partition `tuple` belongs to.
    pub fn key_of(&self, tuple: &T) -> K {
        (self.core.key_function)(tuple)
    }

    /// Snapshot of the current partitions. Lock a partition before reading
    /// its contents.
    pub fn partitions(&self) -> HashMap<K, Arc<Partition<T, K, C>>> {
        self.core
            .partitions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn partition(&self, key: &K) -> Option<Arc<Partition<T, K, C>>> {
        self.core
            .partitions
            .get(key)
            .map(|partition| Arc::clone(partition.value()))
    }

    pub fn partition_count(&self) -> usize {
        self.core.partitions.len()
    }

    pub fn processor_count(&self) -> usize {
        self.core.processors.read().len()
    }
}
