use super::container::{InsertionTimeList, TupleContainer};
use super::policies::{
    self, ContentsPolicy, EvictionDeterminer, InsertionPolicy, TriggerPolicy, validate_duration,
    validate_size,
};
use super::window::Window;
use crate::error::{ProcessorResult, WindowResult};
use crate::scheduler::Scheduler;
use crate::window_definition::WindowDefinition;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Factory for [`Window`] implementations.
pub struct Windows;

impl Windows {
    /// Create a window from explicit policies.
    ///
    /// Custom windows whose policies arm timers need a scheduler registered
    /// before the first insert, otherwise that insert fails.
    pub fn window<T, K, C, KF, CF>(
        insertion_policy: InsertionPolicy<T, K, C>,
        contents_policy: ContentsPolicy<T, K, C>,
        eviction_determiner: EvictionDeterminer<T, K, C>,
        trigger_policy: TriggerPolicy<T, K, C>,
        key_function: KF,
        container_factory: CF,
    ) -> Window<T, K, C>
    where
        T: Send + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        C: TupleContainer<T>,
        KF: Fn(&T) -> K + Send + Sync + 'static,
        CF: Fn() -> C + Send + Sync + 'static,
    {
        Window::from_parts(
            insertion_policy,
            contents_policy,
            eviction_determiner,
            trigger_policy,
            Arc::new(key_function),
            Arc::new(container_factory),
            false,
        )
    }

    /// A window that maintains the last `count` tuples of each partition and
    /// processes the partition on every insert.
    ///
    /// Once a partition holds `count` tuples each insert evicts the oldest
    /// one, so processors always see the `count` most recent tuples,
    /// including the one just inserted.
    pub fn last_n_process_on_insert<T, K, KF>(
        count: usize,
        key_function: KF,
    ) -> WindowResult<Window<T, K, VecDeque<T>>>
    where
        T: Send + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        KF: Fn(&T) -> K + Send + Sync + 'static,
    {
        let count = validate_size(count)?;
        Ok(Self::window(
            policies::always_insert(),
            policies::append(),
            policies::evict_oldest_beyond(count),
            policies::process_on_insert(),
            key_function,
            move || VecDeque::with_capacity(count + 1),
        ))
    }

    /// A window that collects `size` tuples per partition, processes them
    /// as one batch and starts over empty.
    pub fn count_batch<T, K, KF>(size: usize, key_function: KF) -> WindowResult<Window<T, K, Vec<T>>>
    where
        T: Send + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        KF: Fn(&T) -> K + Send + Sync + 'static,
    {
        let size = validate_size(size)?;
        Ok(Self::window(
            policies::always_insert(),
            policies::append(),
            policies::evict_nothing(),
            policies::process_when_full_and_evict(size),
            key_function,
            move || Vec::with_capacity(size),
        ))
    }

    /// A window holding the tuples inserted within the last `span`.
    ///
    /// Partitions are processed after every insert and after every timer
    /// driven eviction, including the one that empties the partition.
    /// Requires [`Window::register_scheduler`] before the first insert.
    pub fn time_sliding<T, K, KF>(
        span: Duration,
        key_function: KF,
    ) -> WindowResult<Window<T, K, InsertionTimeList<T>>>
    where
        T: Send + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        KF: Fn(&T) -> K + Send + Sync + 'static,
    {
        let span = validate_duration(span)?;
        Ok(Window::from_parts(
            policies::always_insert(),
            policies::append(),
            policies::evict_older_with_process(span),
            policies::process_on_insert(),
            Arc::new(key_function),
            Arc::new(InsertionTimeList::<T>::new),
            true,
        ))
    }

    /// A window that processes each partition every `period` with the tuples
    /// inserted since the previous period, then clears it.
    ///
    /// The period of a partition starts with its first insert and keeps
    /// firing, with an empty batch when nothing arrived.
    /// Requires [`Window::register_scheduler`] before the first insert.
    pub fn time_batch<T, K, KF>(period: Duration, key_function: KF) -> WindowResult<Window<T, K, Vec<T>>>
    where
        T: Send + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        KF: Fn(&T) -> K + Send + Sync + 'static,
    {
        let period = validate_duration(period)?;
        Ok(Window::from_parts(
            policies::always_insert(),
            policies::append(),
            policies::evict_all_and_schedule_with_process(period),
            policies::do_nothing(),
            Arc::new(key_function),
            Arc::new(Vec::<T>::new),
            true,
        ))
    }

    /// Build the window described by a parsed window clause.
    pub fn from_definition<T, K, KF>(
        definition: &WindowDefinition,
        key_function: KF,
    ) -> WindowResult<DefinedWindow<T, K>>
    where
        T: Send + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        KF: Fn(&T) -> K + Send + Sync + 'static,
    {
        Ok(match *definition {
            WindowDefinition::LastN { count } => {
                DefinedWindow::LastN(Self::last_n_process_on_insert(count, key_function)?)
            }
            WindowDefinition::CountBatch { size } => {
                DefinedWindow::CountBatch(Self::count_batch(size, key_function)?)
            }
            WindowDefinition::TimeSliding { span } => {
                DefinedWindow::TimeSliding(Self::time_sliding(span, key_function)?)
            }
            WindowDefinition::TimeBatch { period } => {
                DefinedWindow::TimeBatch(Self::time_batch(period, key_function)?)
            }
        })
    }
}

/// Key function placing every tuple in the same partition.
pub fn unpartitioned<T>() -> impl Fn(&T) -> u32 + Clone + Send + Sync + 'static {
    |_: &T| 0u32
}

/// One of the built-in window flavors, as produced by
/// [`Windows::from_definition`].
pub enum DefinedWindow<T, K> {
    LastN(Window<T, K, VecDeque<T>>),
    CountBatch(Window<T, K, Vec<T>>),
    TimeSliding(Window<T, K, InsertionTimeList<T>>),
    TimeBatch(Window<T, K, Vec<T>>),
}

impl<T, K> DefinedWindow<T, K>
where
    T: Send + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn insert(&self, tuple: T) -> WindowResult<bool> {
        match self {
            DefinedWindow::LastN(window) => window.insert(tuple),
            DefinedWindow::CountBatch(window) => window.insert(tuple),
            DefinedWindow::TimeSliding(window) => window.insert(tuple),
            DefinedWindow::TimeBatch(window) => window.insert(tuple),
        }
    }

    pub fn register_partition_processor<F>(&self, processor: F)
    where
        F: Fn(&[T], &K) -> ProcessorResult + Send + Sync + 'static,
    {
        match self {
            DefinedWindow::LastN(window) => window.register_partition_processor(processor),
            DefinedWindow::CountBatch(window) => window.register_partition_processor(processor),
            DefinedWindow::TimeSliding(window) => window.register_partition_processor(processor),
            DefinedWindow::TimeBatch(window) => window.register_partition_processor(processor),
        }
    }

    pub fn register_scheduler(&self, scheduler: Arc<dyn Scheduler>) -> WindowResult<()> {
        match self {
            DefinedWindow::LastN(window) => window.register_scheduler(scheduler),
            DefinedWindow::CountBatch(window) => window.register_scheduler(scheduler),
            DefinedWindow::TimeSliding(window) => window.register_scheduler(scheduler),
            DefinedWindow::TimeBatch(window) => window.register_scheduler(scheduler),
        }
    }

    pub fn requires_scheduler(&self) -> bool {
        match self {
            DefinedWindow::LastN(window) => window.requires_scheduler(),
            DefinedWindow::CountBatch(window) => window.requires_scheduler(),
            DefinedWindow::TimeSliding(window) => window.requires_scheduler(),
            DefinedWindow::TimeBatch(window) => window.requires_scheduler(),
        }
    }

    pub fn partition_count(&self) -> usize {
        match self {
            DefinedWindow::LastN(window) => window.partition_count(),
            DefinedWindow::CountBatch(window) => window.partition_count(),
            DefinedWindow::TimeSliding(window) => window.partition_count(),
            DefinedWindow::TimeBatch(window) => window.partition_count(),
        }
    }

    /// Keys of the current partitions.
    pub fn partition_keys(&self) -> Vec<K> {
        match self {
            DefinedWindow::LastN(window) => window.partitions().into_keys().collect(),
            DefinedWindow::CountBatch(window) => window.partitions().into_keys().collect(),
            DefinedWindow::TimeSliding(window) => window.partitions().into_keys().collect(),
            DefinedWindow::TimeBatch(window) => window.partitions().into_keys().collect(),
        }
    }

    /// Copy of the contents of the partition for `key`, oldest first, read
    /// with the partition locked. `None` when no such partition exists.
    pub fn partition_contents(&self, key: &K) -> Option<Vec<T>>
    where
        T: Clone,
    {
        match self {
            DefinedWindow::LastN(window) => window
                .partition(key)
                .map(|partition| partition.lock().contents().iter().cloned().collect()),
            DefinedWindow::CountBatch(window) => window
                .partition(key)
                .map(|partition| partition.lock().contents().iter().cloned().collect()),
            DefinedWindow::TimeSliding(window) => window
                .partition(key)
                .map(|partition| partition.lock().contents().iter().cloned().collect()),
            DefinedWindow::TimeBatch(window) => window
                .partition(key)
                .map(|partition| partition.lock().contents().iter().cloned().collect()),
        }
    }

    /// Copies of all partition contents, each read with its partition locked.
    pub fn partitions_snapshot(&self) -> HashMap<K, Vec<T>>
    where
        T: Clone,
    {
        self.partition_keys()
            .into_iter()
            .filter_map(|key| {
                let contents = self.partition_contents(&key)?;
                Some((key, contents))
            })
            .collect()
    }
}
