//! Delayed and periodic task execution used by time based window policies.

use crate::error::SchedulerError;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// A task that runs once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A task that runs on every period of a fixed rate schedule.
pub type RepeatingTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// Facility that runs tasks after a delay or on a fixed period.
///
/// A window holds one scheduler shared by all of its partitions' timers.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> Result<ScheduledHandle, SchedulerError>;

    /// Run `task` after `initial_delay` and then every `period` until the
    /// returned handle is cancelled. Executions of one task never overlap.
    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<ScheduledHandle, SchedulerError>;
}

/// Handle to a scheduled task. Cancelling is idempotent and prevents
/// any execution that has not started yet.
#[derive(Debug, Clone, Default)]
pub struct ScheduledHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

enum Job {
    Once(Task),
    Repeating { task: RepeatingTask, period: Duration },
}

struct Entry {
    deadline: Instant,
    seq: u64,
    handle: ScheduledHandle,
    job: Job,
}

// BinaryHeap is a max-heap, order so the earliest deadline is on top.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
}

impl Queue {
    fn push(&mut self, deadline: Instant, handle: ScheduledHandle, job: Job) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Entry {
            deadline,
            seq,
            handle,
            job,
        });
    }
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

/// A pool of timer threads running tasks in deadline order.
///
/// Fixed rate tasks are rescheduled from their previous deadline, so a late
/// execution does not shift the following ones. Dropping the pool discards
/// pending tasks and joins the workers.
pub struct ScheduledThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ScheduledThreadPool {
    /// Start a pool with `threads` workers (at least one).
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            available: Condvar::new(),
        });

        let threads = threads.max(1);
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let shared = shared.clone();
            let worker = thread::Builder::new()
                .name(format!("window-timer-{}", i))
                .spawn(move || run_worker(shared))?;
            workers.push(worker);
        }
        debug!("Started scheduled thread pool with {} workers", threads);

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Number of tasks waiting to run, including cancelled ones not yet discarded.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    /// Stop accepting tasks, discard pending ones and wait for the workers.
    pub fn shutdown(&self) {
        let discarded = {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            std::mem::take(&mut queue.heap)
        };
        self.shared.available.notify_all();
        drop(discarded);

        let current = thread::current().id();
        for worker in self.workers.lock().drain(..) {
            // A task dropping the last reference to the pool runs on a worker.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!("Timer worker terminated abnormally");
            }
        }
        debug!("Scheduled thread pool shut down");
    }

    fn submit(&self, delay: Duration, job: Job) -> Result<ScheduledHandle, SchedulerError> {
        let handle = ScheduledHandle::new();
        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return Err(SchedulerError::Shutdown);
            }
            match Instant::now().checked_add(delay) {
                Some(deadline) => queue.push(deadline, handle.clone(), job),
                // Past the range of the clock, the task can never become due.
                None => {
                    trace!("Dropping task with unreachable delay {:?}", delay);
                    return Ok(handle);
                }
            }
        }
        self.shared.available.notify_one();
        Ok(handle)
    }
}

impl Scheduler for ScheduledThreadPool {
    fn schedule(&self, delay: Duration, task: Task) -> Result<ScheduledHandle, SchedulerError> {
        trace!("Scheduling task in {:?}", delay);
        self.submit(delay, Job::Once(task))
    }

    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<ScheduledHandle, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::InvalidPeriod { period });
        }
        trace!(
            "Scheduling fixed rate task in {:?} every {:?}",
            initial_delay, period
        );
        self.submit(initial_delay, Job::Repeating { task, period })
    }
}

impl Drop for ScheduledThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: Arc<Shared>) {
    let mut queue = shared.queue.lock();
    loop {
        if queue.shutdown {
            return;
        }

        let head = queue
            .heap
            .peek()
            .map(|entry| (entry.deadline, entry.handle.is_cancelled()));

        match head {
            None => shared.available.wait(&mut queue),
            Some((_, true)) => {
                queue.heap.pop();
            }
            Some((deadline, false)) if deadline > Instant::now() => {
                shared.available.wait_until(&mut queue, deadline);
            }
            Some(_) => {
                if let Some(entry) = queue.heap.pop() {
                    run_entry(&shared, &mut queue, entry);
                }
            }
        }
    }
}

fn run_entry(shared: &Shared, queue: &mut MutexGuard<'_, Queue>, entry: Entry) {
    let Entry {
        deadline,
        handle,
        job,
        ..
    } = entry;

    match job {
        Job::Once(task) => {
            MutexGuard::unlocked(queue, || run_guarded(task));
        }
        Job::Repeating { task, period } => {
            let run = task.clone();
            MutexGuard::unlocked(queue, || run_guarded(move || run()));
            if queue.shutdown || handle.is_cancelled() {
                return;
            }
            if let Some(next) = deadline.checked_add(period) {
                queue.push(next, handle, Job::Repeating { task, period });
                // Another worker may be sleeping on a later deadline.
                shared.available.notify_one();
            }
        }
    }
}

fn run_guarded<F: FnOnce()>(task: F) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("Scheduled task panicked");
    }
}
