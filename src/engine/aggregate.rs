use crate::windowing::{DefinedWindow, TupleContainer, Window};
use std::hash::Hash;
use std::sync::mpsc;
use std::time::Duration;

/// Output stream of a window.
///
/// Every time the window processes a partition, the mapping function turns
/// the partition contents and key into one value that is sent on a channel.
/// Values are received in the order the window produced them for a given
/// partition.
pub struct Aggregate<U> {
    receiver: mpsc::Receiver<U>,
}

impl<U> Aggregate<U>
where
    U: Send + 'static,
{
    /// Attach to `window` as an additional partition processor.
    pub fn attach<T, K, C, F>(window: &Window<T, K, C>, map: F) -> Self
    where
        T: Send + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        C: TupleContainer<T>,
        F: Fn(&[T], &K) -> U + Send + Sync + 'static,
    {
        let (tx, receiver) = mpsc::channel();
        window.register_partition_processor(move |tuples, key| {
            // A dropped receiver only means nobody listens anymore.
            let _ = tx.send(map(tuples, key));
            Ok(())
        });
        Self { receiver }
    }

    /// Same as [`Aggregate::attach`] for a window built from a clause.
    pub fn attach_defined<T, K, F>(window: &DefinedWindow<T, K>, map: F) -> Self
    where
        T: Send + 'static,
        K: Eq + Hash + Clone + Send + Sync + 'static,
        F: Fn(&[T], &K) -> U + Send + Sync + 'static,
    {
        let (tx, receiver) = mpsc::channel();
        window.register_partition_processor(move |tuples, key| {
            let _ = tx.send(map(tuples, key));
            Ok(())
        });
        Self { receiver }
    }

    pub fn recv(&self) -> Option<U> {
        self.receiver.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<U> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Values produced so far, without blocking.
    pub fn try_iter(&self) -> mpsc::TryIter<'_, U> {
        self.receiver.try_iter()
    }

    pub fn into_receiver(self) -> mpsc::Receiver<U> {
        self.receiver
    }
}
