use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

/// State kept independently for each partition key.
///
/// The state for a key is created lazily from the initializer the first
/// time the key is accessed. Operations on one key are atomic with respect
/// to each other, there is no ordering across keys.
pub struct PartitionedState<K, S> {
    initial_state: Arc<dyn Fn() -> S + Send + Sync>,
    states: DashMap<K, S>,
}

impl<K, S> PartitionedState<K, S>
where
    K: Eq + Hash + Clone,
{
    pub fn new<F>(initial_state: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            initial_state: Arc::new(initial_state),
            states: DashMap::new(),
        }
    }

    /// Current state for `key`, creating the initial state if none is held.
    pub fn get_state(&self, key: &K) -> S
    where
        S: Clone,
    {
        self.with_state(key, |state| state.clone())
    }

    /// Run `f` on the state for `key`, creating the initial state if none
    /// is held. Other operations on the same key wait until `f` returns, so
    /// `f` must not access this `PartitionedState` again.
    pub fn with_state<R, F>(&self, key: &K, f: F) -> R
    where
        F: FnOnce(&mut S) -> R,
    {
        if let Some(mut state) = self.states.get_mut(key) {
            return f(state.value_mut());
        }
        let mut state = self
            .states
            .entry(key.clone())
            .or_insert_with(|| (self.initial_state)());
        f(state.value_mut())
    }

    /// Replace the state for `key`, returning the previous state if one was held.
    pub fn set_state(&self, key: K, state: S) -> Option<S> {
        self.states.insert(key, state)
    }

    /// Remove the state for `key`. The next access starts again from the
    /// initial state.
    pub fn remove_state(&self, key: &K) -> Option<S> {
        self.states.remove(key).map(|(_, state)| state)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.states.contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.states.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
