use std::collections::BTreeMap;

/// Per-tick event bus with an independent ordered queue per key.
#[derive(Debug)]
pub struct EventBus<K, E> {
    queues: BTreeMap<K, Vec<E>>,
}

impl<K: Ord, E> Default for EventBus<K, E> {
    fn default() -> Self {
        Self {
            queues: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy, E> EventBus<K, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, key: K, event: E) {
        self.queues.entry(key).or_default().push(event);
    }

    /// Drain all events for a specific key, in emission order.
    pub fn drain(&mut self, key: K) -> Vec<E> {
        self.queues.remove(&key).unwrap_or_default()
    }

    /// Drain all events from all queues, sorted by key.
    pub fn drain_all(&mut self) -> Vec<(K, Vec<E>)> {
        std::mem::take(&mut self.queues).into_iter().collect()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(|q| q.is_empty())
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }
}
