//! Fixed-capacity fingerprint-addressed slot table shared by the shader and
//! pipeline caches.
//!
//! Policy, deliberately naive and load-bearing for compatibility: a matching
//! fingerprint is overwritten in place, a free slot is appended, and a full
//! table always evicts slot 0. This is NOT an LRU; dependents rely on the
//! predictable victim.

pub(crate) struct SlotTable<T> {
    capacity: usize,
    entries: Vec<(u64, T)>,
}

impl<T> SlotTable<T> {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, fingerprint: u64) -> Option<&T> {
        self.entries
            .iter()
            .find(|(fp, _)| *fp == fingerprint)
            .map(|(_, v)| v)
    }

    /// Insert under the overwrite / append / evict-slot-0 policy.
    pub fn insert(&mut self, fingerprint: u64, value: T) {
        if let Some(slot) = self.entries.iter_mut().find(|(fp, _)| *fp == fingerprint) {
            slot.1 = value;
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.push((fingerprint, value));
            return;
        }
        self.entries.remove(0);
        self.entries.push((fingerprint, value));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn fingerprint_at(&self, slot: usize) -> Option<u64> {
        self.entries.get(slot).map(|(fp, _)| *fp)
    }
}
