//! Fixed-capacity slot ring indexed by job sequence number.
//!
//! Slot `seq % capacity` holds the pipe read end of the job with that
//! sequence number while it is outstanding (launched but not fully drained).
//! The runner guarantees at most `capacity` outstanding jobs, so a sequence
//! number never wraps onto an occupied slot.

/// Ring of outstanding job slots.
pub struct SlotRing<T> {
    slots: Vec<Option<T>>,
}

impl<T> SlotRing<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Place a job's pipe in its slot. The slot must be free.
    pub fn store(&mut self, seq: u64, value: T) {
        let idx = self.index(seq);
        debug_assert!(self.slots[idx].is_none(), "slot {idx} already occupied");
        self.slots[idx] = Some(value);
    }

    /// Remove and return the pipe for `seq`, freeing its slot.
    pub fn take(&mut self, seq: u64) -> Option<T> {
        let idx = self.index(seq);
        self.slots[idx].take()
    }

    fn index(&self, seq: u64) -> usize {
        (seq % self.slots.len() as u64) as usize
    }
}
