//! Fixed-capacity ring buffer backing both windows.
//!
//! Entries are addressed by their offset from the front, so window code
//! deals in "n-th slot after base" and never touches raw array indices.

/// A ring holding at most `capacity` values, oldest at offset 0.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> Ring<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 1, "ring capacity must be at least 1");
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Append `value` behind the newest entry.
    ///
    /// Hands `value` back when the ring is full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let idx = self.index(self.len);
        self.slots[idx] = Some(value);
        self.len += 1;
        Ok(())
    }

    /// Entry `offset` places behind the front.
    pub fn peek(&self, offset: usize) -> Option<&T> {
        if offset >= self.len {
            return None;
        }
        self.slots[self.index(offset)].as_ref()
    }

    pub fn peek_mut(&mut self, offset: usize) -> Option<&mut T> {
        if offset >= self.len {
            return None;
        }
        let idx = self.index(offset);
        self.slots[idx].as_mut()
    }

    /// Remove and return the oldest entry.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        value
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |offset| self.peek(offset))
    }

    #[inline]
    fn index(&self, offset: usize) -> usize {
        (self.head + offset) % self.slots.len()
    }
}
