//! Modular sequence-number arithmetic shared by both windows.
//!
//! Sequence numbers live in `0..size` and wrap.  Every window computation
//! (relative offset from a base, stepping forward or back, membership in a
//! window) goes through [`SeqSpace`] so the modulo logic exists in exactly
//! one place.
//!
//! ```text
//!   base            base + len
//!    │                  │
//!  ──┼──────────────────┼──────▶ (mod size)
//!    │ <── contains ──▶ │
//! ```

/// A sequence-number space of `size` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    size: u32,
}

impl SeqSpace {
    /// Create a space of `size` sequence numbers.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: u32) -> Self {
        assert!(size >= 1, "sequence space must hold at least one value");
        Self { size }
    }

    /// Number of distinct sequence numbers.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The sequence number following `seq`.
    #[inline]
    pub fn next(&self, seq: u32) -> u32 {
        (seq % self.size + 1) % self.size
    }

    /// The sequence number preceding `seq`.
    #[inline]
    pub fn prev(&self, seq: u32) -> u32 {
        (seq % self.size + self.size - 1) % self.size
    }

    /// Distance from `base` forward to `seq`, in `0..size`.
    #[inline]
    pub fn offset(&self, base: u32, seq: u32) -> u32 {
        (seq % self.size + self.size - base % self.size) % self.size
    }

    /// `true` when `seq` lies in the `len` numbers starting at `base`.
    #[inline]
    pub fn contains(&self, base: u32, len: usize, seq: u32) -> bool {
        (self.offset(base, seq) as usize) < len
    }
}
