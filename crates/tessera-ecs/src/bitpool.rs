//! Free-slot allocation on top of a [`Bitfield`].
//!
//! A [`Bitpool`] reads its bitfield inverted from the usual sense: a set bit
//! means "this slot is available". Acquiring clears the lowest set bit of the
//! cached word; releasing sets the bit again and points the cache at its word.
//! Entity ids and sparse storage slots are both handed out by bitpools.

use crate::bitfield::{Bitfield, BITS_PER_WORD};

/// A fixed-size pool of integer slots `0..size`.
#[derive(Debug, Clone)]
pub struct Bitpool {
    /// Bit set = slot free.
    field: Bitfield,
    /// Number of slots managed by this pool.
    size: usize,
    /// Word expected to hold a free slot. `None` once the pool is exhausted.
    next_available: Option<usize>,
}

impl Bitpool {
    /// Create a pool where every slot in `0..size` is free.
    pub fn new(size: usize) -> Self {
        let field = Bitfield::filled(size);
        let next_available = if size > 0 { Some(0) } else { None };
        Self {
            field,
            size,
            next_available,
        }
    }

    /// Take the lowest free slot of the cached word.
    ///
    /// Returns `None` when the pool is exhausted; that is not an error at this
    /// level, callers decide whether it is fatal.
    pub fn acquire(&mut self) -> Option<usize> {
        let word_index = self.next_available?;
        let words = self.field.words_mut();
        let word = words[word_index];
        if word == 0 {
            // Hint went stale; fall back to a scan.
            self.next_available = self.scan_from(word_index);
            return self.next_available.and_then(|_| self.acquire());
        }

        let bit = word.trailing_zeros() as usize;
        words[word_index] = word & (word - 1);
        if words[word_index] == 0 {
            self.next_available = self.scan_from(word_index);
        }
        Some(word_index * BITS_PER_WORD + bit)
    }

    /// Scan for the next non-empty word, starting after `from` and wrapping.
    fn scan_from(&self, from: usize) -> Option<usize> {
        let words = self.field.words();
        (from + 1..words.len())
            .chain(0..=from.min(words.len().saturating_sub(1)))
            .find(|&i| words[i] != 0)
    }

    /// Return `position` to the pool.
    ///
    /// Releasing a slot that is already free, or one outside the pool, is a
    /// no-op that returns `false`.
    pub fn release(&mut self, position: usize) -> bool {
        if position >= self.size {
            return false;
        }
        let pos = Bitfield::position(position);
        let words = self.field.words_mut();
        if words[pos.word] & pos.mask() != 0 {
            return false;
        }
        words[pos.word] |= pos.mask();
        self.next_available = Some(pos.word);
        true
    }

    /// Whether `position` is currently free.
    pub fn is_available(&self, position: usize) -> bool {
        position < self.size && self.field.is_set(position).unwrap_or(false)
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.field.population_count() as usize
    }

    /// Total number of slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether every slot is taken.
    pub fn is_exhausted(&self) -> bool {
        self.next_available.is_none()
    }

    /// The underlying free-bit field.
    pub fn bits(&self) -> &Bitfield {
        &self.field
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
