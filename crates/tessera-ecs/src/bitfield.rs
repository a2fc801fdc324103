//! Fixed-width bit-vectors.
//!
//! A [`Bitfield`] is an array of 32-bit words whose width is decided once, at
//! construction time, and never changes afterwards. Bit `i` set means "the
//! thing with numeric id `i` is present". The same type serves as an
//! archetype's component signature, as a query's AND/OR/NOT mask, as the
//! per-component owner set, and (through [`Bitpool`](crate::bitpool::Bitpool))
//! as a free-slot allocator.
//!
//! Bitfields compare and hash by value, so a bitfield is directly usable as the
//! canonical key of an archetype. [`Bitfield::key`] renders the same identity
//! as a string for logging.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::EcsError;

/// Number of bits stored per word.
pub const BITS_PER_WORD: usize = 32;

// ---------------------------------------------------------------------------
// BitPosition
// ---------------------------------------------------------------------------

/// Location of a single bit: which word, and which bit within that word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitPosition {
    /// Index of the word holding the bit.
    pub word: usize,
    /// Bit offset inside the word (`0..32`).
    pub bit: u32,
}

impl BitPosition {
    /// Single-bit mask for this position within its word.
    #[inline]
    pub fn mask(self) -> u32 {
        1u32 << self.bit
    }
}

// ---------------------------------------------------------------------------
// Bitfield
// ---------------------------------------------------------------------------

/// A fixed-width bit-vector backed by 32-bit words.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bitfield {
    words: Vec<u32>,
}

impl Bitfield {
    /// Create a zero-filled bitfield able to hold `size` bits.
    ///
    /// The width is rounded up to a whole number of words.
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0; size.div_ceil(BITS_PER_WORD)],
        }
    }

    /// Create a bitfield with bits `0..size` set and the padding bits of the
    /// last word left clear.
    pub fn filled(size: usize) -> Self {
        let mut field = Self::new(size);
        let full_words = size / BITS_PER_WORD;
        for word in &mut field.words[..full_words] {
            *word = u32::MAX;
        }
        let rest = size - full_words * BITS_PER_WORD;
        if rest > 0 {
            field.words[full_words] = (1u32 << rest) - 1;
        }
        field
    }

    /// Build a fresh bitfield of `size` bits with one bit set per key.
    ///
    /// Repeated keys are applied once; the first occurrence wins.
    pub fn from_keys<I>(size: usize, keys: I) -> Result<Self, EcsError>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut field = Self::new(size);
        field.toggle_each(keys)?;
        Ok(field)
    }

    /// Word index holding `bit`, or `None` for negative input.
    pub fn index_of(bit: i64) -> Option<usize> {
        if bit < 0 {
            return None;
        }
        Some(bit as usize / BITS_PER_WORD)
    }

    /// Split a bit index into `(word, bit-within-word)`.
    ///
    /// The in-word offset is computed as `bit - word * 32`, so bit 32 lands on
    /// bit 0 of word 1.
    #[inline]
    pub fn position(bit: usize) -> BitPosition {
        let word = bit / BITS_PER_WORD;
        BitPosition {
            word,
            bit: (bit - word * BITS_PER_WORD) as u32,
        }
    }

    /// Number of 32-bit words backing this field.
    #[inline]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Total number of addressable bits (`word_count * 32`).
    #[inline]
    pub fn width(&self) -> usize {
        self.words.len() * BITS_PER_WORD
    }

    /// Raw words, lowest bits first.
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[inline]
    pub(crate) fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    fn checked_position(&self, bit: usize) -> Result<BitPosition, EcsError> {
        let pos = Self::position(bit);
        if pos.word >= self.words.len() {
            return Err(EcsError::BitOutOfRange {
                bit,
                width: self.width(),
            });
        }
        Ok(pos)
    }

    /// Whether `bit` is set.
    ///
    /// # Errors
    ///
    /// [`EcsError::BitOutOfRange`] when `bit` lies beyond the allocated width.
    pub fn is_set(&self, bit: usize) -> Result<bool, EcsError> {
        let pos = self.checked_position(bit)?;
        Ok(self.words[pos.word] & pos.mask() != 0)
    }

    /// Flip `bit` and return its new state.
    ///
    /// # Errors
    ///
    /// [`EcsError::BitOutOfRange`] when `bit` lies beyond the allocated width.
    pub fn toggle(&mut self, bit: usize) -> Result<bool, EcsError> {
        let pos = self.checked_position(bit)?;
        self.words[pos.word] ^= pos.mask();
        Ok(self.words[pos.word] & pos.mask() != 0)
    }

    /// Force `bit` to `value`.
    ///
    /// # Errors
    ///
    /// [`EcsError::BitOutOfRange`] when `bit` lies beyond the allocated width.
    pub fn set(&mut self, bit: usize, value: bool) -> Result<(), EcsError> {
        let pos = self.checked_position(bit)?;
        if value {
            self.words[pos.word] |= pos.mask();
        } else {
            self.words[pos.word] &= !pos.mask();
        }
        Ok(())
    }

    /// Clone this field, then toggle one bit per key.
    ///
    /// Repeated keys are toggled once so that a duplicate cannot flip the bit
    /// straight back.
    pub fn toggled_clone<I>(&self, keys: I) -> Result<Self, EcsError>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut field = self.clone();
        field.toggle_each(keys)?;
        Ok(field)
    }

    fn toggle_each<I>(&mut self, keys: I) -> Result<(), EcsError>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut seen: Vec<usize> = Vec::new();
        for key in keys {
            if seen.contains(&key) {
                continue;
            }
            self.toggle(key)?;
            seen.push(key);
        }
        Ok(())
    }

    /// Number of set bits.
    pub fn population_count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Whether no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterate the indices of all set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * BITS_PER_WORD + bit)
            })
        })
    }

    /// Canonical string form: the words in hex, most significant word first.
    pub fn key(&self) -> String {
        self.words
            .iter()
            .rev()
            .map(|w| format!("{w:08x}"))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Debug for Bitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitfield({})", self.key())
    }
}

impl fmt::Display for Bitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
