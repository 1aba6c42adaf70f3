//! Unbounded bit array with an "all on" tail

use std::fmt;

const WORD_BITS: usize = 64;

/// A bit array of unbounded length.
///
/// Bits beyond the stored words all share one value (`high_bits`), so the
/// array can represent "every joint" without knowing how many joints exist.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitArray {
    words: Vec<u64>,
    high_bits: bool,
}

impl BitArray {
    /// All bits off
    pub fn new() -> Self {
        Self::default()
    }

    /// All bits on, including every bit past the end
    pub fn all_on() -> Self {
        Self {
            words: Vec::new(),
            high_bits: true,
        }
    }

    /// Create with the lowest `count` bits on
    pub fn lower_on(count: usize) -> Self {
        let mut bits = Self::new();
        for i in 0..count {
            bits.set_bit(i);
        }
        bits
    }

    fn fill_word(&self) -> u64 {
        if self.high_bits { u64::MAX } else { 0 }
    }

    fn word(&self, index: usize) -> u64 {
        self.words.get(index).copied().unwrap_or_else(|| self.fill_word())
    }

    fn ensure_word(&mut self, index: usize) {
        let fill = self.fill_word();
        while self.words.len() <= index {
            self.words.push(fill);
        }
    }

    fn normalize(&mut self) {
        let fill = self.fill_word();
        while self.words.last() == Some(&fill) {
            self.words.pop();
        }
    }

    /// Read one bit
    pub fn get_bit(&self, index: usize) -> bool {
        self.word(index / WORD_BITS) & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Turn one bit on
    pub fn set_bit(&mut self, index: usize) {
        let w = index / WORD_BITS;
        self.ensure_word(w);
        self.words[w] |= 1u64 << (index % WORD_BITS);
        self.normalize();
    }

    /// Turn one bit off
    pub fn clear_bit(&mut self, index: usize) {
        let w = index / WORD_BITS;
        self.ensure_word(w);
        self.words[w] &= !(1u64 << (index % WORD_BITS));
        self.normalize();
    }

    /// Set one bit to `value`
    pub fn set_bit_to(&mut self, index: usize, value: bool) {
        if value {
            self.set_bit(index);
        } else {
            self.clear_bit(index);
        }
    }

    /// True if no bit is on
    pub fn is_zero(&self) -> bool {
        !self.high_bits && self.words.is_empty()
    }

    /// True if every bit is on
    pub fn is_all_on(&self) -> bool {
        self.high_bits && self.words.is_empty()
    }

    /// Number of on bits, or `None` if infinitely many are on
    pub fn count_on(&self) -> Option<usize> {
        if self.high_bits {
            return None;
        }
        Some(self.words.iter().map(|w| w.count_ones() as usize).sum())
    }

    /// True if any bit is on in both arrays
    pub fn has_bits_in_common(&self, other: &BitArray) -> bool {
        if self.high_bits && other.high_bits {
            return true;
        }
        let n = self.words.len().max(other.words.len());
        (0..n).any(|i| self.word(i) & other.word(i) != 0)
    }

    /// Indices of the on bits below `limit`
    pub fn iter_on(&self, limit: usize) -> impl Iterator<Item = usize> + '_ {
        (0..limit).filter(move |&i| self.get_bit(i))
    }
}

impl fmt::Debug for BitArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitArray(")?;
        if self.high_bits {
            write!(f, "...1 ")?;
        }
        for w in self.words.iter().rev() {
            write!(f, "{:016x}", w)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut bits = BitArray::new();
        assert!(bits.is_zero());

        bits.set_bit(3);
        bits.set_bit(130);
        assert!(bits.get_bit(3));
        assert!(bits.get_bit(130));
        assert!(!bits.get_bit(4));
        assert_eq!(bits.count_on(), Some(2));

        bits.clear_bit(130);
        bits.clear_bit(3);
        assert!(bits.is_zero());
        assert_eq!(bits, BitArray::new());
    }

    #[test]
    fn test_all_on_clear_bit() {
        let mut bits = BitArray::all_on();
        assert!(bits.get_bit(1_000_000));
        bits.clear_bit(1);
        assert!(!bits.get_bit(1));
        assert!(bits.get_bit(0));
        assert!(bits.get_bit(2));
        assert!(!bits.is_all_on());
        assert_eq!(bits.count_on(), None);

        bits.set_bit(1);
        assert!(bits.is_all_on());
    }

    #[test]
    fn test_has_bits_in_common() {
        let a = BitArray::lower_on(3);
        let mut b = BitArray::new();
        b.set_bit(5);
        assert!(!a.has_bits_in_common(&b));

        b.set_bit(2);
        assert!(a.has_bits_in_common(&b));

        assert!(BitArray::all_on().has_bits_in_common(&a));
        assert!(!BitArray::all_on().has_bits_in_common(&BitArray::new()));
    }

    #[test]
    fn test_iter_on() {
        let mut bits = BitArray::new();
        bits.set_bit(0);
        bits.set_bit(2);
        let on: Vec<usize> = bits.iter_on(4).collect();
        assert_eq!(on, vec![0, 2]);
    }
}
