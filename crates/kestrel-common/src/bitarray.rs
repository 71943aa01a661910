/// Narrowest entry width the wire format uses.
pub const MIN_BITS_PER_ENTRY: usize = 4;
/// Widest entry width that still fits at least two entries per word.
pub const MAX_BITS_PER_ENTRY: usize = 31;

/// Fixed-capacity array of fixed-width unsigned integers packed into
/// 64-bit words.
///
/// Entries are never split across a word boundary: each word holds
/// `64 / bits` whole entries and any leftover high bits stay unused, so
/// a reader can skip to the next word instead of stitching two words
/// together.
#[derive(Debug, Clone)]
pub struct FlexibleStorage {
    bits: usize,
    size: usize,
    entries_per_word: usize,
    mask: u64,
    words: Vec<u64>,
}

impl FlexibleStorage {
    /// Creates zero-filled storage for `size` entries of `bits` width.
    /// Width is clamped into `[MIN_BITS_PER_ENTRY, MAX_BITS_PER_ENTRY]`.
    pub fn new(bits: usize, size: usize) -> Self {
        let bits = bits.clamp(MIN_BITS_PER_ENTRY, MAX_BITS_PER_ENTRY);
        let entries_per_word = 64 / bits;
        let words = (size + entries_per_word - 1) / entries_per_word;

        Self {
            bits,
            size,
            entries_per_word,
            mask: (1u64 << bits) - 1,
            words: vec![0; words],
        }
    }

    pub fn bits_per_entry(&self) -> usize {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn get(&self, index: usize) -> u32 {
        debug_assert!(index < self.size);
        let word = index / self.entries_per_word;
        let offset = (index % self.entries_per_word) * self.bits;

        ((self.words[word] >> offset) & self.mask) as u32
    }

    /// Stores `value` at `index`, silently truncating it to the entry
    /// width. Callers keep values in range through the palette-size
    /// invariant.
    pub fn set(&mut self, index: usize, value: u32) {
        debug_assert!(index < self.size);
        let word = index / self.entries_per_word;
        let offset = (index % self.entries_per_word) * self.bits;

        self.words[word] &= !(self.mask << offset);
        self.words[word] |= ((value as u64) & self.mask) << offset;
    }
}
