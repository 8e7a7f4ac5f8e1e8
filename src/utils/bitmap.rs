/// Growable bit set backed by 32-bit words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitMap {
    words: Vec<u32>,
}

impl BitMap {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    pub fn with_capacity(bits: usize) -> Self {
        let mut map = Self::new();
        map.resize(bits);
        map
    }

    /// Number of addressable bits.
    #[inline]
    pub fn size(&self) -> usize {
        self.words.len() * 32
    }

    /// Grows (never shrinks) the map so that `bits` are addressable. New bits are clear.
    pub fn resize(&mut self, bits: usize) {
        let words = bits.div_ceil(32);
        if words > self.words.len() {
            self.words.resize(words, 0);
        }
    }

    /// Makes `index` addressable, doubling the storage when it is not.
    #[inline]
    pub fn grow_to_fit(&mut self, index: usize) {
        if index >= self.size() {
            self.resize((index + 1).max(self.size() * 2));
        }
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        self.grow_to_fit(index);
        self.words[index >> 5] |= 1 << (index & 31);
    }

    #[inline]
    pub fn reset(&mut self, index: usize) {
        if let Some(word) = self.words.get_mut(index >> 5) {
            *word &= !(1 << (index & 31));
        }
    }

    #[inline]
    pub fn test(&self, index: usize) -> bool {
        self.words
            .get(index >> 5)
            .map(|word| word & (1 << (index & 31)) != 0)
            .unwrap_or(false)
    }

    /// Clears every bit while keeping the storage.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|word| *word = 0);
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Set bits in ascending order.
    pub fn iter(&self) -> BitIter<'_> {
        self.iter_from(0)
    }

    /// Set bits at or above `start`, in ascending order.
    pub fn iter_from(&self, start: usize) -> BitIter<'_> {
        let word_index = start >> 5;
        let current = self
            .words
            .get(word_index)
            .map(|word| word & (u32::MAX << (start & 31)))
            .unwrap_or(0);
        BitIter {
            words: &self.words,
            word_index,
            current,
        }
    }
}

pub struct BitIter<'a> {
    words: &'a [u32],
    word_index: usize,
    current: u32,
}

impl Iterator for BitIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some((self.word_index << 5) + bit);
            }
            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
    }
}
