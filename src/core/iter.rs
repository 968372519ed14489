use super::{MvccKey, Result};

/// Forward-only cursor over MVCC entries in key order.
///
/// `key` and `value` may only be called while `valid` returns `Ok(true)`.
pub trait MvccIterator {
    /// Position at the first entry `>= key`
    fn seek_ge(&mut self, key: &MvccKey);

    fn valid(&self) -> Result<bool>;

    fn next(&mut self);

    /// Skip the remaining versions of the current key
    fn next_key(&mut self) -> Result<()> {
        let current = self.key().key.clone();
        self.next();
        while self.valid()? {
            if self.key().key != current {
                break;
            }
            self.next();
        }
        Ok(())
    }

    fn key(&self) -> &MvccKey;

    fn value(&self) -> &[u8];
}

/// Iterator over an owned, already sorted run of entries
#[derive(Debug, Clone, Default)]
pub struct MemIterator {
    entries: Vec<(MvccKey, Vec<u8>)>,
    pos: usize,
}

impl MemIterator {
    /// `entries` must already be sorted by `MvccKey`
    pub fn new(entries: Vec<(MvccKey, Vec<u8>)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { entries, pos: 0 }
    }
}

impl MvccIterator for MemIterator {
    fn seek_ge(&mut self, key: &MvccKey) {
        self.pos = self.entries.partition_point(|(k, _)| k < key);
    }

    fn valid(&self) -> Result<bool> {
        Ok(self.pos < self.entries.len())
    }

    fn next(&mut self) {
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
    }

    fn key(&self) -> &MvccKey {
        &self.entries[self.pos].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos].1
    }
}
