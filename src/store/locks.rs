//! Striped per-key locks
//!
//! A fixed table of mutexes; a key maps to one stripe by CRC32. Distinct
//! keys may share a stripe, which only costs contention.

use parking_lot::{Mutex, MutexGuard};

pub(crate) const DEFAULT_STRIPES: usize = 64;

pub(crate) struct KeyLocks {
    stripes: Box<[Mutex<()>]>,
}

impl KeyLocks {
    pub fn new(stripes: usize) -> Self {
        let stripes = (0..stripes.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    fn stripe(&self, key: &[u8]) -> usize {
        crc32fast::hash(key) as usize % self.stripes.len()
    }

    pub fn lock(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(key)].lock()
    }

    /// Lock every stripe touched by `keys`, in ascending stripe order so
    /// concurrent callers cannot deadlock
    pub fn lock_many<'k, I>(&self, keys: I) -> Vec<MutexGuard<'_, ()>>
    where
        I: IntoIterator<Item = &'k [u8]>,
    {
        let mut indices: Vec<usize> = keys.into_iter().map(|k| self.stripe(k)).collect();
        indices.sort_unstable();
        indices.dedup();
        indices.into_iter().map(|i| self.stripes[i].lock()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_many_handles_shared_stripes() {
        let locks = KeyLocks::new(1);
        let guards = locks.lock_many([b"a".as_slice(), b"b".as_slice(), b"a".as_slice()]);
        assert_eq!(guards.len(), 1);
        drop(guards);
        let _again = locks.lock(b"a");
    }
}
