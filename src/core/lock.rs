use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, MutexGuard};

/// Fixed set of mutexes selected by key hash.
/// Callers touching the same name serialize, unrelated names rarely contend.
#[derive(Debug)]
pub struct StripedLock {
    stripes: Box<[Mutex<()>]>,
}

impl StripedLock {
    pub const DEFAULT_STRIPES: usize = 32;

    pub fn new(stripes: usize) -> Self {
        let stripes = std::cmp::max(stripes, 1);
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn lock<K: Hash + ?Sized>(&self, key: &K) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(key)].lock()
    }

    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }

    fn stripe<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut h);
        (h.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for StripedLock {
    fn default() -> Self {
        StripedLock::new(StripedLock::DEFAULT_STRIPES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    #[test]
    fn same_key_same_stripe() {
        let lock = StripedLock::default();
        let a = lock.stripe(Path::new("/dump/db/node-1"));
        let b = lock.stripe(Path::new("/dump/db/node-1"));
        assert_eq!(a, b);
        assert!(a < lock.stripes());
    }

    #[test]
    fn serializes_holders() {
        let lock = Arc::new(StripedLock::new(4));
        let counter = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let lock = lock.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let _guard = lock.lock("123.classname0");
                    counter.lock().push(i);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.lock().len(), 8);
    }

    #[test]
    fn zero_stripes_clamped() {
        assert_eq!(StripedLock::new(0).stripes(), 1);
    }
}
