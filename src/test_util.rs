use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::Owned;

/// Counts constructions (including clones) and drops of [`Tracked`] values.
#[derive(Debug, Default)]
pub(crate) struct DropCounter {
    created: AtomicUsize,
    dropped: AtomicUsize,
}

impl DropCounter {
    pub(crate) fn assert_balanced(&self) {
        assert_eq!(
            self.created.load(Ordering::SeqCst),
            self.dropped.load(Ordering::SeqCst),
            "every constructed value must be dropped exactly once",
        );
    }
}

/// A value whose lifecycle is recorded in a shared [`DropCounter`].
#[derive(Debug)]
pub(crate) struct Tracked {
    counter: Arc<DropCounter>,
    pub(crate) tag: u32,
}

impl Tracked {
    pub(crate) fn new(counter: &Arc<DropCounter>, tag: u32) -> Self {
        counter.created.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
            tag,
        }
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        Tracked::new(&self.counter, self.tag)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counter.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
    }
}

impl Eq for Tracked {}

/// A build hasher whose output is the key itself, so hash codes (and with
/// them bucket indices and split keys) are exact in tests.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct IdentityHash;

impl BuildHasher for IdentityHash {
    type Hasher = IdentityHasher;

    fn build_hasher(&self) -> IdentityHasher {
        IdentityHasher(0)
    }
}

pub(crate) struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut word = [0u8; 8];
        let len = bytes.len().min(8);
        word[..len].copy_from_slice(&bytes[..len]);
        self.0 = u64::from_le_bytes(word);
    }

    fn write_u32(&mut self, n: u32) {
        self.0 = u64::from(n);
    }

    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

/// Drives the epoch collector until the destructions this crate defers
/// (nodes unlinked by searches, values displaced by swaps) have run, so drop
/// accounting can be checked afterwards.
pub(crate) fn drain_deferred() {
    // Each pass seeds one throwaway deferral; repeated pin/flush cycles
    // advance the global epoch past every pending batch.
    for _ in 0..32_768 {
        let guard = crossbeam_epoch::pin();
        let seed = Owned::new(0u8).into_shared(&guard);
        unsafe { guard.defer_destroy(seed) };
        guard.flush();
    }
}
