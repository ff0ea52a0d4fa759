//! List payloads: real key-value entries and bucket dummies.
//!
//! Every node in the split-ordered list carries an `Entry`. The list is
//! ordered by the entry's *split key*: the bit-reversed 32-bit hash code with
//! the low bit used as a class tag. Real entries set the tag, bucket dummies
//! clear it, so a dummy always sorts immediately before the real entries of
//! its bucket and the two classes can never collide on a split key.

use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::Ordering;

use crossbeam_epoch::Atomic;

/// Computes the 32-bit hash code the split order consumes.
///
/// The ordering key is 32-bit by design; the hasher's 64-bit output is
/// truncated. Widening the table to 64-bit codes is a parameter of this
/// function and the split-key helpers, not of the algorithms.
pub(crate) fn hash_code<Q, S>(build_hasher: &S, key: &Q) -> u32
where
    Q: ?Sized + Hash,
    S: BuildHasher,
{
    let mut hasher = build_hasher.build_hasher();
    key.hash(&mut hasher);

    hasher.finish() as u32
}

/// Split key of a real entry: bit-reversed hash with the tag bit set.
pub(crate) fn real_split_key(hash_code: u32) -> u32 {
    hash_code.reverse_bits() | 1
}

/// Split key of the bucket dummy for logical index `index`: bit-reversed
/// index with the tag bit cleared.
pub(crate) fn dummy_split_key(index: u32) -> u32 {
    index.reverse_bits() & !1
}

/// The payload of a list node.
///
/// For a real entry `key` is present and `value` holds a non-null,
/// atomically swappable pointer to the user value. For a bucket dummy both
/// are empty and `hash_code` records the dummy's logical bucket index.
pub(crate) struct Entry<K, V> {
    pub(crate) hash_code: u32,
    pub(crate) split_key: u32,
    pub(crate) key: Option<K>,
    pub(crate) value: Atomic<V>,
}

impl<K, V> Entry<K, V> {
    /// A live entry carrying `key` and `value`.
    pub(crate) fn real(hash_code: u32, key: K, value: V) -> Self {
        Self {
            hash_code,
            split_key: real_split_key(hash_code),
            key: Some(key),
            value: Atomic::new(value),
        }
    }

    /// A keyless probe that compares like a real entry with `hash_code`.
    /// Probes are never linked into the list.
    pub(crate) fn probe(hash_code: u32) -> Self {
        Self {
            hash_code,
            split_key: real_split_key(hash_code),
            key: None,
            value: Atomic::null(),
        }
    }

    /// The bucket dummy for logical index `index`.
    pub(crate) fn dummy(index: u32) -> Self {
        Self {
            hash_code: index,
            split_key: dummy_split_key(index),
            key: None,
            value: Atomic::null(),
        }
    }

    /// Whether this entry carries user data (split-key tag bit set).
    pub(crate) fn is_real(&self) -> bool {
        self.split_key & 1 == 1
    }
}

impl<K, V> Drop for Entry<K, V> {
    fn drop(&mut self) {
        // Entries are dropped only once unlinked (or never linked), so the
        // value slot is no longer shared.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let value = self.value.load(Ordering::Relaxed, guard);
        if !value.is_null() {
            drop(unsafe { value.into_owned() });
        }
    }
}

// List order is by split key alone. Entries of distinct keys may compare
// equal when their hash codes collide; the table's key-aware second search
// pass resolves those.
impl<K, V> PartialEq for Entry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.split_key == other.split_key
    }
}

impl<K, V> Eq for Entry<K, V> {}

impl<K, V> PartialOrd for Entry<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, V> Ord for Entry<K, V> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.split_key.cmp(&other.split_key)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = &crossbeam_epoch::pin();
        let value = self.value.load(Ordering::Acquire, guard);
        write!(
            f,
            "{:032b}/{:032b} {:?} => {:?}",
            self.hash_code,
            self.split_key,
            self.key,
            unsafe { value.as_ref() },
        )
    }
}
