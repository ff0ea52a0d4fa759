//! A lock-free hash map implemented as a split-ordered list with a two-level
//! bucket directory.

pub(crate) mod directory;
pub(crate) mod entry;

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{self, AtomicI64, AtomicU32, Ordering};

use crossbeam_epoch::{Guard, Owned, Shared};
use crossbeam_utils::CachePadded;

use crate::error::IntegrityError;
use crate::list::{self, Cursor, Node};
use crate::map::directory::{Directory, DIRECTORY_SLOTS};
use crate::map::entry::Entry;

/// Default hasher for [`SplitOrderedMap`].
pub type DefaultHashBuilder = RandomState;

const DEFAULT_LOAD_FACTOR: f64 = 0.5;

/// A lock-free hash map that grows online, based on Shalev and Shavit's
/// split-ordered lists.
///
/// All entries live on a single lock-free linked list ordered by the
/// bit-reversed hash code, and a lazily materialized directory of bucket
/// dummies provides shortcuts into that list. Doubling the table publishes
/// one directory sub-array and bumps an exponent; no entry is ever rehashed
/// or moved. See the crate documentation for the full picture.
///
/// Reads return clones of the stored value (or borrow it through
/// [`get_and`][SplitOrderedMap::get_and]); writers swap the value pointer
/// atomically, and displaced values are reclaimed through an epoch scheme
/// once no reader can still observe them.
///
/// It is required that the keys implement the [`Eq`] and [`Hash`] traits and
/// that `k1 == k2` implies `hash(k1) == hash(k2)`. It is a logic error for a
/// key to change in a way that alters its hash or equality while it is in
/// the map.
pub struct SplitOrderedMap<K, V, S = DefaultHashBuilder> {
    directory: Directory<K, V>,
    exponent: AtomicU32,
    count: CachePadded<AtomicI64>,
    load_factor: f64,
    build_hasher: S,
}

impl<K, V> SplitOrderedMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map with the default load factor of 0.5.
    pub fn new() -> Self {
        Self::with_load_factor_and_hasher(DEFAULT_LOAD_FACTOR, DefaultHashBuilder::default())
    }

    /// Creates an empty map that doubles its directory once the entry count
    /// exceeds `load_factor * 2^exponent`.
    ///
    /// # Panics
    ///
    /// Panics if `load_factor` is not finite and positive.
    pub fn with_load_factor(load_factor: f64) -> Self {
        Self::with_load_factor_and_hasher(load_factor, DefaultHashBuilder::default())
    }
}

impl<K, V> Default for SplitOrderedMap<K, V, DefaultHashBuilder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> SplitOrderedMap<K, V, S> {
    /// Creates an empty map using `build_hasher` to hash keys.
    pub fn with_hasher(build_hasher: S) -> Self {
        Self::with_load_factor_and_hasher(DEFAULT_LOAD_FACTOR, build_hasher)
    }

    /// Creates an empty map with the given load factor and hasher.
    ///
    /// Bucket zero is materialized here, so every later operation finds its
    /// anchor in place.
    ///
    /// # Panics
    ///
    /// Panics if `load_factor` is not finite and positive.
    pub fn with_load_factor_and_hasher(load_factor: f64, build_hasher: S) -> Self {
        assert!(
            load_factor.is_finite() && load_factor > 0.0,
            "load factor must be positive and finite"
        );

        let directory = Directory::new();

        // Not shared yet; no other thread can race this seed.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        directory
            .cell(0, guard)
            .store(Owned::new(Node::new(Entry::dummy(0))), Ordering::Relaxed);

        Self {
            directory,
            exponent: AtomicU32::new(0),
            count: CachePadded::new(AtomicI64::new(0)),
            load_factor,
            build_hasher,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// The counter is maintained with relaxed atomic adds and is eventually
    /// consistent: it is exact once all in-flight operations have returned,
    /// but a concurrent observer may see a transiently stale value.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed).max(0) as usize
    }

    /// Returns `true` if the map contains no entries, with the same caveat
    /// as [`len`][SplitOrderedMap::len].
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, S> SplitOrderedMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns a clone of the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but [`Hash`]
    /// and [`Eq`] on the borrowed form *must* match those for the key type.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get_and(key, V::clone)
    }

    /// Returns the result of invoking a function with a reference to the
    /// value corresponding to the key.
    pub fn get_and<Q, F, T>(&self, key: &Q, with_value: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        let guard = &crossbeam_epoch::pin();
        let hash_code = entry::hash_code(&self.build_hasher, key);

        let bucket = self.bucket_for_hash(hash_code, guard);
        let cursor = self.find(bucket, hash_code, |k| k.borrow() == key, guard);
        let found = unsafe { cursor.node.as_ref() }?;

        let value = found.entry.value.load(Ordering::Acquire, guard);
        Some(with_value(unsafe { value.deref() }))
    }

    /// Inserts a key-value pair, returning a clone of the value previously
    /// stored under the key, if any.
    ///
    /// When the key is already present the stored value pointer is swapped
    /// in place; per-key updates linearize on that swap.
    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let guard = &crossbeam_epoch::pin();
        let hash_code = entry::hash_code(&self.build_hasher, &key);
        let mut node = Owned::new(Node::new(Entry::real(hash_code, key, value)));

        loop {
            let bucket = self.bucket_for_hash(hash_code, guard);
            let key_ref = node.entry.key.as_ref().unwrap();
            let cursor = self.find(bucket, hash_code, |k| k == key_ref, guard);

            if let Some(found) = unsafe { cursor.node.as_ref() } {
                // Hand our value to the existing entry and return the one it
                // held. The spare node keeps the key and is freed on return.
                let value = node.entry.value.swap(Shared::null(), Ordering::Relaxed, guard);
                let previous = found.entry.value.swap(value, Ordering::AcqRel, guard);
                let cloned = unsafe { previous.deref() }.clone();
                unsafe { guard.defer_destroy(previous) };
                return Some(cloned);
            }

            match list::add_before(node, cursor.left, cursor.right, guard) {
                Ok(_) => {
                    self.len_added(guard);
                    return None;
                }
                Err(returned) => node = returned,
            }
        }
    }

    /// Inserts a key-value pair only if the key is absent, returning whether
    /// the insertion happened.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let guard = &crossbeam_epoch::pin();
        let hash_code = entry::hash_code(&self.build_hasher, &key);
        let mut node = Owned::new(Node::new(Entry::real(hash_code, key, value)));

        loop {
            let bucket = self.bucket_for_hash(hash_code, guard);
            let key_ref = node.entry.key.as_ref().unwrap();
            let cursor = self.find(bucket, hash_code, |k| k == key_ref, guard);

            if !cursor.node.is_null() {
                return false;
            }

            match list::add_before(node, cursor.left, cursor.right, guard) {
                Ok(_) => {
                    self.len_added(guard);
                    return true;
                }
                Err(returned) => node = returned,
            }
        }
    }

    /// Replaces the value under `key` with `value` only if the current value
    /// equals `expected`, returning whether the replacement happened.
    ///
    /// Returns `false` when the key is absent; this operation never inserts.
    pub fn replace_if_equals<Q>(&self, key: &Q, value: V, expected: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let guard = &crossbeam_epoch::pin();
        let hash_code = entry::hash_code(&self.build_hasher, key);
        let mut value = Owned::new(value);

        loop {
            let bucket = self.bucket_for_hash(hash_code, guard);
            let cursor = self.find(bucket, hash_code, |k| k.borrow() == key, guard);

            let Some(found) = (unsafe { cursor.node.as_ref() }) else {
                return false;
            };

            let current = found.entry.value.load(Ordering::Acquire, guard);
            if unsafe { current.deref() } != expected {
                return false;
            }

            match found.entry.value.compare_exchange(
                current,
                value,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    unsafe { guard.defer_destroy(current) };
                    return true;
                }
                // Lost a race on the value slot; re-resolve and retry.
                Err(error) => value = error.new,
            }
        }
    }

    /// Removes the entry under `key`, returning a clone of the value it held.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let guard = &crossbeam_epoch::pin();
        let hash_code = entry::hash_code(&self.build_hasher, key);

        loop {
            let bucket = self.bucket_for_hash(hash_code, guard);
            let cursor = self.find(bucket, hash_code, |k| k.borrow() == key, guard);

            let Some(found) = (unsafe { cursor.node.as_ref() }) else {
                return None;
            };

            if list::do_remove(cursor.node, guard) {
                let value = found.entry.value.load(Ordering::Acquire, guard);
                let removed = unsafe { value.deref() }.clone();
                self.len_removed();

                // Unlink the node promptly rather than leaving it to the
                // next reader that happens to pass over it.
                let _ = list::search(bucket, &Entry::probe(hash_code), guard);

                return Some(removed);
            }
            // Another thread removed the node first; retry to observe the
            // list without it.
        }
    }

    /// Returns a snapshot of the map as a [`HashMap`].
    ///
    /// The traversal is not atomic: entries inserted or removed while it
    /// runs may or may not be reflected, but the result always equals the
    /// logical mapping at some point during the call for any single key.
    pub fn to_map(&self) -> HashMap<K, V>
    where
        K: Clone,
        V: Clone,
    {
        let guard = &crossbeam_epoch::pin();
        let mut mapping = HashMap::new();

        let mut node = self.bucket_for_index(0, guard);
        while let Some(node_ref) = unsafe { node.as_ref() } {
            if let Some(key) = &node_ref.entry.key {
                let value = node_ref.entry.value.load(Ordering::Acquire, guard);
                mapping.insert(key.clone(), unsafe { value.deref() }.clone());
            }
            node = list::next(node, guard);
        }

        mapping
    }

    /// Checks the structural invariants: the list is in split-order, every
    /// dummy is referenced by its directory cell, and no real entry is.
    ///
    /// Returns the first violation found. Meant for tests and debugging on a
    /// quiescent table; a concurrent bucket materialization can make a
    /// healthy table transiently report an unindexed dummy.
    pub fn verify(&self) -> Result<(), IntegrityError> {
        let guard = &crossbeam_epoch::pin();
        let exponent = self.exponent.load(Ordering::Acquire);

        let mut previous: Option<u32> = None;
        let mut node = self.bucket_for_index(0, guard);

        while let Some(node_ref) = unsafe { node.as_ref() } {
            let entry = &node_ref.entry;

            if let Some(first) = previous {
                if entry.split_key < first {
                    return Err(IntegrityError::OutOfOrder {
                        first,
                        second: entry.split_key,
                    });
                }
            }
            previous = Some(entry.split_key);

            let (indexed, index) = self.indexed_at(node, exponent, guard);
            if entry.is_real() && indexed {
                return Err(IntegrityError::RealEntryIndexed {
                    hash_code: entry.hash_code,
                    index,
                });
            }
            if !entry.is_real() && !indexed {
                return Err(IntegrityError::DummyNotIndexed {
                    index: entry.hash_code,
                });
            }

            node = list::next(node, guard);
        }

        Ok(())
    }

    /// Renders the list with its bucket structure, one node per line, for
    /// debugging. Directory-indexed nodes carry their `index:super,sub`
    /// coordinate and a trailing `*`.
    pub fn describe(&self) -> String
    where
        K: fmt::Debug,
        V: fmt::Debug,
    {
        use fmt::Write as _;

        let guard = &crossbeam_epoch::pin();
        let exponent = self.exponent.load(Ordering::Acquire);
        let mut out = format!(
            "SplitOrderedMap {{ len: {}, exponent: {}, load_factor: {} }}\n",
            self.len(),
            exponent,
            self.load_factor,
        );

        let mut node = self.bucket_for_index(0, guard);
        while let Some(node_ref) = unsafe { node.as_ref() } {
            let (indexed, index) = self.indexed_at(node, exponent, guard);
            if indexed {
                let (super_index, sub_index) = directory::bucket_indices(index);
                let _ = writeln!(
                    out,
                    "{index:>3}:{super_index:>3},{sub_index:>3}: {:?} *",
                    node_ref.entry,
                );
            } else {
                let _ = writeln!(out, "             {:?}", node_ref.entry);
            }
            node = list::next(node, guard);
        }

        out
    }

    /// The key-aware second search pass.
    ///
    /// [`list::search`] positions the cursor at the first node whose split
    /// key matches; entries of distinct keys share a split key exactly when
    /// their hash codes collide, so this walks the run of equal split keys
    /// until `eq` accepts a key or the run ends. The returned cursor either
    /// holds the match in `node` or brackets the insertion point.
    fn find<'g>(
        &self,
        bucket: Shared<'g, Node<Entry<K, V>>>,
        hash_code: u32,
        mut eq: impl FnMut(&K) -> bool,
        guard: &'g Guard,
    ) -> Cursor<'g, Entry<K, V>> {
        let probe = Entry::probe(hash_code);
        let mut cursor = list::search(bucket, &probe, guard);

        loop {
            let Some(found) = (unsafe { cursor.node.as_ref() }) else {
                return cursor;
            };
            cursor.right = list::next(cursor.node, guard);

            let entry = &found.entry;
            if entry.split_key != probe.split_key {
                cursor.right = cursor.node;
                cursor.node = Shared::null();
                return cursor;
            }
            if entry.key.as_ref().is_some_and(&mut eq) {
                return cursor;
            }

            cursor.left = cursor.node;
            cursor.node = list::next(cursor.node, guard);
            cursor.right = Shared::null();
        }
    }

    fn bucket_for_hash<'g>(&self, hash_code: u32, guard: &'g Guard) -> Shared<'g, Node<Entry<K, V>>> {
        let exponent = self.exponent.load(Ordering::Acquire);
        self.bucket_for_index(hash_code & bucket_mask(exponent), guard)
    }

    /// Returns the dummy node for logical bucket `index`, materializing it
    /// (and, recursively, its parents) on first use.
    fn bucket_for_index<'g>(&self, index: u32, guard: &'g Guard) -> Shared<'g, Node<Entry<K, V>>> {
        loop {
            let cell = self.directory.cell(index, guard);
            let node = cell.load(Ordering::Acquire, guard);
            if !node.is_null() {
                return node;
            }

            if index == 0 {
                // Only reachable before the constructor's seed is visible to
                // this thread; install a fresh dummy with no predecessor.
                let dummy = Owned::new(Node::new(Entry::dummy(0)));
                let _ = cell.compare_exchange(
                    Shared::null(),
                    dummy,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                );
            } else {
                let parent = self.bucket_for_index(self.parent_index(index), guard);
                let dummy = Entry::dummy(index);
                let cursor = list::search(parent, &dummy, guard);

                if cursor.node.is_null() {
                    // Win or lose, the next loop iteration re-reads the cell
                    // and finds the dummy through the parent.
                    let _ = list::add_before(
                        Owned::new(Node::new(dummy)),
                        cursor.left,
                        cursor.right,
                        guard,
                    );
                } else {
                    // Another thread spliced the dummy in; adopt it.
                    let _ = cell.compare_exchange(
                        Shared::null(),
                        cursor.node,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    );
                }
            }
        }
    }

    /// Index of the next-lower materialized parent in the split-ordered
    /// tree: clear out everything below the exponent, step the remaining
    /// prefix down by one, and map back to index space.
    fn parent_index(&self, index: u32) -> u32 {
        debug_assert!(index != 0);

        let exponent = self.exponent.load(Ordering::Acquire);
        let shift = 32 - exponent;
        let prefix = entry::dummy_split_key(index) >> shift;

        ((prefix - 1) << shift).reverse_bits()
    }

    /// Whether `node` is the target of the directory cell for its logical
    /// bucket under `exponent`; returns the logical index alongside.
    fn indexed_at<'g>(
        &self,
        node: Shared<'g, Node<Entry<K, V>>>,
        exponent: u32,
        guard: &'g Guard,
    ) -> (bool, u32) {
        let entry = &unsafe { node.deref() }.entry;
        let index = entry.hash_code & bucket_mask(exponent);
        let cell = self.directory.cell(index, guard).load(Ordering::Acquire, guard);

        (cell == node, index)
    }

    fn len_added(&self, guard: &Guard) {
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        let exponent = self.exponent.load(Ordering::Acquire);

        if count as f64 > self.load_factor * f64::from(1u32 << exponent) {
            self.try_grow(guard);
        }
    }

    fn len_removed(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Publishes the next directory sub-array and advances the exponent.
    ///
    /// At most one thread publishes per epoch; the sub-array fills in on
    /// demand as operations materialize buckets in the new range. Beyond
    /// the 32-bit cap this is a no-op and the table saturates.
    fn try_grow(&self, guard: &Guard) {
        let exponent = self.exponent.load(Ordering::Acquire);
        let next = exponent + 1;
        if next as usize >= DIRECTORY_SLOTS {
            return;
        }

        if self.directory.publish(next as usize, guard)
            && self
                .exponent
                .compare_exchange(exponent, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            log::debug!("doubled bucket directory: exponent {exponent} -> {next}");
        }
    }
}

impl<K, V, S> fmt::Debug for SplitOrderedMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitOrderedMap")
            .field("len", &self.len())
            .field("exponent", &self.exponent.load(Ordering::Relaxed))
            .field("load_factor", &self.load_factor)
            .finish_non_exhaustive()
    }
}

impl<K, V, S> Drop for SplitOrderedMap<K, V, S> {
    fn drop(&mut self) {
        let guard = unsafe { crossbeam_epoch::unprotected() };
        atomic::fence(Ordering::Acquire);

        // Everything still linked hangs off bucket zero, including logically
        // deleted nodes that were never unlinked. Nodes that were unlinked
        // went through the epoch collector already.
        let mut node = self.directory.cell(0, guard).load(Ordering::Relaxed, guard);
        while !node.is_null() {
            let next = unsafe { node.deref() }
                .next
                .load(Ordering::Relaxed, guard)
                .with_tag(0);
            drop(unsafe { node.into_owned() });
            node = next;
        }
    }
}

fn bucket_mask(exponent: u32) -> u32 {
    (1u32 << exponent) - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{drain_deferred, DropCounter, IdentityHash, Tracked};

    use std::sync::Arc;

    fn identity_map<V>(load_factor: f64) -> SplitOrderedMap<u32, V, IdentityHash> {
        SplitOrderedMap::with_load_factor_and_hasher(load_factor, IdentityHash)
    }

    #[test]
    fn insert_get_and_growth() {
        let map = identity_map(0.5);

        assert_eq!(map.insert(1, "a"), None);
        assert_eq!(map.get(&1), Some("a"));
        assert_eq!(map.len(), 1);

        assert_eq!(map.insert(2, "b"), None);
        assert_eq!(map.get(&2), Some("b"));
        assert_eq!(map.len(), 2);
        assert!(map.exponent.load(Ordering::Acquire) >= 1);

        assert_eq!(map.insert(3, "c"), None);
        assert_eq!(map.get(&3), Some("c"));
        assert_eq!(map.len(), 3);
        assert!(map.exponent.load(Ordering::Acquire) >= 2);

        assert_eq!(map.get(&1), Some("a"));
        assert_eq!(map.get(&2), Some("b"));
        assert!(map.verify().is_ok());
    }

    #[test]
    fn insert_replaces_and_returns_previous() {
        let map = identity_map(0.5);

        assert_eq!(map.insert(5, "x"), None);
        assert_eq!(map.insert(5, "y"), Some("x"));
        assert_eq!(map.get(&5), Some("y"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn insert_if_absent_only_once() {
        let map = identity_map(0.5);

        assert!(map.insert_if_absent(7, "p"));
        assert!(!map.insert_if_absent(7, "q"));
        assert_eq!(map.get(&7), Some("p"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn replace_if_equals_compares_current() {
        let map = identity_map(0.5);

        assert_eq!(map.insert(9, "m"), None);
        assert!(map.replace_if_equals(&9, "n", &"m"));
        assert!(!map.replace_if_equals(&9, "o", &"m"));
        assert_eq!(map.get(&9), Some("n"));
    }

    #[test]
    fn replace_if_equals_never_inserts() {
        let map = identity_map(0.5);

        assert!(!map.replace_if_equals(&11, "v", &"v"));
        assert_eq!(map.get(&11), None);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn remove_returns_value_once() {
        let map = identity_map(0.5);

        assert_eq!(map.insert(4, "d"), None);
        assert_eq!(map.remove(&4), Some("d"));
        assert_eq!(map.remove(&4), None);
        assert_eq!(map.get(&4), None);
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn reinsert_after_remove() {
        let map = identity_map(0.5);

        map.insert(6, "old");
        assert_eq!(map.remove(&6), Some("old"));
        assert_eq!(map.insert(6, "new"), None);
        assert_eq!(map.get(&6), Some("new"));
        assert!(map.verify().is_ok());
    }

    #[test]
    fn get_on_empty_map() {
        let map = identity_map::<u32>(0.5);

        assert_eq!(map.get(&0), None);
        assert_eq!(map.get(&42), None);
        assert!(map.is_empty());
    }

    #[test]
    fn colliding_hash_codes_are_distinguished_by_key() {
        // Identity-hashed u64 keys that agree in their low 32 bits collide
        // on the split key and land in the same run of the list.
        let map: SplitOrderedMap<u64, &str, IdentityHash> =
            SplitOrderedMap::with_load_factor_and_hasher(0.5, IdentityHash);
        let low = 9u64;
        let high = 9u64 + (1 << 32);

        assert_eq!(map.insert(low, "low"), None);
        assert_eq!(map.insert(high, "high"), None);
        assert_eq!(map.len(), 2);

        assert_eq!(map.get(&low), Some("low"));
        assert_eq!(map.get(&high), Some("high"));

        assert_eq!(map.remove(&low), Some("low"));
        assert_eq!(map.get(&low), None);
        assert_eq!(map.get(&high), Some("high"));
        assert!(map.verify().is_ok());
    }

    #[test]
    fn many_inserts_stay_consistent() {
        let map = identity_map(0.5);

        for key in 0..512u32 {
            assert_eq!(map.insert(key, key * 10), None);
        }
        assert_eq!(map.len(), 512);
        assert!(map.exponent.load(Ordering::Acquire) >= 9);
        assert!(map.verify().is_ok());

        for key in 0..512u32 {
            assert_eq!(map.get(&key), Some(key * 10));
        }

        for key in (0..512u32).step_by(2) {
            assert_eq!(map.remove(&key), Some(key * 10));
        }
        assert_eq!(map.len(), 256);
        assert!(map.verify().is_ok());

        for key in 0..512u32 {
            let expected = (key % 2 == 1).then_some(key * 10);
            assert_eq!(map.get(&key), expected);
        }
    }

    #[test]
    fn to_map_snapshots_real_entries() {
        let map = identity_map(0.5);
        map.insert(1, "a");
        map.insert(2, "b");
        map.insert(3, "c");
        map.remove(&2);

        let snapshot = map.to_map();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&1), Some(&"a"));
        assert_eq!(snapshot.get(&3), Some(&"c"));
    }

    #[test]
    fn describe_marks_buckets() {
        let map = identity_map(0.5);
        map.insert(1, "a");
        map.insert(2, "b");

        let description = map.describe();
        assert!(description.starts_with("SplitOrderedMap"));
        assert!(description.contains("exponent"));
        // At least bucket 0 is materialized and marked.
        assert!(description.contains('*'));
    }

    #[test]
    fn debug_is_a_summary() {
        let map = identity_map(0.5);
        map.insert(1, "a");

        let rendered = format!("{map:?}");
        assert!(rendered.contains("SplitOrderedMap"));
        assert!(rendered.contains("len: 1"));
    }

    #[test]
    fn load_factor_controls_growth() {
        let relaxed = identity_map(64.0);
        for key in 0..32u32 {
            relaxed.insert(key, key);
        }
        assert_eq!(relaxed.exponent.load(Ordering::Acquire), 0);
        assert!(relaxed.verify().is_ok());

        for key in 0..32u32 {
            assert_eq!(relaxed.get(&key), Some(key));
        }
    }

    #[test]
    #[should_panic(expected = "load factor")]
    fn zero_load_factor_is_rejected() {
        let _ = identity_map::<u32>(0.0);
    }

    #[test]
    fn values_are_dropped_exactly_once() {
        let counter = Arc::new(DropCounter::default());

        {
            let map = identity_map(0.5);

            for key in 0..64u32 {
                map.insert(key, Tracked::new(&counter, key));
            }
            // Replacements displace the previous referent.
            for key in 0..16u32 {
                map.insert(key, Tracked::new(&counter, key + 1000));
            }
            // Conditional replacement displaces one more.
            assert!(map.replace_if_equals(&20, Tracked::new(&counter, 2000), &Tracked::new(&counter, 20)));
            // Removals and losing insert-if-absent attempts free their values.
            for key in 32..48u32 {
                assert!(map.remove(&key).is_some());
            }
            assert!(!map.insert_if_absent(0, Tracked::new(&counter, 3000)));

            drop(map);
        }

        drain_deferred();
        counter.assert_balanced();
    }
}
