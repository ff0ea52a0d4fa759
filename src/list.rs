//! An ordered lock-free singly linked list.
//!
//! The list holds nodes in ascending payload order and supports three atomic
//! primitives: positioning a three-pointer cursor with [`search`], splicing a
//! new node between an observed pair of neighbors with [`add_before`], and
//! logically deleting a node with [`do_remove`].
//!
//! Deletion is logical-then-physical. `do_remove` sets a tag bit on the
//! victim's own `next` pointer; the node stays reachable until a later
//! `search` passes over it, unlinks it from its predecessor with a
//! compare-and-swap, and defers its destruction through the epoch guard. A
//! node whose `next` pointer carries [`DELETED_TAG`] compares as absent to
//! every subsequent operation.
//!
//! The list does not own a head pointer. Callers anchor traversals at a node
//! of their choosing (the hash table anchors at bucket dummies), which must
//! itself never be removed.

use std::cmp;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{Atomic, CompareExchangeError, Guard, Owned, Shared};

/// Tag bit set on a node's `next` pointer when the node is logically deleted.
pub(crate) const DELETED_TAG: usize = 0b1;

/// A list node. Once linked, `entry` is immutable; all mutation goes through
/// the `next` pointer.
pub(crate) struct Node<T> {
    pub(crate) entry: T,
    pub(crate) next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    pub(crate) fn new(entry: T) -> Self {
        Self {
            entry,
            next: Atomic::null(),
        }
    }
}

/// A consistent position in the list, as returned by [`search`].
///
/// `node` is the first node whose entry compares equal to the search target,
/// or null if there is none. In either case `left` and `right` bracket the
/// insertion point for the target: `left` precedes it and `right` is the
/// observed successor of `left` (or of `node` when one was found).
pub(crate) struct Cursor<'g, T> {
    pub(crate) left: Shared<'g, Node<T>>,
    pub(crate) node: Shared<'g, Node<T>>,
    pub(crate) right: Shared<'g, Node<T>>,
}

/// Positions a cursor at the first node at or after `from` whose entry
/// compares equal to `target`.
///
/// Any node observed with its deleted tag set is unlinked in passing and its
/// destruction deferred on `guard`. If the unlinking CAS fails the search
/// restarts from `from`, so the returned cursor is always a consistent
/// snapshot taken after all helping has succeeded.
///
/// `from` must be a live node; it is the caller's responsibility that anchor
/// nodes are never removed.
pub(crate) fn search<'g, T: Ord>(
    from: Shared<'g, Node<T>>,
    target: &T,
    guard: &'g Guard,
) -> Cursor<'g, T> {
    'retry: loop {
        let mut left = from;
        let mut curr = unsafe { left.deref() }
            .next
            .load(Ordering::Acquire, guard)
            .with_tag(0);

        loop {
            let Some(curr_ref) = (unsafe { curr.as_ref() }) else {
                return Cursor {
                    left,
                    node: Shared::null(),
                    right: Shared::null(),
                };
            };

            let succ = curr_ref.next.load(Ordering::Acquire, guard);

            if succ.tag() & DELETED_TAG != 0 {
                // `curr` is logically deleted. Unlink it before looking at
                // its entry. The expected value is the untagged `curr`, so
                // this fails (and we restart) if `left` was itself deleted
                // or re-linked in the meantime.
                let left_ref = unsafe { left.deref() };
                match left_ref.next.compare_exchange(
                    curr,
                    succ.with_tag(0),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                    guard,
                ) {
                    Ok(_) => {
                        unsafe { guard.defer_destroy(curr) };
                        curr = succ.with_tag(0);
                        continue;
                    }
                    Err(_) => continue 'retry,
                }
            }

            match curr_ref.entry.cmp(target) {
                cmp::Ordering::Less => {
                    left = curr;
                    curr = succ;
                }
                cmp::Ordering::Equal => {
                    return Cursor {
                        left,
                        node: curr,
                        right: succ,
                    }
                }
                cmp::Ordering::Greater => {
                    return Cursor {
                        left,
                        node: Shared::null(),
                        right: curr,
                    }
                }
            }
        }
    }
}

/// Atomically splices `node` in between `left` and `right`.
///
/// Succeeds only if `left.next` still equals the untagged `right`, which
/// rules out `left` having been deleted (its tag would differ) or another
/// node having been inserted. On failure the allocation is handed back so
/// retry loops can reuse it.
pub(crate) fn add_before<'g, T>(
    node: Owned<Node<T>>,
    left: Shared<'g, Node<T>>,
    right: Shared<'g, Node<T>>,
    guard: &'g Guard,
) -> Result<Shared<'g, Node<T>>, Owned<Node<T>>> {
    node.next.store(right, Ordering::Relaxed);

    let left_ref = unsafe { left.deref() };
    match left_ref
        .next
        .compare_exchange(right, node, Ordering::AcqRel, Ordering::Relaxed, guard)
    {
        Ok(inserted) => Ok(inserted),
        Err(CompareExchangeError { new, .. }) => Err(new),
    }
}

/// Logically deletes `node` by tagging its `next` pointer.
///
/// Exactly one of any number of concurrent callers returns `true`. Physical
/// unlinking is left to later searches.
pub(crate) fn do_remove<'g, T>(node: Shared<'g, Node<T>>, guard: &'g Guard) -> bool {
    let node_ref = unsafe { node.deref() };

    loop {
        let succ = node_ref.next.load(Ordering::Acquire, guard);
        if succ.tag() & DELETED_TAG != 0 {
            return false;
        }

        if node_ref
            .next
            .compare_exchange(
                succ,
                succ.with_tag(DELETED_TAG),
                Ordering::AcqRel,
                Ordering::Relaxed,
                guard,
            )
            .is_ok()
        {
            return true;
        }
    }
}

/// Returns the current live successor of `node`, skipping over logically
/// deleted nodes without unlinking them.
pub(crate) fn next<'g, T>(node: Shared<'g, Node<T>>, guard: &'g Guard) -> Shared<'g, Node<T>> {
    let mut curr = unsafe { node.deref() }
        .next
        .load(Ordering::Acquire, guard)
        .with_tag(0);

    loop {
        let Some(curr_ref) = (unsafe { curr.as_ref() }) else {
            return Shared::null();
        };

        let succ = curr_ref.next.load(Ordering::Acquire, guard);
        if succ.tag() & DELETED_TAG == 0 {
            return curr;
        }

        curr = succ.with_tag(0);
    }
}
