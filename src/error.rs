/// The error type returned by [`SplitOrderedMap::verify`][verify] when an
/// integrity check fails.
///
/// Each variant describes the first violation encountered while walking the
/// split-ordered list from bucket zero. A healthy table never produces any of
/// them; they exist to diagnose corruption in tests and debugging sessions.
///
/// [verify]: crate::SplitOrderedMap::verify
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// Two adjacent list nodes are out of split-order.
    #[error("list out of order: split key {first:#010x} is followed by {second:#010x}")]
    OutOfOrder {
        /// Split key of the earlier node.
        first: u32,
        /// Split key of its successor.
        second: u32,
    },

    /// A real (key-carrying) entry is referenced by a directory cell, which
    /// may only ever point at bucket dummies.
    #[error("entry with hash code {hash_code:#010x} is indexed as the dummy for bucket {index}")]
    RealEntryIndexed {
        /// Hash code of the offending entry.
        hash_code: u32,
        /// Logical bucket index whose cell references it.
        index: u32,
    },

    /// A bucket dummy is linked into the list but its directory cell does not
    /// reference it.
    #[error("dummy for bucket {index} is not referenced by its directory cell")]
    DummyNotIndexed {
        /// Logical bucket index of the orphaned dummy.
        index: u32,
    },
}
