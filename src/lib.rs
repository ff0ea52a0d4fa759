#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! A lock-free, concurrently extensible hash table built on split-ordered
//! lists, after Shalev and Shavit's "Split-Ordered Lists: Lock-Free
//! Extensible Hash Tables".
//!
//! Every entry in the table lives on a single lock-free linked list, ordered
//! by the *split key*: the bit-reversed 32-bit hash code of the entry's key,
//! with the low bit set for real entries and cleared for bucket dummies.
//! Reversing the bits turns "append one more bucket bit" into "refine an
//! existing contiguous region of the list", which is what makes the table
//! extensible without moving anything: when the table doubles, each old
//! bucket's region of the list splits in place into the regions of two new
//! buckets.
//!
//! Buckets are shortcuts into that list. A two-level directory maps the low
//! `exponent` bits of a hash code to a *bucket dummy*, a sentinel node that
//! precedes all real entries of its bucket in list order. Dummies are
//! materialized lazily: the first operation to touch a bucket walks to the
//! bucket's parent (the nearest lower index in the split-order tree, itself
//! materialized recursively), splices a fresh dummy into the list, and
//! publishes it in the directory with a compare-and-swap. Racing
//! materializers are harmless; one compare-and-swap wins per cell and a
//! lost list insertion still leaves a correctly ordered dummy behind.
//!
//! Growing the table is equally incremental: once the entry count passes
//! `load_factor * 2^exponent`, one thread publishes a fresh directory
//! sub-array (doubling the number of addressable buckets) and bumps the
//! exponent. No entry is rehashed, no entry moves; the new buckets fill in
//! on demand through the lazy materialization above.
//!
//! All data-path operations are retry loops around compare-and-swaps on the
//! list or on an entry's value slot; there are no locks and the structure is
//! lock-free. Memory reclamation is epoch-based: nodes and displaced values
//! are destroyed only after every thread that could still observe them has
//! moved on.
//!
//! # Example
//!
//! ```
//! use splitmap::SplitOrderedMap;
//!
//! let map = SplitOrderedMap::new();
//!
//! assert_eq!(map.insert("alpha", 1), None);
//! assert_eq!(map.insert("alpha", 2), Some(1));
//! assert!(map.insert_if_absent("beta", 3));
//! assert_eq!(map.get(&"alpha"), Some(2));
//! assert_eq!(map.remove(&"beta"), Some(3));
//! assert_eq!(map.len(), 1);
//! ```

mod error;
mod list;
mod map;

#[cfg(test)]
mod test_util;

pub use error::IntegrityError;
pub use map::{DefaultHashBuilder, SplitOrderedMap};
