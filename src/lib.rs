#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

extern crate alloc;

/// A hash table that resolves collisions with per-bucket chains.
///
/// Duplicate keys are kept in insertion order within their chain.
pub mod chaining;

/// A linear-probing hash table that accepts inserts from many threads.
pub mod concurrent;

/// Errors returned by table operations.
pub mod error;

pub mod hasher;

pub mod prime;

mod probe;

/// A single-threaded linear-probing hash table with tombstone deletion.
pub mod probing;

/// The operations shared by every table variant.
pub mod table;

#[cfg(feature = "stats")]
mod stats;

#[cfg(test)]
mod test_util;

pub use chaining::ChainingTable;
pub use concurrent::ConcurrentProbingTable;
pub use error::Error;
pub use error::Result;
pub use hasher::BucketHasher;
pub use hasher::DefaultHashBuilder;
pub use prime::is_prime;
pub use prime::next_prime;
pub use probing::ProbingTable;
#[cfg(feature = "stats")]
pub use stats::TableStats;
pub use table::KeyValueTable;
