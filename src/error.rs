/// Errors reported by table operations.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No live entry matches the requested key.
    #[error("key not in hash table")]
    KeyNotFound,

    /// A probe visited every slot without finding an empty one.
    ///
    /// No operation returns this variant as an `Err`. It is the panic message
    /// of [`ConcurrentProbingTable::insert`](crate::ConcurrentProbingTable::insert)
    /// and of the single-threaded inserts, which
    /// [`ConcurrentProbingTable::try_insert`](crate::ConcurrentProbingTable::try_insert)
    /// avoids by handing the entry back instead.
    ///
    /// This only happens when the 3/4 load-factor bound was not maintained,
    /// e.g. when workers keep inserting into a
    /// [`ConcurrentProbingTable`](crate::ConcurrentProbingTable) without ever
    /// calling [`check_rehash`](crate::ConcurrentProbingTable::check_rehash).
    #[error(
        "probe wrapped all {capacity} slots without finding an empty one; \
    the load factor bound was not maintained"
    )]
    InvariantViolation {
        /// Number of slots in the table at the time of the probe.
        capacity: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Logs and panics on an exhausted probe.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn invariant_violation(capacity: usize) -> ! {
    let err = Error::InvariantViolation { capacity };
    log::error!("{err}");
    panic!("{err}");
}
