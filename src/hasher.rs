//! Mapping keys to bucket indices.

use core::hash::BuildHasher;
use core::hash::Hash;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// Hasher builder used when none is supplied.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else {
        /// Hasher builder used when none is supplied.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    }
}

/// Maps keys to a bucket index in `[0, capacity)`.
///
/// The index is `hash(key) mod capacity`. For a fixed hasher builder and a
/// fixed capacity the mapping is stable; when the table grows the mapping
/// changes deterministically with the new capacity.
#[derive(Clone, Debug, Default)]
pub struct BucketHasher<S = DefaultHashBuilder> {
    hash_builder: S,
}

impl<S> BucketHasher<S> {
    /// Wraps a hasher builder.
    pub fn new(hash_builder: S) -> Self {
        Self { hash_builder }
    }

    /// Returns the wrapped hasher builder.
    pub fn hash_builder(&self) -> &S {
        &self.hash_builder
    }

    /// Unwraps the hasher builder.
    pub fn into_inner(self) -> S {
        self.hash_builder
    }
}

impl<S: BuildHasher> BucketHasher<S> {
    /// Returns the full 64-bit hash of `key`.
    #[inline]
    pub fn hash<K: Hash + ?Sized>(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    /// Returns the bucket `key` belongs to in a table of `capacity` buckets.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use prime_hash::BucketHasher;
    ///
    /// let hasher = BucketHasher::<prime_hash::DefaultHashBuilder>::default();
    /// let index = hasher.index(&42u64, 11);
    /// assert!(index < 11);
    /// assert_eq!(index, hasher.index(&42u64, 11));
    /// ```
    #[inline]
    pub fn index<K: Hash + ?Sized>(&self, key: &K, capacity: usize) -> usize {
        assert!(capacity > 0, "bucket index into an empty table");
        (self.hash(key) % capacity as u64) as usize
    }
}
