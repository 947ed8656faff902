use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::error::Error;
use crate::error::Result;
use crate::hasher::BucketHasher;
use crate::hasher::DefaultHashBuilder;
use crate::prime::MIN_CAPACITY;
use crate::prime::PrimeCapacity;
use crate::prime::exceeds_max_load;
use crate::prime::load_factor;
use crate::table::KeyValueTable;

const DEFAULT_CAPACITY: usize = 11;

/// A separate-chaining hash table with multimap semantics.
///
/// Each of the table's prime number of buckets holds the entries hashing to it
/// in insertion order. Inserting appends to the bucket's chain, so duplicate
/// keys are kept and the earliest one is found first. The table doubles to the
/// next prime whenever an insert pushes the load factor past 3/4.
///
/// ## Example
///
/// ```rust
/// use prime_hash::ChainingTable;
/// use prime_hash::Error;
///
/// let mut table = ChainingTable::new();
/// table.insert("apple", 1);
/// table.insert("pear", 2);
/// table.insert("apple", 3);
///
/// assert_eq!(table.find(&"apple"), Ok(&1));
/// assert_eq!(table.count(&"apple"), 2);
///
/// assert_eq!(table.erase(&"apple"), Ok(1));
/// assert_eq!(table.find(&"apple"), Ok(&3));
/// assert_eq!(table.find(&"plum"), Err(Error::KeyNotFound));
/// ```
#[derive(Clone)]
pub struct ChainingTable<K, V, S = DefaultHashBuilder> {
    buckets: Vec<Vec<(K, V)>>,
    capacity: PrimeCapacity,
    populated: usize,
    hasher: BucketHasher<S>,
}

impl<K, V, S> Debug for ChainingTable<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChainingTable")
            .field("populated", &self.populated)
            .field("capacity", &self.capacity.get())
            .field("entries", &DebugEntries(self))
            .finish()
    }
}

struct DebugEntries<'a, K, V, S>(&'a ChainingTable<K, V, S>);

impl<K: Debug, V: Debug, S> Debug for DebugEntries<'_, K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

fn empty_buckets<K, V>(capacity: PrimeCapacity) -> Vec<Vec<(K, V)>> {
    let mut buckets = Vec::with_capacity(capacity.get());
    buckets.resize_with(capacity.get(), Vec::new);
    buckets
}

impl<K, V, S> ChainingTable<K, V, S> {
    /// Creates a table with `capacity` buckets (rounded up to a prime) and
    /// the given hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        let capacity = PrimeCapacity::from(capacity);
        Self {
            buckets: empty_buckets(capacity),
            capacity,
            populated: 0,
            hasher: BucketHasher::new(hash_builder),
        }
    }

    /// Creates a table with the default number of buckets and the given
    /// hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hash_builder)
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of buckets. Always prime.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Returns `len / capacity`.
    pub fn load_factor(&self) -> f64 {
        load_factor(self.populated, self.capacity.get())
    }

    /// Returns the number of entries chained in bucket `n`, or 0 if `n` is
    /// out of range.
    pub fn bucket_size(&self, n: usize) -> usize {
        self.buckets.get(n).map_or(0, Vec::len)
    }

    /// Returns the table's hasher builder.
    pub fn hasher(&self) -> &S {
        self.hasher.hash_builder()
    }

    /// Removes all entries and frees their chains, keeping the current bucket
    /// count.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = Vec::new();
        }
        log::trace!(
            "cleared chaining table ({} entries, {} buckets)",
            self.populated,
            self.capacity.get()
        );
        self.populated = 0;
    }

    /// Returns an iterator over all entries, bucket by bucket.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use prime_hash::ChainingTable;
    ///
    /// let table: ChainingTable<u32, u32> = (0..10).map(|k| (k, k * k)).collect();
    /// let mut squares: Vec<u32> = table.iter().map(|(_, v)| *v).collect();
    /// squares.sort_unstable();
    /// assert_eq!(squares, vec![0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            chain: Default::default(),
        }
    }

    /// Returns an iterator that removes and yields every entry.
    ///
    /// The table keeps its bucket count. Dropping the iterator early still
    /// removes the remaining entries.
    pub fn drain(&mut self) -> Drain<'_, K, V, S> {
        Drain {
            table: self,
            bucket_index: 0,
            chain: Vec::new().into_iter(),
        }
    }

    #[cfg(feature = "stats")]
    /// Returns occupancy statistics.
    pub fn stats(&self) -> crate::TableStats {
        crate::TableStats {
            populated: self.populated,
            capacity: self.capacity.get(),
            occupied: self.buckets.iter().filter(|b| !b.is_empty()).count(),
            tombstones: 0,
            longest_run: self.buckets.iter().map(Vec::len).max().unwrap_or(0),
            load_factor: self.load_factor(),
        }
    }
}

impl<K, V, S> ChainingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    fn bucket_of(&self, key: &K) -> usize {
        self.hasher.index(key, self.capacity.get())
    }

    /// Appends `(key, value)` to the key's bucket.
    ///
    /// Existing entries with the same key are kept. If the load factor now
    /// exceeds 3/4 the table grows to `next_prime(2 * capacity)` before
    /// returning.
    pub fn insert(&mut self, key: K, value: V) {
        let index = self.bucket_of(&key);
        self.buckets[index].push((key, value));
        self.populated += 1;

        if exceeds_max_load(self.populated, self.capacity.get()) {
            self.resize(self.capacity.doubled());
        }
    }

    /// Returns the value of the earliest inserted entry matching `key`.
    pub fn find(&self, key: &K) -> Result<&V> {
        self.buckets[self.bucket_of(key)]
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or(Error::KeyNotFound)
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(&mut self, key: &K) -> Result<&mut V> {
        let index = self.bucket_of(key);
        self.buckets[index]
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or(Error::KeyNotFound)
    }

    /// Returns `true` if at least one entry matches `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_ok()
    }

    /// Returns the number of entries matching `key`.
    pub fn count(&self, key: &K) -> usize {
        self.buckets[self.bucket_of(key)]
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    /// Returns the bucket holding `key`, if any entry matches it.
    pub fn bucket(&self, key: &K) -> Result<usize> {
        let index = self.bucket_of(key);
        if self.buckets[index].iter().any(|(k, _)| k == key) {
            Ok(index)
        } else {
            Err(Error::KeyNotFound)
        }
    }

    /// Removes the earliest inserted entry matching `key` and returns its
    /// value.
    ///
    /// The bucket count never shrinks on erase.
    pub fn erase(&mut self, key: &K) -> Result<V> {
        let index = self.bucket_of(key);
        let chain = &mut self.buckets[index];
        let position = chain
            .iter()
            .position(|(k, _)| k == key)
            .ok_or(Error::KeyNotFound)?;

        let (_, value) = chain.remove(position);
        self.populated -= 1;
        Ok(value)
    }

    /// Redistributes all entries into `next_prime(target_capacity)` buckets.
    ///
    /// The target is raised if it would leave the load factor above 3/4.
    pub fn rehash(&mut self, target_capacity: usize) {
        self.resize(PrimeCapacity::for_target(target_capacity, self.populated));
    }

    /// Rehashes to `next_prime(2 * capacity)`.
    pub fn grow(&mut self) {
        self.resize(self.capacity.doubled());
    }

    /// Shrinks the bucket array to the smallest prime that keeps the load
    /// factor at or below 3/4.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use prime_hash::ChainingTable;
    ///
    /// let mut table = ChainingTable::with_capacity(1000);
    /// table.insert(1, "one");
    /// table.insert(2, "two");
    ///
    /// table.shrink_to_fit();
    /// assert_eq!(table.capacity(), 3);
    /// assert_eq!(table.find(&2), Ok(&"two"));
    /// ```
    pub fn shrink_to_fit(&mut self) {
        let capacity = PrimeCapacity::for_target(MIN_CAPACITY, self.populated);
        if capacity < self.capacity {
            self.resize(capacity);
        }
    }

    fn resize(&mut self, capacity: PrimeCapacity) {
        let old = core::mem::replace(&mut self.buckets, empty_buckets(capacity));
        let old_capacity = core::mem::replace(&mut self.capacity, capacity);

        // Chains are replayed in order, so duplicates keep their relative order.
        for (key, value) in old.into_iter().flatten() {
            let index = self.bucket_of(&key);
            self.buckets[index].push((key, value));
        }

        log::debug!(
            "rehashed chaining table from {} to {} buckets ({} entries)",
            old_capacity.get(),
            capacity.get(),
            self.populated
        );
    }
}

impl<K, V> ChainingTable<K, V, DefaultHashBuilder> {
    /// Creates an empty table with 11 buckets.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty table with `capacity` buckets, rounded up to a prime.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> Default for ChainingTable<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Extend<(K, V)> for ChainingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for ChainingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::default();
        table.extend(iter);
        table
    }
}

impl<K, V, S> KeyValueTable<K, V> for ChainingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn insert(&mut self, key: K, value: V) {
        ChainingTable::insert(self, key, value);
    }

    fn find(&self, key: &K) -> Result<V>
    where
        V: Clone,
    {
        ChainingTable::find(self, key).cloned()
    }

    fn erase(&mut self, key: &K) -> Result<()> {
        ChainingTable::erase(self, key).map(drop)
    }

    fn count(&self, key: &K) -> usize {
        ChainingTable::count(self, key)
    }

    fn len(&self) -> usize {
        self.populated
    }

    fn capacity(&self) -> usize {
        self.capacity.get()
    }

    fn clear(&mut self) {
        ChainingTable::clear(self);
    }

    fn rehash(&mut self, target_capacity: usize) {
        ChainingTable::rehash(self, target_capacity);
    }

    fn grow(&mut self) {
        ChainingTable::grow(self);
    }
}

/// An iterator over the entries of a [`ChainingTable`].
pub struct Iter<'a, K, V> {
    buckets: core::slice::Iter<'a, Vec<(K, V)>>,
    chain: core::slice::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((k, v)) = self.chain.next() {
                return Some((k, v));
            }
            self.chain = self.buckets.next()?.iter();
        }
    }
}

/// A draining iterator over the entries of a [`ChainingTable`].
pub struct Drain<'a, K, V, S> {
    table: &'a mut ChainingTable<K, V, S>,
    bucket_index: usize,
    chain: alloc::vec::IntoIter<(K, V)>,
}

impl<K, V, S> Iterator for Drain<'_, K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.chain.next() {
                self.table.populated -= 1;
                return Some(entry);
            }

            let bucket = self.table.buckets.get_mut(self.bucket_index)?;
            self.chain = core::mem::take(bucket).into_iter();
            self.bucket_index += 1;
        }
    }
}

impl<K, V, S> Drop for Drain<'_, K, V, S> {
    fn drop(&mut self) {
        for _ in self {}
    }
}
