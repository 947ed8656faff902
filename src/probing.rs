use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::error::Error;
use crate::error::Result;
use crate::error::invariant_violation;
use crate::hasher::BucketHasher;
use crate::hasher::DefaultHashBuilder;
use crate::prime::MIN_CAPACITY;
use crate::prime::PrimeCapacity;
use crate::prime::exceeds_max_load;
use crate::prime::load_factor;
use crate::probe::Probe;
use crate::table::KeyValueTable;

const DEFAULT_CAPACITY: usize = 11;

/// State of one slot in a [`ProbingTable`].
#[derive(Clone, Debug)]
enum Slot<K, V> {
    /// Never written since the last rehash or clear. Ends every probe.
    Empty,
    Valid(K, V),
    /// Tombstone left by an erase. Probes continue past it; inserts may reuse
    /// it.
    Deleted,
}

impl<K, V> Slot<K, V> {
    #[inline(always)]
    fn is_valid(&self) -> bool {
        matches!(self, Slot::Valid(..))
    }
}

/// An open-addressing hash table using linear probing and lazy deletion.
///
/// All entries live in one flat array of a prime number of slots. A key
/// hashes to a start slot and the table scans forward from there, wrapping at
/// the end of the array:
///
/// - `insert` writes into the first slot that is not live (empty or a
///   tombstone).
/// - `find` and `erase` skip tombstones and give up at the first empty slot.
/// - `erase` leaves a tombstone behind instead of shifting other entries.
///
/// Duplicate keys occupy distinct slots, and the first live match in probe
/// order wins. Tombstones are dropped whenever the table is rehashed. After
/// every insert the table rehashes if live entries exceed 3/4 of the slots
/// (growing to `next_prime(2 * capacity)`), or if live entries and tombstones
/// together do (rehashing in place), so every probe is guaranteed to meet an
/// empty slot.
///
/// ## Example
///
/// ```rust
/// use prime_hash::Error;
/// use prime_hash::ProbingTable;
///
/// let mut table = ProbingTable::with_capacity(11);
/// for key in 1..=8 {
///     table.insert(key, key * 100);
/// }
/// assert_eq!(table.capacity(), 11);
///
/// // The ninth entry pushes the load factor past 3/4.
/// table.insert(9, 900);
/// assert_eq!(table.capacity(), 23);
///
/// assert_eq!(table.erase(&4), Ok(400));
/// assert_eq!(table.find(&4), Err(Error::KeyNotFound));
/// assert_eq!(table.tombstones(), 1);
/// ```
#[derive(Clone)]
pub struct ProbingTable<K, V, S = DefaultHashBuilder> {
    slots: Vec<Slot<K, V>>,
    capacity: PrimeCapacity,
    populated: usize,
    tombstones: usize,
    hasher: BucketHasher<S>,
}

impl<K, V, S> Debug for ProbingTable<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        struct Slots<'a, K, V>(&'a [Slot<K, V>]);

        impl<K: Debug, V: Debug> Debug for Slots<'_, K, V> {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut list = f.debug_list();
                for slot in self.0 {
                    match slot {
                        Slot::Empty => list.entry(&format_args!("..")),
                        Slot::Deleted => list.entry(&format_args!("xx")),
                        Slot::Valid(k, v) => list.entry(&(k, v)),
                    };
                }
                list.finish()
            }
        }

        f.debug_struct("ProbingTable")
            .field("populated", &self.populated)
            .field("tombstones", &self.tombstones)
            .field("capacity", &self.capacity.get())
            .field("slots", &Slots(&self.slots))
            .finish()
    }
}

fn empty_slots<K, V>(capacity: PrimeCapacity) -> Vec<Slot<K, V>> {
    let mut slots = Vec::with_capacity(capacity.get());
    slots.resize_with(capacity.get(), || Slot::Empty);
    slots
}

impl<K, V, S> ProbingTable<K, V, S> {
    /// Creates a table with `capacity` slots (rounded up to a prime) and the
    /// given hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        let capacity = PrimeCapacity::from(capacity);
        Self {
            slots: empty_slots(capacity),
            capacity,
            populated: 0,
            tombstones: 0,
            hasher: BucketHasher::new(hash_builder),
        }
    }

    /// Creates a table with the default number of slots and the given hasher
    /// builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hash_builder)
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of slots. Always prime.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Returns `len / capacity`. Tombstones do not count.
    pub fn load_factor(&self) -> f64 {
        load_factor(self.populated, self.capacity.get())
    }

    /// Returns the number of tombstones currently held.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Returns 1 if slot `n` holds a live entry, 0 otherwise (including when
    /// `n` is out of range).
    pub fn bucket_size(&self, n: usize) -> usize {
        self.slots.get(n).map_or(0, |slot| slot.is_valid() as usize)
    }

    /// Returns the table's hasher builder.
    pub fn hasher(&self) -> &S {
        self.hasher.hash_builder()
    }

    /// Removes all entries and tombstones, keeping the current capacity.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = Slot::Empty;
        }
        log::trace!(
            "cleared probing table ({} entries, {} tombstones, {} slots)",
            self.populated,
            self.tombstones,
            self.capacity.get()
        );
        self.populated = 0;
        self.tombstones = 0;
    }

    /// Returns an iterator over all live entries in slot order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots.iter(),
        }
    }

    /// Returns an iterator that removes and yields every live entry.
    ///
    /// Tombstones are cleared as well. Dropping the iterator early still
    /// empties the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use prime_hash::ProbingTable;
    ///
    /// let mut table: ProbingTable<u32, &str> = [(1, "a"), (2, "b")].into_iter().collect();
    /// table.erase(&1).unwrap();
    ///
    /// let drained: Vec<(u32, &str)> = table.drain().collect();
    /// assert_eq!(drained, vec![(2, "b")]);
    /// assert!(table.is_empty());
    /// assert_eq!(table.tombstones(), 0);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V, S> {
        Drain {
            table: self,
            slot_index: 0,
        }
    }

    #[cfg(feature = "stats")]
    /// Returns occupancy statistics.
    pub fn stats(&self) -> crate::TableStats {
        crate::TableStats {
            populated: self.populated,
            capacity: self.capacity.get(),
            occupied: self.slots.iter().filter(|s| s.is_valid()).count(),
            tombstones: self.tombstones,
            longest_run: crate::stats::longest_wrapping_run(
                self.slots.iter().map(|s| !matches!(s, Slot::Empty)),
            ),
            load_factor: self.load_factor(),
        }
    }
}

impl<K, V, S> ProbingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    fn probe(&self, key: &K) -> Probe {
        let capacity = self.capacity.get();
        Probe::start(self.hasher.index(key, capacity), capacity)
    }

    /// Index of the first live slot matching `key`.
    ///
    /// A scan that visits every slot without meeting an empty one is still a
    /// complete search, so it reports a miss rather than an error.
    fn position(&self, key: &K) -> Option<usize> {
        for index in self.probe(key) {
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Valid(k, _) if k == key => return Some(index),
                _ => {}
            }
        }
        None
    }

    /// Writes `(key, value)` into the first non-live slot of its probe
    /// sequence.
    ///
    /// Duplicate keys are kept in separate slots. If live entries now exceed
    /// 3/4 of the slots the table grows to `next_prime(2 * capacity)`; if
    /// live entries plus tombstones do, it rehashes in place to drop the
    /// tombstones.
    ///
    /// # Panics
    ///
    /// Panics with [`Error::InvariantViolation`] if the probe finds no free
    /// slot, which the growth policy rules out.
    pub fn insert(&mut self, key: K, value: V) {
        let index = self
            .probe(&key)
            .find(|&index| !self.slots[index].is_valid())
            .unwrap_or_else(|| invariant_violation(self.capacity.get()));

        if let Slot::Deleted = self.slots[index] {
            self.tombstones -= 1;
        }
        self.slots[index] = Slot::Valid(key, value);
        self.populated += 1;

        let capacity = self.capacity.get();
        if exceeds_max_load(self.populated, capacity) {
            self.resize(self.capacity.doubled());
        } else if exceeds_max_load(self.populated + self.tombstones, capacity) {
            self.resize(self.capacity);
        }
    }

    /// Returns the value of the first live entry matching `key` in probe
    /// order.
    pub fn find(&self, key: &K) -> Result<&V> {
        match self.position(key).map(|index| &self.slots[index]) {
            Some(Slot::Valid(_, value)) => Ok(value),
            _ => Err(Error::KeyNotFound),
        }
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(&mut self, key: &K) -> Result<&mut V> {
        let index = self.position(key).ok_or(Error::KeyNotFound)?;
        match &mut self.slots[index] {
            Slot::Valid(_, value) => Ok(value),
            _ => Err(Error::KeyNotFound),
        }
    }

    /// Returns `true` if at least one live entry matches `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.position(key).is_some()
    }

    /// Returns the number of live entries matching `key`.
    pub fn count(&self, key: &K) -> usize {
        let mut total = 0;
        for index in self.probe(key) {
            match &self.slots[index] {
                Slot::Empty => break,
                Slot::Valid(k, _) if k == key => total += 1,
                _ => {}
            }
        }
        total
    }

    /// Returns the slot holding the first live entry matching `key`.
    pub fn bucket(&self, key: &K) -> Result<usize> {
        self.position(key).ok_or(Error::KeyNotFound)
    }

    /// Replaces the first live entry matching `key` with a tombstone and
    /// returns its value.
    pub fn erase(&mut self, key: &K) -> Result<V> {
        let index = self.position(key).ok_or(Error::KeyNotFound)?;
        match core::mem::replace(&mut self.slots[index], Slot::Deleted) {
            Slot::Valid(_, value) => {
                self.populated -= 1;
                self.tombstones += 1;
                Ok(value)
            }
            _ => unreachable!("position only returns live slots"),
        }
    }

    /// Reinserts every live entry into `next_prime(target_capacity)` slots,
    /// dropping all tombstones.
    ///
    /// The target is raised if it would leave the load factor above 3/4.
    pub fn rehash(&mut self, target_capacity: usize) {
        self.resize(PrimeCapacity::for_target(target_capacity, self.populated));
    }

    /// Rehashes to `next_prime(2 * capacity)`.
    pub fn grow(&mut self) {
        self.resize(self.capacity.doubled());
    }

    /// Shrinks to the smallest prime capacity that keeps the load factor at
    /// or below 3/4.
    pub fn shrink_to_fit(&mut self) {
        let capacity = PrimeCapacity::for_target(MIN_CAPACITY, self.populated);
        if capacity < self.capacity {
            self.resize(capacity);
        }
    }

    fn resize(&mut self, capacity: PrimeCapacity) {
        let old = core::mem::replace(&mut self.slots, empty_slots(capacity));
        let old_capacity = core::mem::replace(&mut self.capacity, capacity);
        let reclaimed = core::mem::take(&mut self.tombstones);

        let mut reinserted = 0;
        for slot in old {
            if let Slot::Valid(key, value) = slot {
                let index = self
                    .probe(&key)
                    .find(|&index| matches!(self.slots[index], Slot::Empty))
                    .unwrap_or_else(|| invariant_violation(capacity.get()));
                self.slots[index] = Slot::Valid(key, value);
                reinserted += 1;
            }
        }
        debug_assert_eq!(reinserted, self.populated);
        self.populated = reinserted;

        log::debug!(
            "rehashed probing table from {} to {} slots ({} entries, {} tombstones dropped)",
            old_capacity.get(),
            capacity.get(),
            reinserted,
            reclaimed
        );
    }
}

impl<K, V> ProbingTable<K, V, DefaultHashBuilder> {
    /// Creates an empty table with 11 slots.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty table with `capacity` slots, rounded up to a prime.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> Default for ProbingTable<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Extend<(K, V)> for ProbingTable<K, V, S>
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

impl<K, V, S> FromIterator<(K, V)> for ProbingTable<K, V, S>
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

impl<K, V, S> KeyValueTable<K, V> for ProbingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn insert(&mut self, key: K, value: V) {
        ProbingTable::insert(self, key, value);
    }

    fn find(&self, key: &K) -> Result<V>
    where
        V: Clone,
    {
        ProbingTable::find(self, key).cloned()
    }

    fn erase(&mut self, key: &K) -> Result<()> {
        ProbingTable::erase(self, key).map(drop)
    }

    fn count(&self, key: &K) -> usize {
        ProbingTable::count(self, key)
    }

    fn len(&self) -> usize {
        self.populated
    }

    fn capacity(&self) -> usize {
        self.capacity.get()
    }

    fn clear(&mut self) {
        ProbingTable::clear(self);
    }

    fn rehash(&mut self, target_capacity: usize) {
        ProbingTable::rehash(self, target_capacity);
    }

    fn grow(&mut self) {
        ProbingTable::grow(self);
    }
}

impl<K, V, S> From<crate::ConcurrentProbingTable<K, V, S>> for ProbingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Reinserts the live entries of a concurrent table once its workers are
    /// done. Tombstones are dropped.
    fn from(table: crate::ConcurrentProbingTable<K, V, S>) -> Self {
        let (capacity, hash_builder, entries) = table.into_parts();
        let mut probing = Self::with_capacity_and_hasher(capacity, hash_builder);
        probing.extend(entries);
        probing
    }
}

/// An iterator over the live entries of a [`ProbingTable`].
pub struct Iter<'a, K, V> {
    slots: core::slice::Iter<'a, Slot<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.slots.find_map(|slot| match slot {
            Slot::Valid(k, v) => Some((k, v)),
            _ => None,
        })
    }
}

/// A draining iterator over the live entries of a [`ProbingTable`].
pub struct Drain<'a, K, V, S> {
    table: &'a mut ProbingTable<K, V, S>,
    slot_index: usize,
}

impl<K, V, S> Iterator for Drain<'_, K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(slot) = self.table.slots.get_mut(self.slot_index) {
            self.slot_index += 1;
            match core::mem::replace(slot, Slot::Empty) {
                Slot::Valid(key, value) => {
                    self.table.populated -= 1;
                    return Some((key, value));
                }
                Slot::Deleted => self.table.tombstones -= 1,
                Slot::Empty => {}
            }
        }
        None
    }
}

impl<K, V, S> Drop for Drain<'_, K, V, S> {
    fn drop(&mut self) {
        for _ in self {}
    }
}
