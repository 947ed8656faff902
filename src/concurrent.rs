use core::cell::UnsafeCell;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::mem::MaybeUninit;
use core::sync::atomic::AtomicU8;
use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering;

use crossbeam_utils::Backoff;
use parking_lot::RwLock;
use parking_lot::RwLockUpgradableReadGuard;

use crate::error::Error;
use crate::error::Result;
use crate::error::invariant_violation;
use crate::hasher::BucketHasher;
use crate::hasher::DefaultHashBuilder;
use crate::prime::PrimeCapacity;
use crate::prime::exceeds_max_load;
use crate::prime::load_factor;
use crate::probe::Probe;
use crate::probing::ProbingTable;
use crate::table::KeyValueTable;

const DEFAULT_CAPACITY: usize = 101;

// Slot states. Transitions under shared access are EMPTY -> CLAIMED -> VALID
// -> DELETED; everything else happens under exclusive access.
const EMPTY: u8 = 0;
const CLAIMED: u8 = 1;
const VALID: u8 = 2;
const DELETED: u8 = 3;

/// A slot in the table.
///
/// The entry is initialized exactly when the state is VALID or DELETED.
/// Tombstones keep their entry alive until the next exclusive operation, so a
/// reader that saw VALID can keep using the entry after a concurrent erase.
struct Slot<K, V> {
    state: AtomicU8,
    entry: UnsafeCell<MaybeUninit<(K, V)>>,
}

// SAFETY: An entry is written once, by the thread that won the EMPTY -> CLAIMED
// exchange, and published with a release store of VALID. Shared readers only
// touch entries after an acquire load of VALID or DELETED, and entries are
// moved or dropped only through `&mut`.
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Slot<K, V> {}

impl<K, V> Slot<K, V> {
    fn empty() -> Self {
        Slot {
            state: AtomicU8::new(EMPTY),
            entry: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Attempts to take ownership of an empty slot.
    ///
    /// Exactly one of any number of racing callers succeeds.
    #[inline]
    fn try_claim(&self) -> bool {
        self.state.load(Ordering::Relaxed) == EMPTY
            && self
                .state
                .compare_exchange(EMPTY, CLAIMED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
    }

    /// Writes the entry and makes it visible to readers.
    ///
    /// # Safety
    ///
    /// The caller must have won [`try_claim`](Self::try_claim) on this slot.
    #[inline]
    unsafe fn publish(&self, key: K, value: V) {
        // SAFETY: The claim gives this thread sole access to the entry until
        // VALID is stored.
        unsafe { (*self.entry.get()).write((key, value)) };
        self.state.store(VALID, Ordering::Release);
    }

    /// Loads the state, waiting out a claim that is still being published.
    #[inline]
    fn settled_state(&self) -> u8 {
        let backoff = Backoff::new();
        loop {
            let state = self.state.load(Ordering::Acquire);
            if state != CLAIMED {
                return state;
            }
            backoff.snooze();
        }
    }

    /// # Safety
    ///
    /// The caller must have observed VALID or DELETED with acquire ordering
    /// while holding shared or exclusive access to the storage.
    #[inline]
    unsafe fn entry(&self) -> &(K, V) {
        // SAFETY: Guaranteed initialized by the caller's state observation.
        unsafe { (*self.entry.get()).assume_init_ref() }
    }

    /// Empties the slot, returning its live entry and dropping a tombstoned
    /// one.
    fn take(&mut self) -> Option<(K, V)> {
        let state = core::mem::replace(self.state.get_mut(), EMPTY);
        match state {
            // SAFETY: VALID slots hold an initialized entry, and the state is
            // now EMPTY so it will not be read or dropped again.
            VALID => Some(unsafe { self.entry.get_mut().assume_init_read() }),
            DELETED => {
                // SAFETY: Tombstones keep their entry initialized until here,
                // and the state is now EMPTY so it is dropped exactly once.
                unsafe { self.entry.get_mut().assume_init_drop() };
                None
            }
            _ => None,
        }
    }

    fn place(&mut self, key: K, value: V) {
        debug_assert_eq!(*self.state.get_mut(), EMPTY);
        self.entry.get_mut().write((key, value));
        *self.state.get_mut() = VALID;
    }
}

impl<K, V> Drop for Slot<K, V> {
    fn drop(&mut self) {
        self.take();
    }
}

/// The table's backing array. Its identity only changes under the write lock.
struct Storage<K, V> {
    slots: Box<[Slot<K, V>]>,
    capacity: PrimeCapacity,
    populated: AtomicUsize,
    tombstones: AtomicUsize,
}

impl<K, V> Storage<K, V> {
    fn new(capacity: PrimeCapacity) -> Self {
        Storage {
            slots: (0..capacity.get()).map(|_| Slot::empty()).collect(),
            capacity,
            populated: AtomicUsize::new(0),
            tombstones: AtomicUsize::new(0),
        }
    }

    fn len(&self) -> usize {
        self.populated.load(Ordering::Relaxed)
    }

    fn tombstones(&self) -> usize {
        self.tombstones.load(Ordering::Relaxed)
    }

    /// Capacity the next [`check_rehash`](ConcurrentProbingTable::check_rehash)
    /// should rebuild at, if any.
    fn rehash_target(&self) -> Option<PrimeCapacity> {
        let capacity = self.capacity.get();
        let populated = self.len();
        if exceeds_max_load(populated, capacity) {
            Some(self.capacity.doubled())
        } else if exceeds_max_load(populated + self.tombstones(), capacity) {
            Some(self.capacity)
        } else {
            None
        }
    }

    fn probe<S: BuildHasher, Q: Hash + ?Sized>(&self, hasher: &BucketHasher<S>, key: &Q) -> Probe {
        let capacity = self.capacity.get();
        Probe::start(hasher.index(key, capacity), capacity)
    }

    fn try_insert<S>(&self, hasher: &BucketHasher<S>, key: K, value: V) -> core::result::Result<(), (K, V)>
    where
        K: Hash,
        S: BuildHasher,
    {
        for index in self.probe(hasher, &key) {
            let slot = &self.slots[index];
            if slot.try_claim() {
                // SAFETY: The claim above succeeded.
                unsafe { slot.publish(key, value) };
                self.populated.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }
        Err((key, value))
    }

    /// Index of the first slot that was VALID and matched `key` when visited.
    fn position<S>(&self, hasher: &BucketHasher<S>, key: &K) -> Option<usize>
    where
        K: Hash + Eq,
        S: BuildHasher,
    {
        for index in self.probe(hasher, key) {
            let slot = &self.slots[index];
            match slot.settled_state() {
                EMPTY => return None,
                // SAFETY: VALID was observed with acquire ordering.
                VALID if unsafe { &slot.entry().0 } == key => return Some(index),
                _ => {}
            }
        }
        None
    }

    fn count<S>(&self, hasher: &BucketHasher<S>, key: &K) -> usize
    where
        K: Hash + Eq,
        S: BuildHasher,
    {
        let mut total = 0;
        for index in self.probe(hasher, key) {
            let slot = &self.slots[index];
            match slot.settled_state() {
                EMPTY => break,
                // SAFETY: VALID was observed with acquire ordering.
                VALID if unsafe { &slot.entry().0 } == key => total += 1,
                _ => {}
            }
        }
        total
    }

    fn erase<S>(&self, hasher: &BucketHasher<S>, key: &K) -> Result<()>
    where
        K: Hash + Eq,
        S: BuildHasher,
    {
        for index in self.probe(hasher, key) {
            let slot = &self.slots[index];
            match slot.settled_state() {
                EMPTY => break,
                // SAFETY: VALID was observed with acquire ordering.
                VALID if unsafe { &slot.entry().0 } == key => {
                    // Losing this exchange means a peer erased the same entry;
                    // keep looking for another match.
                    if slot
                        .state
                        .compare_exchange(VALID, DELETED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.populated.fetch_sub(1, Ordering::Relaxed);
                        self.tombstones.fetch_add(1, Ordering::Relaxed);
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(Error::KeyNotFound)
    }

    /// Rebuilds the storage at `capacity`, dropping tombstones.
    fn resize<S>(&mut self, hasher: &BucketHasher<S>, capacity: PrimeCapacity)
    where
        K: Hash,
        S: BuildHasher,
    {
        let old_capacity = self.capacity;
        let reclaimed = self.tombstones();
        let mut fresh = Storage::new(capacity);

        let mut reinserted = 0;
        for slot in self.slots.iter_mut() {
            if let Some((key, value)) = slot.take() {
                let index = fresh
                    .probe(hasher, &key)
                    .find(|&index| fresh.slots[index].state.load(Ordering::Relaxed) == EMPTY)
                    .unwrap_or_else(|| invariant_violation(capacity.get()));
                fresh.slots[index].place(key, value);
                reinserted += 1;
            }
        }
        *fresh.populated.get_mut() = reinserted;
        *self = fresh;

        log::debug!(
            "rehashed concurrent probing table from {} to {} slots ({} entries, {} tombstones dropped)",
            old_capacity.get(),
            capacity.get(),
            reinserted,
            reclaimed
        );
    }
}

/// A linear-probing hash table that accepts inserts from many threads at
/// once.
///
/// Storage and probing match [`ProbingTable`]: a flat array of a prime number
/// of slots, scanned linearly from the key's hash with wraparound. The
/// difference is in how slots are written:
///
/// - [`insert`](Self::insert), [`find`](Self::find) and
///   [`erase`](Self::erase) take `&self` and can run on any number of threads
///   at once. An insert claims an empty slot with a single compare-and-swap
///   on that slot's state, so two threads racing for the same slot never both
///   win; the loser keeps probing forward.
/// - Growth is not automatic. Call [`check_rehash`](Self::check_rehash) to
///   rebuild the table when live entries exceed 3/4 of the slots. Rebuilding
///   holds the table's write lock, so no insert, find or erase observes the
///   array while it is being replaced, and only one thread performs a given
///   doubling.
/// - Concurrent inserts only claim empty slots. Tombstones left by `erase`
///   are reclaimed by the next rebuild, which `check_rehash` also triggers
///   when live entries and tombstones together exceed 3/4 of the slots.
///
/// Only the end state of concurrent inserts is defined: once every worker
/// has finished, `len` equals the number of inserts and every inserted key is
/// findable.
///
/// ## Example
///
/// ```rust
/// use prime_hash::ConcurrentProbingTable;
///
/// let table = ConcurrentProbingTable::new();
///
/// std::thread::scope(|s| {
///     for worker in 0..4u64 {
///         let table = &table;
///         s.spawn(move || {
///             for key in worker * 1000..(worker + 1) * 1000 {
///                 table.insert(key, key);
///                 table.check_rehash();
///             }
///         });
///     }
/// });
///
/// assert_eq!(table.len(), 4000);
/// assert_eq!(table.find(&1234), Ok(1234));
/// assert!(table.load_factor() <= 0.75);
/// ```
///
/// ## Growth cadence
///
/// Workers that insert without calling `check_rehash` often enough can fill
/// every empty slot. [`try_insert`](Self::try_insert) then hands the entry
/// back, and [`insert`](Self::insert) panics with
/// [`Error::InvariantViolation`]. Calling `check_rehash` after each insert is
/// cheap when no growth is due: it takes the shared lock and reads two
/// counters.
pub struct ConcurrentProbingTable<K, V, S = DefaultHashBuilder> {
    storage: RwLock<Storage<K, V>>,
    hasher: BucketHasher<S>,
}

impl<K, V, S> Debug for ConcurrentProbingTable<K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let storage = self.storage.read();
        f.debug_struct("ConcurrentProbingTable")
            .field("populated", &storage.len())
            .field("tombstones", &storage.tombstones())
            .field("capacity", &storage.capacity.get())
            .finish()
    }
}

impl<K, V, S> ConcurrentProbingTable<K, V, S> {
    /// Creates a table with `capacity` slots (rounded up to a prime) and the
    /// given hasher builder.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            storage: RwLock::new(Storage::new(PrimeCapacity::from(capacity))),
            hasher: BucketHasher::new(hash_builder),
        }
    }

    /// Creates a table with 101 slots and the given hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hash_builder)
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.storage.read().len()
    }

    /// Returns `true` if the table holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of slots. Always prime.
    pub fn capacity(&self) -> usize {
        self.storage.read().capacity.get()
    }

    /// Returns `len / capacity`, read under one lock acquisition.
    pub fn load_factor(&self) -> f64 {
        let storage = self.storage.read();
        load_factor(storage.len(), storage.capacity.get())
    }

    /// Returns the number of tombstones currently held.
    pub fn tombstones(&self) -> usize {
        self.storage.read().tombstones()
    }

    /// Returns 1 if slot `n` holds a live entry, 0 otherwise (including when
    /// `n` is out of range).
    pub fn bucket_size(&self, n: usize) -> usize {
        self.storage
            .read()
            .slots
            .get(n)
            .map_or(0, |slot| (slot.settled_state() == VALID) as usize)
    }

    /// Returns the table's hasher builder.
    pub fn hasher(&self) -> &S {
        self.hasher.hash_builder()
    }

    /// Drops every entry and tombstone, keeping the current capacity.
    ///
    /// Waits for in-flight operations on other threads to finish.
    pub fn clear(&self) {
        let mut storage = self.storage.write();
        log::trace!(
            "cleared concurrent probing table ({} entries, {} tombstones, {} slots)",
            storage.len(),
            storage.tombstones(),
            storage.capacity.get()
        );
        *storage = Storage::new(storage.capacity);
    }

    /// Splits the table into its capacity, hasher builder and live entries.
    pub(crate) fn into_parts(self) -> (usize, S, Vec<(K, V)>) {
        let mut storage = self.storage.into_inner();
        let entries = storage.slots.iter_mut().filter_map(Slot::take).collect();
        (storage.capacity.get(), self.hasher.into_inner(), entries)
    }

    #[cfg(feature = "stats")]
    /// Returns occupancy statistics.
    pub fn stats(&self) -> crate::TableStats {
        let storage = self.storage.read();
        let states = || storage.slots.iter().map(Slot::settled_state);
        crate::TableStats {
            populated: storage.len(),
            capacity: storage.capacity.get(),
            occupied: states().filter(|&state| state == VALID).count(),
            tombstones: storage.tombstones(),
            longest_run: crate::stats::longest_wrapping_run(states().map(|state| state != EMPTY)),
            load_factor: load_factor(storage.len(), storage.capacity.get()),
        }
    }
}

impl<K, V, S> ConcurrentProbingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Claims the first empty slot in the key's probe sequence and writes
    /// `(key, value)` into it.
    ///
    /// Returns the entry back if every slot is taken, which only happens when
    /// [`check_rehash`](Self::check_rehash) has not been called often enough.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use prime_hash::ConcurrentProbingTable;
    ///
    /// let table = ConcurrentProbingTable::with_capacity(2);
    /// assert_eq!(table.try_insert(1, 'a'), Ok(()));
    /// assert_eq!(table.try_insert(2, 'b'), Ok(()));
    /// assert_eq!(table.try_insert(3, 'c'), Err((3, 'c')));
    ///
    /// assert!(table.check_rehash());
    /// assert_eq!(table.try_insert(3, 'c'), Ok(()));
    /// ```
    pub fn try_insert(&self, key: K, value: V) -> core::result::Result<(), (K, V)> {
        self.storage.read().try_insert(&self.hasher, key, value)
    }

    /// Claims the first empty slot in the key's probe sequence and writes
    /// `(key, value)` into it.
    ///
    /// Duplicate keys are kept in separate slots. The table does not grow on
    /// its own; see [`check_rehash`](Self::check_rehash).
    ///
    /// # Panics
    ///
    /// Panics with [`Error::InvariantViolation`] if no slot is empty.
    pub fn insert(&self, key: K, value: V) {
        let storage = self.storage.read();
        if storage.try_insert(&self.hasher, key, value).is_err() {
            invariant_violation(storage.capacity.get());
        }
    }

    /// Returns a clone of the value of the first live entry matching `key`
    /// in probe order.
    pub fn find(&self, key: &K) -> Result<V>
    where
        V: Clone,
    {
        let storage = self.storage.read();
        let index = storage
            .position(&self.hasher, key)
            .ok_or(Error::KeyNotFound)?;
        // SAFETY: `position` observed VALID, and the entry stays initialized
        // until the next exclusive operation, which this read lock excludes.
        Ok(unsafe { storage.slots[index].entry() }.1.clone())
    }

    /// Returns `true` if at least one live entry matches `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.storage.read().position(&self.hasher, key).is_some()
    }

    /// Returns the number of live entries matching `key`.
    pub fn count(&self, key: &K) -> usize {
        self.storage.read().count(&self.hasher, key)
    }

    /// Returns the slot holding the first live entry matching `key`.
    pub fn bucket(&self, key: &K) -> Result<usize> {
        self.storage
            .read()
            .position(&self.hasher, key)
            .ok_or(Error::KeyNotFound)
    }

    /// Marks the first live entry matching `key` as deleted.
    ///
    /// If another thread erases the same entry first, the next match is
    /// erased instead.
    pub fn erase(&self, key: &K) -> Result<()> {
        self.storage.read().erase(&self.hasher, key)
    }

    /// Rebuilds the table if live entries exceed 3/4 of the slots (growing to
    /// `next_prime(2 * capacity)`) or if live entries plus tombstones do
    /// (rebuilding in place). Returns `true` if a rebuild happened.
    ///
    /// Safe to call from every worker: the check runs under the shared lock,
    /// and a due rebuild upgrades to the exclusive lock, so one caller
    /// rebuilds while the others wait and then find nothing left to do.
    pub fn check_rehash(&self) -> bool {
        if self.storage.read().rehash_target().is_none() {
            return false;
        }

        let storage = self.storage.upgradable_read();
        if storage.rehash_target().is_none() {
            return false;
        }

        let mut storage = RwLockUpgradableReadGuard::upgrade(storage);
        // Inserts may have landed while waiting for the upgrade.
        match storage.rehash_target() {
            Some(target) => {
                let target = PrimeCapacity::for_target(target.get(), storage.len());
                storage.resize(&self.hasher, target);
                true
            }
            None => false,
        }
    }

    /// Rebuilds at `next_prime(target_capacity)` slots under the write lock.
    ///
    /// The target is raised if it would leave the load factor above 3/4.
    pub fn rehash(&self, target_capacity: usize) {
        let mut storage = self.storage.write();
        let target = PrimeCapacity::for_target(target_capacity, storage.len());
        storage.resize(&self.hasher, target);
    }

    /// Rebuilds at `next_prime(2 * capacity)` slots under the write lock.
    pub fn grow(&self) {
        let mut storage = self.storage.write();
        let target = storage.capacity.doubled();
        storage.resize(&self.hasher, target);
    }

    /// Converts into a single-threaded [`ProbingTable`] holding the same live
    /// entries.
    pub fn into_probing_table(self) -> ProbingTable<K, V, S> {
        ProbingTable::from(self)
    }
}

impl<K, V> ConcurrentProbingTable<K, V, DefaultHashBuilder> {
    /// Creates an empty table with 101 slots.
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty table with `capacity` slots, rounded up to a prime.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K, V, S> Default for ConcurrentProbingTable<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

/// Exclusive access needs no locking; growth is checked after every insert
/// like the single-threaded tables.
impl<K, V, S> KeyValueTable<K, V> for ConcurrentProbingTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn insert(&mut self, key: K, value: V) {
        let storage = self.storage.get_mut();
        if storage.try_insert(&self.hasher, key, value).is_err() {
            invariant_violation(storage.capacity.get());
        }
        if let Some(target) = storage.rehash_target() {
            storage.resize(&self.hasher, target);
        }
    }

    fn find(&self, key: &K) -> Result<V>
    where
        V: Clone,
    {
        ConcurrentProbingTable::find(self, key)
    }

    fn erase(&mut self, key: &K) -> Result<()> {
        self.storage.get_mut().erase(&self.hasher, key)
    }

    fn count(&self, key: &K) -> usize {
        ConcurrentProbingTable::count(self, key)
    }

    fn len(&self) -> usize {
        ConcurrentProbingTable::len(self)
    }

    fn capacity(&self) -> usize {
        ConcurrentProbingTable::capacity(self)
    }

    fn load_factor(&self) -> f64 {
        ConcurrentProbingTable::load_factor(self)
    }

    fn clear(&mut self) {
        let storage = self.storage.get_mut();
        *storage = Storage::new(storage.capacity);
    }

    fn rehash(&mut self, target_capacity: usize) {
        let storage = self.storage.get_mut();
        let target = PrimeCapacity::for_target(target_capacity, storage.len());
        storage.resize(&self.hasher, target);
    }

    fn grow(&mut self) {
        let storage = self.storage.get_mut();
        let target = storage.capacity.doubled();
        storage.resize(&self.hasher, target);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::prime::is_prime;
    use crate::test_util::CollidingState;
    use crate::test_util::SipHashBuilder;
    use crate::test_util::check_against_model;

    #[test]
    fn single_thread_operations() {
        let table = ConcurrentProbingTable::with_hasher(SipHashBuilder::default());
        for k in 0..50u64 {
            table.insert(k, k * 3);
        }

        assert_eq!(table.len(), 50);
        assert_eq!(table.find(&7), Ok(21));
        assert_eq!(table.find(&500), Err(Error::KeyNotFound));
        assert_eq!(table.erase(&7), Ok(()));
        assert_eq!(table.find(&7), Err(Error::KeyNotFound));
        assert_eq!(table.erase(&7), Err(Error::KeyNotFound));
        assert_eq!(table.len(), 49);
        assert_eq!(table.tombstones(), 1);
    }

    #[test]
    fn no_growth_without_check_rehash() {
        let table = ConcurrentProbingTable::with_capacity_and_hasher(11, SipHashBuilder::default());
        for k in 0..11u32 {
            assert_eq!(table.try_insert(k, k), Ok(()));
        }
        assert_eq!(table.capacity(), 11);
        assert_eq!(table.load_factor(), 1.0);

        assert_eq!(table.try_insert(11, 11), Err((11, 11)));
        // A full scan without an empty slot is still a complete miss.
        assert_eq!(table.find(&11), Err(Error::KeyNotFound));

        assert!(table.check_rehash());
        assert_eq!(table.capacity(), 23);
        assert!(!table.check_rehash());
        for k in 0..11u32 {
            assert_eq!(table.find(&k), Ok(k));
        }
        assert_eq!(table.try_insert(11, 11), Ok(()));
    }

    #[test]
    #[should_panic(expected = "load factor bound was not maintained")]
    fn insert_into_full_table_panics() {
        let table = ConcurrentProbingTable::with_capacity_and_hasher(2, SipHashBuilder::default());
        table.insert(1u8, ());
        table.insert(2u8, ());
        table.insert(3u8, ());
    }

    #[test]
    fn check_rehash_thresholds() {
        let table = ConcurrentProbingTable::with_capacity_and_hasher(11, SipHashBuilder::default());
        for k in 0..8u32 {
            table.insert(k, k);
            assert!(!table.check_rehash());
        }
        table.insert(8, 8);
        assert!(table.check_rehash());
        assert_eq!(table.capacity(), 23);
    }

    #[test]
    fn check_rehash_purges_tombstones_in_place() {
        let table = ConcurrentProbingTable::with_capacity_and_hasher(11, SipHashBuilder::default());
        for k in 0..8u32 {
            table.insert(k, k);
        }
        for k in 0..6u32 {
            table.erase(&k).unwrap();
        }
        assert!(!table.check_rehash());

        table.insert(100, 100);
        assert_eq!(table.tombstones(), 6);
        assert!(table.check_rehash());
        assert_eq!(table.capacity(), 11);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.len(), 3);
        for k in [6u32, 7, 100] {
            assert_eq!(table.find(&k), Ok(k));
        }
    }

    #[test]
    fn inserts_skip_tombstones() {
        let table = ConcurrentProbingTable::with_capacity_and_hasher(11, CollidingState);
        table.insert(1u32, 1u32);
        table.insert(2, 2);
        table.erase(&1).unwrap();
        table.insert(3, 3);

        assert_eq!(table.bucket(&2), Ok(1));
        assert_eq!(table.bucket(&3), Ok(2));
        assert_eq!(table.bucket_size(0), 0);
        assert_eq!(table.bucket_size(1), 1);
        assert_eq!(table.bucket(&1), Err(Error::KeyNotFound));
    }

    #[test]
    fn explicit_rehash_grow_and_clear() {
        let table = ConcurrentProbingTable::with_hasher(SipHashBuilder::default());
        for k in 0..60u32 {
            table.insert(k, k);
        }
        table.rehash(3);
        assert_eq!(table.capacity(), 83);
        table.grow();
        assert_eq!(table.capacity(), 167);
        for k in 0..60u32 {
            assert_eq!(table.find(&k), Ok(k));
        }

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 167);
        assert_eq!(table.find(&1), Err(Error::KeyNotFound));
    }

    #[test]
    fn entries_are_dropped() {
        let value = std::sync::Arc::new(());
        {
            let table = ConcurrentProbingTable::with_hasher(SipHashBuilder::default());
            for k in 0..200u32 {
                table.insert(k, value.clone());
                table.check_rehash();
            }
            for k in 0..100u32 {
                table.erase(&k).unwrap();
            }
            assert_eq!(std::sync::Arc::strong_count(&value), 201);
            table.grow();
            assert_eq!(std::sync::Arc::strong_count(&value), 101);
        }
        assert_eq!(std::sync::Arc::strong_count(&value), 1);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn disjoint_ranges_from_many_threads() {
        let _ = env_logger::builder().is_test(true).try_init();
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 10_000;

        let table = ConcurrentProbingTable::with_hasher(SipHashBuilder::default());
        let barrier = Barrier::new(THREADS as usize);
        thread::scope(|s| {
            for t in 0..THREADS {
                let table = &table;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    for k in t * PER_THREAD..(t + 1) * PER_THREAD {
                        table.insert(k, k + 1);
                        table.check_rehash();
                    }
                });
            }
        });

        assert_eq!(table.len() as u64, THREADS * PER_THREAD);
        assert!(table.load_factor() <= 0.75);
        assert!(is_prime(table.capacity()));
        for k in 0..THREADS * PER_THREAD {
            assert_eq!(table.find(&k), Ok(k + 1));
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn overlapping_keys_are_all_kept() {
        const THREADS: usize = 4;
        const KEYS: u32 = 2_000;

        let table = ConcurrentProbingTable::with_hasher(SipHashBuilder::default());
        thread::scope(|s| {
            for t in 0..THREADS {
                let table = &table;
                s.spawn(move || {
                    for k in 0..KEYS {
                        table.insert(k, t);
                        table.check_rehash();
                    }
                });
            }
        });

        assert_eq!(table.len(), THREADS * KEYS as usize);
        for k in 0..KEYS {
            assert_eq!(table.count(&k), THREADS);
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn contended_claims_on_one_probe_chain() {
        const THREADS: u32 = 4;
        const PER_THREAD: u32 = 100;

        // Every key starts at slot 0, so all threads race for the same slots.
        let table = ConcurrentProbingTable::with_capacity_and_hasher(1009, CollidingState);
        thread::scope(|s| {
            for t in 0..THREADS {
                let table = &table;
                s.spawn(move || {
                    for k in t * PER_THREAD..(t + 1) * PER_THREAD {
                        table.insert(k, k);
                    }
                });
            }
        });

        assert_eq!(table.len(), (THREADS * PER_THREAD) as usize);
        assert_eq!(table.capacity(), 1009);
        for k in 0..THREADS * PER_THREAD {
            assert_eq!(table.find(&k), Ok(k));
        }
        for n in 0..(THREADS * PER_THREAD) as usize {
            assert_eq!(table.bucket_size(n), 1);
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn concurrent_erase_and_find() {
        const KEYS: u32 = 8_000;

        let table = ConcurrentProbingTable::with_hasher(SipHashBuilder::default());
        for k in 0..KEYS {
            table.insert(k, k);
            table.check_rehash();
        }

        thread::scope(|s| {
            for half in 0..2u32 {
                let table = &table;
                s.spawn(move || {
                    for k in (half..KEYS).step_by(2) {
                        assert_eq!(table.erase(&k), Ok(()));
                    }
                });
            }
            let table = &table;
            s.spawn(move || {
                for k in 0..KEYS {
                    if let Ok(v) = table.find(&k) {
                        assert_eq!(v, k);
                    }
                }
            });
        });

        assert!(table.is_empty());
        assert_eq!(table.tombstones(), KEYS as usize);
        table.rehash(0);
        assert_eq!(table.tombstones(), 0);
        assert_eq!(table.capacity(), 2);
    }

    #[test]
    fn exclusive_access_keeps_load_bound() {
        let mut table = ConcurrentProbingTable::with_capacity_and_hasher(11, SipHashBuilder::default());
        for k in 0..1_000u32 {
            KeyValueTable::insert(&mut table, k, k);
            assert!(table.load_factor() <= 0.75);
        }
        assert_eq!(table.len(), 1_000);
    }

    #[test]
    fn matches_multimap_model() {
        for seed in 0..8 {
            let mut table = ConcurrentProbingTable::with_hasher(SipHashBuilder::default());
            check_against_model(&mut table, seed, 4_000, false);
        }
    }

    #[test]
    fn into_probing_table_keeps_live_entries() {
        let table = ConcurrentProbingTable::with_hasher(SipHashBuilder::default());
        for k in 0..40u32 {
            table.insert(k, k);
        }
        table.erase(&0).unwrap();

        let probing = table.into_probing_table();
        assert_eq!(probing.len(), 39);
        assert_eq!(probing.tombstones(), 0);
        assert_eq!(probing.find(&0), Err(Error::KeyNotFound));
        assert_eq!(probing.find(&39), Ok(&39));
    }

    #[cfg(feature = "stats")]
    #[test]
    fn stats_snapshot() {
        let table = ConcurrentProbingTable::with_capacity_and_hasher(11, CollidingState);
        for k in 0..3u32 {
            table.insert(k, k);
        }
        table.erase(&0).unwrap();

        let stats = table.stats();
        assert_eq!(stats.populated, 2);
        assert_eq!(stats.occupied, 2);
        assert_eq!(stats.tombstones, 1);
        assert_eq!(stats.longest_run, 3);
    }
}
