//! The operation set shared by every table variant.

use crate::error::Result;
use crate::prime::load_factor;

/// A key-value table with multimap semantics.
///
/// Duplicate keys are permitted: [`insert`](Self::insert) never checks for an
/// existing key, [`find`](Self::find) returns the first live match in the
/// variant's scan order, and [`erase`](Self::erase) removes exactly that one
/// match. After every `insert` returns the load factor is at most 3/4 and the
/// capacity is prime.
///
/// Each variant implements this independently over its own storage; callers
/// that only drive operations and read sizes (benchmark harnesses, tests that
/// run against all three) should go through this trait.
///
/// # Examples
///
/// ```rust
/// use prime_hash::ChainingTable;
/// use prime_hash::ConcurrentProbingTable;
/// use prime_hash::KeyValueTable;
/// use prime_hash::ProbingTable;
///
/// fn fill<T: KeyValueTable<u64, u64>>(table: &mut T) {
///     for key in 1..=100 {
///         table.insert(key, key * 10);
///     }
/// }
///
/// let mut chaining = ChainingTable::new();
/// let mut probing = ProbingTable::new();
/// let mut concurrent = ConcurrentProbingTable::new();
/// fill(&mut chaining);
/// fill(&mut probing);
/// fill(&mut concurrent);
///
/// assert_eq!(KeyValueTable::find(&chaining, &7), Ok(70));
/// assert_eq!(KeyValueTable::find(&probing, &7), Ok(70));
/// assert_eq!(KeyValueTable::find(&concurrent, &7), Ok(70));
/// assert!(KeyValueTable::load_factor(&concurrent) <= 0.75);
/// ```
pub trait KeyValueTable<K, V> {
    /// Inserts `(key, value)`, growing the table if the load factor would
    /// exceed 3/4.
    fn insert(&mut self, key: K, value: V);

    /// Returns a copy of the value of the first live entry matching `key`.
    fn find(&self, key: &K) -> Result<V>
    where
        V: Clone;

    /// Removes the first live entry matching `key`.
    fn erase(&mut self, key: &K) -> Result<()>;

    /// Number of live entries matching `key`.
    fn count(&self, key: &K) -> usize;

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Returns `true` if the table holds no live entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets or slots; always prime.
    fn capacity(&self) -> usize;

    /// `len / capacity`, computed on demand.
    fn load_factor(&self) -> f64 {
        load_factor(self.len(), self.capacity())
    }

    /// Drops every entry, keeping the current capacity.
    fn clear(&mut self);

    /// Redistributes every live entry into `next_prime(target_capacity)`
    /// buckets (raised as needed to keep the load bound).
    fn rehash(&mut self, target_capacity: usize);

    /// Rehashes to `next_prime(2 * capacity)`.
    fn grow(&mut self) {
        let target = self.capacity().saturating_mul(2);
        self.rehash(target);
    }
}
