//! Prime table sizing.
//!
//! Every table in this crate keeps a prime number of buckets or slots. Prime
//! moduli keep keys whose hashes share a common stride from piling into the
//! same few buckets.

/// Smallest capacity any table will allocate.
pub(crate) const MIN_CAPACITY: usize = 2;

/// Returns the smallest prime greater than or equal to `n`.
///
/// Values below 2 map to 2.
///
/// # Examples
///
/// ```rust
/// use prime_hash::next_prime;
///
/// assert_eq!(next_prime(0), 2);
/// assert_eq!(next_prime(11), 11);
/// assert_eq!(next_prime(22), 23);
/// assert_eq!(next_prime(1_000_000), 1_000_003);
/// ```
pub fn next_prime(n: usize) -> usize {
    let mut candidate = n.max(MIN_CAPACITY);
    if candidate > 2 && candidate % 2 == 0 {
        candidate += 1;
    }
    while !is_prime(candidate) {
        candidate = candidate.checked_add(2).expect("capacity overflow");
    }
    candidate
}

/// Returns `true` if `n` is prime.
///
/// 0 and 1 are not prime.
///
/// # Examples
///
/// ```rust
/// use prime_hash::is_prime;
///
/// assert!(!is_prime(0));
/// assert!(!is_prime(1));
/// assert!(is_prime(2));
/// assert!(is_prime(23));
/// assert!(!is_prime(25));
/// ```
pub fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }

    let mut divisor = 3usize;
    while divisor <= n / divisor {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// A table capacity that is always prime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct PrimeCapacity(usize);

impl From<usize> for PrimeCapacity {
    #[inline]
    fn from(value: usize) -> Self {
        PrimeCapacity(next_prime(value))
    }
}

impl PrimeCapacity {
    #[inline(always)]
    pub(crate) fn get(self) -> usize {
        self.0
    }

    /// Capacity for the default growth path: `next_prime(2 * self)`.
    #[inline]
    pub(crate) fn doubled(self) -> Self {
        self.0.checked_mul(2).expect("capacity overflow").into()
    }

    /// Rounds `target` up so that `len` entries stay within the load bound.
    #[inline]
    pub(crate) fn for_target(target: usize, len: usize) -> Self {
        target.max(min_capacity_for(len)).into()
    }
}

/// Maximum load factor, as `MAX_LOAD_NUM / MAX_LOAD_DEN`.
pub(crate) const MAX_LOAD_NUM: usize = 3;
pub(crate) const MAX_LOAD_DEN: usize = 4;

/// Returns `true` when `len / capacity > 3/4`.
#[inline(always)]
pub(crate) fn exceeds_max_load(len: usize, capacity: usize) -> bool {
    (len as u128) * (MAX_LOAD_DEN as u128) > (capacity as u128) * (MAX_LOAD_NUM as u128)
}

/// Smallest slot count that holds `len` entries at or under the load bound.
#[inline(always)]
pub(crate) fn min_capacity_for(len: usize) -> usize {
    ((len as u128 * MAX_LOAD_DEN as u128).div_ceil(MAX_LOAD_NUM as u128)) as usize
}

#[inline(always)]
pub(crate) fn load_factor(len: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        0.0
    } else {
        len as f64 / capacity as f64
    }
}
