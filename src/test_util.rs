use core::hash::BuildHasher;
use core::hash::Hasher;

use hashbrown::HashMap;
use rand::Rng;
use rand::SeedableRng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use rand::rngs::SmallRng;
use siphasher::sip::SipHasher;

use crate::error::Error;
use crate::prime::is_prime;
use crate::table::KeyValueTable;

#[derive(Clone, Debug)]
pub(crate) struct SipHashBuilder {
    k1: u64,
    k2: u64,
}

impl BuildHasher for SipHashBuilder {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> Self::Hasher {
        SipHasher::new_with_keys(self.k1, self.k2)
    }
}

impl Default for SipHashBuilder {
    fn default() -> Self {
        let mut rng = OsRng;
        Self {
            k1: rng.try_next_u64().unwrap_or(0),
            k2: rng.try_next_u64().unwrap_or(0),
        }
    }
}

/// Sends every key to bucket 0.
#[derive(Clone, Debug, Default)]
pub(crate) struct CollidingState;

pub(crate) struct ZeroHasher;

impl Hasher for ZeroHasher {
    fn finish(&self) -> u64 {
        0
    }

    fn write(&mut self, _bytes: &[u8]) {}
}

impl BuildHasher for CollidingState {
    type Hasher = ZeroHasher;

    fn build_hasher(&self) -> Self::Hasher {
        ZeroHasher
    }
}

pub(crate) fn assert_table_invariants<T: KeyValueTable<u32, u32>>(table: &T) {
    assert!(is_prime(table.capacity()), "capacity {}", table.capacity());
    assert!(
        table.load_factor() <= 0.75,
        "load factor {} at {}/{}",
        table.load_factor(),
        table.len(),
        table.capacity()
    );
}

/// Runs a random insert/erase/find sequence against `table` and checks every
/// step against a multimap model.
///
/// With `ordered`, duplicates must be found in insertion order.
pub(crate) fn check_against_model<T: KeyValueTable<u32, u32>>(
    table: &mut T,
    seed: u64,
    ops: usize,
    ordered: bool,
) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut model: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut len = 0usize;

    for step in 0..ops {
        let key = rng.random_range(0..64u32);
        let values = model.entry(key).or_default();
        match rng.random_range(0..10u8) {
            0..=5 => {
                table.insert(key, step as u32);
                values.push(step as u32);
                len += 1;
            }
            6..=7 => {
                let found = table.find(&key);
                match (found, table.erase(&key)) {
                    (Ok(value), Ok(())) => {
                        let position = values
                            .iter()
                            .position(|&v| v == value)
                            .expect("erased a value the model never saw");
                        if ordered {
                            assert_eq!(position, 0);
                        }
                        values.remove(position);
                        len -= 1;
                    }
                    (Err(Error::KeyNotFound), Err(Error::KeyNotFound)) => {
                        assert!(values.is_empty());
                    }
                    other => panic!("find and erase disagree for {key}: {other:?}"),
                }
            }
            _ => match table.find(&key) {
                Ok(value) => {
                    assert!(values.contains(&value));
                    if ordered {
                        assert_eq!(values.first(), Some(&value));
                    }
                }
                Err(err) => {
                    assert_eq!(err, Error::KeyNotFound);
                    assert!(values.is_empty());
                }
            },
        }

        assert_eq!(table.len(), len);
        assert_eq!(table.count(&key), model[&key].len());
        assert_table_invariants(table);
    }

    for (key, values) in &model {
        assert_eq!(table.count(key), values.len());
    }
}
