use std::sync::Barrier;
use std::thread;

use prime_hash::ChainingTable;
use prime_hash::ConcurrentProbingTable;
use prime_hash::Error;
use prime_hash::KeyValueTable;
use prime_hash::ProbingTable;
use prime_hash::is_prime;

const MILLION: u64 = 1_000_000;

fn million_key_lifecycle<T: KeyValueTable<u64, u64>>(table: &mut T) {
    for key in 1..=MILLION {
        table.insert(key, key);
    }
    assert_eq!(table.len() as u64, MILLION);
    assert!(is_prime(table.capacity()));
    assert!(table.load_factor() <= 0.75);

    assert_eq!(table.find(&177), Ok(177));
    assert_eq!(table.find(&(2 * MILLION)), Err(Error::KeyNotFound));

    assert_eq!(table.erase(&177), Ok(()));
    assert_eq!(table.find(&177), Err(Error::KeyNotFound));
    assert_eq!(table.len() as u64, MILLION - 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn chaining_million_keys() {
    million_key_lifecycle(&mut ChainingTable::new());
}

#[test]
#[cfg_attr(miri, ignore)]
fn probing_million_keys() {
    million_key_lifecycle(&mut ProbingTable::new());
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_exclusive_million_keys() {
    million_key_lifecycle(&mut ConcurrentProbingTable::new());
}

#[test]
fn probing_first_growth_from_eleven() {
    let mut table = ProbingTable::with_capacity(11);
    for key in 0..8u32 {
        table.insert(key, key);
    }
    assert_eq!(table.capacity(), 11);

    table.insert(8, 8);
    assert_eq!(table.capacity(), 23);
    for key in 0..9u32 {
        assert_eq!(table.find(&key), Ok(&key));
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn two_workers_fill_a_million() {
    let _ = env_logger::builder().is_test(true).try_init();

    let table = ConcurrentProbingTable::new();
    let barrier = Barrier::new(2);
    let half = MILLION / 2;

    thread::scope(|s| {
        for range in [1..=half, half + 1..=MILLION] {
            let table = &table;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for key in range {
                    table.insert(key, key);
                    table.check_rehash();
                }
            });
        }
    });

    assert_eq!(table.len() as u64, MILLION);
    assert!(is_prime(table.capacity()));
    assert!(table.load_factor() <= 0.75);
    for key in 1..=MILLION {
        assert_eq!(table.find(&key), Ok(key));
    }
}

#[test]
fn variants_agree_on_duplicates() {
    fn run<T: KeyValueTable<&'static str, u32>>(table: &mut T) {
        table.insert("k", 1);
        table.insert("k", 2);
        table.insert("other", 3);
        assert_eq!(table.count(&"k"), 2);

        let first = table.find(&"k").unwrap();
        table.erase(&"k").unwrap();
        let second = table.find(&"k").unwrap();
        assert_ne!(first, second);
        table.erase(&"k").unwrap();

        assert_eq!(table.erase(&"k"), Err(Error::KeyNotFound));
        assert_eq!(table.find(&"other"), Ok(3));
        assert_eq!(table.len(), 1);
    }

    run(&mut ChainingTable::new());
    run(&mut ProbingTable::new());
    run(&mut ConcurrentProbingTable::new());
}

#[test]
fn rehash_and_clear_through_the_trait() {
    fn run<T: KeyValueTable<u32, u32>>(table: &mut T) {
        for key in 0..100 {
            table.insert(key, key);
        }

        table.rehash(1000);
        assert_eq!(table.capacity(), 1009);
        table.rehash(0);
        assert_eq!(table.capacity(), 137);
        let capacity = table.capacity();
        table.grow();
        assert_eq!(table.capacity(), 277);
        assert!(capacity < table.capacity());
        for key in 0..100 {
            assert_eq!(table.find(&key), Ok(key));
        }

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 277);
        assert_eq!(table.find(&1), Err(Error::KeyNotFound));
    }

    run(&mut ChainingTable::new());
    run(&mut ProbingTable::new());
    run(&mut ConcurrentProbingTable::new());
}
