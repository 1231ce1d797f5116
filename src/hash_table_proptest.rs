#![cfg(all(test, feature = "std"))]

// Property tests for HashTable kept inside the crate so they can inspect the
// overflow pool and tombstone counters.

use std::collections::BTreeSet;
use std::collections::HashMap;

use proptest::prelude::*;

use crate::hash_table::HashTable;
use crate::hasher::KeyHasher;
use crate::hasher::mix64;

// Key-pool-indexed operations so shrinking moves towards earlier keys.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    GetOrInsert(usize, i32),
    Remove(usize),
    Find(usize),
    Mutate(usize, i32),
    Reserve(u8),
    Iterate,
    Clear,
}

#[derive(Clone, Copy, Debug)]
enum Hashing {
    Mixed,
    Identity,
    // Only four distinct homes, so most keys end up in overflow chains.
    FourHomes,
}

impl KeyHasher for Hashing {
    fn hash_key(&self, key: u64) -> u64 {
        match self {
            Hashing::Mixed => mix64(key),
            Hashing::Identity => key,
            Hashing::FourHomes => key & 3,
        }
    }
}

fn arb_scenario() -> impl Strategy<Value = (Hashing, Vec<u64>, Vec<Op>)> {
    let hashing = prop_oneof![
        Just(Hashing::Mixed),
        Just(Hashing::Identity),
        Just(Hashing::FourHomes),
    ];
    let pool = proptest::collection::vec(any::<u64>(), 1..=48);

    (hashing, pool).prop_flat_map(|(hashing, pool)| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::GetOrInsert(i, v)),
            3 => idx.clone().prop_map(Op::Remove),
            2 => idx.clone().prop_map(Op::Find),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            1 => any::<u8>().prop_map(Op::Reserve),
            1 => Just(Op::Iterate),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..300).prop_map(move |ops| (hashing, pool.clone(), ops))
    })
}

// Property: state-machine equivalence against std::collections::HashMap.
// - `insert` returns the replaced value exactly when the model has the key.
// - `find`/`contains` agree with the model for every pooled key.
// - `remove` returns the model's value and the key is absent afterwards.
// - `iter` yields each live entry exactly once.
// - `size`, capacity shape and `overflow_heap_ptr <= capacity` hold after every op.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((hashing, pool, ops) in arb_scenario()) {
        let mut sut: HashTable<i32, Hashing> = HashTable::with_hasher(hashing);
        let mut model: HashMap<u64, i32> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(i, v) => {
                    let key = pool[i];
                    prop_assert_eq!(sut.insert(key, v), model.insert(key, v));
                }
                Op::GetOrInsert(i, v) => {
                    let key = pool[i];
                    let got = *sut.get_or_insert_with(key, || v);
                    prop_assert_eq!(got, *model.entry(key).or_insert(v));
                }
                Op::Remove(i) => {
                    let key = pool[i];
                    prop_assert_eq!(sut.remove(key), model.remove(&key));
                    prop_assert!(!sut.contains(key));
                }
                Op::Find(i) => {
                    let key = pool[i];
                    prop_assert_eq!(sut.find(key), model.get(&key));
                    prop_assert_eq!(sut.contains(key), model.contains_key(&key));
                }
                Op::Mutate(i, d) => {
                    let key = pool[i];
                    match (sut.find_mut(key), model.get_mut(&key)) {
                        (Some(a), Some(b)) => {
                            *a = a.wrapping_add(d);
                            *b = b.wrapping_add(d);
                        }
                        (None, None) => {}
                        (a, b) => prop_assert!(false, "find_mut mismatch: {:?} vs {:?}", a, b),
                    }
                }
                Op::Reserve(n) => {
                    sut.reserve(n as usize);
                    prop_assert!(sut.capacity() - sut.capacity() / 4 >= sut.size() + n as usize);
                }
                Op::Iterate => {
                    let mut seen = BTreeSet::new();
                    for (key, value) in sut.iter() {
                        prop_assert!(seen.insert(key), "key {} yielded twice", key);
                        prop_assert_eq!(Some(value), model.get(&key));
                    }
                    prop_assert_eq!(seen.len(), model.len());
                }
                Op::Clear => {
                    sut.clear();
                    model.clear();
                }
            }

            prop_assert_eq!(sut.size(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            prop_assert_eq!(sut.capacity(), 1usize << sut.capacity_log());
            prop_assert!(sut.size() <= sut.capacity());
            prop_assert!(sut.overflow_heap_ptr() <= sut.capacity());
            prop_assert!(sut.overflow_len() <= sut.overflow_heap_ptr());
        }

        for key in &pool {
            prop_assert_eq!(sut.find(*key), model.get(key));
        }
    }
}

// Property: a table built by churning a key set never ends up more than twice
// the capacity of one built directly from the same keys.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_churn_is_bounded(
        keys in proptest::collection::btree_set(any::<u64>(), 1..200),
        rounds in 1usize..50,
    ) {
        let mut baseline = HashTable::with_hasher(mix64);
        for &key in &keys {
            baseline.insert(key, ());
        }

        let mut churned = HashTable::with_hasher(mix64);
        for _ in 0..rounds {
            for &key in &keys {
                churned.insert(key, ());
            }
            for &key in &keys {
                prop_assert_eq!(churned.remove(key), Some(()));
            }
            prop_assert!(churned.overflow_heap_ptr() <= churned.capacity());
        }
        for &key in &keys {
            churned.insert(key, ());
        }

        prop_assert_eq!(churned.size(), keys.len());
        prop_assert!(churned.capacity() <= 2 * baseline.capacity());
    }
}
