use core::hint::black_box;
use std::collections::HashMap as StdHashMap;

use criterion::AxisScale;
use criterion::BatchSize;
use criterion::BenchmarkGroup;
use criterion::Criterion;
use criterion::PlotConfiguration;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::measurement::WallTime;
use hashbrown::HashMap as HashbrownHashMap;
use rand::Rng;
use rand::SeedableRng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand_distr::Zipf;
use spill_hash::HashTable as SpillHashTable;

trait BenchValue: Clone {
    fn new(key: u64) -> Self;
}

#[derive(Clone)]
struct SmallValue {
    _value: u64,
}

impl BenchValue for SmallValue {
    fn new(key: u64) -> Self {
        black_box(Self { _value: key })
    }
}

#[derive(Clone)]
struct LargeValue {
    _value: [u8; 256],
}

impl BenchValue for LargeValue {
    fn new(key: u64) -> Self {
        let mut value = [0u8; 256];
        for (i, byte) in value.iter_mut().enumerate() {
            *byte = ((key >> ((i % 8) * 8)) & 0xFF) as u8;
        }
        black_box(Self { _value: value })
    }
}

/// The operations every compared table supports, keyed by `u64`.
trait BenchTable<V>: Sized {
    const NAME: &'static str;

    fn with_capacity(capacity: usize) -> Self;
    fn insert(&mut self, key: u64, value: V) -> Option<V>;
    fn find(&self, key: u64) -> Option<&V>;
    fn remove(&mut self, key: u64) -> Option<V>;
}

impl<V> BenchTable<V> for SpillHashTable<V> {
    const NAME: &'static str = "spill_hash";

    fn with_capacity(capacity: usize) -> Self {
        SpillHashTable::with_capacity(capacity)
    }

    fn insert(&mut self, key: u64, value: V) -> Option<V> {
        SpillHashTable::insert(self, key, value)
    }

    fn find(&self, key: u64) -> Option<&V> {
        SpillHashTable::find(self, key)
    }

    fn remove(&mut self, key: u64) -> Option<V> {
        SpillHashTable::remove(self, key)
    }
}

impl<V> BenchTable<V> for HashbrownHashMap<u64, V> {
    const NAME: &'static str = "hashbrown";

    fn with_capacity(capacity: usize) -> Self {
        HashbrownHashMap::with_capacity(capacity)
    }

    fn insert(&mut self, key: u64, value: V) -> Option<V> {
        HashbrownHashMap::insert(self, key, value)
    }

    fn find(&self, key: u64) -> Option<&V> {
        self.get(&key)
    }

    fn remove(&mut self, key: u64) -> Option<V> {
        HashbrownHashMap::remove(self, &key)
    }
}

impl<V> BenchTable<V> for StdHashMap<u64, V> {
    const NAME: &'static str = "std";

    fn with_capacity(capacity: usize) -> Self {
        StdHashMap::with_capacity(capacity)
    }

    fn insert(&mut self, key: u64, value: V) -> Option<V> {
        StdHashMap::insert(self, key, value)
    }

    fn find(&self, key: u64) -> Option<&V> {
        self.get(&key)
    }

    fn remove(&mut self, key: u64) -> Option<V> {
        StdHashMap::remove(self, &key)
    }
}

const SIZES: &[usize] = &[
    (1 << 10),
    (1 << 12),
    (1 << 14),
    (1 << 16),
    (1 << 18),
];

#[derive(Clone, Copy)]
enum Operation {
    Insert,
    Find,
    Remove,
}

fn group<'a>(c: &'a mut Criterion, name: &str) -> BenchmarkGroup<'a, WallTime> {
    let mut group = c.benchmark_group(name);
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));
    group
}

fn random_entries<V: BenchValue>(count: usize) -> Vec<(u64, V)> {
    let mut rng = OsRng;
    (0..count)
        .map(|_| {
            let key = rng.try_next_u64().unwrap();
            (key, V::new(key))
        })
        .collect()
}

fn insert_random_with<V: BenchValue, T: BenchTable<V>>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    entries: &[(u64, V)],
    preallocate: bool,
) {
    group.bench_function(T::NAME, |b| {
        b.iter_batched(
            || {
                let mut entries = entries.to_vec();
                entries.shuffle(&mut SmallRng::from_os_rng());
                entries
            },
            |entries| {
                let mut table = T::with_capacity(if preallocate { entries.len() } else { 0 });
                for (key, value) in entries {
                    black_box(table.insert(key, value));
                }
                black_box(table)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_insert_random<V: BenchValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    for preallocate in [false, true] {
        let mut group = group(
            c,
            &format!(
                "insert_random{}_{}",
                if preallocate { "_preallocated" } else { "" },
                core::any::type_name::<V>()
            ),
        );

        for &size in SIZES[..=MAX_SIZE].iter() {
            let entries = random_entries::<V>(size);
            group.throughput(Throughput::Elements(size as u64));
            insert_random_with::<V, SpillHashTable<V>>(&mut group, &entries, preallocate);
            insert_random_with::<V, HashbrownHashMap<u64, V>>(&mut group, &entries, preallocate);
            insert_random_with::<V, StdHashMap<u64, V>>(&mut group, &entries, preallocate);
        }

        group.finish();
    }
}

fn find_hit_miss_with<V: BenchValue, T: BenchTable<V>>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    entries: &[(u64, V)],
    probes: &[u64],
) {
    let mut table = T::with_capacity(0);
    for (key, value) in entries.iter().cloned() {
        table.insert(key, value);
    }

    group.bench_function(T::NAME, |b| {
        b.iter(|| {
            for &key in probes {
                black_box(table.find(key));
            }
        })
    });
}

fn bench_find_hit_miss<V: BenchValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = group(
        c,
        &format!("find_hit_miss_{}", core::any::type_name::<V>()),
    );

    for &size in SIZES[..=MAX_SIZE].iter() {
        let entries = random_entries::<V>(size);
        let mut rng = OsRng;

        // Half the probes hit, half are fresh random keys that almost surely miss.
        let mut probes = entries
            .iter()
            .take(size / 2)
            .map(|(key, _)| *key)
            .chain((0..size / 2).map(|_| rng.try_next_u64().unwrap()))
            .collect::<Vec<u64>>();
        probes.shuffle(&mut SmallRng::from_os_rng());

        group.throughput(Throughput::Elements(probes.len() as u64));
        find_hit_miss_with::<V, SpillHashTable<V>>(&mut group, &entries, &probes);
        find_hit_miss_with::<V, HashbrownHashMap<u64, V>>(&mut group, &entries, &probes);
        find_hit_miss_with::<V, StdHashMap<u64, V>>(&mut group, &entries, &probes);
    }

    group.finish();
}

fn remove_with<V: BenchValue, T: BenchTable<V>>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    entries: &[(u64, V)],
) {
    group.bench_function(T::NAME, |b| {
        b.iter_batched(
            || {
                let mut table = T::with_capacity(0);
                for (key, value) in entries.iter().cloned() {
                    table.insert(key, value);
                }
                let mut keys = entries.iter().map(|(key, _)| *key).collect::<Vec<_>>();
                keys.shuffle(&mut SmallRng::from_os_rng());
                (table, keys)
            },
            |(mut table, keys)| {
                for key in keys {
                    black_box(table.remove(key));
                }
                black_box(table)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_remove<V: BenchValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = group(c, &format!("remove_{}", core::any::type_name::<V>()));

    for &size in SIZES[..=MAX_SIZE].iter() {
        let entries = random_entries::<V>(size);
        group.throughput(Throughput::Elements(size as u64));
        remove_with::<V, SpillHashTable<V>>(&mut group, &entries);
        remove_with::<V, HashbrownHashMap<u64, V>>(&mut group, &entries);
        remove_with::<V, StdHashMap<u64, V>>(&mut group, &entries);
    }

    group.finish();
}

fn churn_with<V: BenchValue, T: BenchTable<V>>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    keys: &[u64],
    rounds: usize,
) {
    group.bench_function(T::NAME, |b| {
        b.iter(|| {
            let mut table = T::with_capacity(0);
            for _ in 0..rounds {
                for &key in keys {
                    table.insert(key, V::new(key));
                }
                for &key in keys {
                    black_box(table.remove(key));
                }
            }
            black_box(table)
        })
    });
}

/// Repeated insert/remove of one fixed key set.
fn bench_churn<V: BenchValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = group(c, &format!("churn_{}", core::any::type_name::<V>()));
    const ROUNDS: usize = 16;

    for &size in SIZES[..=MAX_SIZE].iter() {
        let keys = (0..size as u64).collect::<Vec<_>>();
        group.throughput(Throughput::Elements((size * ROUNDS * 2) as u64));
        churn_with::<V, SpillHashTable<V>>(&mut group, &keys, ROUNDS);
        churn_with::<V, HashbrownHashMap<u64, V>>(&mut group, &keys, ROUNDS);
        churn_with::<V, StdHashMap<u64, V>>(&mut group, &keys, ROUNDS);
    }

    group.finish();
}

fn mixed_zipf_with<V: BenchValue, T: BenchTable<V>>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    operations: &[(Operation, u64)],
) {
    group.bench_function(T::NAME, |b| {
        b.iter(|| {
            let mut table = T::with_capacity(0);
            for &(operation, key) in operations {
                match operation {
                    Operation::Insert => {
                        black_box(table.insert(key, V::new(key)));
                    }
                    Operation::Find => {
                        black_box(table.find(key));
                    }
                    Operation::Remove => {
                        black_box(table.remove(key));
                    }
                }
            }
            black_box(table)
        })
    });
}

fn bench_mixed_probabilistic_zipf<V: BenchValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    const KEY_SPACE_MULTIPLIER: f32 = 2.0;

    for exponent in [1.0, 1.3] {
        let mut group = group(
            c,
            &format!(
                "mixed_probabilistic_zipf_{:.01}_{}",
                exponent,
                core::any::type_name::<V>()
            ),
        );

        for &size in SIZES[..=MAX_SIZE].iter() {
            let mut rng = SmallRng::from_os_rng();
            let op_distr = Zipf::new(3.0, exponent).unwrap();
            let insert_distr = Zipf::new(size as f32 - 1.0, 1.0).unwrap();
            let find_remove_distr = Zipf::new(size as f32 * KEY_SPACE_MULTIPLIER - 1.0, 1.0).unwrap();

            let operations = (0..size * 3)
                .map(|_| {
                    let op_choice: f32 = rng.sample(op_distr);
                    if op_choice <= 1.0 {
                        (Operation::Find, rng.sample(find_remove_distr) as u64)
                    } else if op_choice <= 2.0 {
                        (Operation::Insert, rng.sample(insert_distr) as u64)
                    } else {
                        (Operation::Remove, rng.sample(find_remove_distr) as u64)
                    }
                })
                .collect::<Vec<_>>();

            group.throughput(Throughput::Elements(operations.len() as u64));
            mixed_zipf_with::<V, SpillHashTable<V>>(&mut group, &operations);
            mixed_zipf_with::<V, HashbrownHashMap<u64, V>>(&mut group, &operations);
            mixed_zipf_with::<V, StdHashMap<u64, V>>(&mut group, &operations);
        }

        group.finish();
    }
}

criterion_group!(
    benches,
    bench_insert_random::<SmallValue, 4>,
    bench_insert_random::<LargeValue, 2>,
    bench_find_hit_miss::<SmallValue, 4>,
    bench_find_hit_miss::<LargeValue, 2>,
    bench_remove::<SmallValue, 4>,
    bench_remove::<LargeValue, 2>,
    bench_churn::<SmallValue, 4>,
    bench_churn::<LargeValue, 2>,
    bench_mixed_probabilistic_zipf::<SmallValue, 4>,
    bench_mixed_probabilistic_zipf::<LargeValue, 2>,
);

criterion_main!(benches);
