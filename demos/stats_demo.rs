use clap::Parser;
use spill_hash::HashTable;
use spill_hash::hasher::mix64;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Keep only this many low bits of each hash, forcing collisions.
    #[arg(short = 'b', long = "collide_bits")]
    collide_bits: Option<u32>,

    /// Insert/remove rounds over the same key set before the final fill.
    #[arg(short = 'r', long = "churn_rounds", default_value_t = 0)]
    churn_rounds: usize,
}

fn main() {
    let args = Args::parse();

    let mask = match args.collide_bits {
        Some(bits) if bits < u64::BITS => (1u64 << bits) - 1,
        _ => u64::MAX,
    };
    let hasher = move |key: u64| mix64(key) & mask;

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<u64, _> = HashTable::with_capacity_and_hasher(0, hasher);
    let num_values = args.target_capacity as u64;

    for round in 0..args.churn_rounds {
        for key in 0..num_values {
            table.insert(key, key);
        }
        for key in 0..num_values {
            table.remove(key);
        }
        if round == 0 {
            println!("Capacity after first churn round: {}", table.capacity());
        }
    }

    println!("Filling table with u64 values...");
    for key in 0..num_values {
        table.insert(key, key);
    }

    println!("Inserted {} values into table", table.len());
    println!("Actual capacity: {}", table.capacity());
    println!(
        "Final load factor: {:.2}%",
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );

    table.print_probe_histogram();
    table.debug_stats().print();
    println!(
        "Overflow heap ptr: {} of {} nodes",
        table.overflow_heap_ptr(),
        table.capacity()
    );
}
