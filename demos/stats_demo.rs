use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use swiss_ctrl::DefaultGroup;
use swiss_ctrl::GROUP_SIZE;
use swiss_ctrl::Group;
use swiss_ctrl::State;
use swiss_ctrl::StatesAndBuckets;
use swiss_ctrl::stats::DebugStats;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Percentage of slots kept filled while churning.
    #[arg(short = 'l', long = "load", default_value_t = 80)]
    load: usize,

    /// Number of delete + insert rounds.
    #[arg(short = 'r', long = "rounds", default_value_t = 10_000)]
    rounds: u64,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Claims the first free slot on the value's probe sequence.
fn insert(block: &mut StatesAndBuckets<u64>, value: u64) -> usize {
    let hash = hash_u64(value);
    let (mut data, buckets) = block.split_mut();
    let mask = data.capacity_m1();
    let mut pos = hash as usize & mask;
    loop {
        let mut free = DefaultGroup::load(data.states(), pos).match_empty_or_deleted();
        if let Some(lane) = free.next() {
            let index = (pos + lane) & mask;
            buckets[index].write(value);
            data.set_state(index, State::from_hash(hash));
            return index;
        }
        pos = (pos + GROUP_SIZE) & mask;
    }
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating control bytes with target capacity: {}",
        args.target_capacity
    );

    let mut block: StatesAndBuckets<u64> = StatesAndBuckets::with_capacity(args.target_capacity);
    println!("Actual bucket count: {}", block.num_buckets());
    println!("Allocation size: {} bytes", block.allocation_size());

    let live = block.num_buckets() * args.load.min(99) / 100;
    let mut slots: Vec<usize> = (0..live as u64).map(|v| insert(&mut block, v)).collect();
    println!("Inserted {live} values");

    let mut reclaimed = 0u64;
    let mut next_value = live as u64;
    for round in 0..args.rounds {
        let victim = (hash_u64(round) as usize) % slots.len();
        if block.table_data_mut().set_deleted(slots[victim]) == State::EMPTY {
            reclaimed += 1;
        }
        slots[victim] = insert(&mut block, next_value);
        next_value += 1;
    }

    println!(
        "Deletes reclaimed straight to EMPTY: {} of {} ({:.02}%)",
        reclaimed,
        args.rounds,
        reclaimed as f64 / args.rounds.max(1) as f64 * 100.0
    );
    DebugStats::collect(&block.table_data()).print();
}
