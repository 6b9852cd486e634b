use std::collections::HashSet;
use std::hash::Hasher;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use siphasher::sip::SipHasher;
use swiss_ctrl::DefaultGroup;
use swiss_ctrl::GROUP_SIZE;
use swiss_ctrl::Group;
use swiss_ctrl::State;
use swiss_ctrl::StatesAndBuckets;

/// Minimal set of `u64` keys probing group by group from the hashed slot.
///
/// A lookup stops at the first window holding an empty lane, which is exactly
/// what `set_deleted` has to keep working.
struct ProbingSet {
    block: StatesAndBuckets<u64>,
    len: usize,
    k0: u64,
    k1: u64,
    reclaimed: usize,
    tombstoned: usize,
}

impl ProbingSet {
    fn with_capacity(capacity: usize, rng: &mut SmallRng) -> Self {
        Self {
            block: StatesAndBuckets::with_capacity(capacity),
            len: 0,
            k0: rng.random(),
            k1: rng.random(),
            reclaimed: 0,
            tombstoned: 0,
        }
    }

    fn hash(&self, key: u64) -> u64 {
        let mut hasher = SipHasher::new_with_keys(self.k0, self.k1);
        hasher.write_u64(key);
        hasher.finish()
    }

    fn probes(&self, hash: u64) -> impl Iterator<Item = usize> + use<> {
        let mask = self.block.num_buckets() - 1;
        let start = hash as usize & mask;
        (0..self.block.num_buckets() / GROUP_SIZE).map(move |i| (start + i * GROUP_SIZE) & mask)
    }

    fn find(&self, key: u64) -> Option<usize> {
        let hash = self.hash(key);
        let data = self.block.table_data();
        let mask = data.capacity_m1();
        for pos in self.probes(hash) {
            let group = DefaultGroup::load(data.states(), pos);
            for lane in group.match_tag(State::from_hash(hash)) {
                let index = (pos + lane) & mask;
                // SAFETY: the slot is filled, so its bucket was written.
                if unsafe { self.block.buckets()[index].assume_init_read() } == key {
                    return Some(index);
                }
            }
            if group.match_empty().any_true() {
                return None;
            }
        }
        None
    }

    fn insert(&mut self, key: u64) -> bool {
        if self.find(key).is_some() {
            return false;
        }
        assert!(self.len < self.block.num_buckets());

        let hash = self.hash(key);
        let probes: Vec<usize> = self.probes(hash).collect();
        let (mut data, buckets) = self.block.split_mut();
        let mask = data.capacity_m1();
        for pos in probes {
            let mut free = DefaultGroup::load(data.states(), pos).match_empty_or_deleted();
            if let Some(lane) = free.next() {
                let index = (pos + lane) & mask;
                buckets[index].write(key);
                data.set_state(index, State::from_hash(hash));
                self.len += 1;
                return true;
            }
        }
        unreachable!("no free slot with {} of {} used", self.len, data.num_buckets());
    }

    fn remove(&mut self, key: u64) -> bool {
        let Some(index) = self.find(key) else {
            return false;
        };
        match self.block.table_data_mut().set_deleted(index) {
            state if state == State::EMPTY => self.reclaimed += 1,
            state if state == State::DELETED => self.tombstoned += 1,
            state => panic!("set_deleted wrote {state:?}"),
        }
        self.len -= 1;
        true
    }

    fn keys(&self) -> HashSet<u64> {
        let data = self.block.table_data();
        let mut keys = HashSet::new();
        let mut index = data.first_filled_bucket(0);
        while index < data.num_buckets() {
            // SAFETY: `first_filled_bucket` only reports filled slots.
            keys.insert(unsafe { self.block.buckets()[index].assume_init_read() });
            index = data.first_filled_bucket(index + 1);
        }
        assert_eq!(index, data.sentinel_index());
        keys
    }
}

fn churn(capacity: usize, max_load: usize, ops: usize, seed: u64) -> ProbingSet {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut set = ProbingSet::with_capacity(capacity, &mut rng);
    let mut reference = HashSet::new();
    let key_space = (max_load * 2) as u64;

    for _ in 0..ops {
        let key = rng.random_range(0..key_space);
        if reference.len() < max_load && rng.random_bool(0.55) {
            assert_eq!(set.insert(key), reference.insert(key));
        } else {
            assert_eq!(set.remove(key), reference.remove(&key));
        }

        let probe = rng.random_range(0..key_space);
        assert_eq!(set.find(probe).is_some(), reference.contains(&probe), "key {probe}");
    }

    for &key in &reference {
        assert!(set.find(key).is_some(), "lost {key}");
    }
    assert_eq!(set.keys(), reference);
    assert_eq!(set.block.table_data().count_states().filled, reference.len());
    set
}

#[test]
fn churn_at_low_load_reclaims_slots() {
    let set = churn(256, 64, 20_000, 1);
    assert!(set.reclaimed > 0);
}

#[test]
#[cfg_attr(miri, ignore)]
fn churn_at_high_load_keeps_lookups_correct() {
    let set = churn(256, 224, 50_000, 2);
    assert!(set.tombstoned > 0, "{:?}", set.block.table_data());
}

#[test]
fn churn_in_single_group_table() {
    churn(16, 14, 5_000, 3);
}

#[test]
fn first_filled_walks_every_key() {
    let mut rng = SmallRng::seed_from_u64(4);
    let mut set = ProbingSet::with_capacity(1024, &mut rng);
    let mut expected = HashSet::new();
    for _ in 0..700 {
        let key = rng.random();
        set.insert(key);
        expected.insert(key);
    }
    assert_eq!(set.keys(), expected);
}
