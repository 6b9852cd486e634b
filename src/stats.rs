use crate::state::State;
use crate::table_data::HashTableData;
use crate::table_data::StatesRef;

/// Occupancy statistics for a control-byte array.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugStats {
    /// Number of slots
    pub num_buckets: usize,
    /// Slots holding a live element
    pub filled: usize,
    /// Tombstones
    pub deleted: usize,
    /// Empty slots
    pub empty: usize,
    /// Load factor (filled / num_buckets)
    pub load_factor: f64,
    /// Share of non-empty slots that are tombstones
    pub tombstone_ratio: f64,
    /// Bytes of control state, copied tail and sentinel included
    pub control_bytes: usize,
}

impl DebugStats {
    /// Gathers statistics from `data`.
    pub fn collect<S: StatesRef>(data: &HashTableData<S>) -> Self {
        let counts = data.count_states();
        let used = counts.filled + counts.deleted;
        Self {
            num_buckets: data.num_buckets(),
            filled: counts.filled,
            deleted: counts.deleted,
            empty: counts.empty,
            load_factor: counts.filled as f64 / data.num_buckets() as f64,
            tombstone_ratio: if used == 0 {
                0.0
            } else {
                counts.deleted as f64 / used as f64
            },
            control_bytes: data.num_states() * size_of::<State>(),
        }
    }

    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Control Byte Statistics ===");
        println!(
            "Occupancy: {}/{} ({:.2}% load factor)",
            self.filled,
            self.num_buckets,
            self.load_factor * 100.0
        );
        println!(
            "Tombstones: {} ({:.2}% of used slots)",
            self.deleted,
            self.tombstone_ratio * 100.0
        );
        println!("Empty: {}", self.empty);
        println!("Control bytes: {}", self.control_bytes);
    }
}
