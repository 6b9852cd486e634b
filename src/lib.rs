#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Word-sized lane sets, used for group-match results and as fixed-size free
/// lists.
pub mod bitmask;

/// Fallible allocation errors.
pub mod error;

/// 16-lane control-byte windows and their SSE2 and scalar matchers.
pub mod group;

/// Control-byte encoding.
pub mod state;

/// Owning allocation of control bytes plus bucket storage.
pub mod states_and_buckets;

/// Occupancy statistics.
#[cfg(feature = "stats")]
pub mod stats;

pub mod table_data;

pub use bitmask::BitMask;
pub use error::Error;
pub use group::DefaultGroup;
pub use group::Group;
pub use state::GROUP_SIZE;
pub use state::State;
pub use state::StateKind;
pub use states_and_buckets::StatesAndBuckets;
pub use table_data::HashTableData;
