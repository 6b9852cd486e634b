use core::fmt::Debug;

use crate::group::DefaultGroup;
use crate::group::Group;
use crate::group::GroupMask;
use crate::group::lanes_from;
use crate::state::GROUP_SIZE;
use crate::state::NUM_MIRRORED;
use crate::state::State;
use crate::state::StateKind;

mod sealed {
    pub trait Sealed {}
}

/// Borrowed control-byte storage a [`HashTableData`] can read.
///
/// Sealed: only `&[State]` and `&mut [State]` qualify, so the buffer seen by
/// every call is the one validated at construction.
pub trait StatesRef: AsRef<[State]> + sealed::Sealed {}

/// Borrowed control-byte storage a [`HashTableData`] can mutate.
pub trait StatesMut: StatesRef + AsMut<[State]> {}

impl sealed::Sealed for &[State] {}
impl StatesRef for &[State] {}
impl sealed::Sealed for &mut [State] {}
impl StatesRef for &mut [State] {}
impl StatesMut for &mut [State] {}

/// Occupancy of the logical slots of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateCounts {
    /// Slots holding a live element.
    pub filled: usize,
    /// Tombstones.
    pub deleted: usize,
    /// Never-used (or reclaimed) slots.
    pub empty: usize,
}

/// Control-byte bookkeeping for an open-addressing table of `num_buckets`
/// slots.
///
/// The storage layout is:
///
/// ```text
/// [0, num_buckets)                  slot states
/// [num_buckets, num_buckets + 15)   copy of states [0, 15)
/// [num_buckets + 15]                SENTINEL
/// ```
///
/// The copied tail lets a [`GROUP_SIZE`] window be read from any slot without
/// wrapping. `HashTableData` never allocates; the buffer belongs to the
/// caller, see [`crate::StatesAndBuckets`] for an owning block.
///
/// Index, transition and double-delete contracts are checked with
/// `debug_assert!` only. The layout checks in [`HashTableData::new`] are
/// always on since the aligned group loads rely on them.
pub struct HashTableData<S> {
    states: S,
    capacity_m1: usize,
}

/// Number of control bytes needed for a table of `num_buckets` slots.
#[inline(always)]
pub const fn num_states_for(num_buckets: usize) -> usize {
    num_buckets + GROUP_SIZE
}

impl<S: StatesRef> HashTableData<S> {
    /// Wraps a control-byte buffer for a table of `num_buckets` slots.
    ///
    /// The buffer is used as is; call [`HashTableData::reset_states`] before
    /// the first mutation if it does not already hold a valid table.
    ///
    /// # Panics
    ///
    /// If `num_buckets` is not a power of two of at least [`GROUP_SIZE`], if
    /// `states` is shorter than [`num_states_for`], or if it is
    /// not aligned to [`GROUP_SIZE`] bytes.
    pub fn new(states: S, num_buckets: usize) -> Self {
        assert!(
            num_buckets.is_power_of_two() && num_buckets >= GROUP_SIZE,
            "bucket count {num_buckets} must be a power of two of at least {GROUP_SIZE}"
        );

        let buffer = states.as_ref();
        assert!(
            buffer.len() >= num_states_for(num_buckets),
            "control buffer of {} bytes is too small for {num_buckets} buckets",
            buffer.len()
        );
        assert!(
            buffer.as_ptr() as usize % GROUP_SIZE == 0,
            "control buffer must be {GROUP_SIZE}-byte aligned"
        );

        Self {
            states,
            capacity_m1: num_buckets - 1,
        }
    }

    /// Returns the wrapped buffer.
    pub fn into_inner(self) -> S {
        self.states
    }

    /// Number of slots.
    #[inline(always)]
    pub fn num_buckets(&self) -> usize {
        self.capacity_m1 + 1
    }

    /// Number of control bytes, including the copied tail and the sentinel.
    #[inline(always)]
    pub fn num_states(&self) -> usize {
        num_states_for(self.num_buckets())
    }

    /// `num_buckets() - 1`, the mask applied to every slot index.
    #[inline(always)]
    pub fn capacity_m1(&self) -> usize {
        self.capacity_m1
    }

    /// Position of the sentinel, which is what scans report when they find
    /// nothing.
    #[inline(always)]
    pub fn sentinel_index(&self) -> usize {
        self.num_states() - 1
    }

    /// All control bytes, copied tail and sentinel included.
    #[inline(always)]
    pub fn states(&self) -> &[State] {
        &self.states.as_ref()[..self.num_states()]
    }

    /// State of slot `index`.
    #[inline(always)]
    pub fn state(&self, index: usize) -> State {
        debug_assert!(index < self.num_states());
        self.states()[index]
    }

    #[inline(always)]
    fn mirror_index(&self, index: usize) -> usize {
        // Slots below NUM_MIRRORED land on `index + num_buckets`, every other
        // slot maps onto itself.
        (index.wrapping_sub(NUM_MIRRORED) & self.capacity_m1) + (NUM_MIRRORED & self.capacity_m1)
    }

    /// Offset from `start` of the first filled slot at or after `start`.
    ///
    /// Returns `sentinel_index() - start` when no slot from `start` on is
    /// filled. Groups are loaded from aligned addresses; the part of the first
    /// group that lies before `start` is masked off.
    pub fn first_filled_bucket_offset(&self, start: usize) -> usize {
        let states = self.states();
        debug_assert!(start < states.len());

        let mut base = start & !(GROUP_SIZE - 1);
        let mut visited = lanes_from(start - base);
        while base < states.len() {
            // SAFETY: The buffer start is aligned to GROUP_SIZE (checked in
            // `new`, and the sealed `StatesRef` impls always hand back that same
            // buffer). `base` is a multiple of GROUP_SIZE, and `num_states` is
            // too, so the window lies inside `states`.
            let group = unsafe { DefaultGroup::load_aligned(states, base) };

            // The final group holds the copied tail, whose filled lanes are
            // duplicates of slots already scanned. The sentinel wins there.
            let sentinel = group.match_sentinel() & visited;
            if sentinel.any_true() {
                return base + sentinel.first_bit_set_assume_not_empty() - start;
            }

            let filled = group.match_filled() & visited;
            if filled.any_true() {
                return base + filled.first_bit_set_assume_not_empty() - start;
            }

            base += GROUP_SIZE;
            visited = GroupMask::full();
        }

        if cfg!(debug_assertions) {
            panic!("control bytes have no sentinel, reset_states was never called");
        }
        self.sentinel_index() - start
    }

    /// Index of the first filled slot at or after `start`, or
    /// [`HashTableData::sentinel_index`] if there is none.
    #[inline]
    pub fn first_filled_bucket(&self, start: usize) -> usize {
        start + self.first_filled_bucket_offset(start)
    }

    /// Counts filled, deleted and empty slots.
    pub fn count_states(&self) -> StateCounts {
        let states = self.states();
        let mut counts = StateCounts::default();
        for base in (0..self.num_buckets()).step_by(GROUP_SIZE) {
            // SAFETY: `base` is a multiple of GROUP_SIZE below `num_buckets`,
            // and the buffer is aligned (see `first_filled_bucket_offset`).
            let group = unsafe { DefaultGroup::load_aligned(states, base) };
            counts.filled += group.match_filled().count();
            counts.deleted += group.match_deleted().count();
            counts.empty += group.match_empty().count();
        }
        counts
    }
}

impl<S: StatesMut> HashTableData<S> {
    /// Marks every slot empty and writes the sentinel.
    pub fn reset_states(&mut self) {
        let num_states = self.num_states();
        let states = &mut self.states.as_mut()[..num_states];
        debug_assert!(states.as_ptr() as usize % GROUP_SIZE == 0);

        states[..num_states - 1].fill(State::EMPTY);
        states[num_states - 1] = State::SENTINEL;

        log::trace!("reset {num_states} control bytes");
    }

    /// Writes `state` into slot `index` and its copy in the tail, returning
    /// the previous state.
    ///
    /// `index` must be a slot (`< num_buckets()`) and `state` must not be
    /// [`State::SENTINEL`].
    #[inline]
    pub fn set_state(&mut self, index: usize, state: State) -> State {
        debug_assert!(index < self.num_buckets(), "slot {index} out of range");
        debug_assert!(!state.is_sentinel(), "the sentinel is never moved");

        let mirror = self.mirror_index(index);
        let states = self.states.as_mut();
        let previous = states[index];
        debug_assert_eq!(
            states[mirror], previous,
            "copied tail out of sync for slot {index}"
        );

        states[index] = state;
        states[mirror] = state;
        previous
    }

    /// Clears the filled slot `index`, returning the state written.
    ///
    /// The slot goes straight back to [`State::EMPTY`] when no probe sequence
    /// can have run past it: that is the case when the empty lanes nearest to
    /// it on the left and on the right are less than a group apart, since any
    /// group scan covering the slot would then have stopped at one of them.
    /// Otherwise it becomes a [`State::DELETED`] tombstone.
    pub fn set_deleted(&mut self, index: usize) -> State {
        debug_assert!(
            self.state(index).is_filled(),
            "deleting slot {index} which is {:?}",
            self.state(index)
        );

        let before = index.wrapping_sub(GROUP_SIZE) & self.capacity_m1;
        let states = self.states();
        let empty_after = DefaultGroup::load(states, index).match_empty();
        let empty_before = DefaultGroup::load(states, before).match_empty();

        let state = if empty_after.trailing_zeros() + empty_before.leading_zeros() < GROUP_SIZE {
            State::EMPTY
        } else {
            State::DELETED
        };
        self.set_state(index, state);
        state
    }
}

impl<S: StatesRef> Debug for HashTableData<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTableData")
            .field("num_buckets", &self.num_buckets())
            .field("states", &Rows(self.states()))
            .finish()
    }
}

/// One line per group: `..` empty, `xx` deleted, `||` sentinel, hex tag
/// otherwise.
struct Rows<'a>(&'a [State]);

impl Debug for Rows<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.0.chunks(GROUP_SIZE).map(Row))
            .finish()
    }
}

struct Row<'a>(&'a [State]);

impl Debug for Row<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, state) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            match state.kind() {
                StateKind::Empty => f.write_str("..")?,
                StateKind::Deleted => f.write_str("xx")?,
                StateKind::Sentinel => f.write_str("||")?,
                StateKind::Filled(tag) => write!(f, "{tag:02x}")?,
            }
        }
        Ok(())
    }
}
