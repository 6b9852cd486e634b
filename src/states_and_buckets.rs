use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::error::Error;
use crate::error::Result;
use crate::state::GROUP_SIZE;
use crate::state::State;
use crate::table_data::HashTableData;
use crate::table_data::num_states_for;

/// Rounds a requested slot count up to a valid bucket count.
#[inline]
fn bucket_count(requested: usize) -> Option<usize> {
    requested.max(GROUP_SIZE).checked_next_power_of_two()
}

#[derive(Debug, Clone, Copy)]
struct DataLayout {
    layout: Layout,
    buckets_offset: usize,
}

impl DataLayout {
    fn new<T>(num_buckets: usize) -> Result<Self> {
        let states_layout = Layout::array::<State>(num_states_for(num_buckets))
            .and_then(|layout| layout.align_to(GROUP_SIZE))
            .map_err(|_| Error::CapacityOverflow)?;
        let buckets_layout =
            Layout::array::<MaybeUninit<T>>(num_buckets).map_err(|_| Error::CapacityOverflow)?;

        let (layout, buckets_offset) = states_layout
            .extend(buckets_layout)
            .map_err(|_| Error::CapacityOverflow)?;

        Ok(DataLayout {
            layout: layout.pad_to_align(),
            buckets_offset,
        })
    }
}

/// Control bytes and bucket storage in one allocation.
///
/// The control array comes first, aligned to [`GROUP_SIZE`], followed by
/// `num_buckets` uninitialized `T`. The block only tracks slot states: bucket
/// contents are never read, written or dropped here, that is up to the
/// container built on top.
///
/// ## Example
///
/// ```rust
/// # use swiss_ctrl::State;
/// # use swiss_ctrl::StatesAndBuckets;
/// #
/// let mut block: StatesAndBuckets<u64> = StatesAndBuckets::with_capacity(20);
/// assert_eq!(block.num_buckets(), 32);
///
/// let (mut data, buckets) = block.split_mut();
/// buckets[7].write(42);
/// data.set_state(7, State::filled(0x15));
///
/// assert_eq!(block.table_data().first_filled_bucket(0), 7);
/// ```
pub struct StatesAndBuckets<T> {
    layout: DataLayout,
    alloc: NonNull<u8>,
    num_buckets: usize,

    _phantom: PhantomData<T>,
}

// SAFETY: The block owns its allocation exclusively, and the only typed data
// behind it is `MaybeUninit<T>`.
unsafe impl<T: Send> Send for StatesAndBuckets<T> {}
// SAFETY: Shared access only hands out shared slices.
unsafe impl<T: Sync> Sync for StatesAndBuckets<T> {}

impl<T> Debug for StatesAndBuckets<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StatesAndBuckets")
            .field("allocation_size", &self.allocation_size())
            .field("data", &self.table_data())
            .finish()
    }
}

impl<T> Drop for StatesAndBuckets<T> {
    fn drop(&mut self) {
        log::trace!(
            "releasing {} bytes of control bytes and buckets",
            self.layout.layout.size()
        );
        // SAFETY: `alloc` was returned by `alloc::alloc::alloc` for exactly this
        // layout, and is released only here.
        unsafe { alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout) }
    }
}

impl<T> StatesAndBuckets<T> {
    /// Allocates a block with room for at least `capacity` slots and resets
    /// its control bytes.
    ///
    /// The slot count is rounded up to a power of two of at least
    /// [`GROUP_SIZE`].
    ///
    /// # Panics
    ///
    /// Panics if the size overflows, and aborts through
    /// [`handle_alloc_error`] if the allocator fails.
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(block) => block,
            Err(Error::AllocFailed { size, align }) => {
                // SAFETY: This exact size/align pair was accepted by
                // `Layout::from_size_align` when building the data layout.
                handle_alloc_error(unsafe { Layout::from_size_align_unchecked(size, align) })
            }
            Err(Error::CapacityOverflow) => panic!("capacity overflow"),
        }
    }

    /// Fallible version of [`StatesAndBuckets::with_capacity`].
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        let num_buckets = bucket_count(capacity).ok_or(Error::CapacityOverflow)?;
        let layout = DataLayout::new::<T>(num_buckets)?;

        // SAFETY: The layout always holds at least `num_states` control bytes,
        // so its size is non-zero.
        let raw_alloc = unsafe { alloc::alloc::alloc(layout.layout) };
        let Some(alloc) = NonNull::new(raw_alloc) else {
            return Err(Error::AllocFailed {
                size: layout.layout.size(),
                align: layout.layout.align(),
            });
        };

        // SAFETY: The first `num_states` bytes of the block are the control
        // array. Writing them before any slice is formed makes every later
        // `&[State]` view point at initialized memory.
        unsafe {
            core::ptr::write_bytes(
                alloc.as_ptr(),
                State::EMPTY.as_byte(),
                num_states_for(num_buckets) - 1,
            );
            alloc
                .as_ptr()
                .add(num_states_for(num_buckets) - 1)
                .write(State::SENTINEL.as_byte());
        }

        log::trace!(
            "allocated {num_buckets} buckets in {} bytes",
            layout.layout.size()
        );

        Ok(Self {
            layout,
            alloc,
            num_buckets,
            _phantom: PhantomData,
        })
    }

    /// Number of slots.
    #[inline]
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Number of control bytes.
    #[inline]
    pub fn num_states(&self) -> usize {
        num_states_for(self.num_buckets)
    }

    /// Total size of the block in bytes.
    #[inline]
    pub fn allocation_size(&self) -> usize {
        self.layout.layout.size()
    }

    fn states_ptr(&self) -> NonNull<[State]> {
        NonNull::slice_from_raw_parts(self.alloc.cast::<State>(), self.num_states())
    }

    fn buckets_ptr(&self) -> NonNull<[MaybeUninit<T>]> {
        // SAFETY: `buckets_offset` lies inside the allocation, see `DataLayout`.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.buckets_offset).cast(),
                self.num_buckets,
            )
        }
    }

    /// Read-only view of the control bytes.
    #[inline]
    pub fn table_data(&self) -> HashTableData<&[State]> {
        // SAFETY: Control bytes are initialized at construction and only
        // mutated through `&mut self`.
        HashTableData::new(unsafe { self.states_ptr().as_ref() }, self.num_buckets)
    }

    /// Mutable view of the control bytes.
    #[inline]
    pub fn table_data_mut(&mut self) -> HashTableData<&mut [State]> {
        // SAFETY: See `table_data`; `&mut self` guarantees exclusivity.
        HashTableData::new(unsafe { self.states_ptr().as_mut() }, self.num_buckets)
    }

    /// Bucket storage.
    #[inline]
    pub fn buckets(&self) -> &[MaybeUninit<T>] {
        // SAFETY: The bucket region is in bounds and `MaybeUninit` needs no
        // initialization.
        unsafe { self.buckets_ptr().as_ref() }
    }

    /// Mutable bucket storage.
    #[inline]
    pub fn buckets_mut(&mut self) -> &mut [MaybeUninit<T>] {
        // SAFETY: See `buckets`; `&mut self` guarantees exclusivity.
        unsafe { self.buckets_ptr().as_mut() }
    }

    /// Mutable control bytes and bucket storage at the same time.
    #[inline]
    pub fn split_mut(&mut self) -> (HashTableData<&mut [State]>, &mut [MaybeUninit<T>]) {
        // SAFETY: The control bytes end before `buckets_offset`, so the two
        // slices never overlap, and `&mut self` keeps both exclusive.
        unsafe {
            let states = self.states_ptr().as_mut();
            let buckets = self.buckets_ptr().as_mut();
            (HashTableData::new(states, self.num_buckets), buckets)
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn rounds_capacity() {
        assert_eq!(StatesAndBuckets::<u64>::with_capacity(0).num_buckets(), 16);
        assert_eq!(StatesAndBuckets::<u64>::with_capacity(16).num_buckets(), 16);
        assert_eq!(StatesAndBuckets::<u64>::with_capacity(17).num_buckets(), 32);
        assert_eq!(StatesAndBuckets::<u64>::with_capacity(1000).num_buckets(), 1024);
    }

    #[test]
    fn starts_reset() {
        let block: StatesAndBuckets<String> = StatesAndBuckets::with_capacity(64);
        let data = block.table_data();
        let (last, rest) = data.states().split_last().unwrap();
        assert!(rest.iter().all(|s| s.is_empty()));
        assert!(last.is_sentinel());
        assert_eq!(data.first_filled_bucket(0), data.sentinel_index());
    }

    #[test]
    fn layout_is_aligned_and_disjoint() {
        let mut block: StatesAndBuckets<u128> = StatesAndBuckets::with_capacity(32);
        assert!(block.allocation_size() >= block.num_states() + 32 * 16);

        let states_end = block.table_data().states().as_ptr_range().end as usize;
        let (data, buckets) = block.split_mut();
        assert_eq!(data.states().as_ptr() as usize % GROUP_SIZE, 0);
        assert_eq!(buckets.len(), 32);
        assert!(buckets.as_ptr() as usize >= states_end);
        assert_eq!(buckets.as_ptr() as usize % align_of::<u128>(), 0);
    }

    #[test]
    fn zero_sized_buckets() {
        let mut block: StatesAndBuckets<()> = StatesAndBuckets::with_capacity(16);
        assert_eq!(block.buckets().len(), 16);
        block.table_data_mut().set_state(3, State::filled(1));
        assert_eq!(block.table_data().first_filled_bucket(0), 3);
    }

    #[test]
    fn split_mut_tracks_payloads() {
        let mut block: StatesAndBuckets<String> = StatesAndBuckets::with_capacity(16);
        {
            let (mut data, buckets) = block.split_mut();
            for i in [2, 9, 11] {
                buckets[i].write(i.to_string());
                data.set_state(i, State::filled(i as u8));
            }
        }

        let mut seen = String::new();
        let mut index = block.table_data().first_filled_bucket(0);
        while index < block.num_buckets() {
            // SAFETY: filled slots were written above.
            seen.push_str(unsafe { block.buckets()[index].assume_init_ref() });
            index = block.table_data().first_filled_bucket(index + 1);
        }
        assert_eq!(seen, "2911");

        let (mut data, buckets) = block.split_mut();
        for i in [2, 9, 11] {
            data.set_deleted(i);
            // SAFETY: the slot was filled until the line above.
            unsafe { buckets[i].assume_init_drop() };
        }
        assert_eq!(data.count_states().filled, 0);
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(
            StatesAndBuckets::<u64>::try_with_capacity(usize::MAX).unwrap_err(),
            Error::CapacityOverflow
        );
        assert_eq!(
            StatesAndBuckets::<[u8; 4096]>::try_with_capacity(usize::MAX / 8192).unwrap_err(),
            Error::CapacityOverflow
        );
    }
}
