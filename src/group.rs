use crate::bitmask::BitMask;
use crate::state::GROUP_SIZE;
use crate::state::State;

/// Result of classifying the lanes of one group, one bit per control byte.
pub type GroupMask = BitMask<u16>;

/// A [`GROUP_SIZE`]-byte window of control bytes, classified in one shot.
///
/// [`sse2::Sse2Group`] and [`generic::GenericGroup`] produce bit-identical
/// masks; [`DefaultGroup`] is whichever is fastest on the target.
pub trait Group: Copy {
    /// Loads the window `states[index..index + GROUP_SIZE]`.
    ///
    /// Panics if the window runs past the end of `states`.
    fn load(states: &[State], index: usize) -> Self;

    /// Loads the window `states[index..index + GROUP_SIZE]` with an aligned
    /// load.
    ///
    /// # Safety
    ///
    /// `states.as_ptr().add(index)` must be aligned to [`GROUP_SIZE`] bytes.
    /// The window must also lie inside `states`, which is checked.
    unsafe fn load_aligned(states: &[State], index: usize) -> Self;

    /// Lanes equal to `tag`.
    fn match_tag(self, tag: State) -> GroupMask;

    /// Lanes holding [`State::EMPTY`].
    #[inline(always)]
    fn match_empty(self) -> GroupMask {
        self.match_tag(State::EMPTY)
    }

    /// Lanes holding [`State::DELETED`].
    #[inline(always)]
    fn match_deleted(self) -> GroupMask {
        self.match_tag(State::DELETED)
    }

    /// Lanes holding [`State::SENTINEL`].
    #[inline(always)]
    fn match_sentinel(self) -> GroupMask {
        self.match_tag(State::SENTINEL)
    }

    /// Lanes holding either [`State::EMPTY`] or [`State::DELETED`].
    fn match_empty_or_deleted(self) -> GroupMask;

    /// Lanes holding a filled (non-negative) state.
    fn match_filled(self) -> GroupMask;
}

/// Mask of the lanes at or after `lane`, used to ignore the part of an
/// aligned-down group that lies before the scan origin.
#[inline(always)]
pub(crate) fn lanes_from(lane: usize) -> GroupMask {
    debug_assert!(lane < GROUP_SIZE);
    !GroupMask::set_first_n(lane)
}

cfg_if::cfg_if! {
    if #[cfg(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2",
        not(feature = "force-generic"),
        not(miri),
    ))] {
        /// Group implementation selected for this target.
        pub type DefaultGroup = sse2::Sse2Group;
    } else {
        /// Group implementation selected for this target.
        pub type DefaultGroup = generic::GenericGroup;
    }
}

/// Portable scalar implementation, one byte compare per lane.
pub mod generic {
    use super::Group;
    use super::GroupMask;
    use crate::state::GROUP_SIZE;
    use crate::state::State;

    /// Plain copy of the window.
    #[derive(Clone, Copy, Debug)]
    pub struct GenericGroup([State; GROUP_SIZE]);

    impl GenericGroup {
        #[inline(always)]
        fn match_lanes(self, pred: impl Fn(State) -> bool) -> GroupMask {
            let mut bits: u16 = 0;
            for (i, &state) in self.0.iter().enumerate() {
                if pred(state) {
                    bits |= 1 << i;
                }
            }
            GroupMask::new(bits)
        }
    }

    impl Group for GenericGroup {
        #[inline(always)]
        fn load(states: &[State], index: usize) -> Self {
            let mut window = [State::EMPTY; GROUP_SIZE];
            window.copy_from_slice(&states[index..index + GROUP_SIZE]);
            GenericGroup(window)
        }

        #[inline(always)]
        unsafe fn load_aligned(states: &[State], index: usize) -> Self {
            debug_assert!(
                (states.as_ptr() as usize).wrapping_add(index) % GROUP_SIZE == 0,
                "misaligned group load at {index}"
            );
            Self::load(states, index)
        }

        #[inline(always)]
        fn match_tag(self, tag: State) -> GroupMask {
            self.match_lanes(|state| state == tag)
        }

        #[inline(always)]
        fn match_empty_or_deleted(self) -> GroupMask {
            self.match_lanes(State::is_empty_or_deleted)
        }

        #[inline(always)]
        fn match_filled(self) -> GroupMask {
            self.match_lanes(State::is_filled)
        }
    }
}

/// SSE2 implementation, one compare plus `movemask` per query.
#[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), target_feature = "sse2"))]
pub mod sse2 {
    #[cfg(target_arch = "x86")]
    use core::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64::*;

    use super::Group;
    use super::GroupMask;
    use crate::state::GROUP_SIZE;
    use crate::state::State;

    /// The window held in an XMM register.
    #[derive(Clone, Copy, Debug)]
    pub struct Sse2Group(__m128i);

    impl Group for Sse2Group {
        #[inline(always)]
        fn load(states: &[State], index: usize) -> Self {
            let window = &states[index..index + GROUP_SIZE];
            // SAFETY: `window` is exactly 16 bytes long (`State` is a
            // transparent `i8`) and `_mm_loadu_si128` has no alignment
            // requirement.
            unsafe { Sse2Group(_mm_loadu_si128(window.as_ptr() as *const __m128i)) }
        }

        #[inline(always)]
        unsafe fn load_aligned(states: &[State], index: usize) -> Self {
            let window = &states[index..index + GROUP_SIZE];
            debug_assert!(
                window.as_ptr() as usize % GROUP_SIZE == 0,
                "misaligned group load at {index}"
            );
            // SAFETY: `window` is exactly 16 bytes long, and the caller
            // guarantees it starts on a 16-byte boundary as required by
            // `_mm_load_si128`.
            unsafe { Sse2Group(_mm_load_si128(window.as_ptr() as *const __m128i)) }
        }

        #[inline(always)]
        fn match_tag(self, tag: State) -> GroupMask {
            // SAFETY: SSE2 is statically enabled for this module.
            unsafe {
                let cmp = _mm_cmpeq_epi8(self.0, _mm_set1_epi8(tag.as_i8()));
                GroupMask::new(_mm_movemask_epi8(cmp) as u16)
            }
        }

        #[inline(always)]
        fn match_empty_or_deleted(self) -> GroupMask {
            // EMPTY and DELETED are the only states below SENTINEL when
            // compared as signed bytes.
            //
            // SAFETY: SSE2 is statically enabled for this module.
            unsafe {
                let special = _mm_set1_epi8(State::SENTINEL.as_i8());
                let cmp = _mm_cmpgt_epi8(special, self.0);
                GroupMask::new(_mm_movemask_epi8(cmp) as u16)
            }
        }

        #[inline(always)]
        fn match_filled(self) -> GroupMask {
            // Filled bytes are exactly the ones with the sign bit clear.
            //
            // SAFETY: SSE2 is statically enabled for this module.
            unsafe { !GroupMask::new(_mm_movemask_epi8(self.0) as u16) }
        }
    }
}
