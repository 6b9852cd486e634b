use core::fmt::Debug;
use core::ops::BitAnd;
use core::ops::BitOr;
use core::ops::Not;

/// Unsigned machine word usable as the backing store of a [`BitMask`].
///
/// Implemented for `u8`, `u16`, `u32`, `u64` and `u128`.
pub trait BitWord:
    Copy
    + Eq
    + Debug
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Not<Output = Self>
    + sealed::Sealed
{
    /// Number of bits in the word.
    const BITS: usize;
    /// No bit set.
    const ZERO: Self;
    /// Every bit set.
    const ONES: Self;

    #[doc(hidden)]
    fn shl(self, n: usize) -> Self;
    #[doc(hidden)]
    fn shr(self, n: usize) -> Self;
    #[doc(hidden)]
    fn count_ones(self) -> usize;
    #[doc(hidden)]
    fn trailing_zeros(self) -> usize;
    #[doc(hidden)]
    fn leading_zeros(self) -> usize;
    #[doc(hidden)]
    fn clear_lowest(self) -> Self;
}

mod sealed {
    pub trait Sealed {}
}

macro_rules! impl_bit_word {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}

        impl BitWord for $t {
            const BITS: usize = <$t>::BITS as usize;
            const ZERO: Self = 0;
            const ONES: Self = <$t>::MAX;

            #[inline(always)]
            fn shl(self, n: usize) -> Self {
                self << n
            }

            #[inline(always)]
            fn shr(self, n: usize) -> Self {
                self >> n
            }

            #[inline(always)]
            fn count_ones(self) -> usize {
                <$t>::count_ones(self) as usize
            }

            #[inline(always)]
            fn trailing_zeros(self) -> usize {
                <$t>::trailing_zeros(self) as usize
            }

            #[inline(always)]
            fn leading_zeros(self) -> usize {
                <$t>::leading_zeros(self) as usize
            }

            #[inline(always)]
            fn clear_lowest(self) -> Self {
                self & self.wrapping_sub(1)
            }
        }
    )*};
}

impl_bit_word!(u8, u16, u32, u64, u128);

/// A word-sized set of lane bits.
///
/// Bit `i` means "lane `i` matched" for group scans, or "resource `i` is free"
/// when the mask is used as a fixed-size free list. Index-returning helpers
/// that can fail return the index **plus one** and use `0` for "nothing found",
/// so lane 0 stays a valid answer.
///
/// Iterating a `BitMask` yields the set lanes from lowest to highest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct BitMask<W>(W);

impl<W: BitWord> BitMask<W> {
    /// Number of lanes in the mask.
    pub const BIT_COUNT: usize = W::BITS;

    /// A mask with no bit set.
    #[inline(always)]
    pub fn empty() -> Self {
        BitMask(W::ZERO)
    }

    /// A mask with every bit set.
    #[inline(always)]
    pub fn full() -> Self {
        BitMask(W::ONES)
    }

    /// Wraps a raw word.
    #[inline(always)]
    pub fn new(bits: W) -> Self {
        BitMask(bits)
    }

    /// Raw word.
    #[inline(always)]
    pub fn bits(self) -> W {
        self.0
    }

    /// Mask with bits `0..n` set.
    #[inline(always)]
    pub fn set_first_n(n: usize) -> Self {
        debug_assert!(n <= W::BITS);
        if n >= W::BITS {
            BitMask(W::ONES)
        } else {
            BitMask(!W::ONES.shl(n))
        }
    }

    /// Mask with bits `BITS - n..BITS` set.
    #[inline(always)]
    pub fn set_last_n(n: usize) -> Self {
        debug_assert!(n <= W::BITS);
        if n == 0 {
            BitMask(W::ZERO)
        } else {
            BitMask(W::ONES.shl(W::BITS - n))
        }
    }

    #[inline(always)]
    fn run(index: usize, n: usize) -> W {
        debug_assert!(index < W::BITS);
        debug_assert!(n >= 1 && index + n <= W::BITS);
        Self::set_first_n(n).0.shl(index)
    }

    /// Reads bit `index`.
    #[inline(always)]
    pub fn get(self, index: usize) -> bool {
        debug_assert!(index < W::BITS);
        self.0 & W::ONES.shr(W::BITS - 1).shl(index) != W::ZERO
    }

    /// Writes bit `index`.
    #[inline(always)]
    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < W::BITS);
        let bit = W::ONES.shr(W::BITS - 1).shl(index);
        if value {
            self.0 = self.0 | bit;
        } else {
            self.0 = self.0 & !bit;
        }
    }

    /// Number of set bits.
    #[inline(always)]
    pub fn count(self) -> usize {
        self.0.count_ones()
    }

    /// Every bit is set.
    #[inline(always)]
    pub fn all_true(self) -> bool {
        self.0 == W::ONES
    }

    /// No bit is set.
    #[inline(always)]
    pub fn all_false(self) -> bool {
        self.0 == W::ZERO
    }

    /// At least one bit is set.
    #[inline(always)]
    pub fn any_true(self) -> bool {
        self.0 != W::ZERO
    }

    /// At least one bit is clear.
    #[inline(always)]
    pub fn any_false(self) -> bool {
        self.0 != W::ONES
    }

    /// Number of clear bits below the lowest set bit, `BITS` when empty.
    #[inline(always)]
    pub fn trailing_zeros(self) -> usize {
        self.0.trailing_zeros()
    }

    /// Number of clear bits above the highest set bit, `BITS` when empty.
    #[inline(always)]
    pub fn leading_zeros(self) -> usize {
        self.0.leading_zeros()
    }

    /// Index of the lowest set bit. The mask must not be empty.
    #[inline(always)]
    pub fn first_bit_set_assume_not_empty(self) -> usize {
        debug_assert!(self.any_true());
        self.0.trailing_zeros()
    }

    /// Index of the highest set bit. The mask must not be empty.
    #[inline(always)]
    pub fn last_bit_set_assume_not_empty(self) -> usize {
        debug_assert!(self.any_true());
        W::BITS - 1 - self.0.leading_zeros()
    }

    /// Clears the lowest set bit and returns its index plus one, or `0` if the
    /// mask was empty.
    #[inline(always)]
    pub fn pop_front(&mut self) -> usize {
        if self.all_false() {
            0
        } else {
            self.pop_front_assume_not_empty() + 1
        }
    }

    /// Clears the lowest set bit and returns its 0-based index. The mask must
    /// not be empty.
    #[inline(always)]
    pub fn pop_front_assume_not_empty(&mut self) -> usize {
        let index = self.first_bit_set_assume_not_empty();
        self.0 = self.0.clear_lowest();
        index
    }

    /// Claims the lowest run of `n` contiguous set bits.
    ///
    /// Returns the run's first index plus one, or `0` if no such run exists.
    /// The claimed bits are cleared.
    pub fn allocate(&mut self, n: usize) -> usize {
        debug_assert!(n >= 1 && n <= W::BITS);

        let mut candidates = self.0;
        while candidates != W::ZERO {
            let start = candidates.trailing_zeros();
            if start + n > W::BITS {
                return 0;
            }

            let run = Self::run(start, n);
            if self.0 & run == run {
                self.0 = self.0 & !run;
                return start + 1;
            }

            // The run of free bits starting at `start` is shorter than `n`,
            // skip all of it.
            let len = (!candidates.shr(start)).trailing_zeros();
            candidates = candidates & !Self::set_first_n(start + len).0;
        }

        0
    }

    /// Moves the `old_n`-bit run at `index` into a fresh `n`-bit run.
    ///
    /// The old run is released first so the new one may overlap it. On
    /// failure the old run is kept and `0` is returned, otherwise the new run's
    /// first index plus one.
    pub fn reallocate(&mut self, index: usize, old_n: usize, n: usize) -> usize {
        let old = Self::run(index, old_n);
        debug_assert!(self.0 & old == W::ZERO, "reallocating a free run");

        self.0 = self.0 | old;
        let new = self.allocate(n);
        if new == 0 {
            self.0 = self.0 & !old;
        }
        new
    }

    /// Releases `n` bits starting at `index`. None of them may already be free.
    #[inline]
    pub fn deallocate(&mut self, index: usize, n: usize) {
        let run = Self::run(index, n);
        debug_assert!(self.0 & run == W::ZERO, "double free of {n} bits at {index}");
        self.0 = self.0 | run;
    }
}

impl<W: BitWord> Iterator for BitMask<W> {
    type Item = usize;

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        if self.all_false() {
            None
        } else {
            Some(self.pop_front_assume_not_empty())
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.count();
        (count, Some(count))
    }
}

impl<W: BitWord> ExactSizeIterator for BitMask<W> {}

impl<W: BitWord> From<W> for BitMask<W> {
    #[inline(always)]
    fn from(bits: W) -> Self {
        BitMask(bits)
    }
}

impl<W: BitWord> BitAnd for BitMask<W> {
    type Output = Self;

    #[inline(always)]
    fn bitand(self, rhs: Self) -> Self {
        BitMask(self.0 & rhs.0)
    }
}

impl<W: BitWord> BitOr for BitMask<W> {
    type Output = Self;

    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self {
        BitMask(self.0 | rhs.0)
    }
}

impl<W: BitWord> Not for BitMask<W> {
    type Output = Self;

    #[inline(always)]
    fn not(self) -> Self {
        BitMask(!self.0)
    }
}

impl<W: BitWord> Debug for BitMask<W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("BitMask(")?;
        for i in (0..W::BITS).rev() {
            f.write_str(if self.get(i) { "1" } else { "0" })?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn first_and_last_n() {
        assert_eq!(BitMask::<u8>::set_first_n(0).bits(), 0);
        assert_eq!(BitMask::<u8>::set_first_n(3).bits(), 0b0000_0111);
        assert_eq!(BitMask::<u8>::set_first_n(8).bits(), 0xFF);
        assert_eq!(BitMask::<u8>::set_last_n(0).bits(), 0);
        assert_eq!(BitMask::<u8>::set_last_n(3).bits(), 0b1110_0000);
        assert_eq!(BitMask::<u8>::set_last_n(8).bits(), 0xFF);
        assert!(BitMask::<u64>::set_first_n(64).all_true());
        assert!(BitMask::<u128>::set_last_n(128).all_true());
    }

    #[test]
    fn get_and_set() {
        let mut mask = BitMask::<u32>::empty();
        mask.set(0, true);
        mask.set(31, true);
        mask.set(7, true);
        assert!(mask.get(0) && mask.get(7) && mask.get(31));
        assert!(!mask.get(1));
        mask.set(7, false);
        assert!(!mask.get(7));
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.first_bit_set_assume_not_empty(), 0);
        assert_eq!(mask.last_bit_set_assume_not_empty(), 31);
    }

    #[test]
    fn predicates() {
        let empty = BitMask::<u16>::empty();
        let full = BitMask::<u16>::full();
        let some = BitMask::<u16>::new(0b1010);

        assert!(empty.all_false() && empty.any_false());
        assert!(!empty.any_true() && !empty.all_true());
        assert!(full.all_true() && full.any_true());
        assert!(!full.any_false() && !full.all_false());
        assert!(some.any_true() && some.any_false());
        assert!(!some.all_true() && !some.all_false());
    }

    #[test]
    fn zero_counts_on_empty() {
        let empty = BitMask::<u16>::empty();
        assert_eq!(empty.trailing_zeros(), 16);
        assert_eq!(empty.leading_zeros(), 16);
    }

    #[test]
    fn pop_front_drains_first_n() {
        for n in 1..=u32::BITS as usize {
            let mut mask = BitMask::<u32>::set_first_n(n);
            let mut seen = Vec::new();
            loop {
                let index = mask.pop_front();
                if index == 0 {
                    break;
                }
                assert!(index - 1 < n);
                assert!(!seen.contains(&index));
                seen.push(index);
            }
            assert_eq!(seen.len(), n);
            assert_eq!(mask.pop_front(), 0);
        }
    }

    #[test]
    fn iterates_lanes_in_order() {
        let lanes: Vec<usize> = BitMask::<u16>::new(0b1000_0000_0010_0101).collect();
        assert_eq!(lanes, [0, 2, 5, 15]);
        assert_eq!(BitMask::<u16>::new(0b110).len(), 2);
    }

    #[test]
    fn allocate_from_empty_fails() {
        let mut mask = BitMask::<u32>::new(0);
        assert_eq!(mask.allocate(4), 0);
        assert_eq!(mask.bits(), 0);
    }

    #[test]
    fn allocate_from_full() {
        let mut mask = BitMask::<u32>::set_first_n(32);
        assert_eq!(mask.allocate(4), 1);
        assert_eq!(mask.bits(), u32::MAX & !0xF);
        assert_eq!(mask.allocate(4), 5);
        assert_eq!(mask.bits(), u32::MAX & !0xFF);
    }

    #[test]
    fn allocate_skips_short_runs() {
        // Free runs: [0,2) [3,6) [8,16)
        let mut mask = BitMask::<u16>::new(0b1111_1111_0011_1011);
        assert_eq!(mask.allocate(4), 9);
        assert_eq!(mask.bits(), 0b1111_0000_0011_1011);
        assert_eq!(mask.allocate(3), 4);
        assert_eq!(mask.allocate(5), 0);
        assert_eq!(mask.allocate(2), 1);
        assert_eq!(mask.bits(), 0b1111_0000_0000_0000);
    }

    #[test]
    fn allocate_run_at_top() {
        let mut mask = BitMask::<u8>::set_last_n(3);
        assert_eq!(mask.allocate(3), 6);
        assert!(mask.all_false());

        let mut mask = BitMask::<u8>::set_last_n(2);
        assert_eq!(mask.allocate(3), 0);
        assert_eq!(mask, BitMask::set_last_n(2));
    }

    #[test]
    fn allocate_single_bit() {
        let mut mask = BitMask::<u8>::new(0b0100_1000);
        assert_eq!(mask.allocate(1), 4);
        assert_eq!(mask.bits(), 0b0100_0000);
    }

    #[test]
    fn allocate_deallocate_restores_mask() {
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        for _ in 0..2000 {
            let bits: u64 = rng.random();
            let n = rng.random_range(1..=64usize);
            let mut mask = BitMask::<u64>::new(bits);
            let before = mask;
            let index = mask.allocate(n);
            if index == 0 {
                assert_eq!(mask, before);
                continue;
            }
            assert_eq!(mask.count() + n, before.count());
            mask.deallocate(index - 1, n);
            assert_eq!(mask, before);
        }
    }

    #[test]
    fn allocate_finds_lowest_run() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..2000 {
            let bits: u32 = rng.random();
            let n = rng.random_range(1..=8usize);
            let expected = (0..=(32 - n))
                .find(|&start| (start..start + n).all(|i| bits & (1 << i) != 0))
                .map_or(0, |start| start + 1);
            let mut mask = BitMask::<u32>::new(bits);
            assert_eq!(mask.allocate(n), expected, "{bits:#034b} n={n}");
        }
    }

    #[test]
    fn reallocate_grows_in_place() {
        let mut mask = BitMask::<u16>::full();
        assert_eq!(mask.allocate(2), 1);
        assert_eq!(mask.reallocate(0, 2, 6), 1);
        assert_eq!(mask.bits(), 0xFFC0);
    }

    #[test]
    fn reallocate_moves() {
        let mut mask = BitMask::<u16>::full();
        assert_eq!(mask.allocate(4), 1);
        assert_eq!(mask.allocate(2), 5);
        // [0,4) can't grow to 8 in place, the next free run starts at 6.
        assert_eq!(mask.reallocate(0, 4, 8), 7);
        assert_eq!(mask.bits(), 0b1100_0000_0000_1111 & !0b11_0000);
    }

    #[test]
    fn reallocate_failure_keeps_old_run() {
        let mut mask = BitMask::<u8>::full();
        assert_eq!(mask.allocate(4), 1);
        mask.set(6, false);
        let before = mask;
        assert_eq!(mask.reallocate(0, 4, 8), 0);
        assert_eq!(mask, before);
        assert_eq!(mask.bits(), 0b1011_0000);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn double_free_panics() {
        let mut mask = BitMask::<u8>::full();
        mask.deallocate(2, 2);
    }
}
