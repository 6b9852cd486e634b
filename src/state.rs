use core::fmt::Debug;

/// Number of control bytes scanned as one unit.
///
/// Matches the SSE2 register width. A lot of the table arithmetic (mirror
/// length, aligned group bases, `num_states`) assumes this is 16.
pub const GROUP_SIZE: usize = 16;

/// Number of leading control bytes duplicated after the last slot.
pub(crate) const NUM_MIRRORED: usize = GROUP_SIZE - 1;

/// A single control byte.
///
/// Non-negative bytes mark a filled slot and carry a 7-bit tag derived from
/// the element's hash. The three special states all have the sign bit set, so
/// a single `movemask` over a group separates "occupied" from "not occupied".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct State(i8);

impl State {
    /// Slot has not held an element since the last reset.
    pub const EMPTY: State = State(-128);
    /// Slot held an element that was removed, and a probe sequence may still
    /// pass through it.
    pub const DELETED: State = State(-2);
    /// Terminator placed once at the very end of the control array.
    pub const SENTINEL: State = State(-1);

    /// Builds a filled state from the low 7 bits of `tag`.
    #[inline(always)]
    pub const fn filled(tag: u8) -> State {
        State((tag & 0x7F) as i8)
    }

    /// Builds a filled state from the top 7 bits of a 64-bit hash.
    #[inline(always)]
    pub const fn from_hash(hash: u64) -> State {
        State((hash >> 57) as i8)
    }

    /// Reinterprets a raw control byte.
    #[inline(always)]
    pub const fn from_byte(byte: u8) -> State {
        State(byte as i8)
    }

    /// Raw byte as stored in the control array.
    #[inline(always)]
    pub const fn as_byte(self) -> u8 {
        self.0 as u8
    }

    /// Signed view of the control byte.
    #[inline(always)]
    pub const fn as_i8(self) -> i8 {
        self.0
    }

    /// `true` if the slot holds a live element.
    #[inline(always)]
    pub const fn is_filled(self) -> bool {
        self.0 >= 0
    }

    /// `true` for [`State::EMPTY`].
    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == Self::EMPTY.0
    }

    /// `true` for [`State::DELETED`].
    #[inline(always)]
    pub const fn is_deleted(self) -> bool {
        self.0 == Self::DELETED.0
    }

    /// `true` for [`State::SENTINEL`].
    #[inline(always)]
    pub const fn is_sentinel(self) -> bool {
        self.0 == Self::SENTINEL.0
    }

    /// `true` for empty and deleted slots, the ones an insert may claim.
    #[inline(always)]
    pub const fn is_empty_or_deleted(self) -> bool {
        self.0 < Self::SENTINEL.0
    }

    /// Classifies the byte.
    pub const fn kind(self) -> StateKind {
        match self.0 {
            -128 => StateKind::Empty,
            -2 => StateKind::Deleted,
            -1 => StateKind::Sentinel,
            tag if tag >= 0 => StateKind::Filled(tag as u8),
            // Other negative bytes are never written by this crate. Treat them
            // as deleted so scans keep probing past them.
            _ => StateKind::Deleted,
        }
    }
}

impl Debug for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            StateKind::Empty => f.write_str("Empty"),
            StateKind::Deleted => f.write_str("Deleted"),
            StateKind::Sentinel => f.write_str("Sentinel"),
            StateKind::Filled(tag) => write!(f, "Filled({tag:#04x})"),
        }
    }
}

impl From<State> for StateKind {
    #[inline(always)]
    fn from(state: State) -> Self {
        state.kind()
    }
}

/// Closed classification of a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// See [`State::EMPTY`].
    Empty,
    /// See [`State::DELETED`].
    Deleted,
    /// See [`State::SENTINEL`].
    Sentinel,
    /// Filled slot with its 7-bit tag.
    Filled(u8),
}

const _: () = {
    // Every special state has the sign bit set, and filled tags never do.
    assert!(State::EMPTY.0 & State::DELETED.0 & State::SENTINEL.0 & (0x80u8 as i8) != 0);
    assert!(State::filled(0xFF).0 >= 0);
    assert!(State::from_hash(u64::MAX).0 >= 0);
    // `match_empty_or_deleted` is a single signed compare against SENTINEL.
    assert!(State::EMPTY.0 < State::SENTINEL.0);
    assert!(State::DELETED.0 < State::SENTINEL.0);
    // EMPTY is the only special state with the low bits clear.
    assert!(State::EMPTY.0 & !State::DELETED.0 & 0x7F == 0);
    assert!(State::EMPTY.0 != State::DELETED.0 && State::DELETED.0 != State::SENTINEL.0);
    assert!(GROUP_SIZE.is_power_of_two());
};
