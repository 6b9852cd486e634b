/// Errors reported when allocating control-byte storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested capacity does not fit in the address space
    CapacityOverflow,

    /// The allocator returned null for a block of `size` bytes aligned to
    /// `align`
    AllocFailed {
        /// Requested size in bytes
        size: usize,
        /// Requested alignment in bytes
        align: usize,
    },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SwissCtrlError: {self:?}")
    }
}

impl core::error::Error for Error {}

/// Allocation result
pub type Result<T> = core::result::Result<T, Error>;
