use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::alloc::LayoutError;

/// Errors applicable to allocating and growing table storage.
///
/// Every fallible operation leaves the table exactly as it was before the
/// call when it returns one of these.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The storage for the requested capacity does not fit in `isize::MAX`
    /// bytes.
    #[error("requested capacity overflows the addressable storage size")]
    CapacityOverflow,

    /// The global allocator returned null for the table storage.
    #[error("failed to allocate table storage ({layout:?})")]
    AllocFailed {
        /// Layout of the allocation that failed.
        layout: Layout,
    },
}

impl From<LayoutError> for Error {
    fn from(_: LayoutError) -> Self {
        Error::CapacityOverflow
    }
}

/// Resolve a storage result for infallible constructors, diverting
/// allocation failure to the global allocation error handler.
pub(crate) fn or_alloc_error<T>(result: Result<T, Error>) -> T {
    match result {
        Ok(value) => value,
        Err(Error::AllocFailed { layout }) => handle_alloc_error(layout),
        Err(Error::CapacityOverflow) => panic!("capacity overflow"),
    }
}
