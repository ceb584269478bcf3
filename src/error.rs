use thiserror::Error;

/// Errors reported by the allocator.
///
/// Every fallible operation surfaces its failure as a value; the allocator
/// never hands back a usable-looking pointer into memory it does not own.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The operating system denied a mapping request, or no block could
    /// satisfy the request even after growing the region chain.
    #[error("out of memory: no region or block can satisfy the request")]
    OutOfMemory,

    /// The pointer handed to `free` is not an allocation of this heap, or
    /// the block it names was already freed.
    #[error("invalid free: pointer is not a live allocation of this heap")]
    InvalidFree,

    /// An operation other than initialization was invoked on an
    /// uninitialized process-wide heap.
    #[error("heap is not initialized")]
    NotInitialized,
}
