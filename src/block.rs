use std::{mem, ptr::NonNull};

use crate::{list::Node, region::Region, utils::align};

/// Alignment contract of the allocator: every payload address handed to a
/// caller is a multiple of this, and every requested size is rounded up to
/// the next multiple of it.
pub const ALIGNMENT: usize = 16;

/// Header size of a block, including the overhead introduced by the
/// [`Node`] links, rounded up to [`ALIGNMENT`]. Data areas start on a page
/// boundary and block sizes are multiples of [`ALIGNMENT`], so rounding the
/// header too keeps every payload address aligned.
pub(crate) const BLOCK_HEADER_SIZE: usize = align(mem::size_of::<Node<Block>>(), ALIGNMENT);

/// A single allocation unit: this header, followed by `size` payload bytes.
/// The whole thing lives inside its region's data area, wrapped in a
/// [`Node`] so that the block list spans the area without any side storage.
///
/// ```text
/// +---------------------+ <------+
/// |     next / prev     |        |
/// +---------------------+        |
/// |       region        |        | -> Header (BLOCK_HEADER_SIZE)
/// +---------------------+        |
/// |   size | is_free    |        |
/// +---------------------+ <------+
/// |       Payload       |        |
/// |         ...         |        | -> size bytes, loaned to the caller
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// The payload size and the free flag are two explicit fields rather than a
/// packed word; the flag is the only statement of whether the payload is
/// currently loaned out.
pub(crate) struct Block {
    /// Payload size in bytes.
    pub size: usize,
    /// Whether the payload is available, as opposed to loaned to a caller.
    pub is_free: bool,
    /// Region node this block belongs to. Used only to look the region up
    /// again on `free`; the region list owns the region, not the block.
    pub region: NonNull<Node<Region>>,
}

/// Payload address of a block: its header address plus the header size.
/// This is the only place the header-to-payload offset is applied.
///
/// SAFETY: `node` must point to a block header inside a mapped data area.
#[inline]
pub(crate) unsafe fn payload_of(node: NonNull<Node<Block>>) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(node.as_ptr().cast::<u8>().add(BLOCK_HEADER_SIZE)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_covers_the_node_and_stays_aligned() {
        assert!(BLOCK_HEADER_SIZE >= mem::size_of::<Node<Block>>());
        assert_eq!(BLOCK_HEADER_SIZE % ALIGNMENT, 0);
    }
}
