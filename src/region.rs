use std::{mem, ptr, ptr::NonNull};

use crate::{
    block::{Block, BLOCK_HEADER_SIZE, payload_of},
    list::{List, Node},
};

/// Overhead of the region metadata, which is mapped separately from the
/// data area and represented as a [`Node`] of the region chain.
pub(crate) const REGION_HEADER_SIZE: usize = mem::size_of::<Node<Region>>();

/// A contiguous OS-backed memory arena.
///
/// The OS hands out mappings in page-sized chunks, and we cannot assume
/// two mappings are adjacent, so the heap is a chain of regions, each
/// subdivided into a doubly-linked list of [`Block`]:
///
/// ```text
/// +-----------------------------------------------+      +-----------------------------------------------+
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// | Region | | Block | -> | Block | -> | Block |  | ---> | Region | | Block | -> | Block | -> | Block |  |
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// +-----------------------------------------------+      +-----------------------------------------------+
/// ```
///
/// The block list is contiguous and gapless: the sum of header plus payload
/// over every block always equals the data-area size, and `free` always
/// equals the sum of the free blocks' payloads.
pub(crate) struct Region {
    /// Size of the data area in bytes.
    pub size: usize,
    /// Free-byte tally of the data area.
    pub free: usize,
    /// The mapped data area.
    pub data: NonNull<u8>,
    /// List of blocks occupying the data area.
    pub blocks: List<Block>,
}

impl Region {
    /// Whether `ptr` points inside this region's data area.
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let start = self.data.as_ptr() as usize;

        addr >= start && addr < start + self.size
    }

    /// First-fit scan of the block list: the first block that is both free
    /// and large enough. Returns `None` when no single block qualifies,
    /// which can happen under fragmentation even if the region's tally
    /// suggested there was room; the caller must treat that as this region
    /// being exhausted rather than keep walking.
    pub(crate) fn find_free_block(&self, size: usize) -> Option<NonNull<Node<Block>>> {
        let mut cursor = self.blocks.first();

        while let Some(node) = cursor {
            unsafe {
                let block = &node.as_ref().data;

                if block.is_free && block.size >= size {
                    return Some(node);
                }

                cursor = node.as_ref().next;
            }
        }

        None
    }

    /// Finds the block whose payload starts exactly at `payload`, if any.
    pub(crate) fn find_block(&self, payload: NonNull<u8>) -> Option<NonNull<Node<Block>>> {
        let mut cursor = self.blocks.first();

        while let Some(node) = cursor {
            unsafe {
                if payload_of(node) == payload {
                    return Some(node);
                }

                cursor = node.as_ref().next;
            }
        }

        None
    }

    /// Carves `node` into a front block of exactly `size` payload bytes and
    /// a new trailing free block covering the remainder. The new header
    /// consumes one header's worth of the region's free tally.
    ///
    /// SAFETY: `node` must be a free block of this region with payload
    /// capacity strictly greater than `size + BLOCK_HEADER_SIZE`, so the
    /// remainder can host its own header and a non-empty payload.
    pub(crate) unsafe fn split(&mut self, mut node: NonNull<Node<Block>>, size: usize) {
        unsafe {
            let old_size = node.as_ref().data.size;

            let rest = Block {
                size: old_size - size - BLOCK_HEADER_SIZE,
                is_free: true,
                region: node.as_ref().data.region,
            };
            let rest_addr = NonNull::new_unchecked(
                node.as_ptr().cast::<u8>().add(BLOCK_HEADER_SIZE + size),
            );

            self.blocks.insert_after(node, rest, rest_addr);

            node.as_mut().data.size = size;
        }

        self.free -= BLOCK_HEADER_SIZE;
    }

    /// Coalesces `node` with its immediate successor `next`: the absorbed
    /// header's bytes go back into the payload and into the free tally, the
    /// absorbed node is unlinked, and the resulting payload is zeroed so no
    /// stale data survives into the next allocation.
    ///
    /// SAFETY: `node` and `next` must be adjacent blocks of this region,
    /// in that order.
    pub(crate) unsafe fn merge_with_next(
        &mut self,
        mut node: NonNull<Node<Block>>,
        next: NonNull<Node<Block>>,
    ) {
        unsafe {
            let merged = node.as_ref().data.size + next.as_ref().data.size + BLOCK_HEADER_SIZE;

            self.blocks.remove(next);
            node.as_mut().data.size = merged;

            ptr::write_bytes(payload_of(node).as_ptr(), 0, merged);
        }

        self.free += BLOCK_HEADER_SIZE;
    }
}
