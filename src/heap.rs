use std::{cmp, ptr::NonNull};

use log::{debug, info, trace};

use crate::{
    block::{payload_of, ALIGNMENT, Block, BLOCK_HEADER_SIZE},
    error::AllocError,
    list::{List, Node},
    os,
    region::{Region, REGION_HEADER_SIZE},
    utils::align,
};

/// Requests at or above this are refused outright, before any size
/// arithmetic can overflow.
const MAX_REQUEST: usize = isize::MAX as usize / 4;

/// A heap: a chain of OS-mapped regions, each subdivided into blocks.
///
/// The handle owns every mapping it has requested; dropping it (or calling
/// [`Heap::destroy`]) returns them all to the operating system. Multiple
/// independent heaps can coexist in one process.
///
/// A `Heap` is single-threaded: it takes `&mut self` for every mutation and
/// carries no internal locking. For a process-wide, locked instance see
/// [`LockedHeap`](crate::LockedHeap).
pub struct Heap {
    pub(crate) regions: List<Region>,
    pub(crate) page_size: usize,
}

// A heap owns its mappings exclusively; nothing in it refers to the thread
// that created it.
unsafe impl Send for Heap {}

impl Heap {
    /// Creates a heap backed by a single region of one OS page.
    pub fn init() -> Result<Self, AllocError> {
        let page_size = os::page_size();

        let mut heap = Self {
            regions: List::new(),
            page_size,
        };
        heap.create_region(page_size)?;

        info!("heap initialized with one {page_size}-byte region");

        Ok(heap)
    }

    /// Page size this heap was initialized with.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Allocates `size` bytes and returns the payload address.
    ///
    /// The size is rounded up to the next multiple of [`ALIGNMENT`] and the
    /// returned address is aligned to it. Regions are tried first-fit in
    /// chain order; within a region, blocks are tried first-fit in list
    /// order. When no region can serve the request a new one is mapped, and
    /// `OutOfMemory` is returned only if the OS refuses that mapping too.
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size >= MAX_REQUEST {
            return Err(AllocError::OutOfMemory);
        }
        let size = cmp::max(align(size, ALIGNMENT), ALIGNMENT);

        let mut cursor = self.regions.first();
        while let Some(rnode) = cursor {
            unsafe {
                cursor = rnode.as_ref().next;
                let region = &rnode.as_ref().data;

                if region.free >= size + BLOCK_HEADER_SIZE {
                    if let Some(bnode) = region.find_free_block(size) {
                        return Ok(self.commit(rnode, bnode, size));
                    }

                    // The tally had room but no single block did: the
                    // region is fragmented, move on to the next one.
                    trace!("region {rnode:p} too fragmented for {size} bytes, skipping");
                }
            }
        }

        let area_size = cmp::max(size * 2, self.page_size);
        let rnode = self.create_region(area_size)?;
        debug!("grew heap with a {area_size}-byte region for a {size}-byte request");

        let bnode = unsafe { rnode.as_ref().data.find_free_block(size) }
            .ok_or(AllocError::OutOfMemory)?;

        Ok(unsafe { self.commit(rnode, bnode, size) })
    }

    /// Returns a payload previously obtained from [`Heap::alloc`].
    ///
    /// The owning region is located by containment, the block by its exact
    /// payload address; anything else is reported as `InvalidFree`, as is a
    /// block that is already free. Adjacent free neighbors are coalesced in
    /// both directions, so no two adjacent blocks are ever left free.
    pub fn free(&mut self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        let mut rnode = self.region_of(ptr).ok_or(AllocError::InvalidFree)?;

        unsafe {
            let region = &mut rnode.as_mut().data;
            let mut node = region.find_block(ptr).ok_or(AllocError::InvalidFree)?;

            if node.as_ref().data.is_free || node.as_ref().data.region != rnode {
                return Err(AllocError::InvalidFree);
            }

            trace!("freeing {} bytes at {ptr:p}", node.as_ref().data.size);

            region.free += node.as_ref().data.size;

            while let Some(next) = node.as_ref().next {
                if !next.as_ref().data.is_free {
                    break;
                }
                region.merge_with_next(node, next);
            }

            while let Some(prev) = node.as_ref().prev {
                if !prev.as_ref().data.is_free {
                    break;
                }
                region.merge_with_next(prev, node);
                node = prev;
            }

            node.as_mut().data.is_free = true;
        }

        Ok(())
    }

    /// Tears the heap down, returning every mapping to the operating
    /// system. Equivalent to dropping the handle; taking `self` by value
    /// makes use-after-destroy unrepresentable.
    pub fn destroy(self) {}

    /// Maps a region of `area_size` data bytes plus its metadata node,
    /// appends it to the chain and writes the single free block spanning
    /// the whole data area.
    fn create_region(&mut self, area_size: usize) -> Result<NonNull<Node<Region>>, AllocError> {
        unsafe {
            let meta = os::request_memory(REGION_HEADER_SIZE).ok_or(AllocError::OutOfMemory)?;

            let data = match os::request_memory(area_size) {
                Some(data) => data,
                None => {
                    os::return_memory(meta.as_ptr(), REGION_HEADER_SIZE);
                    return Err(AllocError::OutOfMemory);
                }
            };

            let mut rnode = self.regions.append(
                Region {
                    size: area_size,
                    free: area_size - BLOCK_HEADER_SIZE,
                    data,
                    blocks: List::new(),
                },
                meta,
            );

            let first = Block {
                size: area_size - BLOCK_HEADER_SIZE,
                is_free: true,
                region: rnode,
            };
            rnode.as_mut().data.blocks.append(first, data);

            debug!("mapped region {rnode:p} with a {area_size}-byte data area");

            Ok(rnode)
        }
    }

    /// Hands `bnode` out for a `size`-byte request: splits off the unused
    /// remainder when it can host a block of its own, clears the free flag
    /// and deducts the granted payload from the region's tally.
    ///
    /// SAFETY: `bnode` must be a free block of `rnode`'s region with
    /// payload capacity of at least `size`.
    unsafe fn commit(
        &mut self,
        rnode: NonNull<Node<Region>>,
        mut bnode: NonNull<Node<Block>>,
        size: usize,
    ) -> NonNull<u8> {
        unsafe {
            let region = &mut (*rnode.as_ptr()).data;

            if bnode.as_ref().data.size > size + BLOCK_HEADER_SIZE {
                region.split(bnode, size);
            }

            let block = &mut bnode.as_mut().data;
            block.is_free = false;
            block.region = rnode;

            // A remainder too small to host its own header is absorbed
            // into the granted block, so deduct the actual payload size.
            region.free -= block.size;

            payload_of(bnode)
        }
    }

    /// Finds the region whose data area contains `ptr`.
    fn region_of(&self, ptr: NonNull<u8>) -> Option<NonNull<Node<Region>>> {
        let mut cursor = self.regions.first();

        while let Some(rnode) = cursor {
            unsafe {
                if rnode.as_ref().data.contains(ptr) {
                    return Some(rnode);
                }

                cursor = rnode.as_ref().next;
            }
        }

        None
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let mut cursor = self.regions.first();

        while let Some(rnode) = cursor {
            unsafe {
                // Read the link before unmapping the node that holds it.
                cursor = rnode.as_ref().next;

                let (data, size) = {
                    let region = &rnode.as_ref().data;
                    (region.data.as_ptr(), region.size)
                };

                os::return_memory(data, size);
                os::return_memory(rnode.as_ptr().cast(), REGION_HEADER_SIZE);
            }
        }

        self.regions = List::new();

        info!("heap destroyed, all regions returned to the OS");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(heap: &Heap) -> usize {
        heap.report().regions[0].tracked_free
    }

    fn assert_conserved(heap: &Heap) {
        for region in &heap.report().regions {
            assert_eq!(region.computed_size, region.size);
            assert_eq!(region.computed_free, region.tracked_free);
        }
    }

    fn assert_no_adjacent_free(heap: &Heap) {
        for region in &heap.report().regions {
            for pair in region.blocks.windows(2) {
                assert!(!(pair[0].is_free && pair[1].is_free));
            }
        }
    }

    #[test]
    fn init_creates_one_page_region() {
        let heap = Heap::init().unwrap();
        let report = heap.report();

        assert_eq!(report.regions.len(), 1);
        assert_eq!(report.regions[0].size, heap.page_size());
        assert_eq!(tally(&heap), heap.page_size() - BLOCK_HEADER_SIZE);
        assert_eq!(report.regions[0].blocks.len(), 1);
        assert!(report.regions[0].blocks[0].is_free);
        assert_conserved(&heap);
    }

    #[test]
    fn payloads_are_aligned() {
        let mut heap = Heap::init().unwrap();

        for size in [1, 13, 16, 30, 100, 255] {
            let ptr = heap.alloc(size).unwrap();
            assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
        }

        assert_conserved(&heap);
    }

    #[test]
    fn two_small_allocations_split_the_page() {
        let mut heap = Heap::init().unwrap();
        let page = heap.page_size();

        let a = heap.alloc(30).unwrap();
        assert_eq!(tally(&heap), page - 2 * BLOCK_HEADER_SIZE - 32);

        let b = heap.alloc(30).unwrap();
        assert_eq!(tally(&heap), page - 3 * BLOCK_HEADER_SIZE - 64);
        assert_conserved(&heap);

        heap.free(a).unwrap();
        heap.free(b).unwrap();
        assert_eq!(tally(&heap), page - BLOCK_HEADER_SIZE);
        assert_conserved(&heap);
    }

    #[test]
    fn freeing_in_reverse_order_restores_the_tally_too() {
        let mut heap = Heap::init().unwrap();
        let page = heap.page_size();

        let a = heap.alloc(30).unwrap();
        let b = heap.alloc(30).unwrap();

        heap.free(b).unwrap();
        heap.free(a).unwrap();

        assert_eq!(tally(&heap), page - BLOCK_HEADER_SIZE);
        assert_conserved(&heap);
    }

    #[test]
    fn alloc_then_free_round_trips_the_tally() {
        let mut heap = Heap::init().unwrap();
        let before = tally(&heap);

        let ptr = heap.alloc(100).unwrap();
        assert!(tally(&heap) < before);

        heap.free(ptr).unwrap();
        assert_eq!(tally(&heap), before);
        assert_conserved(&heap);
    }

    #[test]
    fn adjacent_frees_coalesce_into_one_block() {
        let mut heap = Heap::init().unwrap();
        let before = tally(&heap);

        let a = heap.alloc(64).unwrap();
        let b = heap.alloc(64).unwrap();

        heap.free(a).unwrap();
        heap.free(b).unwrap();

        let report = heap.report();
        assert_eq!(report.regions[0].blocks.len(), 1);
        assert!(report.regions[0].blocks[0].is_free);
        assert_eq!(tally(&heap), before);
    }

    #[test]
    fn no_two_adjacent_blocks_stay_free() {
        let mut heap = Heap::init().unwrap();

        let a = heap.alloc(32).unwrap();
        let b = heap.alloc(32).unwrap();
        let c = heap.alloc(32).unwrap();
        let d = heap.alloc(32).unwrap();

        heap.free(b).unwrap();
        assert_no_adjacent_free(&heap);

        heap.free(d).unwrap();
        assert_no_adjacent_free(&heap);

        heap.free(c).unwrap();
        assert_no_adjacent_free(&heap);

        heap.free(a).unwrap();
        assert_no_adjacent_free(&heap);
        assert_conserved(&heap);
    }

    #[test]
    fn oversized_request_grows_the_chain_once() {
        let mut heap = Heap::init().unwrap();
        let big = heap.page_size() * 2;

        let ptr = heap.alloc(big).unwrap();
        let report = heap.report();
        assert_eq!(report.regions.len(), 2);
        assert!(report.regions[1].size >= big);

        // A smaller request fits the first region, no further growth.
        let small = heap.alloc(16).unwrap();
        assert_eq!(heap.report().regions.len(), 2);

        heap.free(ptr).unwrap();
        heap.free(small).unwrap();
        assert_conserved(&heap);
    }

    #[test]
    fn fragmented_region_is_skipped_in_favor_of_growth() {
        let mut heap = Heap::init().unwrap();
        let quarter = heap.page_size() / 4;

        let a = heap.alloc(quarter).unwrap();
        let _b = heap.alloc(16).unwrap();
        let c = heap.alloc(quarter).unwrap();
        let _d = heap.alloc(16).unwrap();
        let _e = heap.alloc(quarter).unwrap();

        // Two non-adjacent holes: plenty of aggregate free bytes, but no
        // single block can take half a page.
        heap.free(a).unwrap();
        heap.free(c).unwrap();

        let half = heap.page_size() / 2;
        assert!(tally(&heap) >= half + BLOCK_HEADER_SIZE);

        let big = heap.alloc(half).unwrap();
        let report = heap.report();
        assert_eq!(report.regions.len(), 2);
        assert!(report.regions[1].contains_addr(big.as_ptr() as usize));
        assert_conserved(&heap);
    }

    #[test]
    fn double_free_is_reported() {
        let mut heap = Heap::init().unwrap();

        let ptr = heap.alloc(64).unwrap();
        heap.free(ptr).unwrap();

        assert_eq!(heap.free(ptr), Err(AllocError::InvalidFree));
    }

    #[test]
    fn foreign_pointer_is_reported() {
        let mut heap = Heap::init().unwrap();

        let mut local = 0u8;
        let foreign = NonNull::from(&mut local);
        assert_eq!(heap.free(foreign), Err(AllocError::InvalidFree));
    }

    #[test]
    fn mid_payload_pointer_is_reported() {
        let mut heap = Heap::init().unwrap();

        let ptr = heap.alloc(64).unwrap();
        let inside = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(8)) };

        assert_eq!(heap.free(inside), Err(AllocError::InvalidFree));
        heap.free(ptr).unwrap();
    }

    #[test]
    fn merged_payloads_read_back_zeroed() {
        let mut heap = Heap::init().unwrap();

        let ptr = heap.alloc(64).unwrap();
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0xAA, 64);
        }
        heap.free(ptr).unwrap();

        // First fit hands the front of the coalesced block back out.
        let again = heap.alloc(64).unwrap();
        assert_eq!(again, ptr);

        let payload = unsafe { std::slice::from_raw_parts(again.as_ptr(), 64) };
        assert!(payload.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn zero_sized_request_gets_a_minimal_block() {
        let mut heap = Heap::init().unwrap();
        let before = tally(&heap);

        let ptr = heap.alloc(0).unwrap();
        assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
        assert_eq!(tally(&heap), before - BLOCK_HEADER_SIZE - ALIGNMENT);

        heap.free(ptr).unwrap();
        assert_eq!(tally(&heap), before);
    }

    #[test]
    fn absurd_request_is_out_of_memory() {
        let mut heap = Heap::init().unwrap();

        assert_eq!(heap.alloc(usize::MAX), Err(AllocError::OutOfMemory));
        assert_eq!(heap.alloc(MAX_REQUEST), Err(AllocError::OutOfMemory));
    }

    #[test]
    fn destroy_consumes_the_heap() {
        let mut heap = Heap::init().unwrap();

        let ptr = heap.alloc(32).unwrap();
        heap.free(ptr).unwrap();

        heap.destroy();
    }

    #[test]
    fn conservation_holds_across_a_mixed_workload() {
        let mut heap = Heap::init().unwrap();
        let mut live = Vec::new();

        for size in [24, 80, 16, 200, 48, 1000, 32] {
            live.push(heap.alloc(size).unwrap());
            assert_conserved(&heap);
        }

        for ptr in live.drain(..).rev() {
            heap.free(ptr).unwrap();
            assert_conserved(&heap);
            assert_no_adjacent_free(&heap);
        }

        assert_eq!(tally(&heap), heap.page_size() - BLOCK_HEADER_SIZE);
    }
}
