use std::{fmt, ptr};

use crate::{block::BLOCK_HEADER_SIZE, heap::Heap};

/// Layout of a single block as seen by a read-only traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReport {
    /// Address of the block header inside the region's data area.
    pub addr: usize,
    /// Payload size in bytes.
    pub payload_size: usize,
    /// Header size in bytes.
    pub header_size: usize,
    /// Whether the payload is currently free.
    pub is_free: bool,
}

/// Layout of a single region: its block list plus both the maintained
/// counters and the totals recomputed from the traversal, so the two can be
/// checked against each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionReport {
    /// Address of the region's metadata mapping.
    pub addr: usize,
    /// Address of the region's data area.
    pub data_addr: usize,
    /// Declared size of the data area in bytes.
    pub size: usize,
    /// The region's maintained free-byte tally.
    pub tracked_free: usize,
    /// Sum of header plus payload over every block in the list.
    pub computed_size: usize,
    /// Sum of the free blocks' payload sizes.
    pub computed_free: usize,
    /// Every block of the region, in list order.
    pub blocks: Vec<BlockReport>,
}

impl RegionReport {
    /// Whether `addr` falls inside this region's data area.
    pub fn contains_addr(&self, addr: usize) -> bool {
        addr >= self.data_addr && addr < self.data_addr + self.size
    }
}

/// Layout of the whole heap, region by region in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapReport {
    pub regions: Vec<RegionReport>,
}

impl Heap {
    /// Walks every region and block and reports their layout. Purely
    /// diagnostic: the traversal reads the lists and mutates nothing.
    pub fn report(&self) -> HeapReport {
        let mut regions = Vec::new();

        for rnode in &self.regions {
            let region = &rnode.data;
            let mut blocks = Vec::new();
            let mut computed_size = 0;
            let mut computed_free = 0;

            for bnode in &region.blocks {
                let block = &bnode.data;

                computed_size += BLOCK_HEADER_SIZE + block.size;
                if block.is_free {
                    computed_free += block.size;
                }

                blocks.push(BlockReport {
                    addr: ptr::from_ref(bnode) as usize,
                    payload_size: block.size,
                    header_size: BLOCK_HEADER_SIZE,
                    is_free: block.is_free,
                });
            }

            regions.push(RegionReport {
                addr: ptr::from_ref(rnode) as usize,
                data_addr: region.data.as_ptr() as usize,
                size: region.size,
                tracked_free: region.free,
                computed_size,
                computed_free,
                blocks,
            });
        }

        HeapReport { regions }
    }

    /// Writes a human-readable layout dump to standard output.
    pub fn print(&self) {
        print!("{}", self.report());
    }
}

impl fmt::Display for HeapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.regions.is_empty() {
            return writeln!(f, "heap: no regions mapped");
        }

        for (index, region) in self.regions.iter().enumerate() {
            writeln!(f, "region {index} @ {:#x}:", region.addr)?;
            write!(f, "{region}")?;
        }

        Ok(())
    }
}

impl fmt::Display for RegionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            writeln!(
                f,
                "  block @ {:#x}: payload {} ({:#x}), header {} ({:#x}), {}",
                block.addr,
                block.payload_size,
                block.payload_size,
                block.header_size,
                block.header_size,
                if block.is_free { "free" } else { "allocated" },
            )?;
        }

        writeln!(
            f,
            "  size: {} declared | {} computed",
            self.size, self.computed_size,
        )?;
        writeln!(
            f,
            "  free: {} tracked | {} computed",
            self.tracked_free, self.computed_free,
        )
    }
}
