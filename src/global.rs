use std::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{block::ALIGNMENT, error::AllocError, heap::Heap, report::HeapReport};

/// A process-wide heap: a [`Heap`] behind one coarse lock.
///
/// The core heap is single-threaded by contract; this wrapper serializes
/// every primitive through a mutex without changing that contract, which
/// also makes it usable as the program's `#[global_allocator]`:
///
/// ```no_run
/// use regionalloc::LockedHeap;
///
/// #[global_allocator]
/// static ALLOCATOR: LockedHeap = LockedHeap::new();
/// ```
///
/// The inherent methods mirror [`Heap`] and report `NotInitialized` before
/// [`LockedHeap::init`] has run; the `GlobalAlloc` impl instead initializes
/// lazily on first use, since it has no error channel to report through.
pub struct LockedHeap {
    heap: Mutex<Option<Heap>>,
}

impl LockedHeap {
    /// Creates an uninitialized wrapper. `const`, so it can back a static.
    pub const fn new() -> Self {
        Self {
            heap: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Heap>> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initializes the inner heap. A second call is a no-op: the already
    /// initialized heap is kept.
    pub fn init(&self) -> Result<(), AllocError> {
        let mut guard = self.lock();

        if guard.is_none() {
            *guard = Some(Heap::init()?);
        }

        Ok(())
    }

    /// Allocates `size` bytes. See [`Heap::alloc`].
    pub fn alloc(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.lock()
            .as_mut()
            .ok_or(AllocError::NotInitialized)?
            .alloc(size)
    }

    /// Returns a payload to the heap. See [`Heap::free`].
    pub fn free(&self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        self.lock()
            .as_mut()
            .ok_or(AllocError::NotInitialized)?
            .free(ptr)
    }

    /// Reports the heap layout; empty when uninitialized.
    pub fn report(&self) -> HeapReport {
        match &*self.lock() {
            Some(heap) => heap.report(),
            None => HeapReport {
                regions: Vec::new(),
            },
        }
    }

    /// Writes a layout dump to standard output. Never fails: before
    /// initialization it degrades to an empty dump.
    pub fn print(&self) {
        print!("{}", self.report());
    }

    /// Tears the inner heap down and returns the wrapper to the
    /// uninitialized state.
    pub fn destroy(&self) -> Result<(), AllocError> {
        self.lock()
            .take()
            .map(Heap::destroy)
            .ok_or(AllocError::NotInitialized)
    }
}

impl Default for LockedHeap {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // Payloads are 16-byte aligned; stricter layouts are not served.
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        let mut guard = self.lock();
        let heap = match guard.as_mut() {
            Some(heap) => heap,
            None => match Heap::init() {
                Ok(heap) => guard.insert(heap),
                Err(_) => return ptr::null_mut(),
            },
        };

        match heap.alloc(layout.size()) {
            Ok(payload) => payload.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };

        if let Some(heap) = self.lock().as_mut() {
            let _ = heap.free(payload);
        }
    }
}
