//! Drives the four primitives in sequence: two allocations, a dump after
//! every step, both frees, then teardown.

use std::{ptr, slice, str};

use regionalloc::Heap;

fn write_message(addr: std::ptr::NonNull<u8>, message: &str) {
    unsafe {
        ptr::copy_nonoverlapping(message.as_ptr(), addr.as_ptr(), message.len());

        let written = slice::from_raw_parts(addr.as_ptr(), message.len());
        println!("{addr:p}: {}", str::from_utf8(written).unwrap());
    }
}

fn main() {
    pretty_env_logger::init();

    let mut heap = Heap::init().expect("failed to map the initial region");

    let a = heap.alloc(30).expect("allocation failed");
    println!("\n- allocated 30 bytes ------------------\n");
    heap.print();
    write_message(a, "Hello world from the allocator.");

    let b = heap.alloc(30).expect("allocation failed");
    println!("\n- allocated 30 bytes ------------------\n");
    heap.print();
    write_message(b, "Hello again from the allocator.");

    heap.free(a).expect("invalid pointer");
    println!("\n- freed 30 bytes ----------------------\n");
    heap.print();

    heap.free(b).expect("invalid pointer");
    println!("\n- freed 30 bytes ----------------------\n");
    heap.print();

    heap.destroy();
}
