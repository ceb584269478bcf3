//! Installs the locked heap as the program's global allocator and lets the
//! standard library allocate through it.
//!
//! No logger here: a logger would allocate through the very heap it is
//! logging about.

use regionalloc::LockedHeap;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::new();

fn main() {
    // Box example
    let val_box = Box::new(22);
    println!("Box value: {}, at: {:p}", val_box, val_box);

    // Vec example
    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
        println!("Added {}; capacity: {}; at: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("Heap testing");
    println!("String '{}' - at: {:p}", msg, msg.as_ptr());

    let p1 = Box::new(2.22);
    println!("P1 allocated at: {p1:p}");
    drop(p1);

    let p2 = Box::new(2.22);
    println!("P2 at: {p2:p}");

    // Coalescing example: two adjacent 64-byte boxes freed back to back
    // should leave room for a single 128-byte one in their place.
    let a = Box::new([0u8; 64]);
    let b = Box::new([0u8; 64]);
    let ptr_a = a.as_ptr();

    drop(a);
    drop(b);

    let c = Box::new([0u8; 128]);
    let ptr_c = c.as_ptr();

    if ptr_a == ptr_c {
        println!("Correctly reused at {ptr_c:p}");
    } else {
        println!("Not reused: A was at {ptr_a:p} and C is at {ptr_c:p}");
    }

    ALLOCATOR.print();
}
