//! Forces the heap to grow: a request larger than the initial page maps a
//! second region, while later small requests keep landing in the first.

use regionalloc::Heap;

fn main() {
    pretty_env_logger::init();

    let mut heap = Heap::init().expect("failed to map the initial region");

    let small = heap.alloc(64).expect("allocation failed");

    let oversized = heap.page_size() * 2;
    let big = heap.alloc(oversized).expect("allocation failed");
    println!("\n- allocated {oversized} bytes, chain grew ----\n");
    heap.print();

    // Still room in the first region, so no third mapping appears.
    let other = heap.alloc(64).expect("allocation failed");
    println!("\n- allocated 64 more bytes -------------\n");
    heap.print();

    heap.free(small).expect("invalid pointer");
    heap.free(big).expect("invalid pointer");
    heap.free(other).expect("invalid pointer");
    println!("\n- freed everything --------------------\n");
    heap.print();

    heap.destroy();
}
