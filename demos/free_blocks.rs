//! A 64-block arena that hands out contiguous runs of blocks, with a single
//! `BitMask<u64>` as its free list.

use swiss_ctrl::BitMask;

const BLOCK_SIZE: usize = 64;

struct Arena {
    free: BitMask<u64>,
}

impl Arena {
    fn new() -> Self {
        Self {
            free: BitMask::full(),
        }
    }

    fn alloc(&mut self, bytes: usize) -> Option<(usize, usize)> {
        let blocks = bytes.div_ceil(BLOCK_SIZE).max(1);
        match self.free.allocate(blocks) {
            0 => None,
            start => Some((start - 1, blocks)),
        }
    }

    fn grow(&mut self, (start, blocks): (usize, usize), bytes: usize) -> Option<(usize, usize)> {
        let new_blocks = bytes.div_ceil(BLOCK_SIZE).max(1);
        match self.free.reallocate(start, blocks, new_blocks) {
            0 => None,
            new_start => Some((new_start - 1, new_blocks)),
        }
    }

    fn release(&mut self, (start, blocks): (usize, usize)) {
        self.free.deallocate(start, blocks);
    }
}

fn main() {
    let mut arena = Arena::new();

    let a = arena.alloc(200).unwrap();
    let b = arena.alloc(64).unwrap();
    let c = arena.alloc(1000).unwrap();
    println!("a = {a:?}, b = {b:?}, c = {c:?}");
    println!("free: {:?} ({} blocks)", arena.free, arena.free.count());

    arena.release(b);
    let a = arena.grow(a, 300).unwrap();
    println!("a grown in place to {a:?}");

    let c = match arena.grow(c, 4000) {
        Some(moved) => moved,
        None => {
            println!("c could not grow to 4000 bytes, kept at {c:?}");
            c
        }
    };

    match arena.alloc(64 * 40) {
        Some(big) => println!("big = {big:?}"),
        None => println!("no run of 40 free blocks left"),
    }

    arena.release(a);
    arena.release(c);
    println!("free: {:?} ({} blocks)", arena.free, arena.free.count());
}
