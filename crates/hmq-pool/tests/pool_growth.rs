// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Growth-path integration tests
//!
//! Fresh pools, class-table extension, slab doubling under pressure, and
//! the classifier boundary behaviors.

use std::collections::HashSet;
use std::ptr::NonNull;

use hmq_pool::{
    cell_size, class_of, GlobalPool, MsgHeader, BASE_CELL_SIZE, INITIAL_SLAB_BYTES,
};

fn release(pool: &GlobalPool, cell: NonNull<u8>, len: usize) {
    unsafe {
        MsgHeader::write_into(cell, len);
        pool.deallocate(cell.as_ptr());
    }
}

#[test]
fn fresh_pool_serves_a_thousand_cells_from_one_class() {
    let pool = GlobalPool::new(64).expect("pool construction should succeed");
    let carved = INITIAL_SLAB_BYTES / BASE_CELL_SIZE;

    let mut seen = HashSet::new();
    let held: Vec<_> = (0..1000)
        .map(|_| {
            let cell = pool.allocate(32).expect("allocation should succeed");
            assert!(seen.insert(cell.as_ptr() as usize), "cell handed out twice");
            cell
        })
        .collect();

    let stats = pool.stats();
    assert_eq!(stats.classes.len(), 1);
    for cell in &held {
        assert_eq!(stats.class_containing(cell.as_ptr()), Some(0));
        assert_eq!(cell.as_ptr() as usize % BASE_CELL_SIZE, 0);
    }

    for cell in held {
        release(&pool, cell, 32);
    }

    // A second wave reuses the same slab: no growth beyond the initial carve.
    let held: Vec<_> = (0..1000)
        .map(|_| pool.allocate(32).expect("allocation should succeed"))
        .collect();
    assert_eq!(pool.stats().classes[0].carved_cells, carved);
    assert_eq!(pool.stats().classes[0].slab_spans.len(), 1);

    for cell in held {
        release(&pool, cell, 32);
    }
}

#[test]
fn large_request_extends_the_class_table() {
    let pool = GlobalPool::new(64).expect("pool construction should succeed");

    let small = pool.allocate(32).expect("allocation should succeed");
    let large = pool.allocate(4096).expect("allocation should succeed");
    assert_ne!(small, large);

    let stats = pool.stats();
    assert_eq!(stats.classes.len(), class_of(4096) + 1);
    assert_eq!(stats.class_containing(small.as_ptr()), Some(0));
    assert_eq!(stats.class_containing(large.as_ptr()), Some(class_of(4096)));

    // The two cells live in different classes' slabs, which never overlap.
    let small_addr = small.as_ptr() as usize;
    let (large_base, large_bytes) = stats.classes[class_of(4096)].slab_spans[0];
    assert!(small_addr < large_base || small_addr >= large_base + large_bytes);

    release(&pool, small, 32);
    release(&pool, large, 4096);
}

#[test]
fn exhausting_the_initial_slab_doubles_the_class() {
    let pool = GlobalPool::new(64).expect("pool construction should succeed");
    let carved = INITIAL_SLAB_BYTES / BASE_CELL_SIZE;

    let mut seen = HashSet::new();
    let held: Vec<_> = (0..carved + 1)
        .map(|_| {
            let cell = pool.allocate(64).expect("allocation should succeed");
            assert!(seen.insert(cell.as_ptr() as usize), "cell handed out twice");
            cell
        })
        .collect();

    let stats = pool.stats();
    assert_eq!(stats.classes[0].carved_cells, carved * 2);
    assert_eq!(stats.classes[0].slab_spans.len(), 2);

    // Slabs are disjoint and every held cell lies in exactly one of them.
    let (base_a, bytes_a) = stats.classes[0].slab_spans[0];
    let (base_b, bytes_b) = stats.classes[0].slab_spans[1];
    assert!(base_a + bytes_a <= base_b || base_b + bytes_b <= base_a);
    for cell in &held {
        let addr = cell.as_ptr() as usize;
        let in_a = addr >= base_a && addr < base_a + bytes_a;
        let in_b = addr >= base_b && addr < base_b + bytes_b;
        assert!(in_a ^ in_b);
    }

    for cell in held {
        release(&pool, cell, 64);
    }
}

#[test]
fn classifier_boundaries_route_to_adjacent_classes() {
    let pool = GlobalPool::new(64).expect("pool construction should succeed");

    assert!(pool.allocate(0).is_none());

    let one = pool.allocate(1).expect("allocation should succeed");
    assert_eq!(pool.stats().class_containing(one.as_ptr()), Some(0));
    release(&pool, one, 1);

    for class in 1..4 {
        let exact = pool.allocate(cell_size(class)).expect("allocation should succeed");
        let over = pool.allocate(cell_size(class) + 1).expect("allocation should succeed");

        let stats = pool.stats();
        assert_eq!(stats.class_containing(exact.as_ptr()), Some(class));
        assert_eq!(stats.class_containing(over.as_ptr()), Some(class + 1));

        // Cells are aligned to their class's cell size.
        assert_eq!(exact.as_ptr() as usize % cell_size(class), 0);
        assert_eq!(over.as_ptr() as usize % cell_size(class + 1), 0);

        release(&pool, exact, cell_size(class));
        release(&pool, over, cell_size(class) + 1);
    }
}

#[test]
fn steady_state_round_trips_do_not_grow_the_pool() {
    let pool = GlobalPool::new(64).expect("pool construction should succeed");
    let seeded = pool.size();
    let carved = pool.stats().classes[0].carved_cells;

    for _ in 0..10_000 {
        let cell = pool.allocate(48).expect("allocation should succeed");
        release(&pool, cell, 48);
    }

    assert_eq!(pool.size(), seeded);
    assert_eq!(pool.stats().classes[0].carved_cells, carved);
}
