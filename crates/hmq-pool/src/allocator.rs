// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Allocator seam between the message layer and its cell supplier.
//!
//! The runtime talks to whichever [`MsgAllocator`] it was configured with:
//! the pooling [`GlobalPool`] for throughput, or [`HeapAllocator`] when
//! per-message heap traffic is acceptable (tooling, tests, low-rate
//! control sockets). Both honor the same [`MsgHeader`] contract.

use std::alloc::{alloc, dealloc, Layout};
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::header::MsgHeader;
use crate::pool::{GlobalPool, TAG_DEAD, TAG_LIVE};

/// Supplier of message cells.
pub trait MsgAllocator: Send + Sync {
    /// Allocate a cell of at least `len` bytes; `None` is the null cell.
    fn allocate(&self, len: usize) -> Option<NonNull<u8>>;

    /// Return a cell. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `cell` must be null or a pointer previously returned by
    /// [`allocate`](Self::allocate) on this allocator and not yet
    /// deallocated, with its header `size` field intact.
    unsafe fn deallocate(&self, cell: *mut u8);

    /// Approximate number of cells held ready for reuse.
    fn size(&self) -> usize;

    /// Whether the allocator's liveness tag holds the live sentinel.
    fn check_tag(&self) -> bool;
}

impl MsgAllocator for GlobalPool {
    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        GlobalPool::allocate(self, len)
    }

    unsafe fn deallocate(&self, cell: *mut u8) {
        unsafe { GlobalPool::deallocate(self, cell) }
    }

    fn size(&self) -> usize {
        GlobalPool::size(self)
    }

    fn check_tag(&self) -> bool {
        GlobalPool::check_tag(self)
    }
}

/// Non-pooling allocator: every cell is its own heap allocation.
///
/// Keeps nothing ready for reuse, so [`size`](MsgAllocator::size) is always
/// zero. Deallocation rebuilds the layout from the header's `size` field,
/// which is why the cooperative contract applies here too.
pub struct HeapAllocator {
    tag: AtomicU32,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self {
            tag: AtomicU32::new(TAG_LIVE),
        }
    }

    fn layout_for(len: usize) -> Option<Layout> {
        let bytes = len.max(mem::size_of::<MsgHeader>());
        Layout::from_size_align(bytes, mem::align_of::<MsgHeader>()).ok()
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgAllocator for HeapAllocator {
    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        if len == 0 {
            return None;
        }
        let layout = Self::layout_for(len)?;
        // SAFETY: layout has non-zero size (at least a header).
        NonNull::new(unsafe { alloc(layout) })
    }

    unsafe fn deallocate(&self, cell: *mut u8) {
        let Some(cell) = NonNull::new(cell) else {
            return;
        };

        // SAFETY: the caller guarantees an intact header, which is what
        // allocate sized the layout from.
        let len = unsafe { MsgHeader::read_size(cell) };
        if let Some(layout) = Self::layout_for(len) {
            // SAFETY: cell/layout match the pair produced by allocate.
            unsafe { dealloc(cell.as_ptr(), layout) }
        }
    }

    fn size(&self) -> usize {
        0
    }

    fn check_tag(&self) -> bool {
        self.tag.load(Ordering::Acquire) == TAG_LIVE
    }
}

impl Drop for HeapAllocator {
    fn drop(&mut self) {
        self.tag.store(TAG_DEAD, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(allocator: &dyn MsgAllocator, len: usize) {
        let cell = allocator.allocate(len).expect("allocation should succeed");
        unsafe {
            MsgHeader::write_into(cell, len);
            allocator.deallocate(cell.as_ptr());
        }
    }

    #[test]
    fn heap_allocator_round_trips() {
        let heap = HeapAllocator::new();
        assert!(heap.check_tag());
        for len in [1, 64, 100, 4096] {
            roundtrip(&heap, len);
        }
        assert_eq!(heap.size(), 0);
    }

    #[test]
    fn heap_allocator_null_cases() {
        let heap = HeapAllocator::new();
        assert!(heap.allocate(0).is_none());
        unsafe { heap.deallocate(std::ptr::null_mut()) };
    }

    #[test]
    fn both_suppliers_serve_the_same_seam() {
        let pool = GlobalPool::new(1024).unwrap();
        let heap = HeapAllocator::new();
        let suppliers: [&dyn MsgAllocator; 2] = [&pool, &heap];

        for supplier in suppliers {
            assert!(supplier.check_tag());
            roundtrip(supplier, 256);
        }
    }
}
