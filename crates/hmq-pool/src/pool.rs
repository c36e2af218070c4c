// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Size-classed global message pool.
//!
//! One [`GlobalPool`] supplies fixed-shape message cells to many
//! producer/consumer threads. A steady-state allocate or deallocate touches
//! nothing but the per-class free-list; the growth mutex is only taken when
//! a request crosses into a new size class or a free-list runs dry and a
//! fresh slab must be carved.
//!
//! # Concurrency
//!
//! - Class table: published through `ArcSwap`, mutated only under the growth
//!   mutex. Entries are `Arc`ed, so an index, once observed, never moves.
//! - Free-lists: delegated to the MPMC queue contract; a dequeued cell
//!   leaves the queue exactly once, so no cell is handed to two callers.
//! - Liveness tag: written at end of construction and start of destruction.
//!
//! # Performance
//!
//! - allocate (free-list hit): one lock-free dequeue
//! - deallocate: one lock-free enqueue, never blocks

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::class::{cell_size, class_of, max_cell_size};
use crate::config::INITIAL_SLAB_BYTES;
use crate::error::{PoolError, Result};
use crate::freelist::FreeList;
use crate::header::MsgHeader;
use crate::slab::Slab;

/// Sentinel identifying a live pool (preserved across the pool's lifetime).
pub(crate) const TAG_LIVE: u32 = 0xCAFE_EBEC;
/// Sentinel written at the start of destruction.
pub(crate) const TAG_DEAD: u32 = 0xDEAD_BEEF;

/// One size class: its free-list plus owned slab storage.
struct ClassEntry {
    cell_size: usize,
    free: FreeList,
    /// Slab bases, append-only. Written only under the growth mutex; the
    /// inner lock exists so `stats()` can walk the list without it.
    slabs: Mutex<Vec<Slab>>,
    /// Total cells carved across all slabs of this class.
    carved: AtomicUsize,
}

impl ClassEntry {
    /// Build a class and seed it with its first slab, every cell enqueued.
    fn with_initial_slab(class: usize) -> Result<Self> {
        let cell_size = cell_size(class);
        // Classes bigger than the initial slab still carve one cell.
        let cells = (INITIAL_SLAB_BYTES / cell_size).max(1);
        let slab = Slab::new(cell_size, cells)?;

        let free = FreeList::new();
        for index in 0..slab.cells() {
            free.push(slab.cell(index));
        }

        Ok(Self {
            cell_size,
            free,
            slabs: Mutex::new(vec![slab]),
            carved: AtomicUsize::new(cells),
        })
    }
}

/// Size-classed global message pool allocator.
///
/// Maps byte requests onto power-of-two size classes, serves each class from
/// a lock-free free-list, and grows by carving doubling slabs when a class
/// runs dry. Cells stay valid until the pool is dropped; slabs are never
/// returned to the system before that.
///
/// The pool is an ordinary value: create as many independent pools as the
/// runtime needs, or use [`init_msg_pool`](crate::init_msg_pool) for one
/// process-wide instance.
pub struct GlobalPool {
    tag: Arc<AtomicU32>,
    classes: ArcSwap<Vec<Arc<ClassEntry>>>,
    /// Growth coordinator: serializes class-table extension and slab carving.
    grow: Mutex<()>,
}

impl GlobalPool {
    /// Create a pool whose class table already covers `initial_max_bytes`.
    pub fn new(initial_max_bytes: usize) -> Result<Self> {
        if initial_max_bytes > max_cell_size() {
            return Err(PoolError::OversizedRequest {
                len: initial_max_bytes,
            });
        }

        let pool = Self {
            tag: Arc::new(AtomicU32::new(0)),
            classes: ArcSwap::from_pointee(Vec::new()),
            grow: Mutex::new(()),
        };
        pool.ensure_class(class_of(initial_max_bytes.max(1)))?;

        // Construction is complete; the tag goes live last.
        pool.tag.store(TAG_LIVE, Ordering::Release);
        Ok(pool)
    }

    /// Allocate a cell of at least `len` bytes.
    ///
    /// Returns `None` for `len == 0` (the null cell), for requests beyond
    /// the largest size class, and when the system allocator refuses a slab;
    /// in every failure case the free-lists are left untouched.
    ///
    /// The returned pointer is aligned to its class's cell size and stays
    /// valid until the pool is dropped.
    pub fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        if len == 0 {
            return None;
        }
        if len > max_cell_size() {
            log::error!("[GlobalPool::allocate] {}", PoolError::OversizedRequest { len });
            return None;
        }

        let class = class_of(len);
        if self.classes.load().len() <= class {
            if let Err(err) = self.ensure_class(class) {
                log::error!("[GlobalPool::allocate] class {} unavailable: {}", class, err);
                return None;
            }
        }

        let classes = self.classes.load();
        let entry = &classes[class];
        loop {
            if let Some(cell) = entry.free.try_pop() {
                return Some(cell);
            }
            // Free-list ran dry: carve another slab and retry. Two threads
            // racing here both expand; the spare slab only deepens the list.
            if let Err(err) = self.expand_class(class) {
                log::error!("[GlobalPool::allocate] class {} expansion failed: {}", class, err);
                return None;
            }
        }
    }

    /// Return a cell to its class's free-list. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `cell` must be null or a pointer previously returned by
    /// [`allocate`](Self::allocate) on this pool and not yet deallocated,
    /// with its [`MsgHeader`] `size` field still holding the original
    /// allocation length. The caller loses the right to touch the cell.
    pub unsafe fn deallocate(&self, cell: *mut u8) {
        let Some(cell) = NonNull::new(cell) else {
            return;
        };

        // SAFETY: the caller guarantees an intact header.
        let len = unsafe { MsgHeader::read_size(cell) };
        let class = class_of(len);

        let classes = self.classes.load();
        debug_assert!(
            class < classes.len(),
            "cell header maps outside the class table"
        );
        classes[class].free.push(cell);
    }

    /// Approximate number of free cells across all classes. Informational
    /// only; concurrent traffic skews it.
    pub fn size(&self) -> usize {
        self.classes
            .load()
            .iter()
            .map(|entry| entry.free.len_approx())
            .sum()
    }

    /// Whether the liveness tag still holds the live sentinel.
    pub fn check_tag(&self) -> bool {
        self.tag.load(Ordering::Acquire) == TAG_LIVE
    }

    /// A probe onto the liveness tag that outlives the pool itself.
    pub fn liveness(&self) -> PoolLiveness {
        PoolLiveness(Arc::clone(&self.tag))
    }

    /// Snapshot of per-class occupancy and slab layout.
    pub fn stats(&self) -> PoolStats {
        let classes = self
            .classes
            .load()
            .iter()
            .enumerate()
            .map(|(class, entry)| {
                let slabs = entry.slabs.lock();
                ClassStats {
                    class,
                    cell_size: entry.cell_size,
                    carved_cells: entry.carved.load(Ordering::Relaxed),
                    free_cells: entry.free.len_approx(),
                    slab_spans: slabs.iter().map(Slab::span).collect(),
                }
            })
            .collect();
        PoolStats { classes }
    }

    /// Extend the class table so `class` exists, seeding one slab per new
    /// class. No-op when the table already covers it.
    fn ensure_class(&self, class: usize) -> Result<()> {
        let _guard = self.grow.lock();

        let current = self.classes.load_full();
        if current.len() > class {
            return Ok(());
        }

        let mut next = Vec::with_capacity(class + 1);
        next.extend(current.iter().cloned());
        for new_class in current.len()..=class {
            next.push(Arc::new(ClassEntry::with_initial_slab(new_class)?));
        }

        log::debug!(
            "[GlobalPool::ensure_class] class table extended {} -> {} entries",
            current.len(),
            next.len()
        );
        self.classes.store(Arc::new(next));
        Ok(())
    }

    /// Carve a doubling slab for `class`: the new slab holds as many cells
    /// as the class has carved so far.
    fn expand_class(&self, class: usize) -> Result<()> {
        let guard = self.grow.lock();

        let entry = Arc::clone(&self.classes.load()[class]);
        let to_add = entry.carved.load(Ordering::Relaxed);
        let slab = Slab::new(entry.cell_size, to_add)?;
        let base = slab.base();
        entry.slabs.lock().push(slab);
        entry.carved.store(to_add * 2, Ordering::Relaxed);

        // Enqueue outside the growth mutex: the slab is already recorded,
        // and allocators racing past a still-empty list just carve another.
        drop(guard);

        log::debug!(
            "[GlobalPool::expand_class] class {} doubled to {} cells",
            class,
            to_add * 2
        );
        for index in 0..to_add {
            // SAFETY: index < to_add keeps the offset inside the slab, and
            // the slab lives until the pool is dropped.
            let cell =
                unsafe { NonNull::new_unchecked(base.as_ptr().add(index * entry.cell_size)) };
            entry.free.push(cell);
        }
        Ok(())
    }
}

impl Drop for GlobalPool {
    fn drop(&mut self) {
        // Flip the sentinel before any slab is released; the slabs
        // themselves free on the class entries' drop.
        self.tag.store(TAG_DEAD, Ordering::Release);
    }
}

/// Clonable handle onto a pool's liveness tag.
///
/// Unlike [`GlobalPool::check_tag`], a probe can be held by monitoring code
/// and consulted after the pool is gone; it then reports not-live.
#[derive(Clone)]
pub struct PoolLiveness(Arc<AtomicU32>);

impl PoolLiveness {
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire) == TAG_LIVE
    }
}

/// Point-in-time view of one size class.
#[derive(Debug, Clone)]
pub struct ClassStats {
    pub class: usize,
    pub cell_size: usize,
    pub carved_cells: usize,
    /// Approximate; not linearizable under concurrent traffic.
    pub free_cells: usize,
    /// `(base, bytes)` address range of each slab, in carve order.
    pub slab_spans: Vec<(usize, usize)>,
}

/// Snapshot of every class in the pool.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub classes: Vec<ClassStats>,
}

impl PoolStats {
    /// Class whose slabs contain `cell`, if any.
    pub fn class_containing(&self, cell: *const u8) -> Option<usize> {
        let addr = cell as usize;
        self.classes.iter().find_map(|stats| {
            stats
                .slab_spans
                .iter()
                .any(|&(base, bytes)| addr >= base && addr < base + bytes)
                .then_some(stats.class)
        })
    }
}
