// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # hmq-pool - size-classed message pool allocator
//!
//! The global buffer pool of the HMQ messaging runtime. It hands fixed-shape
//! message control blocks to many producer/consumer threads with minimal
//! contention: byte requests map onto power-of-two size classes, each class
//! is served by a lock-free MPMC free-list, and rare growth events (a new
//! class, or a doubling slab for an exhausted one) serialize on a single
//! coarse mutex.
//!
//! ## Quick Start
//!
//! ```rust
//! use hmq_pool::{GlobalPool, MsgHeader};
//!
//! let pool = GlobalPool::new(4096)?;
//!
//! let cell = pool.allocate(256).expect("pool exhausted");
//! unsafe {
//!     MsgHeader::write_into(cell, 256);
//!     // ... the runtime builds its message in the cell ...
//!     pool.deallocate(cell.as_ptr());
//! }
//!
//! assert!(pool.check_tag());
//! # Ok::<(), hmq_pool::PoolError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Messaging Runtime                       |
//! |        (sockets, pipes, wire engines - out of scope)         |
//! +--------------------------------------------------------------+
//! |                    MsgAllocator seam                         |
//! |              GlobalPool     |     HeapAllocator              |
//! +--------------------------------------------------------------+
//! |  Size Classifier -> Class Table -> per-class Free-Lists      |
//! |        (growth serialized by the Growth Coordinator)         |
//! +--------------------------------------------------------------+
//! |                 Slabs (system allocations)                   |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GlobalPool`] | The pooling allocator; one instance per scope the runtime chooses |
//! | [`MsgAllocator`] | Seam the message layer allocates through |
//! | [`HeapAllocator`] | Non-pooling fallback honoring the same contract |
//! | [`MsgHeader`] | Cooperative cell header; its `size` field drives deallocate |
//! | [`PoolStats`] | Per-class occupancy and slab-layout snapshot |

/// Allocator seam and the non-pooling heap fallback.
pub mod allocator;
/// Size classifier (byte length <-> class index).
pub mod class;
/// Compile-time tuning constants.
pub mod config;
/// Pool error types.
pub mod error;
/// Message control-block header contract.
pub mod header;
/// The global pool itself.
pub mod pool;

mod freelist;
mod slab;

pub use allocator::{HeapAllocator, MsgAllocator};
pub use class::{cell_size, class_of, max_cell_size};
pub use config::{BASE_CELL_SIZE, INITIAL_SLAB_BYTES, MAX_CLASSES};
pub use error::{PoolError, Result};
pub use header::{MsgHeader, MSG_FLAG_COMMAND, MSG_FLAG_MORE};
pub use pool::{ClassStats, GlobalPool, PoolLiveness, PoolStats};

use std::sync::{Arc, OnceLock};

/// hmq-pool version string.
pub const VERSION: &str = "0.4.1";

static GLOBAL_MSG_POOL: OnceLock<Arc<GlobalPool>> = OnceLock::new();

/// Initialize the process-wide message pool.
///
/// The first successful call creates the pool; later calls return the same
/// instance and ignore `initial_max_bytes`.
pub fn init_msg_pool(initial_max_bytes: usize) -> Result<Arc<GlobalPool>> {
    if let Some(pool) = GLOBAL_MSG_POOL.get() {
        return Ok(Arc::clone(pool));
    }
    let pool = Arc::new(GlobalPool::new(initial_max_bytes)?);
    Ok(Arc::clone(GLOBAL_MSG_POOL.get_or_init(|| pool)))
}

/// The process-wide message pool, if one was initialized.
pub fn msg_pool() -> Option<Arc<GlobalPool>> {
    GLOBAL_MSG_POOL.get().cloned()
}
