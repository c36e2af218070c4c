// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pool tuning constants - single source of truth.
//!
//! All size-class and slab geometry is derived from the constants in this
//! module. **NEVER hardcode these values elsewhere!**
//!
//! Everything here is compile-time; the pool reads no files and no
//! environment variables.

// =======================================================================
// Size-class geometry
// =======================================================================

/// Cell size of class 0, in bytes.
///
/// This is the smallest message control block the runtime allocates; every
/// other class is `BASE_CELL_SIZE << class`. Must be a power of two (cells
/// are aligned to their class size) and large enough to hold a
/// [`MsgHeader`](crate::MsgHeader) (compile-time asserted in `header.rs`).
pub const BASE_CELL_SIZE: usize = 64;

/// Number of size classes the pool will ever create.
///
/// The largest supported request is `BASE_CELL_SIZE << (MAX_CLASSES - 1)`
/// = 1 GiB. Requests above that are refused rather than shifted into
/// oblivion.
pub const MAX_CLASSES: usize = 25;

// =======================================================================
// Slab geometry
// =======================================================================

/// Byte size of the first slab carved for a new class.
///
/// Classes whose cell size exceeds this still get one cell per slab.
/// Subsequent slabs double the class's carved-cell total.
pub const INITIAL_SLAB_BYTES: usize = 256 * 1024;

const _: () = assert!(BASE_CELL_SIZE.is_power_of_two());
const _: () = assert!(MAX_CLASSES > 0 && MAX_CLASSES <= usize::BITS as usize - BASE_CELL_SIZE.trailing_zeros() as usize - 1);
