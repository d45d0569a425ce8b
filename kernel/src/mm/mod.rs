//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内存管理模块

pub mod page;
pub mod slab;

pub use page::{PageAllocator, PageFrame, PagePool, PAGE_SIZE};
pub use slab::{slots_per_block, BlockId, SlabCache, SlabObject, SlotRef};
