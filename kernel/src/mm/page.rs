//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 页帧管理
//!
//! 文件表按页向页分配器申请内存（对应 xv6 的 kalloc/kfree）。
//! 页分配器本身不属于文件表，这里只定义边界 [`PageAllocator`]，
//! 并提供一个有容量上限的页池 [`PagePool`]。

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

pub use crate::config::PAGE_SIZE;

pub type PhysFrameNr = usize;

/// 已分配的物理页
///
/// 不实现 `Clone`/`Copy`：一页只能被归还一次。
#[derive(Debug, PartialEq, Eq)]
pub struct PageFrame(PhysFrameNr);

impl PageFrame {
    pub const fn new(pfn: PhysFrameNr) -> Self {
        Self(pfn)
    }

    /// 物理页号
    pub fn pfn(&self) -> PhysFrameNr {
        self.0
    }

    /// 页起始地址
    pub fn addr(&self) -> usize {
        self.0 * PAGE_SIZE
    }
}

/// 页分配器接口
///
/// 对应 xv6 的 kalloc()/kfree()
pub trait PageAllocator: Send + Sync {
    /// 分配一页，内存耗尽时返回 `None`
    fn alloc_page(&self) -> Option<PageFrame>;

    /// 归还一页
    fn free_page(&self, frame: PageFrame);
}

/// 有容量上限的页池
///
/// 页号从 1 开始编号，释放的页号会被优先复用。
pub struct PagePool {
    /// 最大页数
    max_pages: usize,
    /// 已分配的页数
    allocated_pages: AtomicUsize,
    /// 下一个从未使用过的页号
    next_pfn: AtomicUsize,
    /// 已释放、可复用的页号
    free_list: Mutex<Vec<PhysFrameNr>>,
}

impl PagePool {
    pub const fn new(max_pages: usize) -> Self {
        Self {
            max_pages,
            allocated_pages: AtomicUsize::new(0),
            next_pfn: AtomicUsize::new(1),
            free_list: Mutex::new(Vec::new()),
        }
    }

    /// 当前已分配的页数
    pub fn allocated(&self) -> usize {
        self.allocated_pages.load(Ordering::Acquire)
    }

    /// 页池容量
    pub fn capacity(&self) -> usize {
        self.max_pages
    }
}

impl PageAllocator for PagePool {
    fn alloc_page(&self) -> Option<PageFrame> {
        let idx = self.allocated_pages.fetch_add(1, Ordering::AcqRel);
        if idx >= self.max_pages {
            self.allocated_pages.fetch_sub(1, Ordering::AcqRel);
            return None;
        }

        if let Some(pfn) = self.free_list.lock().pop() {
            return Some(PageFrame(pfn));
        }
        Some(PageFrame(self.next_pfn.fetch_add(1, Ordering::AcqRel)))
    }

    fn free_page(&self, frame: PageFrame) {
        self.free_list.lock().push(frame.0);
        self.allocated_pages.fetch_sub(1, Ordering::AcqRel);
    }
}
