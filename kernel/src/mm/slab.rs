//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Slab 分配器
//!
//! 为单一类型的内核对象（打开文件）提供按页增长、按页回收的槽位分配。
//!
//! # 设计
//! - Block: 一页内存，头部 + 固定数量的对象槽位
//! - 所有 Block 组成一条双向链表，按链表顺序首次适配（first fit）
//! - 每个 Block 记录空闲槽位数，满的 Block 直接跳过
//! - Block 中最后一个对象被释放时，立即摘链并把页还给页分配器
//!
//! Block 存放在以 [`BlockId`] 为下标的表中，链表指针是下标而不是地址；
//! 槽位句柄 [`SlotRef`] = Block 下标 + 槽位下标 + 分配代数。
//!
//! 槽位数组本身在堆上分配；Block 持有的 [`PageFrame`] 只用来记账，
//! 页大小决定每个 Block 的槽位数，页分配器决定 Block 的总数。
//!
//! 本模块不加锁：调用者（文件表）持有表锁后通过 `&mut SlabCache` 访问。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem::size_of;

use crate::mm::page::{PageAllocator, PageFrame, PAGE_SIZE};

/// Block 在 Block 表中的下标
pub type BlockId = u16;

/// 可以放进 slab 的对象
///
/// 引用计数为 0 表示槽位空闲。分配器只会把新分配槽位的引用计数置为 1，
/// 其余字段由使用者维护；归还槽位前使用者必须把对象复位（引用计数为 0）。
pub trait SlabObject: Default {
    fn refcnt(&self) -> u32;
    fn set_refcnt(&mut self, refcnt: u32);
}

/// Block 头部
#[repr(C)]
#[derive(Debug)]
struct BlockHeader {
    /// 空闲槽位数
    free: u16,
    /// 上一个 Block
    prev: Option<BlockId>,
    /// 下一个 Block
    next: Option<BlockId>,
}

/// 对象槽位
struct Slot<T> {
    /// 最近一次分配的代数，用于识别过期句柄
    gen: u64,
    obj: T,
}

/// 一页内存组成的 Block
struct Block<T> {
    header: BlockHeader,
    /// 支撑本 Block 的物理页
    page: PageFrame,
    slots: Box<[Slot<T>]>,
}

/// 槽位句柄
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SlotRef {
    block: BlockId,
    index: u16,
    gen: u64,
}

impl SlotRef {
    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// 每个 Block 可容纳的对象数
pub const fn slots_per_block<T>() -> usize {
    (PAGE_SIZE - size_of::<BlockHeader>()) / size_of::<Slot<T>>()
}

/// Slab 缓存
pub struct SlabCache<T: SlabObject> {
    /// 页分配器
    pages: Arc<dyn PageAllocator>,
    /// Block 表，`None` 表示该下标当前没有 Block
    blocks: Vec<Option<Block<T>>>,
    /// 空出来的 Block 下标，新建 Block 时优先复用
    free_ids: Vec<BlockId>,
    /// 链表头
    head: Option<BlockId>,
    /// 链表尾
    tail: Option<BlockId>,
    /// 链表中的 Block 数
    nr_blocks: usize,
    /// 已分配的对象数
    nr_active: usize,
    /// 分配代数
    next_gen: u64,
}

impl<T: SlabObject> SlabCache<T> {
    /// 创建空缓存（不申请任何页）
    pub fn new(pages: Arc<dyn PageAllocator>) -> Self {
        Self {
            pages,
            blocks: Vec::new(),
            free_ids: Vec::new(),
            head: None,
            tail: None,
            nr_blocks: 0,
            nr_active: 0,
            next_gen: 0,
        }
    }

    /// 每个 Block 可容纳的对象数
    pub const fn capacity() -> usize {
        slots_per_block::<T>()
    }

    /// 链表中的 Block 数
    pub fn nr_blocks(&self) -> usize {
        self.nr_blocks
    }

    /// 已分配的对象数
    pub fn nr_active(&self) -> usize {
        self.nr_active
    }

    /// 分配一个槽位
    ///
    /// 按链表顺序查找第一个有空闲槽位的 Block，在其中按地址顺序取第一个
    /// 引用计数为 0 的槽位；都满时申请新页并挂到链表尾部。
    /// 只有页分配失败时返回 `None`，此时链表保持不变。
    pub fn alloc(&mut self) -> Option<SlotRef> {
        let mut cur = self.head;
        while let Some(id) = cur {
            let block = self.block_mut(id);
            cur = block.header.next;
            if block.header.free == 0 {
                continue;
            }
            let found = block.slots.iter().position(|s| s.obj.refcnt() == 0);
            if let Some(index) = found {
                return Some(self.take_slot(id, index));
            }
        }

        let id = self.grow()?;
        Some(self.take_slot(id, 0))
    }

    /// 归还槽位
    ///
    /// 对象必须已经复位。Block 全部空闲时立即摘链并释放页。
    pub fn free(&mut self, slot: SlotRef) {
        let block = match self.blocks.get_mut(slot.block as usize).and_then(Option::as_mut) {
            Some(block) => block,
            None => panic!("slab: free into unknown block {}", slot.block),
        };
        debug_assert_eq!(block.slots[slot.index()].obj.refcnt(), 0);

        block.header.free += 1;
        let empty = block.header.free as usize == Self::capacity();
        self.nr_active -= 1;

        if empty {
            self.release_block(slot.block);
        }
    }

    /// 按句柄取对象，句柄过期时返回 `None`
    pub fn get(&self, slot: &SlotRef) -> Option<&T> {
        self.blocks
            .get(slot.block as usize)?
            .as_ref()?
            .slots
            .get(slot.index())
            .filter(|s| s.gen == slot.gen)
            .map(|s| &s.obj)
    }

    /// 按句柄取可变对象，句柄过期时返回 `None`
    pub fn get_mut(&mut self, slot: &SlotRef) -> Option<&mut T> {
        self.blocks
            .get_mut(slot.block as usize)?
            .as_mut()?
            .slots
            .get_mut(slot.index())
            .filter(|s| s.gen == slot.gen)
            .map(|s| &mut s.obj)
    }

    /// 按链表顺序列出 Block
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut ids = Vec::with_capacity(self.nr_blocks);
        let mut cur = self.head;
        while let Some(id) = cur {
            ids.push(id);
            cur = self.block(id).header.next;
        }
        ids
    }

    /// 某个 Block 的空闲槽位数
    pub fn free_slots(&self, id: BlockId) -> Option<usize> {
        self.blocks
            .get(id as usize)?
            .as_ref()
            .map(|b| b.header.free as usize)
    }

    fn block(&self, id: BlockId) -> &Block<T> {
        match self.blocks.get(id as usize).and_then(Option::as_ref) {
            Some(block) => block,
            None => panic!("slab: block {} is linked but not present", id),
        }
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block<T> {
        match self.blocks.get_mut(id as usize).and_then(Option::as_mut) {
            Some(block) => block,
            None => panic!("slab: block {} is linked but not present", id),
        }
    }

    fn take_slot(&mut self, id: BlockId, index: usize) -> SlotRef {
        self.next_gen += 1;
        let gen = self.next_gen;

        let block = self.block_mut(id);
        let slot = &mut block.slots[index];
        slot.gen = gen;
        slot.obj.set_refcnt(1);
        block.header.free -= 1;
        self.nr_active += 1;

        SlotRef {
            block: id,
            index: index as u16,
            gen,
        }
    }

    /// 申请一页，格式化为 Block 并挂到链表尾部
    fn grow(&mut self) -> Option<BlockId> {
        if self.free_ids.is_empty() && self.blocks.len() > BlockId::MAX as usize {
            log::warn!("slab: block table full ({} blocks)", self.blocks.len());
            return None;
        }

        let page = match self.pages.alloc_page() {
            Some(page) => page,
            None => {
                log::warn!("slab: out of pages with {} blocks in use", self.nr_blocks);
                return None;
            }
        };

        let capacity = Self::capacity();
        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|_| Slot { gen: 0, obj: T::default() })
            .collect();

        log::debug!("slab: new block on page {:#x}, {} slots", page.addr(), capacity);

        let block = Block {
            header: BlockHeader {
                free: capacity as u16,
                prev: self.tail,
                next: None,
            },
            page,
            slots,
        };

        let id = match self.free_ids.pop() {
            Some(id) => {
                self.blocks[id as usize] = Some(block);
                id
            }
            None => {
                self.blocks.push(Some(block));
                (self.blocks.len() - 1) as BlockId
            }
        };

        match self.tail {
            Some(tail) => self.block_mut(tail).header.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.nr_blocks += 1;

        Some(id)
    }

    /// 摘链并把页还给页分配器
    fn release_block(&mut self, id: BlockId) {
        let block = match self.blocks[id as usize].take() {
            Some(block) => block,
            None => return,
        };
        let BlockHeader { prev, next, .. } = block.header;

        match prev {
            Some(prev) => self.block_mut(prev).header.next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.block_mut(next).header.prev = prev,
            None => self.tail = prev,
        }

        self.free_ids.push(id);
        self.nr_blocks -= 1;

        log::debug!("slab: release block {} (page {:#x})", id, block.page.addr());
        self.pages.free_page(block.page);
    }
}

impl<T: SlabObject> Drop for SlabCache<T> {
    fn drop(&mut self) {
        for block in self.blocks.drain(..).flatten() {
            self.pages.free_page(block.page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::page::PagePool;
    use alloc::collections::BTreeSet;

    struct Obj {
        refcnt: u32,
        _payload: [u8; 240],
    }

    impl Default for Obj {
        fn default() -> Self {
            Self {
                refcnt: 0,
                _payload: [0; 240],
            }
        }
    }

    impl SlabObject for Obj {
        fn refcnt(&self) -> u32 {
            self.refcnt
        }

        fn set_refcnt(&mut self, refcnt: u32) {
            self.refcnt = refcnt;
        }
    }

    fn cache(max_pages: usize) -> (Arc<PagePool>, SlabCache<Obj>) {
        let pool = Arc::new(PagePool::new(max_pages));
        let cache = SlabCache::new(pool.clone());
        (pool, cache)
    }

    fn release(cache: &mut SlabCache<Obj>, slot: SlotRef) {
        cache.get_mut(&slot).unwrap().refcnt = 0;
        cache.free(slot);
    }

    /// 每个 Block 的空闲计数等于引用计数为 0 的槽位数，链表前后指针一致
    fn check_invariants(cache: &SlabCache<Obj>) {
        let ids = cache.block_ids();
        assert_eq!(ids.len(), cache.nr_blocks());

        let mut prev = None;
        let mut active = 0;
        for &id in &ids {
            let block = cache.block(id);
            assert_eq!(block.header.prev, prev);
            let free = block.slots.iter().filter(|s| s.obj.refcnt == 0).count();
            assert_eq!(block.header.free as usize, free);
            assert!(free < SlabCache::<Obj>::capacity(), "empty block left linked");
            active += block.slots.len() - free;
            prev = Some(id);
        }
        assert_eq!(cache.tail, prev);
        assert_eq!(active, cache.nr_active());
    }

    #[test]
    fn test_capacity() {
        let cap = SlabCache::<Obj>::capacity();
        assert!(cap > 1);
        assert!(cap * size_of::<Slot<Obj>>() + size_of::<BlockHeader>() <= PAGE_SIZE);
    }

    #[test]
    fn test_grow_and_shrink() {
        let cap = SlabCache::<Obj>::capacity();
        let (pool, mut cache) = cache(16);

        let k = cap * 2 + 3;
        let slots: Vec<SlotRef> = (0..k).map(|_| cache.alloc().unwrap()).collect();
        assert_eq!(cache.nr_blocks(), (k + cap - 1) / cap);
        assert_eq!(pool.allocated(), 3);
        check_invariants(&cache);

        let distinct: BTreeSet<(BlockId, usize)> =
            slots.iter().map(|s| (s.block(), s.index())).collect();
        assert_eq!(distinct.len(), k);

        for slot in slots {
            release(&mut cache, slot);
            check_invariants(&cache);
        }
        assert_eq!(cache.nr_blocks(), 0);
        assert_eq!(cache.nr_active(), 0);
        assert_eq!(pool.allocated(), 0);
        assert!(cache.block_ids().is_empty());
    }

    #[test]
    fn test_first_fit_reuse() {
        let (_pool, mut cache) = cache(4);
        let a = cache.alloc().unwrap();
        let b = cache.alloc().unwrap();
        let _c = cache.alloc().unwrap();
        assert_eq!((a.block(), a.index()), (0, 0));
        assert_eq!((b.block(), b.index()), (0, 1));

        release(&mut cache, b);
        let d = cache.alloc().unwrap();
        assert_eq!((d.block(), d.index()), (0, 1));
        assert_ne!(d, b);
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&d).is_some());
    }

    #[test]
    fn test_release_middle_block() {
        let cap = SlabCache::<Obj>::capacity();
        let (pool, mut cache) = cache(8);

        let slots: Vec<SlotRef> = (0..cap * 3).map(|_| cache.alloc().unwrap()).collect();
        assert_eq!(cache.block_ids(), [0, 1, 2]);

        for &slot in &slots[cap..cap * 2] {
            release(&mut cache, slot);
        }
        assert_eq!(cache.block_ids(), [0, 2]);
        assert_eq!(pool.allocated(), 2);
        check_invariants(&cache);

        // 新 Block 复用空出的下标，挂在链表尾部
        let extra: Vec<SlotRef> = (0..cap).map(|_| cache.alloc().unwrap()).collect();
        assert_eq!(cache.block_ids(), [0, 2, 1]);
        assert!(extra.iter().all(|s| s.block() == 1));
        cache.alloc().unwrap();
        assert_eq!(cache.block_ids(), [0, 2, 1, 3]);
        check_invariants(&cache);
    }

    #[test]
    fn test_release_head_and_tail() {
        let cap = SlabCache::<Obj>::capacity();
        let (_pool, mut cache) = cache(8);

        let slots: Vec<SlotRef> = (0..cap * 3).map(|_| cache.alloc().unwrap()).collect();
        for &slot in &slots[..cap] {
            release(&mut cache, slot);
        }
        assert_eq!(cache.block_ids(), [1, 2]);
        check_invariants(&cache);

        for &slot in &slots[cap * 2..] {
            release(&mut cache, slot);
        }
        assert_eq!(cache.block_ids(), [1]);
        check_invariants(&cache);
    }

    #[test]
    fn test_exhausted() {
        let cap = SlabCache::<Obj>::capacity();
        let (pool, mut cache) = cache(1);

        for _ in 0..cap {
            assert!(cache.alloc().is_some());
        }
        assert!(cache.alloc().is_none());
        assert_eq!(cache.nr_blocks(), 1);
        assert_eq!(pool.allocated(), 1);
        check_invariants(&cache);
    }

    #[test]
    fn test_exhausted_empty_list() {
        let (_pool, mut cache) = cache(0);
        assert!(cache.alloc().is_none());
        assert_eq!(cache.nr_blocks(), 0);
        assert!(cache.head.is_none() && cache.tail.is_none());
    }

    #[test]
    fn test_random_sequence() {
        let (pool, mut cache) = cache(1024);
        let mut live: Vec<SlotRef> = Vec::new();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;

        for _ in 0..4000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let r = (seed >> 33) as usize;
            if live.is_empty() || r % 2 == 0 {
                live.push(cache.alloc().unwrap());
            } else {
                let slot = live.swap_remove(r % live.len());
                release(&mut cache, slot);
            }

            let distinct: BTreeSet<(BlockId, usize)> =
                live.iter().map(|s| (s.block(), s.index())).collect();
            assert_eq!(distinct.len(), live.len());
        }
        check_invariants(&cache);

        for slot in live.drain(..) {
            release(&mut cache, slot);
        }
        assert_eq!(cache.nr_blocks(), 0);
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn test_drop_returns_pages() {
        let pool = Arc::new(PagePool::new(4));
        {
            let mut cache: SlabCache<Obj> = SlabCache::new(pool.clone());
            cache.alloc().unwrap();
            assert_eq!(pool.allocated(), 1);
        }
        assert_eq!(pool.allocated(), 0);
    }
}
