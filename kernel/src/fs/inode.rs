//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 索引节点 (Inode) 接口
//!
//! 文件表只通过 [`InodeOps`] 访问 inode 层（对应 xv6 的 ilock/iunlock/readi/
//! writei/stati/iput）。inode 锁可能睡眠，只能在不持有文件表锁时获取。

use core::ops::Deref;

use crate::errno::KResult;
use crate::fs::stat::Stat;

/// inode 层操作
pub trait InodeOps: Send + Sync {
    /// 获取 inode 锁（可能阻塞）
    fn lock(&self);

    /// 释放 inode 锁
    fn unlock(&self);

    /// 从 `off` 处读入最多 `dst.len()` 字节，返回实际读取的字节数
    ///
    /// 调用者必须持有 inode 锁。
    fn read_at(&self, dst: &mut [u8], off: u32) -> KResult<usize>;

    /// 把 `src` 写到 `off` 处，返回实际写入的字节数
    ///
    /// 调用者必须持有 inode 锁，并处在日志事务中。
    fn write_at(&self, src: &[u8], off: u32) -> KResult<usize>;

    /// 读取元数据，调用者必须持有 inode 锁
    fn stat(&self) -> Stat;

    /// 放弃一个 inode 引用（对应 iput），必须在日志事务中调用
    fn release(&self);
}

/// 持有 inode 锁期间的守卫，drop 时解锁
pub struct InodeGuard<'a> {
    inode: &'a dyn InodeOps,
}

impl<'a> InodeGuard<'a> {
    pub fn lock(inode: &'a dyn InodeOps) -> Self {
        inode.lock();
        Self { inode }
    }
}

impl<'a> Deref for InodeGuard<'a> {
    type Target = dyn InodeOps + 'a;

    fn deref(&self) -> &Self::Target {
        self.inode
    }
}

impl Drop for InodeGuard<'_> {
    fn drop(&mut self) {
        self.inode.unlock();
    }
}
