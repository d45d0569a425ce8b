//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内存文件 (ramfs inode)
//!
//! 数据保存在内存中的常规文件，实现 [`InodeOps`]，用于在没有块设备时
//! 挂接到文件表上。

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::Mutex;

use crate::errno::{Errno, KResult};
use crate::fs::inode::InodeOps;
use crate::fs::stat::Stat;

/// 默认最大文件大小
pub const RAMFS_MAX_FILE_SIZE: usize = 1 << 20;

/// 内存 inode
pub struct RamInode {
    /// 设备号
    dev: u64,
    /// inode 号
    ino: u64,
    /// inode 锁（睡眠锁语义，这里以自旋等待实现）
    locked: AtomicBool,
    /// 文件数据
    data: Mutex<Vec<u8>>,
    /// 最大文件大小
    max_size: usize,
    /// iput 次数
    released: AtomicUsize,
}

impl RamInode {
    pub fn new(dev: u64, ino: u64) -> Self {
        Self::with_max_size(dev, ino, RAMFS_MAX_FILE_SIZE)
    }

    pub fn with_max_size(dev: u64, ino: u64, max_size: usize) -> Self {
        Self {
            dev,
            ino,
            locked: AtomicBool::new(false),
            data: Mutex::new(Vec::new()),
            max_size,
            released: AtomicUsize::new(0),
        }
    }

    /// 文件大小
    pub fn size(&self) -> usize {
        self.data.lock().len()
    }

    /// 文件内容的副本
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// 是否被锁住
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// iput 被调用的次数
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }
}

impl InodeOps for RamInode {
    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        if !self.locked.swap(false, Ordering::Release) {
            panic!("iunlock: inode {} not locked", self.ino);
        }
    }

    fn read_at(&self, dst: &mut [u8], off: u32) -> KResult<usize> {
        let data = self.data.lock();
        let off = off as usize;
        if off > data.len() {
            return Err(Errno::InvalidArgument);
        }
        let n = core::cmp::min(dst.len(), data.len() - off);
        dst[..n].copy_from_slice(&data[off..off + n]);
        Ok(n)
    }

    fn write_at(&self, src: &[u8], off: u32) -> KResult<usize> {
        let mut data = self.data.lock();
        let off = off as usize;
        if off > data.len() {
            return Err(Errno::InvalidArgument);
        }
        let end = off.checked_add(src.len()).ok_or(Errno::FileTooLarge)?;
        if end > self.max_size {
            return Err(Errno::FileTooLarge);
        }
        if end > data.len() {
            data.resize(end, 0);
        }
        data[off..end].copy_from_slice(src);
        Ok(src.len())
    }

    fn stat(&self) -> Stat {
        Stat::regular(self.dev, self.ino, self.data.lock().len() as u64)
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::AcqRel);
    }
}
