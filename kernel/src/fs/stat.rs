//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 文件状态信息 (stat)
//!
//! filestat() 返回给调用者的元数据，由 inode 层填写

/// 文件类型掩码
pub const S_IFMT: u32 = 0o170000;
/// 常规文件
pub const S_IFREG: u32 = 0o100000;

/// 文件状态信息
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Stat {
    /// 设备 ID (st_dev)
    pub st_dev: u64,

    /// Inode 号 (st_ino)
    pub st_ino: u64,

    /// 文件类型和权限 (st_mode)
    pub st_mode: u32,

    /// 硬链接数 (st_nlink)
    pub st_nlink: u32,

    /// 文件大小 (字节) (st_size)
    pub st_size: u64,

    /// 块大小 (st_blksize)
    pub st_blksize: u64,

    /// 占用的块数 (st_blocks)
    pub st_blocks: u64,
}

impl Stat {
    /// 常规文件的状态信息，块数按 BSIZE 向上取整
    pub fn regular(dev: u64, ino: u64, size: u64) -> Self {
        let blksize = crate::config::BSIZE as u64;
        Self {
            st_dev: dev,
            st_ino: ino,
            st_mode: S_IFREG | 0o644,
            st_nlink: 1,
            st_size: size,
            st_blksize: blksize,
            st_blocks: size.div_ceil(blksize.max(1)),
        }
    }

    pub fn is_regular_file(&self) -> bool {
        (self.st_mode & S_IFMT) == S_IFREG
    }
}
