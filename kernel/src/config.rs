//! Rux 文件表配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = 4096;

/// 全局文件表最多占用的页数
pub const FTABLE_MAX_PAGES: usize = 64;

// ============================================================
// 文件系统配置
// ============================================================

/// 单个文件系统操作最多写入的块数
pub const MAXOPBLOCKS: usize = 10;

/// 日志区大小（块）
pub const LOGSIZE: usize = 30;

/// 磁盘块大小（字节）
pub const BSIZE: usize = 512;

/// 每个进程最多打开的文件数
pub const NOFILE: usize = 16;

/// 管道缓冲区大小（字节）
pub const PIPESIZE: usize = 512;

// ============================================================
// 调试配置
// ============================================================

/// 默认日志级别
pub const LOG_LEVEL: &str = "info";
