//! 文件层
//!
//! 对应 xv6 的文件对象层：
//! - `file`: 打开文件对象和全局文件表 (kernel/file.c)
//! - `fdtable`: 进程的文件描述符表
//! - `inode`: 文件表使用的 inode 接口
//! - `log`: 日志事务接口
//! - `pipe`: 管道
//! - `ramfs`: 内存中的常规文件
//! - `stat`: 文件元数据

pub mod fdtable;
pub mod file;
pub mod inode;
pub mod log;
pub mod pipe;
pub mod ramfs;
pub mod stat;

pub use fdtable::FdTable;
pub use file::{
    fileinit, FMode, File, FileKind, FileRef, FileTable, FileTableStats, OpenFlags, Whence, FTABLE,
};
pub use inode::{InodeGuard, InodeOps};
pub use self::log::{Log, LogOp, LogOps};
pub use pipe::{Pipe, PipeOps};
pub use ramfs::RamInode;
pub use stat::Stat;
