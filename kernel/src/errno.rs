//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 标准错误代码定义
//!
//! 和 include/uapi/asm-generic/errno.h 保持一致的编号

use core::fmt;

/// 文件表操作的结果类型
pub type KResult<T> = Result<T, Errno>;

/// 标准错误代码
///
/// 使用方法：
/// ```rust
/// use ftable::errno::{Errno, KResult};
///
/// fn check(readable: bool) -> KResult<()> {
///     if !readable {
///         return Err(Errno::BadFileNumber);
///     }
///     Ok(())
/// }
///
/// // 系统调用风格的返回值
/// assert_eq!(check(false).unwrap_err().as_neg_i32(), -9);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Bad file number (EBADF, 9)
    BadFileNumber = 9,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// File table overflow (ENFILE, 23)
    FileTableOverflow = 23,

    /// Too many open files (EMFILE, 24)
    TooManyOpenFiles = 24,

    /// File too large (EFBIG, 27)
    FileTooLarge = 27,

    /// No space left on device (ENOSPC, 28)
    NoSpaceLeftOnDevice = 28,

    /// Illegal seek (ESPIPE, 29)
    IllegalSeek = 29,

    /// Broken pipe (EPIPE, 32)
    BrokenPipe = 32,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 获取错误代码的负数值（isize，用于 read/write 返回字节数的系统调用）
    #[inline]
    pub const fn as_neg_isize(self) -> isize {
        -(self as i32) as isize
    }

    /// 错误名称
    pub const fn name(self) -> &'static str {
        match self {
            Errno::BadFileNumber => "EBADF",
            Errno::InvalidArgument => "EINVAL",
            Errno::FileTableOverflow => "ENFILE",
            Errno::TooManyOpenFiles => "EMFILE",
            Errno::FileTooLarge => "EFBIG",
            Errno::NoSpaceLeftOnDevice => "ENOSPC",
            Errno::IllegalSeek => "ESPIPE",
            Errno::BrokenPipe => "EPIPE",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_i32())
    }
}

/// 把 `KResult<usize>` 转换成系统调用返回值
///
/// 成功返回字节数，失败返回负的错误码。
pub fn to_syscall_ret(res: KResult<usize>) -> isize {
    match res {
        Ok(n) => n as isize,
        Err(e) => e.as_neg_isize(),
    }
}
