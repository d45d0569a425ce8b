//! 管道 (Pipe)
//!
//! 文件表通过 [`PipeOps`] 访问管道层；[`Pipe`] 是基于环形缓冲区的实现。
//!
//! 核心概念：
//! - 读端在缓冲区为空且写端未关闭时阻塞
//! - 写端在缓冲区满且读端未关闭时阻塞，读端关闭后写入失败 (EPIPE)
//! - 两端分别关闭，由打开文件对象最后一次 close 时触发

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use crate::config::PIPESIZE;
use crate::errno::{Errno, KResult};

/// 管道层操作
pub trait PipeOps: Send + Sync {
    /// 读取数据，返回 0 表示写端已关闭且没有剩余数据
    fn read(&self, dst: &mut [u8]) -> KResult<usize>;

    /// 写入全部数据
    fn write(&self, src: &[u8]) -> KResult<usize>;

    /// 关闭一端，`writable` 为真时关闭写端
    fn close(&self, writable: bool);
}

/// 管道缓冲区
pub struct PipeBuffer {
    /// 缓冲区数据
    data: Vec<u8>,
    /// 累计读出的字节数
    nread: usize,
    /// 累计写入的字节数
    nwrite: usize,
}

impl PipeBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size.max(1)],
            nread: 0,
            nwrite: 0,
        }
    }

    /// 可读字节数
    pub fn available_read(&self) -> usize {
        self.nwrite.wrapping_sub(self.nread)
    }

    /// 可写空间
    pub fn available_write(&self) -> usize {
        self.data.len() - self.available_read()
    }

    /// 读取数据，返回读取的字节数
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let size = self.data.len();
        let to_read = core::cmp::min(self.available_read(), buf.len());
        for b in buf.iter_mut().take(to_read) {
            *b = self.data[self.nread % size];
            self.nread = self.nread.wrapping_add(1);
        }
        to_read
    }

    /// 写入数据，返回写入的字节数
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let size = self.data.len();
        let to_write = core::cmp::min(self.available_write(), buf.len());
        for &b in buf.iter().take(to_write) {
            self.data[self.nwrite % size] = b;
            self.nwrite = self.nwrite.wrapping_add(1);
        }
        to_write
    }
}

/// 管道
pub struct Pipe {
    /// 管道缓冲区
    buffer: Mutex<PipeBuffer>,
    /// 读端是否打开
    readopen: AtomicBool,
    /// 写端是否打开
    writeopen: AtomicBool,
}

impl Pipe {
    /// 创建默认大小的管道
    pub fn new() -> Self {
        Self::with_capacity(PIPESIZE)
    }

    pub fn with_capacity(size: usize) -> Self {
        Self {
            buffer: Mutex::new(PipeBuffer::new(size)),
            readopen: AtomicBool::new(true),
            writeopen: AtomicBool::new(true),
        }
    }

    /// 检查读端是否关闭
    pub fn is_read_closed(&self) -> bool {
        !self.readopen.load(Ordering::Acquire)
    }

    /// 检查写端是否关闭
    pub fn is_write_closed(&self) -> bool {
        !self.writeopen.load(Ordering::Acquire)
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeOps for Pipe {
    fn read(&self, dst: &mut [u8]) -> KResult<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        loop {
            {
                let mut buffer = self.buffer.lock();
                if buffer.available_read() > 0 {
                    return Ok(buffer.read(dst));
                }
                if self.is_write_closed() {
                    return Ok(0); // EOF
                }
            }
            core::hint::spin_loop();
        }
    }

    fn write(&self, src: &[u8]) -> KResult<usize> {
        let mut written = 0;
        while written < src.len() {
            if self.is_read_closed() {
                return Err(Errno::BrokenPipe);
            }
            written += self.buffer.lock().write(&src[written..]);
            if written < src.len() {
                // 缓冲区满，等读端取走数据
                core::hint::spin_loop();
            }
        }
        Ok(written)
    }

    fn close(&self, writable: bool) {
        if writable {
            self.writeopen.store(false, Ordering::Release);
        } else {
            self.readopen.store(false, Ordering::Release);
        }
        if self.is_read_closed() && self.is_write_closed() {
            log::trace!("pipe: both ends closed");
        }
    }
}
