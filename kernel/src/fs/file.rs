//! 打开文件对象管理
//!
//! 对应 xv6 的 kernel/file.c：
//! - `File`: 打开的文件对象，多个进程（dup/fork）共享同一个对象
//! - `FileTable`: 全局文件表，对象存放在按页分配的 slab 中
//! - filealloc/filedup/fileclose/filestat/fileread/filewrite/fileseek
//!
//! 锁规则：文件表锁只保护引用计数、类型、偏移这些簿记字段，持锁期间不做
//! 任何可能阻塞的事情。管道读写、inode 锁、日志事务都在表锁之外进行；
//! 引用计数降到 0 时先在锁内把对象复位并归还槽位，解锁后再关闭管道或
//! 释放 inode。

use alloc::sync::Arc;
use core::mem;

use bitflags::bitflags;
use lazy_static::lazy_static;
use spin::Mutex;

use crate::config;
use crate::errno::{Errno, KResult};
use crate::fs::inode::{InodeGuard, InodeOps};
use crate::fs::log::{Log, LogOp, LogOps};
use crate::fs::pipe::PipeOps;
use crate::fs::stat::Stat;
use crate::mm::page::{PageAllocator, PagePool};
use crate::mm::slab::{SlabCache, SlabObject, SlotRef};

/// 文件打开标志
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const O_RDONLY: u32 = 0o00000000;
    pub const O_WRONLY: u32 = 0o00000001;
    pub const O_RDWR: u32 = 0o00000002;
    pub const O_ACCMODE: u32 = 0o00000003;
    pub const O_CREAT: u32 = 0o00000100;
    pub const O_TRUNC: u32 = 0o00001000;

    pub fn new(flags: u32) -> Self {
        Self(flags)
    }

    pub fn is_readonly(&self) -> bool {
        (self.0 & Self::O_ACCMODE) == Self::O_RDONLY
    }

    pub fn is_writeonly(&self) -> bool {
        (self.0 & Self::O_ACCMODE) == Self::O_WRONLY
    }

    pub fn is_rdwr(&self) -> bool {
        (self.0 & Self::O_ACCMODE) == Self::O_RDWR
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// 对应的读写权限
    pub fn mode(&self) -> FMode {
        let mut mode = FMode::empty();
        if self.is_readonly() || self.is_rdwr() {
            mode |= FMode::READ;
        }
        if self.is_writeonly() || self.is_rdwr() {
            mode |= FMode::WRITE;
        }
        mode
    }
}

bitflags! {
    /// 打开文件的读写权限
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct FMode: u8 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// 文件对象背后的资源
#[derive(Clone, Default)]
pub enum FileKind {
    /// 空闲或尚未初始化
    #[default]
    None,
    /// 管道的一端
    Pipe(Arc<dyn PipeOps>),
    /// 文件系统 inode
    Inode(Arc<dyn InodeOps>),
}

impl FileKind {
    pub fn is_none(&self) -> bool {
        matches!(self, FileKind::None)
    }
}

/// 打开的文件对象
pub struct File {
    kind: FileKind,
    /// 引用计数，0 表示槽位空闲
    refcnt: u32,
    mode: FMode,
    /// 读写偏移（只对 inode 有意义）
    off: u32,
}

impl Default for File {
    fn default() -> Self {
        Self {
            kind: FileKind::None,
            refcnt: 0,
            mode: FMode::empty(),
            off: 0,
        }
    }
}

impl SlabObject for File {
    fn refcnt(&self) -> u32 {
        self.refcnt
    }

    fn set_refcnt(&mut self, refcnt: u32) {
        self.refcnt = refcnt;
    }
}

/// 文件对象句柄
///
/// 复制句柄不会增加引用计数，只有 [`FileTable::filedup`] 会；每个由
/// filealloc/filedup 得到的引用都要且只能 [`FileTable::fileclose`] 一次。
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FileRef(SlotRef);

/// lseek 的起点
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Whence {
    /// SEEK_SET
    Set,
    /// SEEK_CUR
    Cur,
    /// SEEK_END
    End,
}

impl Whence {
    pub fn from_raw(whence: i32) -> KResult<Self> {
        match whence {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => Err(Errno::InvalidArgument),
        }
    }
}

/// 文件表统计信息
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileTableStats {
    /// 占用的页（Block）数
    pub nr_blocks: usize,
    /// 正在使用的文件对象数
    pub nr_files: usize,
    /// 每页可容纳的文件对象数
    pub files_per_block: usize,
}

/// 文件表
pub struct FileTable {
    cache: Mutex<SlabCache<File>>,
    log: Arc<dyn LogOps>,
}

impl FileTable {
    pub fn new(pages: Arc<dyn PageAllocator>, log: Arc<dyn LogOps>) -> Self {
        Self {
            cache: Mutex::new(SlabCache::new(pages)),
            log,
        }
    }

    /// 每页可容纳的文件对象数
    pub const fn files_per_block() -> usize {
        SlabCache::<File>::capacity()
    }

    pub fn stats(&self) -> FileTableStats {
        let cache = self.cache.lock();
        FileTableStats {
            nr_blocks: cache.nr_blocks(),
            nr_files: cache.nr_active(),
            files_per_block: Self::files_per_block(),
        }
    }

    /// 在表锁内访问一个仍被引用的文件对象
    ///
    /// 句柄过期或引用计数为 0 属于调用者的逻辑错误，直接 panic。
    fn with_file<R>(&self, f: &FileRef, what: &str, op: impl FnOnce(&mut File) -> R) -> R {
        let mut cache = self.cache.lock();
        match cache.get_mut(&f.0) {
            Some(file) if file.refcnt >= 1 => op(file),
            _ => panic!("{}", what),
        }
    }

    fn snapshot(&self, f: &FileRef, what: &str) -> (FileKind, FMode) {
        self.with_file(f, what, |file| (file.kind.clone(), file.mode))
    }

    /// 分配一个文件对象，引用计数为 1、类型为 None
    pub fn filealloc(&self) -> KResult<FileRef> {
        let slot = self.cache.lock().alloc();
        match slot {
            Some(slot) => Ok(FileRef(slot)),
            None => {
                log::warn!("filealloc: no free file object");
                Err(Errno::FileTableOverflow)
            }
        }
    }

    /// 填写新分配对象的类型和读写权限，偏移归零
    pub fn fileinstall(&self, f: &FileRef, kind: FileKind, mode: FMode) {
        self.with_file(f, "fileinstall", |file| {
            if !file.kind.is_none() {
                panic!("fileinstall: file already installed");
            }
            file.kind = kind;
            file.mode = mode;
            file.off = 0;
        });
    }

    /// 为 inode 分配文件对象
    pub fn open_inode(&self, ip: Arc<dyn InodeOps>, flags: OpenFlags) -> KResult<FileRef> {
        let f = self.filealloc()?;
        self.fileinstall(&f, FileKind::Inode(ip), flags.mode());
        Ok(f)
    }

    /// 为管道分配读端和写端两个文件对象
    pub fn open_pipe(&self, pipe: Arc<dyn PipeOps>) -> KResult<(FileRef, FileRef)> {
        let rf = self.filealloc()?;
        let wf = match self.filealloc() {
            Ok(wf) => wf,
            Err(e) => {
                self.fileclose(rf);
                return Err(e);
            }
        };
        self.fileinstall(&rf, FileKind::Pipe(pipe.clone()), FMode::READ);
        self.fileinstall(&wf, FileKind::Pipe(pipe), FMode::WRITE);
        Ok((rf, wf))
    }

    /// 增加引用计数
    pub fn filedup(&self, f: &FileRef) -> FileRef {
        self.with_file(f, "filedup", |file| file.refcnt += 1);
        *f
    }

    /// 减少引用计数，降到 0 时释放对象并关闭背后的资源
    pub fn fileclose(&self, f: FileRef) {
        let ff = {
            let mut cache = self.cache.lock();
            let file = match cache.get_mut(&f.0) {
                Some(file) if file.refcnt >= 1 => file,
                _ => panic!("fileclose"),
            };
            file.refcnt -= 1;
            if file.refcnt > 0 {
                return;
            }
            let ff = mem::take(file);
            cache.free(f.0);
            ff
        };

        match ff.kind {
            FileKind::None => {}
            FileKind::Pipe(pipe) => {
                log::trace!("fileclose: close pipe end (writable={})", ff.mode.contains(FMode::WRITE));
                pipe.close(ff.mode.contains(FMode::WRITE));
            }
            FileKind::Inode(ip) => {
                log::trace!("fileclose: release inode");
                let _op = LogOp::begin(&*self.log);
                ip.release();
            }
        }
    }

    /// 读取元数据，只支持 inode
    pub fn filestat(&self, f: &FileRef) -> KResult<Stat> {
        match self.snapshot(f, "filestat").0 {
            FileKind::Inode(ip) => {
                let ip = InodeGuard::lock(&*ip);
                Ok(ip.stat())
            }
            _ => Err(Errno::InvalidArgument),
        }
    }

    /// 从文件读取，inode 文件从当前偏移读并推进偏移
    pub fn fileread(&self, f: &FileRef, dst: &mut [u8]) -> KResult<usize> {
        let (kind, mode) = self.snapshot(f, "fileread");
        if !mode.contains(FMode::READ) {
            return Err(Errno::BadFileNumber);
        }

        match kind {
            FileKind::Pipe(pipe) => pipe.read(dst),
            FileKind::Inode(ip) => {
                let ip = InodeGuard::lock(&*ip);
                let off = self.with_file(f, "fileread", |file| file.off);
                // 偏移不能超过 u32::MAX
                let room = (u32::MAX - off) as usize;
                let len = core::cmp::min(dst.len(), room);
                let r = ip.read_at(&mut dst[..len], off)?;
                if r > 0 {
                    self.with_file(f, "fileread", |file| file.off += r as u32);
                }
                Ok(r)
            }
            FileKind::None => panic!("fileread"),
        }
    }

    /// 写入文件
    ///
    /// inode 文件按日志预算分块，每块一个事务。任何一块失败都返回错误，
    /// 即使前面的块已经写入；成功时返回全部字节数。
    pub fn filewrite(&self, f: &FileRef, src: &[u8]) -> KResult<usize> {
        let (kind, mode) = self.snapshot(f, "filewrite");
        if !mode.contains(FMode::WRITE) {
            return Err(Errno::BadFileNumber);
        }

        match kind {
            FileKind::Pipe(pipe) => pipe.write(src),
            FileKind::Inode(ip) => self.write_inode(f, &*ip, src),
            FileKind::None => panic!("filewrite"),
        }
    }

    fn write_inode(&self, f: &FileRef, ip: &dyn InodeOps, src: &[u8]) -> KResult<usize> {
        let max = self.log.write_chunk_max().max(1);
        let n = src.len();
        let mut i = 0;

        while i < n {
            let n1 = core::cmp::min(n - i, max);

            // 解锁 inode 之后才结束事务
            let r = {
                let _op = LogOp::begin(&*self.log);
                let ip = InodeGuard::lock(ip);
                let off = self.with_file(f, "filewrite", |file| file.off);
                let r = match u32::try_from(n1).ok().and_then(|n1| off.checked_add(n1)) {
                    Some(_) => ip.write_at(&src[i..i + n1], off),
                    None => Err(Errno::FileTooLarge),
                };
                if let Ok(w) = r {
                    if w > 0 && w <= n1 {
                        self.with_file(f, "filewrite", |file| file.off += w as u32);
                    }
                }
                r
            };

            match r {
                Ok(w) if w == n1 => i += w,
                Ok(w) => panic!("short filewrite: {} of {} bytes", w, n1),
                Err(e) => {
                    log::warn!("filewrite: chunk at byte {} of {} failed: {}", i, n, e);
                    return Err(e);
                }
            }
        }
        Ok(n)
    }

    /// 调整读写偏移，只支持 inode，返回新的偏移
    pub fn fileseek(&self, f: &FileRef, offset: i64, whence: Whence) -> KResult<u32> {
        let ip = match self.snapshot(f, "fileseek").0 {
            FileKind::Inode(ip) => ip,
            FileKind::Pipe(_) => return Err(Errno::IllegalSeek),
            FileKind::None => return Err(Errno::InvalidArgument),
        };

        let ip = InodeGuard::lock(&*ip);
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.with_file(f, "fileseek", |file| file.off) as i64,
            Whence::End => ip.stat().st_size as i64,
        };
        let new_off = base
            .checked_add(offset)
            .filter(|off| (0..=u32::MAX as i64).contains(off))
            .ok_or(Errno::InvalidArgument)? as u32;

        self.with_file(f, "fileseek", |file| file.off = new_off);
        Ok(new_off)
    }

    /// 当前读写偏移
    pub fn fileoff(&self, f: &FileRef) -> u32 {
        self.with_file(f, "fileoff", |file| file.off)
    }

    /// 当前引用计数；槽位已被其他对象复用时返回 `None`
    pub fn refcnt(&self, f: &FileRef) -> Option<u32> {
        self.cache.lock().get(&f.0).map(|file| file.refcnt)
    }
}

lazy_static! {
    /// 全局文件表
    pub static ref FTABLE: FileTable = FileTable::new(
        Arc::new(PagePool::new(config::FTABLE_MAX_PAGES)),
        Arc::new(Log::from_config()),
    );
}

/// 初始化全局文件表
pub fn fileinit() {
    lazy_static::initialize(&FTABLE);
    log::info!(
        "ftable: initialized, {} files per page, at most {} pages",
        FileTable::files_per_block(),
        config::FTABLE_MAX_PAGES
    );
}
