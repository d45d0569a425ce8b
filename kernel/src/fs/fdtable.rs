//! 文件描述符表
//!
//! 每个进程一张，描述符是下标，槽位里放打开文件对象的句柄。
//! 描述符表只负责 fd 到 [`FileRef`] 的映射，引用计数由 [`FileTable`] 维护：
//! 安装的每个句柄都拥有一个引用，关闭描述符时归还。

use crate::config::NOFILE;
use crate::errno::{Errno, KResult};
use crate::fs::file::{FileRef, FileTable};

/// 文件描述符表
pub struct FdTable {
    fds: [Option<FileRef>; NOFILE],
}

impl FdTable {
    pub fn new() -> Self {
        Self { fds: [None; NOFILE] }
    }

    /// 把句柄装进最小的空闲描述符
    ///
    /// 句柄的引用转交给描述符表；没有空闲描述符时返回 EMFILE，
    /// 引用仍归调用者。
    pub fn fdalloc(&mut self, f: FileRef) -> KResult<usize> {
        match self.fds.iter().position(Option::is_none) {
            Some(fd) => {
                self.fds[fd] = Some(f);
                Ok(fd)
            }
            None => Err(Errno::TooManyOpenFiles),
        }
    }

    /// 描述符对应的句柄
    pub fn get(&self, fd: usize) -> KResult<FileRef> {
        self.fds.get(fd).copied().flatten().ok_or(Errno::BadFileNumber)
    }

    /// 关闭描述符
    pub fn close(&mut self, ftable: &FileTable, fd: usize) -> KResult<()> {
        let f = self
            .fds
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(Errno::BadFileNumber)?;
        ftable.fileclose(f);
        Ok(())
    }

    /// dup：新描述符与旧描述符共享同一个文件对象（包括偏移）
    pub fn dup(&mut self, ftable: &FileTable, fd: usize) -> KResult<usize> {
        let f = self.get(fd)?;
        let f = ftable.filedup(&f);
        self.fdalloc(f).map_err(|e| {
            ftable.fileclose(f);
            e
        })
    }

    /// fork：子进程的描述符表，每个打开的文件多一个引用
    pub fn fork(&self, ftable: &FileTable) -> FdTable {
        let mut child = FdTable::new();
        for (slot, f) in child.fds.iter_mut().zip(self.fds.iter()) {
            *slot = f.map(|f| ftable.filedup(&f));
        }
        child
    }

    /// 进程退出时关闭所有描述符
    pub fn close_all(&mut self, ftable: &FileTable) {
        for f in self.fds.iter_mut().filter_map(Option::take) {
            ftable.fileclose(f);
        }
    }

    /// 已打开的描述符数
    pub fn count(&self) -> usize {
        self.fds.iter().filter(|f| f.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
