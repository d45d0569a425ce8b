//! 日志事务接口
//!
//! 所有会修改磁盘的 inode 操作（writei、iput）都必须包在
//! begin_op()/end_op() 之间。日志层限制单个操作写脏的块数，
//! 因此大块写入要由文件层切成多个事务。

use spin::Mutex;

use crate::config;

/// 日志事务管理器
pub trait LogOps: Send + Sync {
    /// 开始一个文件系统操作（日志空间不足时阻塞）
    fn begin_op(&self);

    /// 结束一个文件系统操作
    fn end_op(&self);

    /// 单个操作最多写脏的块数
    fn max_op_blocks(&self) -> usize;

    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 单个事务内最多写入的文件字节数
    fn write_chunk_max(&self) -> usize {
        write_chunk_max(self.max_op_blocks(), self.block_size())
    }
}

/// 单个事务内最多写入的文件字节数
///
/// 预留 inode 块、一个间接块和两块非对齐写入的余量，剩下的块数一半给数据块、
/// 一半给分配位图。结果至少为一个块。
pub fn write_chunk_max(max_op_blocks: usize, block_size: usize) -> usize {
    (max_op_blocks.saturating_sub(1 + 1 + 2) / 2).max(1) * block_size
}

/// 事务守卫：创建时 begin_op，drop 时 end_op
pub struct LogOp<'a> {
    log: &'a dyn LogOps,
}

impl<'a> LogOp<'a> {
    pub fn begin(log: &'a dyn LogOps) -> Self {
        log.begin_op();
        Self { log }
    }
}

impl Drop for LogOp<'_> {
    fn drop(&mut self) {
        self.log.end_op();
    }
}

struct LogState {
    /// 正在进行的操作数
    outstanding: usize,
    /// 已提交次数
    commits: u64,
}

/// 内存中的日志准入控制
///
/// 同时进行的操作数受 `log_size / max_op_blocks` 限制；最后一个操作结束时提交。
pub struct Log {
    state: Mutex<LogState>,
    max_op_blocks: usize,
    log_size: usize,
    block_size: usize,
}

impl Log {
    pub const fn new(max_op_blocks: usize, log_size: usize, block_size: usize) -> Self {
        // 日志区至少要容纳一个操作
        let log_size = if log_size < max_op_blocks { max_op_blocks } else { log_size };
        Self {
            state: Mutex::new(LogState {
                outstanding: 0,
                commits: 0,
            }),
            max_op_blocks,
            log_size,
            block_size,
        }
    }

    /// 按 Kernel.toml 的配置创建
    pub const fn from_config() -> Self {
        Self::new(config::MAXOPBLOCKS, config::LOGSIZE, config::BSIZE)
    }

    /// 正在进行的操作数
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    /// 已提交次数
    pub fn commits(&self) -> u64 {
        self.state.lock().commits
    }
}

impl LogOps for Log {
    fn begin_op(&self) {
        loop {
            {
                let mut st = self.state.lock();
                if (st.outstanding + 1) * self.max_op_blocks <= self.log_size {
                    st.outstanding += 1;
                    return;
                }
            }
            // 日志空间可能耗尽，等其他操作结束
            core::hint::spin_loop();
        }
    }

    fn end_op(&self) {
        let mut st = self.state.lock();
        st.outstanding = match st.outstanding.checked_sub(1) {
            Some(n) => n,
            None => panic!("end_op: no outstanding operation"),
        };
        if st.outstanding == 0 {
            st.commits += 1;
            log::trace!("log: commit #{}", st.commits);
        }
    }

    fn max_op_blocks(&self) -> usize {
        self.max_op_blocks
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}
