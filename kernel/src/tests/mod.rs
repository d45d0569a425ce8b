//! 场景测试
//!
//! 从系统调用的角度组合文件表、描述符表、inode 和管道，验证整体行为。
//! 单个模块的测试放在各自模块的 `#[cfg(test)] mod tests` 中。
//!
//! 运行测试：
//! ```bash
//! cargo test --package ftable
//! ```

use alloc::sync::Arc;

use crate::fs::file::FileTable;
use crate::fs::log::Log;
use crate::mm::page::PagePool;


/// 测试用文件表：`max_pages` 页、默认日志配置
pub fn new_table(max_pages: usize) -> (Arc<PagePool>, Arc<Log>, FileTable) {
    let pool = Arc::new(PagePool::new(max_pages));
    let log = Arc::new(Log::from_config());
    let table = FileTable::new(pool.clone(), log.clone());
    (pool, log, table)
}
