//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Rux 打开文件表
//!
//! - `mm`: 页分配器接口和按页增长的 slab
//! - `fs`: 打开文件对象、文件描述符表，以及文件表依赖的 inode/日志/管道接口
//! - `errno`: 错误码
//! - `config`: 由 build.rs 根据 Kernel.toml 生成的配置

#![no_std]

extern crate alloc;
extern crate log;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod errno;
pub mod fs;
pub mod mm;

#[cfg(test)]
mod tests;

pub use errno::{Errno, KResult};
pub use fs::file::{fileinit, FileRef, FileTable, FTABLE};

/// 配置的日志级别
///
/// 启用 `debug_log` 特性时固定为 Trace。宿主内核安装 logger 后用它调用
/// `log::set_max_level`。
pub fn max_log_level() -> log::LevelFilter {
    if cfg!(feature = "debug_log") {
        return log::LevelFilter::Trace;
    }
    match config::LOG_LEVEL {
        "off" => log::LevelFilter::Off,
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    }
}
