//! Rux 文件表构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件（或 menuconfig 生成的 build/.config）
//! 2. 生成 src/config.rs 配置代码
//! 3. 导出日志级别等环境变量

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

/// 解析 build/.config 文件（简单 key=value 格式）
fn parse_dot_config(content: &str) -> toml::Value {
    let mut sections: HashMap<String, toml::map::Map<String, toml::Value>> = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        // 跳过注释和空行
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // 解析 section_key=value 格式
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let Some((section, config_key)) = key.split_once('_') else {
            continue;
        };

        let value = value.trim().trim_matches('"');
        let parsed_value = if value == "true" {
            toml::Value::Boolean(true)
        } else if value == "false" {
            toml::Value::Boolean(false)
        } else if let Ok(int_val) = value.parse::<i64>() {
            toml::Value::Integer(int_val)
        } else {
            toml::Value::String(value.to_string())
        };

        sections
            .entry(section.to_string())
            .or_default()
            .insert(config_key.to_string(), parsed_value);
    }

    let mut root_map = toml::map::Map::new();
    for (section_name, section_data) in sections {
        root_map.insert(section_name, toml::Value::Table(section_data));
    }
    toml::Value::Table(root_map)
}

fn get_int(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn get_str<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=../build/.config");

    // 优先读取 build/.config，其次 Kernel.toml，都没有时使用默认值
    let config = if let Ok(content) = fs::read_to_string("../build/.config") {
        println!("cargo:warning=Using build/.config configuration");
        parse_dot_config(&content)
    } else if let Ok(content) = fs::read_to_string("../Kernel.toml") {
        toml::from_str(&content).expect("Kernel.toml 解析失败")
    } else {
        toml::Value::Table(toml::map::Map::new())
    };

    let log_level = get_str(&config, "debug", "log_level", "info");
    println!("cargo:rustc-env=RUX_LOG_LEVEL={}", log_level);

    generate_config_code(&config);
}

fn generate_config_code(config: &toml::Value) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR 未设置"));

    let page_size = get_int(config, "memory", "page_size", 4096);
    let max_op_blocks = get_int(config, "fs", "max_op_blocks", 10);

    let code = format!(
        r#"//! Rux 文件表配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = {page_size};

/// 全局文件表最多占用的页数
pub const FTABLE_MAX_PAGES: usize = {ftable_max_pages};

// ============================================================
// 文件系统配置
// ============================================================

/// 单个文件系统操作最多写入的块数
pub const MAXOPBLOCKS: usize = {max_op_blocks};

/// 日志区大小（块）
pub const LOGSIZE: usize = {log_size};

/// 磁盘块大小（字节）
pub const BSIZE: usize = {block_size};

/// 每个进程最多打开的文件数
pub const NOFILE: usize = {nofile};

/// 管道缓冲区大小（字节）
pub const PIPESIZE: usize = {pipe_size};

// ============================================================
// 调试配置
// ============================================================

/// 默认日志级别
pub const LOG_LEVEL: &str = "{log_level}";
"#,
        page_size = page_size,
        ftable_max_pages = get_int(config, "memory", "ftable_max_pages", 64),
        max_op_blocks = max_op_blocks,
        log_size = get_int(config, "fs", "log_size", max_op_blocks * 3),
        block_size = get_int(config, "fs", "block_size", 512),
        nofile = get_int(config, "fs", "nofile", 16),
        pipe_size = get_int(config, "fs", "pipe_size", 512),
        log_level = get_str(config, "debug", "log_level", "info"),
    );

    let config_path = manifest_dir.join("src").join("config.rs");
    // 内容未变化时不重写，避免触发重新编译
    if fs::read_to_string(&config_path).ok().as_deref() != Some(code.as_str()) {
        fs::write(&config_path, code).expect("无法写入 config.rs");
    }
}
