//! 消融实验依赖的通用组件.

use log::LevelFilter;

pub mod loader;
pub mod phantom;

const SEP: &str = "--------------------------------------------------------";

/// 日志级别环境变量.
const LOG_ENV: &str = "TRACT_LOG";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) {
    writeln!(&mut w, "{SEP}").unwrap();
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 初始化日志. 级别取自环境变量 `$TRACT_LOG` (`error`/`warn`/`info`/`debug`/`trace`),
/// 缺省或无法解析时为 `info`.
pub fn init_logger() {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .unwrap();
}
