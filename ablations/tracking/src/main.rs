//! 追踪算法消融实验: 在同一组输入上比较不同方向场的追踪结果与耗时.

mod algos;
mod result;
mod runner;

fn main() {
    utils::init_logger();
    log::info!("可用核心数: {}", utils::cpus());
    runner::run().analyze();
}
