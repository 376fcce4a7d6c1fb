//! 消融实验:
//!
//! 1. 最近邻查询: k-d 树 vs 暴力搜索;
//! 2. ODF 极大值提取: 固定步长 + 自适应步长 vs 仅固定步长.
//!
//! 负载规模由环境变量 `$ABLATION_SCALE` 控制.

mod algos;
mod result;
mod runner;

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("Logger initialization error");

    let result = runner::run();
    result.analyze();
}
