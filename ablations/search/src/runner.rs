//! 程序运行函数.

use crate::algos::Bench;
use crate::result::AblationResult;
use std::thread;

/// 实际运行.
pub fn run() -> AblationResult {
    let scale = utils::workload::scale_from_env();
    let bench = Bench::new(scale);
    log::info!(
        "workload x{scale}: {} points, {} queries, {} voxels; {} cores available",
        bench.cloud_len(),
        bench.queries_len(),
        bench.fibres_len(),
        utils::cpus()
    );

    println!("Running ablation studies...");
    let bench = &bench;
    thread::scope(|s| {
        use super::algos::*;

        let handles = [kd_tree, brute_force, adaptive, fixed].map(|t| s.spawn(move || t(bench)));

        AblationResult::from_iter(
            ["k-d tree", "brute force", "adaptive step", "fixed step"]
                .into_iter()
                .zip(
                    handles
                        .into_iter()
                        .map(|th| th.join().expect("Thread joining error")),
                ),
        )
    })
}
