//! 合成的实验负载. 所有随机数据都由固定种子生成, 多次运行结果可比.

use dwi_berry::synthetic::BinghamOdf;
use dwi_berry::Point3d;
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::env;
use std::f64::consts::PI;

/// 负载规模倍数.
///
/// 1. 若环境变量 `$ABLATION_SCALE` 为正整数, 则返回其值;
/// 2. 否则, 返回 1.
pub fn scale_from_env() -> usize {
    env::var("ABLATION_SCALE")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(1)
}

/// 在 `[-half, half]³` 内均匀采样 `n` 个点.
pub fn random_cloud(n: usize, half: f64, seed: u64) -> Vec<Point3d> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            [
                rng.gen_range(-half..=half),
                rng.gen_range(-half..=half),
                rng.gen_range(-half..=half),
            ]
        })
        .collect()
}

/// 单位球面上均匀分布的随机方向 (单位立方体内拒绝采样).
fn random_axis(rng: &mut ChaCha8Rng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let n = v.norm();
        if n > 0.1 && n <= 1.0 {
            return v / n;
        }
    }
}

/// `n` 个随机单峰 ODF. 集中度 `k1 ∈ [2, 3]`, `k2 ∈ [k1 + 3, k1 + 5]`.
pub fn random_single_fibres(n: usize, seed: u64) -> Vec<BinghamOdf> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let axis = random_axis(&mut rng);
        let k1 = rng.gen_range(2.0..=3.0);
        let k2 = k1 + rng.gen_range(3.0..=5.0);
        let rot = rng.gen_range(0.0..PI);
        if let Some(b) = BinghamOdf::new(axis, k1, k2, rot) {
            out.push(b);
        }
    }
    out
}
