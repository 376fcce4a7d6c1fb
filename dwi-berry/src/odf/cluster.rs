//! 候选方向的对极聚类与幅值筛选.

use nalgebra::Vector3;
use ordered_float::OrderedFloat;

use crate::consts::odf::{CLUSTER_DISTANCE, MIN_MAX_NORM};
use crate::odf::NormalizationMethod;
use crate::odf::refine::ascend;
use crate::sh::{sph_to_cart, ShCoeffs};

/// 一个候选簇. 成员方向已按种子方向对齐符号.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Cluster {
    seed: Vector3<f64>,
    sum: Vector3<f64>,
}

impl Cluster {
    fn new(u: Vector3<f64>) -> Self {
        Self { seed: u, sum: u }
    }

    /// 代表方向: 成员 (含种子) 向量和的单位化.
    fn representative(&self) -> Vector3<f64> {
        self.sum
            .try_normalize(0.0)
            .unwrap_or(self.seed)
    }
}

/// 单个峰: 单位方向及该方向上的 ODF 幅值.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Peak {
    /// 单位方向.
    pub direction: Vector3<f64>,
    /// ODF 幅值.
    pub amplitude: f64,
}

impl Peak {
    /// 以幅值缩放后的方向向量.
    #[inline]
    pub fn scaled(&self) -> Vector3<f64> {
        self.direction * self.amplitude
    }
}

/// 对极意义下的平方欧氏距离: `min(|a - b|², |a + b|²)`.
#[inline]
fn antipodal_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a - b).norm_squared().min((a + b).norm_squared())
}

/// 将候选 `(θ, φ)` 聚成若干簇, 结果写入 `clusters` (先清空).
///
/// 每个候选与所有簇种子及其反向比较平方欧氏距离, 取最小者;
/// 小于阈值则并入该簇 (按种子对齐符号), 否则以该候选新开一簇.
pub(crate) fn cluster_candidates(candidates: &[(f64, f64)], clusters: &mut Vec<Cluster>) {
    clusters.clear();
    for &(theta, phi) in candidates {
        let u = sph_to_cart(theta, phi);
        let nearest = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let dp = (c.seed - u).norm_squared();
                let dn = (c.seed + u).norm_squared();
                if dn < dp {
                    (i, dn, -u)
                } else {
                    (i, dp, u)
                }
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((i, d, aligned)) if d < CLUSTER_DISTANCE => clusters[i].sum += aligned,
            _ => clusters.push(Cluster::new(u)),
        }
    }
}

/// 把各簇代表方向细化到局部极大值并去重, 去掉幅值低于 `threshold × max` 的峰,
/// 按幅值降序保留至多 `max_num` 个. 结果写入 `peaks` (先清空).
pub(crate) fn select_peaks(
    coeffs: &ShCoeffs,
    clusters: &[Cluster],
    threshold: f64,
    max_num: usize,
    peaks: &mut Vec<Peak>,
) {
    peaks.clear();
    if clusters.is_empty() {
        return;
    }
    for c in clusters {
        let (direction, amplitude) = ascend(coeffs, &c.representative());
        // 不同簇可能上升到同一个极大值.
        if !peaks.iter().any(|p| antipodal_distance(&p.direction, &direction) < CLUSTER_DISTANCE) {
            peaks.push(Peak {
                direction,
                amplitude,
            });
        }
    }

    let max = peaks
        .iter()
        .map(|p| p.amplitude)
        .fold(f64::NEG_INFINITY, f64::max);
    if max <= 0.0 {
        peaks.clear();
        return;
    }
    let floor = threshold * max;
    peaks.retain(|p| p.amplitude >= floor);
    peaks.sort_by_key(|p| std::cmp::Reverse(OrderedFloat(p.amplitude)));
    peaks.truncate(max_num);
}

/// 按 `method` 把峰转换为输出方向向量.
pub fn normalize_peaks(peaks: &[Peak], method: NormalizationMethod) -> Vec<Vector3<f64>> {
    match method {
        NormalizationMethod::NoNorm => peaks.iter().map(Peak::scaled).collect(),
        NormalizationMethod::SingleVecNorm => peaks.iter().map(|p| p.direction).collect(),
        NormalizationMethod::MaxVecNorm => {
            let max = peaks
                .iter()
                .map(|p| p.amplitude.abs())
                .fold(0.0, f64::max);
            let max = if max < MIN_MAX_NORM { 1.0 } else { max };
            peaks.iter().map(|p| p.scaled() / max).collect()
        }
    }
}
