//! 自适应步长 vs 固定步长.

use super::{Bench, Profile, MISS_ANGLE_DEG};
use dwi_berry::prelude::*;

impl Bench {
    /// 在每个合成单峰体素上提取峰方向.
    ///
    /// 主峰与真实方向夹角超过 [`MISS_ANGLE_DEG`] (或根本没有峰) 计为一次不一致;
    /// 偏差为主峰夹角 (度).
    pub fn run_maxima(&self, adaptive: bool, profile: &mut Profile) {
        let params = ExtractParams::default().with_adaptive_step_width(adaptive);
        let mut ws = PeakWorkspace::new();

        for fibre in self.fibres.iter() {
            // 投影到球谐基, 不计时.
            let coeffs = fibre.coeffs();

            profile.task_start();
            let peaks = extract_voxel(&coeffs, &params, &mut ws);
            profile.task_elapsed();

            let Some(first) = peaks.first() else {
                profile.count_mismatch();
                continue;
            };
            let c = first.normalize().dot(&fibre.axis()).abs().min(1.0);
            let angle = c.acos().to_degrees();
            if angle > MISS_ANGLE_DEG {
                profile.count_mismatch();
            } else {
                profile.add_deviation(angle);
            }
        }
    }
}
