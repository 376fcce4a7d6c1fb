//! k-d 树 vs 暴力搜索.

use super::{Bench, Profile};
use dwi_berry::prelude::*;
use std::time::Instant;

impl Bench {
    /// k-d 树最近邻查询. 建树时间计入准备阶段.
    ///
    /// 每次查询结果都与暴力搜索比对 (不计时), 偏差为两者距离之差.
    pub fn run_kd_tree(&self, profile: &mut Profile) {
        let since = Instant::now();
        let mut locator = PointLocator::new();
        locator.set_points(self.cloud.as_slice());
        profile.record_setup(since.elapsed());

        for q in self.queries.iter() {
            profile.task_start();
            let found = locator.find_closest_point_and_distance(q);
            profile.task_elapsed();

            let expect = brute_force_closest(self.cloud.as_slice(), q);
            match (found, expect) {
                (Some((_, d)), Some((_, e))) => {
                    if (d - e).abs() > 1e-9 {
                        profile.count_mismatch();
                    }
                    profile.add_deviation(d - e);
                }
                _ => profile.count_mismatch(),
            }
        }
    }

    /// 暴力搜索. 作为参考答案, 不做比对.
    pub fn run_brute_force(&self, profile: &mut Profile) {
        for q in self.queries.iter() {
            profile.task_start();
            let found = brute_force_closest(self.cloud.as_slice(), q);
            profile.task_elapsed();

            if found.is_none() {
                profile.count_mismatch();
            }
        }
    }
}
