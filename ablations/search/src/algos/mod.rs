mod locate;
mod maxima;
mod profile;

use dwi_berry::synthetic::BinghamOdf;
use dwi_berry::Point3d;
use utils::workload;

pub use profile::Profile;

/// 主峰方向与真实方向的夹角超过该值 (度) 即视为漏检.
const MISS_ANGLE_DEG: f64 = 3.0;

/// 实验负载. 各实验只读共享.
pub struct Bench {
    cloud: Vec<Point3d>,
    queries: Vec<Point3d>,
    fibres: Vec<BinghamOdf>,
}

impl Bench {
    /// 按规模倍数 `scale` 生成负载.
    pub fn new(scale: usize) -> Self {
        Self {
            cloud: workload::random_cloud(20_000 * scale, 50.0, 7),
            queries: workload::random_cloud(2_000 * scale, 55.0, 8),
            fibres: workload::random_single_fibres(200 * scale, 9),
        }
    }

    /// 点云规模.
    #[inline]
    pub fn cloud_len(&self) -> usize {
        self.cloud.len()
    }

    /// 查询个数.
    #[inline]
    pub fn queries_len(&self) -> usize {
        self.queries.len()
    }

    /// 合成体素个数.
    #[inline]
    pub fn fibres_len(&self) -> usize {
        self.fibres.len()
    }
}

pub fn kd_tree(bench: &Bench) -> Profile {
    let mut profile = Profile::new();
    println!("k-d tree: {} queries...", bench.queries.len());
    bench.run_kd_tree(&mut profile);
    profile.finish()
}

pub fn brute_force(bench: &Bench) -> Profile {
    let mut profile = Profile::new();
    println!("Brute force: {} queries...", bench.queries.len());
    bench.run_brute_force(&mut profile);
    profile.finish()
}

pub fn adaptive(bench: &Bench) -> Profile {
    let mut profile = Profile::new();
    println!("Adaptive step: {} voxels...", bench.fibres.len());
    bench.run_maxima(true, &mut profile);
    profile.finish()
}

pub fn fixed(bench: &Bench) -> Profile {
    let mut profile = Profile::new();
    println!("Fixed step: {} voxels...", bench.fibres.len());
    bench.run_maxima(false, &mut profile);
    profile.finish()
}
