use dwi_berry::prelude::*;
use dwi_berry::synthetic::{fibonacci_directions, tensor_signal, BinghamOdf};
use nalgebra::Vector3;
use ndarray::Array4;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

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

/// `n` 个随机朝向的单峰 Bingham ODF, 集中度为 `(k1, k2)`.
pub fn random_fibres(n: usize, k1: f64, k2: f64, seed: u64) -> Vec<BinghamOdf> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let z: f64 = rng.gen_range(-1.0..=1.0);
            let phi: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
            let r = (1.0 - z * z).sqrt();
            let axis = Vector3::new(r * phi.cos(), r * phi.sin(), z);
            let rot: f64 = rng.gen_range(0.0..std::f64::consts::PI);
            BinghamOdf::new(axis, k1, k2, rot).unwrap()
        })
        .collect()
}

/// `[-half, half]³` 上 `steps³` 的规则查询网格.
pub fn query_grid(steps: usize, half: f64) -> Vec<Point3d> {
    let d = 2.0 * half / (steps - 1) as f64;
    let mut out = Vec::with_capacity(steps * steps * steps);
    for i in 0..steps {
        for j in 0..steps {
            for k in 0..steps {
                out.push([
                    -half + i as f64 * d,
                    -half + j as f64 * d,
                    -half + k as f64 * d,
                ]);
            }
        }
    }
    out
}

/// 所有体素都使用同一组系数的图像.
pub fn uniform_sh_image(geometry: ImageGeometry, coeffs: &ShCoeffs) -> ShCoeffImage {
    ShCoeffImage::from_fn(geometry, |_| *coeffs)
}

/// 单纤维张量模型的 DWI 图像: 1 个 b0 通道 + `n_dirs` 个扩散方向.
pub fn tensor_dwi(geometry: ImageGeometry, axis: &Vector3<f64>, n_dirs: usize) -> DwiImage {
    let b = 3000.0;
    let s0 = 1000.0;
    let mut gradients = vec![Vector3::zeros()];
    gradients.extend(fibonacci_directions(n_dirs));

    let (z, h, w) = geometry.shape();
    let signals: Vec<f32> = gradients
        .iter()
        .map(|g| tensor_signal(axis, 1.7e-3, 0.3e-3, b, s0, g) as f32)
        .collect();
    let data = Array4::from_shape_fn((z, h, w, gradients.len()), |(_, _, _, k)| signals[k]);
    DwiImage::new(geometry, data, gradients, b).unwrap()
}
