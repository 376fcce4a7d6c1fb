//! 从扩散加权信号重建 ODF 球谐系数.
//!
//! 目前只实现了立体角 (solid angle) 形式的解析 Q-ball 重建, 阶数固定为 4.
//! 参考: Aganj et al., "Reconstruction of the orientation distribution function
//! in single- and multiple-shell q-ball imaging within constant solid angle", 2010.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{DMatrix, DVector, Vector3};
use ndarray::{ArrayView1, ArrayViewMut1, Axis, Zip};

use crate::consts::sh::N_COEFFS;
use crate::consts::EPS;
use crate::image::{DwiImage, GeometryAttr, ShCoeffImage};
use crate::sh::{cart_to_sph, sh_basis, SH_TERMS};

/// 重建过程中的运行时错误.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconstructError {
    /// 梯度表中没有基线 (b0) 通道.
    NoBaseline,

    /// 梯度方向不足以拟合 4 阶球谐系数.
    ///
    /// 第一个参数代表目前已有的方向数, 第二个参数代表最少需要的方向数.
    TooFewGradients(usize, usize),

    /// 最小二乘法方程奇异.
    SingularSystem,
}

impl fmt::Display for ReconstructError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconstructError::NoBaseline => write!(f, "no baseline (b0) volume in gradient table"),
            ReconstructError::TooFewGradients(found, need) => {
                write!(f, "{found} gradient directions, at least {need} required")
            }
            ReconstructError::SingularSystem => write!(f, "least squares system is singular"),
        }
    }
}

impl std::error::Error for ReconstructError {}

/// 重建结果.
pub type ReconstructResult<T> = Result<T, ReconstructError>;

/// 由 DWI 数据重建球谐系数图像的能力.
pub trait ShReconstructor {
    /// 重建整幅系数图像.
    fn reconstruct(&self, dwi: &DwiImage) -> ReconstructResult<ShCoeffImage>;
}

/// `P_l(0)`: 偶数阶为 `(-1)^(l/2) · (l-1)!! / l!!`, 奇数阶为 0.
fn legendre_at_zero(l: u32) -> f64 {
    if l % 2 == 1 {
        return 0.0;
    }
    let odd: f64 = (1..l).step_by(2).map(|k| k as f64).product();
    let even: f64 = (2..=l).step_by(2).map(|k| k as f64).product();
    let sign = if (l / 2) % 2 == 0 { 1.0 } else { -1.0 };
    sign * odd / even
}

/// 梯度表按基线 / 扩散方向拆分后的结果.
#[derive(Clone, Debug)]
struct GradientTable {
    baselines: Vec<usize>,
    directions: Vec<usize>,
}

impl GradientTable {
    fn split(gradients: &[Vector3<f64>]) -> Self {
        let (baselines, directions) = (0..gradients.len()).partition(|&i| gradients[i].norm() <= 0.0);
        Self {
            baselines,
            directions,
        }
    }
}

/// 立体角解析 Q-ball 重建.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalyticalQball {
    b0_threshold: f32,
    delta1: f64,
    delta2: f64,
}

impl Default for AnalyticalQball {
    fn default() -> Self {
        Self {
            b0_threshold: 0.0,
            delta1: 0.001,
            delta2: 0.001,
        }
    }
}

impl AnalyticalQball {
    /// 默认参数: 不设 b0 阈值, `δ₁ = δ₂ = 0.001`.
    pub fn new() -> Self {
        Self::default()
    }

    /// 基线信号低于该阈值的体素不做重建 (系数全为 0).
    pub fn with_b0_threshold(mut self, threshold: f32) -> Self {
        self.b0_threshold = threshold;
        self
    }

    /// b0 阈值.
    #[inline]
    pub fn b0_threshold(&self) -> f32 {
        self.b0_threshold
    }

    /// 归一化信号 `E = S / S0` 的平滑截断, 保证 `ln(-ln E)` 有定义.
    fn regularize(&self, e: f64) -> f64 {
        let (d1, d2) = (self.delta1, self.delta2);
        if e < 0.0 {
            d1
        } else if e < d1 {
            d1 / 2.0 + e * e / (2.0 * d1)
        } else if e >= 1.0 {
            1.0 - d2 / 2.0
        } else if e >= 1.0 - d2 {
            1.0 - d2 / 2.0 - (1.0 - e) * (1.0 - e) / (2.0 * d2)
        } else {
            e
        }
    }

    /// 重建矩阵 `R` (15 × 扩散方向数). 每个体素的系数为 `R · ln(-ln E)`, 再修正 `c₀`.
    pub fn reconstruction_matrix(&self, directions: &[Vector3<f64>]) -> ReconstructResult<DMatrix<f64>> {
        if directions.len() < N_COEFFS {
            return Err(ReconstructError::TooFewGradients(directions.len(), N_COEFFS));
        }
        let n = directions.len();
        let mut b = DMatrix::zeros(n, N_COEFFS);
        for (i, g) in directions.iter().enumerate() {
            let (theta, phi) = cart_to_sph(g);
            for (j, v) in sh_basis(theta, phi).into_iter().enumerate() {
                b[(i, j)] = v;
            }
        }
        let bt = b.transpose();
        let inv = (&bt * &b)
            .try_inverse()
            .ok_or(ReconstructError::SingularSystem)?;
        let mut r = inv * bt;

        // 1/(16π²) · P · L, 其中 P = 2π P_l(0), L = -l(l+1).
        let fac = 1.0 / (16.0 * PI * PI);
        for (j, t) in SH_TERMS.iter().enumerate() {
            let l = t.l as f64;
            let s = fac * 2.0 * PI * legendre_at_zero(t.l) * (-l * (l + 1.0));
            r.row_mut(j).scale_mut(s);
        }
        Ok(r)
    }

    /// 重建单个体素, 结果写入 `out`. 基线不可用时 `out` 置零.
    fn reconstruct_lane(
        &self,
        table: &GradientTable,
        matrix: &DMatrix<f64>,
        signal: ArrayView1<f32>,
        mut out: ArrayViewMut1<f32>,
    ) {
        out.fill(0.0);
        let b0 = table.baselines.iter().map(|&k| signal[k] as f64).sum::<f64>()
            / table.baselines.len() as f64;
        if b0 == 0.0 || b0 < self.b0_threshold as f64 {
            return;
        }
        let y = DVector::from_iterator(
            table.directions.len(),
            table
                .directions
                .iter()
                .map(|&k| {
                    let e = self.regularize(signal[k] as f64 / b0);
                    (-e.ln()).ln()
                }),
        );
        let c = matrix * y;
        for (o, v) in out.iter_mut().zip(c.iter()) {
            *o = *v as f32;
        }
        out[0] += (0.5 / PI.sqrt()) as f32;
    }
}

/// 梯度表中是否存在重复 (或相反) 的方向?
fn has_duplicate_directions(directions: &[Vector3<f64>]) -> bool {
    directions.iter().enumerate().any(|(i, a)| {
        directions[i + 1..]
            .iter()
            .any(|b| a.normalize().dot(&b.normalize()).abs() > 1.0 - EPS)
    })
}

impl ShReconstructor for AnalyticalQball {
    fn reconstruct(&self, dwi: &DwiImage) -> ReconstructResult<ShCoeffImage> {
        let table = GradientTable::split(dwi.gradients());
        if table.baselines.is_empty() {
            return Err(ReconstructError::NoBaseline);
        }
        let directions: Vec<Vector3<f64>> =
            table.directions.iter().map(|&k| dwi.gradients()[k]).collect();
        if has_duplicate_directions(&directions) {
            log::warn!("gradient table contains duplicated directions");
        }
        let matrix = self.reconstruction_matrix(&directions)?;
        log::info!(
            "q-ball reconstruction: {} baselines, {} directions, {} voxels",
            table.baselines.len(),
            directions.len(),
            dwi.size()
        );

        let mut out = ShCoeffImage::zeros(dwi.geometry().clone());
        let zip = Zip::from(out.data_mut().lanes_mut(Axis(3))).and(dwi.data().lanes(Axis(3)));
        #[cfg(feature = "rayon")]
        zip.par_for_each(|o, s| self.reconstruct_lane(&table, &matrix, s, o));
        #[cfg(not(feature = "rayon"))]
        zip.for_each(|o, s| self.reconstruct_lane(&table, &matrix, s, o));
        Ok(out)
    }
}
