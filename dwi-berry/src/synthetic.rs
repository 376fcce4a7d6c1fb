//! 合成数据. 用于测试和消融实验.

use nalgebra::Vector3;

use crate::consts::EPS;
use crate::sh::{normalize_integral, project, sph_to_cart, ShCoeffs};

pub use crate::sh::fibonacci_directions;

/// 求积网格的默认分辨率 (`θ × φ`).
const QUADRATURE: (usize, usize) = (60, 120);

/// 对称 Bingham 型单峰 ODF: `exp(-k1 (u·e2)² - k2 (u·e3)²)`.
///
/// `e1` 为峰方向, `e2`, `e3` 为与之正交的两个轴. 两个集中度不相等时
/// 峰的截面是椭圆, 不具有绕 `e1` 的旋转对称性.
#[derive(Copy, Clone, Debug)]
pub struct BinghamOdf {
    e1: Vector3<f64>,
    e2: Vector3<f64>,
    e3: Vector3<f64>,
    k1: f64,
    k2: f64,
}

impl BinghamOdf {
    /// 由峰方向 `axis`, 集中度 `k1`, `k2`, 以及次轴绕峰方向的旋转角 `rot` 构造.
    ///
    /// `axis` 为零向量或集中度为负时返回 `None`.
    pub fn new(axis: Vector3<f64>, k1: f64, k2: f64, rot: f64) -> Option<Self> {
        let n = axis.norm();
        if n < EPS || k1 < 0.0 || k2 < 0.0 {
            return None;
        }
        let e1 = axis / n;
        let mut t = e1.cross(&Vector3::new(0.2, 0.3, 0.9));
        if t.norm() < EPS {
            t = e1.cross(&Vector3::x());
        }
        let t = t.normalize();
        let w = e1.cross(&t);
        let (s, c) = rot.sin_cos();
        let e2 = t * c + w * s;
        let e3 = e1.cross(&e2);
        Some(Self { e1, e2, e3, k1, k2 })
    }

    /// 峰方向 (单位向量).
    #[inline]
    pub fn axis(&self) -> Vector3<f64> {
        self.e1
    }

    /// 在方向 `u` 上的取值.
    #[inline]
    pub fn eval(&self, u: &Vector3<f64>) -> f64 {
        (-self.k1 * u.dot(&self.e2).powi(2) - self.k2 * u.dot(&self.e3).powi(2)).exp()
    }

    /// 在 `(θ, φ)` 上的取值.
    #[inline]
    pub fn eval_sph(&self, theta: f64, phi: f64) -> f64 {
        self.eval(&sph_to_cart(theta, phi))
    }

    /// 投影到 4 阶球谐基并归一化 (`c₀ = 1/(2√π)`).
    pub fn coeffs(&self) -> ShCoeffs {
        mixture_coeffs(&[*self])
    }
}

/// 多个 Bingham 分量之和的球谐系数, 归一化方式同 [`BinghamOdf::coeffs`].
pub fn mixture_coeffs(parts: &[BinghamOdf]) -> ShCoeffs {
    let (nt, np) = QUADRATURE;
    let mut c = project(
        |t, p| {
            let u = sph_to_cart(t, p);
            parts.iter().map(|b| b.eval(&u)).sum()
        },
        nt,
        np,
    );
    normalize_integral(&mut c);
    c
}

/// 各向同性 ODF: 只有 `c₀` 非零.
pub fn isotropic_coeffs() -> ShCoeffs {
    let mut c = [0.0; 15];
    c[0] = 0.5 / std::f64::consts::PI.sqrt();
    c
}

/// 单纤维张量模型的扩散信号 `s0 · exp(-b gᵀDg)`.
///
/// `D` 的主特征向量为 `axis`, 主特征值 `l1`, 其余两个特征值均为 `l2`.
pub fn tensor_signal(axis: &Vector3<f64>, l1: f64, l2: f64, b: f64, s0: f64, g: &Vector3<f64>) -> f64 {
    let gn = g.norm();
    if gn < EPS {
        return s0;
    }
    let g = g / gn;
    let e = axis.normalize();
    let c2 = g.dot(&e).powi(2);
    let adc = l2 + (l1 - l2) * c2;
    s0 * (-b * adc).exp()
}
