//! 4 阶实对称球谐函数 (real symmetric spherical harmonics).
//!
//! 系数按 `j = l(l + 1) / 2 + m` 排列, 其中 `l ∈ {0, 2, 4}`, `m ∈ [-l, l]`, 共 15 个.
//! 基函数定义:
//!
//! - `m < 0`: `√2 · N(l, |m|) · P_l^|m|(cos θ) · cos(|m| φ)`
//! - `m = 0`: `N(l, 0) · P_l(cos θ)`
//! - `m > 0`: `(-1)^m · √2 · N(l, m) · P_l^m(cos θ) · sin(m φ)`
//!
//! 其中 `N(l, m) = sqrt((2l + 1) / 4π · (l - m)! / (l + m)!)`, 连带勒让德函数
//! `P_l^m` 包含 Condon-Shortley 相位因子.

use std::f64::consts::{PI, SQRT_2};

use nalgebra::Vector3;
use once_cell::sync::Lazy;

use crate::consts::sh::{N_COEFFS, SH_ORDER};
use crate::consts::EPS;

/// 单个体素的 15 个球谐系数.
pub type ShCoeffs = [f64; N_COEFFS];

/// 单个基函数的阶, 次, 以及与 `θ` 无关的全部常数因子.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ShTerm {
    pub(crate) l: u32,
    pub(crate) m: i32,
    /// `m = 0` 时为 `N`, `m < 0` 时为 `√2·N`, `m > 0` 时为 `(-1)^m·√2·N`.
    pub(crate) scale: f64,
}

impl ShTerm {
    /// 与 `φ` 相关的三角因子.
    #[inline]
    pub(crate) fn trig(&self, phi: f64) -> f64 {
        match self.m {
            m if m < 0 => (-m as f64 * phi).cos(),
            0 => 1.0,
            m => (m as f64 * phi).sin(),
        }
    }

    /// 三角因子对 `φ` 的一阶导数.
    #[inline]
    pub(crate) fn trig_dphi(&self, phi: f64) -> f64 {
        match self.m {
            m if m < 0 => {
                let am = -m as f64;
                -am * (am * phi).sin()
            }
            0 => 0.0,
            m => {
                let m = m as f64;
                m * (m * phi).cos()
            }
        }
    }
}

/// 常数因子表, 首次使用时初始化.
pub(crate) static SH_TERMS: Lazy<[ShTerm; N_COEFFS]> = Lazy::new(|| {
    let mut terms = [ShTerm {
        l: 0,
        m: 0,
        scale: 0.0,
    }; N_COEFFS];
    for l in (0..=SH_ORDER as i32).step_by(2) {
        for m in -l..=l {
            let am = m.unsigned_abs();
            let lu = l as u32;
            let n = ((2 * lu + 1) as f64 / (4.0 * PI) * factorial(lu - am) / factorial(lu + am))
                .sqrt();
            let scale = match m {
                m if m < 0 => SQRT_2 * n,
                0 => n,
                m if m % 2 == 0 => SQRT_2 * n,
                _ => -SQRT_2 * n,
            };
            terms[sh_index(l, m)] = ShTerm { l: lu, m, scale };
        }
    }
    terms
});

/// 系数下标 `j = l(l + 1) / 2 + m`.
///
/// `l` 必须为不超过 4 的非负偶数, 且 `|m| <= l`.
#[inline]
pub const fn sh_index(l: i32, m: i32) -> usize {
    (l * (l + 1) / 2 + m) as usize
}

#[inline]
fn factorial(n: u32) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

/// 连带勒让德函数 `P_l^m(x)`, 含 Condon-Shortley 相位 `(-1)^m`.
///
/// 要求 `m <= l`, `x ∈ [-1, 1]`. 使用标准三项递推.
pub fn legendre_p(l: u32, m: u32, x: f64) -> f64 {
    if m > l {
        return 0.0;
    }
    // P_m^m = (-1)^m (2m - 1)!! (1 - x²)^{m/2}
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = ((1.0 - x) * (1.0 + x)).max(0.0).sqrt();
        let mut fact = 1.0;
        for _ in 0..m {
            pmm *= -fact * somx2;
            fact += 2.0;
        }
    }
    if l == m {
        return pmm;
    }
    let mut pmmp1 = x * (2 * m + 1) as f64 * pmm;
    if l == m + 1 {
        return pmmp1;
    }
    let mut pll = 0.0;
    for ll in (m + 2)..=l {
        pll = (x * (2 * ll - 1) as f64 * pmmp1 - (ll + m - 1) as f64 * pmm) / (ll - m) as f64;
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pll
}

/// 在 `(θ, φ)` 处计算全部 15 个基函数的值.
pub fn sh_basis(theta: f64, phi: f64) -> ShCoeffs {
    let x = theta.cos();
    let mut out = [0.0; N_COEFFS];
    for (o, t) in out.iter_mut().zip(SH_TERMS.iter()) {
        *o = t.scale * legendre_p(t.l, t.m.unsigned_abs(), x) * t.trig(phi);
    }
    out
}

/// 直角坐标转球坐标 `(θ, φ)`, `θ ∈ [0, π]`, `φ ∈ (-π, π]`.
///
/// 零向量没有方向, 此时约定返回 `(π/2, π/2)`.
pub fn cart_to_sph(v: &Vector3<f64>) -> (f64, f64) {
    let mag = v.norm();
    if mag < EPS {
        return (PI / 2.0, PI / 2.0);
    }
    let theta = (v.z / mag).clamp(-1.0, 1.0).acos();
    let phi = v.y.atan2(v.x);
    (theta, phi)
}

/// 球坐标转单位向量.
#[inline]
pub fn sph_to_cart(theta: f64, phi: f64) -> Vector3<f64> {
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = phi.sin_cos();
    Vector3::new(cp * st, sp * st, ct)
}

/// 计算 ODF 在 `(θ, φ)` 处的幅值.
pub fn odf_value(coeffs: &ShCoeffs, theta: f64, phi: f64) -> f64 {
    sh_basis(theta, phi)
        .iter()
        .zip(coeffs.iter())
        .map(|(b, c)| b * c)
        .sum()
}

/// 计算 ODF 在方向 `dir` 上的幅值. `dir` 无需是单位向量.
#[inline]
pub fn odf_value_along(coeffs: &ShCoeffs, dir: &Vector3<f64>) -> f64 {
    let (theta, phi) = cart_to_sph(dir);
    odf_value(coeffs, theta, phi)
}

/// 将球面函数 `f(θ, φ)` 投影到球谐基上.
///
/// 使用 `n_theta × n_phi` 的中点求积, 权重为 `sin θ · dθ · dφ`.
/// 主要用于构造合成数据.
pub fn project<F>(f: F, n_theta: usize, n_phi: usize) -> ShCoeffs
where
    F: Fn(f64, f64) -> f64,
{
    let mut out = [0.0; N_COEFFS];
    if n_theta == 0 || n_phi == 0 {
        return out;
    }
    let dt = PI / n_theta as f64;
    let dp = 2.0 * PI / n_phi as f64;
    for i in 0..n_theta {
        let theta = (i as f64 + 0.5) * dt;
        let w = theta.sin() * dt * dp;
        for k in 0..n_phi {
            let phi = (k as f64 + 0.5) * dp;
            let v = f(theta, phi) * w;
            for (o, b) in out.iter_mut().zip(sh_basis(theta, phi)) {
                *o += v * b;
            }
        }
    }
    out
}

/// 球面上近似均匀分布的 `n` 个方向 (斐波那契点阵).
pub fn fibonacci_directions(n: usize) -> Vec<Vector3<f64>> {
    let golden = PI * (3.0 - 5f64.sqrt());
    (0..n)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let a = golden * i as f64;
            Vector3::new(r * a.cos(), r * a.sin(), z)
        })
        .collect()
}

/// 缩放系数, 使 ODF 在球面上的积分为 1 (即 `c₀ = 1 / (2√π)`).
///
/// `c₀` 不为正时原样返回.
pub fn normalize_integral(coeffs: &mut ShCoeffs) {
    let c0 = coeffs[0];
    if c0 > 0.0 {
        let s = 1.0 / (2.0 * PI.sqrt() * c0);
        coeffs.iter_mut().for_each(|c| *c *= s);
    }
}
