//! 候选极大值方向的一维解析搜索.
//!
//! 固定 `φ` 后, 4 阶 ODF 可写成关于 `θ` 的三角多项式, 其系数记为 `A..H`.
//! `∂ODF/∂φ = 0` 化为 `x = tan θ` 的三次方程, 对每个实根检查 `∂ODF/∂θ`
//! 是否接近 0, 再用 2×2 Hessian 判断是否为极大值.

use std::f64::consts::PI;

use nalgebra::Matrix2;

use crate::consts::odf::{DTHETA_THRESHOLD, MIN_STEP_RATIO, PHI_STEP};
use crate::odf::cubic::solve_cubic;
use crate::sh::{ShCoeffs, SH_TERMS};

/// 固定 `φ` 时关于 `θ` 的三角多项式系数.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) struct ThetaPoly {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    g: f64,
    h: f64,
}

impl ThetaPoly {
    /// 由 `c_j · Y_j(φ)` (或其对 `φ` 的导数) 组合出多项式系数.
    fn from_weighted(w: &ShCoeffs) -> Self {
        Self {
            a: 0.5 * w[3],
            b: -3.0 * (w[2] + w[4]),
            c: 3.0 * (w[1] + w[5]),
            d: 0.125 * w[10],
            e: -2.5 * (w[9] + w[11]),
            f: 7.5 * (w[8] + w[12]),
            g: -105.0 * (w[7] + w[13]),
            h: 105.0 * (w[6] + w[14]),
        }
    }

    /// 对 `φ` 求二阶导后的系数. 每项按各自 `m²` 缩放.
    fn second_phi_derivative(&self) -> Self {
        Self {
            a: 0.0,
            b: -self.b,
            c: -4.0 * self.c,
            d: 0.0,
            e: -self.e,
            f: -4.0 * self.f,
            g: -9.0 * self.g,
            h: -16.0 * self.h,
        }
    }

    /// `∂φ ODF = 0` 化成的三次方程系数, 未知量为 `tan θ`.
    #[inline]
    fn cubic(&self) -> [f64; 4] {
        [
            self.h + self.c - self.f,
            self.g + self.b - 3.0 * self.e,
            6.0 * self.f + self.c,
            self.b + 4.0 * self.e,
        ]
    }

    /// 对 `θ` 的一阶导. `sn = sin 2θ`, `cs = cos 2θ`.
    fn dtheta(&self, sn: f64, cs: f64) -> f64 {
        let Self {
            a,
            b,
            c,
            d,
            e,
            f,
            g,
            h,
        } = *self;
        (g - 7.0 * e) * sn * sn
            + (7.0 * f - 35.0 * d - h) * sn * cs
            + (h + c - f - 3.0 * a - 5.0 * d) * sn
            + (0.5 * e + b + 0.5 * g) * cs
            - 0.5 * g
            + 3.5 * e
    }

    /// 对 `θ` 的二阶导.
    fn dtheta2(&self, sn: f64, cs: f64) -> f64 {
        let Self {
            a,
            b,
            c,
            d,
            e,
            f,
            g,
            h,
        } = *self;
        4.0 * (g - 7.0 * e) * sn * cs + 2.0 * (7.0 * f - 35.0 * d - h) * (2.0 * cs * cs - 1.0)
            + 2.0 * (h + c - f - 3.0 * a - 5.0 * d) * cs
            - (e + 2.0 * b + g) * sn
    }

    /// 多项式本身的值 (不含常数项 `c₀`).
    fn value(&self, sn: f64, cs: f64) -> f64 {
        let Self {
            a,
            b,
            c,
            d,
            e,
            f,
            g,
            h,
        } = *self;
        let up = (1.0 + cs) / 2.0;
        let down = (1.0 - cs) / 2.0;
        35.0 * d * up * up + (3.0 * a - 30.0 * d) * up + 3.0 * d - a
            + 0.5 * (7.0 * e * up - 3.0 * e + b) * sn
            + (7.0 * f * up + c - f) * down
            + g * sn * down / 2.0
            + h * down * down
    }
}

/// 某个 `φ` 上的全部多项式: ODF 本身, 对 `φ` 的一阶导和二阶导.
struct PhiSlice {
    odf: ThetaPoly,
    dphi: ThetaPoly,
    dphi2: ThetaPoly,
}

impl PhiSlice {
    fn new(coeffs: &ShCoeffs, phi: f64) -> Self {
        let mut w = [0.0; 15];
        let mut wp = [0.0; 15];
        for (j, t) in SH_TERMS.iter().enumerate() {
            w[j] = coeffs[j] * t.scale * t.trig(phi);
            wp[j] = coeffs[j] * t.scale * t.trig_dphi(phi);
        }
        let odf = ThetaPoly::from_weighted(&w);
        Self {
            dphi: ThetaPoly::from_weighted(&wp),
            dphi2: odf.second_phi_derivative(),
            odf,
        }
    }

    /// 在 `θ` 处的 Hessian `[[∂θθ, ∂θφ], [∂θφ, ∂φφ]]`.
    fn hessian(&self, sn: f64, cs: f64) -> Matrix2<f64> {
        let h00 = self.odf.dtheta2(sn, cs);
        let h01 = self.dphi.dtheta(sn, cs);
        let h11 = self.dphi2.value(sn, cs);
        Matrix2::new(h00, h01, h01, h11)
    }

    /// 根据根曲线 `θ(φ)` 的斜率缩小步长: 保证相邻两次采样在球面上的距离不超过 `step`.
    fn adaptive_step(&self, t: f64, step: f64) -> Option<f64> {
        let [p3, p2, p1, _] = self.dphi.cubic();
        let [s3, s2, s1, s0] = self.dphi2.cubic();
        let t2 = t * t;
        let t3 = t2 * t;
        let t4 = t3 * t;
        let den = 3.0 * p3 * t2 + 2.0 * p2 * t + p1;
        if den == 0.0 {
            return None;
        }
        let num = s3 * t3 + s2 * t2 + s1 * t + s0;
        let ratio = num / den;
        let s = step * (1.0 + t2) / (t2 + t4 + ratio * ratio).sqrt();
        s.is_finite().then_some(s)
    }
}

/// 把 `atan(x)` 映射到 `[0, π)`.
#[inline]
fn theta_from_tan(x: f64) -> f64 {
    let t = x.atan();
    t - (t / PI).floor() * PI
}

/// 搜索给定体素上全部候选极大值 `(θ, φ)`, 追加到 `out`.
///
/// `adaptive` 为真时, 先以固定步长扫描一遍, 再以自适应步长扫描一遍.
pub(crate) fn find_candidates(coeffs: &ShCoeffs, adaptive: bool, out: &mut Vec<(f64, f64)>) {
    sweep(coeffs, false, out);
    if adaptive {
        sweep(coeffs, true, out);
    }
}

fn sweep(coeffs: &ShCoeffs, adaptive: bool, out: &mut Vec<(f64, f64)>) {
    let min_step = PHI_STEP * MIN_STEP_RATIO;
    let mut phi = 0.0;
    while phi < 2.0 * PI {
        let slice = PhiSlice::new(coeffs, phi);
        let [a, b, c, d] = slice.dphi.cubic();

        let mut high_res = false;
        let mut step = PHI_STEP;
        for x in solve_cubic(a, b, c, d).iter() {
            let theta = theta_from_tan(x);
            let (sn, cs) = (2.0 * theta).sin_cos();

            if slice.odf.dtheta(sn, cs).abs() < DTHETA_THRESHOLD {
                high_res = true;
                let hessian = slice.hessian(sn, cs);
                if hessian.determinant() >= 0.0 && hessian.trace() <= 0.0 {
                    out.push((theta, phi));
                }
            }

            if adaptive {
                if let Some(s) = slice.adaptive_step(x, PHI_STEP) {
                    step = step.min(s.max(min_step));
                }
            }
        }

        phi += if high_res { step * 0.5 } else { step };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    use crate::sh::{odf_value, sh_basis, sph_to_cart};
    use crate::synthetic::BinghamOdf;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    /// 随便取一组系数. 只用于验证多项式恒等式.
    fn sample_coeffs() -> ShCoeffs {
        let mut c = [0.0; 15];
        for (j, v) in c.iter_mut().enumerate() {
            *v = ((j as f64 + 1.0) * 0.37).sin() * 0.3;
        }
        c[0] = 0.28;
        c
    }

    /// `c₀ · Y₀₀ + value(θ)` 与直接按基函数求和一致.
    #[test]
    fn test_theta_poly_value_matches_basis() {
        let c = sample_coeffs();
        for &(theta, phi) in &[(0.3_f64, 0.2_f64), (1.2, 2.5), (2.9, 5.1)] {
            let slice = PhiSlice::new(&c, phi);
            let (sn, cs) = (2.0 * theta).sin_cos();
            let y00 = sh_basis(theta, phi)[0];
            let v = c[0] * y00 + slice.odf.value(sn, cs);
            assert!(f64_eq(v, odf_value(&c, theta, phi)));
        }
    }

    /// 解析导数与有限差分一致.
    #[test]
    fn test_theta_poly_derivatives() {
        let c = sample_coeffs();
        let (theta, phi): (f64, f64) = (0.9, 1.7);
        let h = 1e-5;
        let slice = PhiSlice::new(&c, phi);
        let (sn, cs) = (2.0 * theta).sin_cos();

        let dt = (odf_value(&c, theta + h, phi) - odf_value(&c, theta - h, phi)) / (2.0 * h);
        assert!((slice.odf.dtheta(sn, cs) - dt).abs() < 1e-6);

        let dp = (odf_value(&c, theta, phi + h) - odf_value(&c, theta, phi - h)) / (2.0 * h);
        assert!((slice.dphi.value(sn, cs) - dp).abs() < 1e-6);

        let f0 = odf_value(&c, theta, phi);
        let dtt = (odf_value(&c, theta + h, phi) - 2.0 * f0 + odf_value(&c, theta - h, phi)) / (h * h);
        assert!((slice.odf.dtheta2(sn, cs) - dtt).abs() < 1e-3);

        let dpp = (odf_value(&c, theta, phi + h) - 2.0 * f0 + odf_value(&c, theta, phi - h)) / (h * h);
        assert!((slice.dphi2.value(sn, cs) - dpp).abs() < 1e-3);
    }

    #[test]
    fn test_theta_from_tan() {
        assert!(f64_eq(theta_from_tan(0.0), 0.0));
        assert!(f64_eq(theta_from_tan(1.0), PI / 4.0));
        assert!(f64_eq(theta_from_tan(-1.0), 3.0 * PI / 4.0));
    }

    /// 各向同性 ODF: 三次方程退化, 不产生任何候选点.
    #[test]
    fn test_isotropic_has_no_candidates() {
        let mut c = [0.0; 15];
        c[0] = 0.5 / PI.sqrt();
        let mut out = vec![];
        find_candidates(&c, true, &mut out);
        assert!(out.is_empty());
    }

    /// 单峰 ODF 的候选点中, 至少有一个落在主方向附近.
    #[test]
    fn test_candidates_near_peak() {
        let axis = Vector3::new(0.36, 0.48, 0.8);
        let c = BinghamOdf::new(axis, 2.0, 6.0, 0.3).unwrap().coeffs();
        let mut out = vec![];
        find_candidates(&c, false, &mut out);
        let best = out
            .iter()
            .map(|&(t, p)| sph_to_cart(t, p).dot(&axis).abs())
            .fold(0.0, f64::max);
        assert!(!out.is_empty());
        assert!(best > 0.999);
    }
}
