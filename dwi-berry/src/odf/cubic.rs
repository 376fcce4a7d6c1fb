//! 实系数三次方程 `a x³ + b x² + c x + d = 0` 的卡尔达诺 (Cardano) 求根.

/// 三次方程的实根.
///
/// 首项系数为 0 时方程降次求解, 结果以 `Quadratic` / `Linear` 表示;
/// 所有系数都为 0 时为 `Degenerate`, 不产生任何根.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CubicRoots {
    /// 判别式大于 0, 只有一个实根.
    One(f64),

    /// 判别式小于 0, 三个互异实根.
    Three([f64; 3]),

    /// 判别式等于 0. 三重根时 `simple == double`.
    Repeated {
        /// 单根.
        simple: f64,
        /// 二重根.
        double: f64,
    },

    /// 降为二次方程. 实根个数为 0, 1 或 2, 保存在前 `len` 个位置.
    Quadratic {
        /// 实根.
        roots: [f64; 2],
        /// 实根个数.
        len: usize,
    },

    /// 降为一次方程.
    Linear(f64),

    /// 方程退化 (系数全为 0, 或仅有非零常数项), 没有可用的根.
    Degenerate,
}

impl CubicRoots {
    /// 去重后的实根个数.
    pub fn len(&self) -> usize {
        match self {
            CubicRoots::One(_) | CubicRoots::Linear(_) => 1,
            CubicRoots::Three(_) => 3,
            CubicRoots::Repeated { simple, double } => {
                if simple == double {
                    1
                } else {
                    2
                }
            }
            CubicRoots::Quadratic { len, .. } => *len,
            CubicRoots::Degenerate => 0,
        }
    }

    /// 是否没有实根?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 遍历去重后的实根.
    pub fn iter(&self) -> impl Iterator<Item = f64> {
        let buf = match *self {
            CubicRoots::One(r) | CubicRoots::Linear(r) => [r, 0.0, 0.0],
            CubicRoots::Three(r) => r,
            CubicRoots::Repeated { simple, double } => [simple, double, 0.0],
            CubicRoots::Quadratic { roots, .. } => [roots[0], roots[1], 0.0],
            CubicRoots::Degenerate => [0.0; 3],
        };
        buf.into_iter().take(self.len())
    }
}

/// 求解 `a x³ + b x² + c x + d = 0` 的全部实根.
pub fn solve_cubic(a: f64, b: f64, c: f64, d: f64) -> CubicRoots {
    if a != 0.0 {
        // 化为 x³ + p x² + q x + r = 0, 再代换 x = y - p/3 消去二次项.
        let (p, q, r) = (b / a, c / a, d / a);
        let big_a = (q - p * p / 3.0) / 3.0;
        let big_b = (2.0 * p * p * p - 9.0 * p * q + 27.0 * r) / 27.0 * 0.5;
        let disc = big_b * big_b + big_a * big_a * big_a;
        let offset = p / 3.0;

        if disc > 0.0 {
            let e = disc.sqrt();
            CubicRoots::One((-big_b + e).cbrt() + (-big_b - e).cbrt() - offset)
        } else if disc < 0.0 {
            let e = (-disc).sqrt();
            let t = -big_b;
            let ang = 2.0 / 3.0 * (e / ((t * t + e * e).sqrt() + t)).atan();
            let (sa, ca) = ang.sin_cos();
            let s3 = 3f64.sqrt();
            let m = (-big_a).sqrt();
            CubicRoots::Three([
                2.0 * m * ca - offset,
                -m * (ca + s3 * sa) - offset,
                -m * (ca - s3 * sa) - offset,
            ])
        } else {
            let t = (-big_b).cbrt();
            let simple = 2.0 * t - offset;
            if big_a != 0.0 || big_b != 0.0 {
                CubicRoots::Repeated {
                    simple,
                    double: -t - offset,
                }
            } else {
                CubicRoots::Repeated {
                    simple,
                    double: simple,
                }
            }
        }
    } else if b != 0.0 {
        let disc = c * c - 4.0 * b * d;
        if disc > 0.0 {
            let t = disc.sqrt();
            CubicRoots::Quadratic {
                roots: [(-c + t) / (2.0 * b), (-c - t) / (2.0 * b)],
                len: 2,
            }
        } else if disc == 0.0 {
            CubicRoots::Quadratic {
                roots: [-c / (2.0 * b), 0.0],
                len: 1,
            }
        } else {
            CubicRoots::Quadratic {
                roots: [0.0; 2],
                len: 0,
            }
        }
    } else if c != 0.0 {
        CubicRoots::Linear(-d / c)
    } else {
        CubicRoots::Degenerate
    }
}
