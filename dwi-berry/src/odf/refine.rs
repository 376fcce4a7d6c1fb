//! 候选方向的补充与细化.
//!
//! `φ` 扫描只在 `∂φ ODF = 0` 的曲线上取点. ODF 关于峰方向轴对称时, 这条曲线退化为
//! 过峰的一条经线, 离散的 `φ` 网格几乎不可能恰好落在上面. 因此另外在粗网格上取局部
//! 极大值作为种子, 并把每个簇的代表方向沿球面梯度上升到真正的局部极大值.

use nalgebra::Vector3;
use once_cell::sync::Lazy;

use crate::consts::odf::{
    ASCENT_FD_STEP, ASCENT_MAX_BACKTRACK, ASCENT_MAX_ITER, ASCENT_MIN_GRADIENT, SEED_GRID_SIZE,
    SEED_NEIGHBOUR_ANGLE,
};
use crate::sh::{cart_to_sph, fibonacci_directions, odf_value_along, sh_basis, ShCoeffs};

/// 种子网格: 方向, 各方向上的基函数值, 以及 (对极意义下的) 邻居.
struct SeedGrid {
    directions: Vec<Vector3<f64>>,
    basis: Vec<ShCoeffs>,
    neighbours: Vec<Vec<usize>>,
}

impl SeedGrid {
    fn new(n: usize, radius: f64) -> Self {
        let directions = fibonacci_directions(n);
        let basis = directions
            .iter()
            .map(|d| {
                let (theta, phi) = cart_to_sph(d);
                sh_basis(theta, phi)
            })
            .collect();
        let min_cos = radius.cos();
        let neighbours = directions
            .iter()
            .enumerate()
            .map(|(i, a)| {
                directions
                    .iter()
                    .enumerate()
                    .filter(|&(j, b)| j != i && a.dot(b).abs() > min_cos)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();
        Self {
            directions,
            basis,
            neighbours,
        }
    }
}

static SEED_GRID: Lazy<SeedGrid> = Lazy::new(|| SeedGrid::new(SEED_GRID_SIZE, SEED_NEIGHBOUR_ANGLE));

/// 种子网格上严格大于全部邻居的方向, 以 `(θ, φ)` 追加到 `out`.
///
/// `values` 为临时缓冲区. 常数 ODF 不产生任何种子.
pub(crate) fn grid_seeds(coeffs: &ShCoeffs, values: &mut Vec<f64>, out: &mut Vec<(f64, f64)>) {
    let grid = &*SEED_GRID;
    values.clear();
    values.extend(
        grid.basis
            .iter()
            .map(|b| b.iter().zip(coeffs.iter()).map(|(b, c)| b * c).sum::<f64>()),
    );
    for (i, nb) in grid.neighbours.iter().enumerate() {
        if nb.iter().all(|&j| values[i] > values[j]) {
            out.push(cart_to_sph(&grid.directions[i]));
        }
    }
}

/// 与 `u` 正交的一组单位切向量.
fn tangent_basis(u: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let a = if u.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let t1 = u.cross(&a).normalize();
    let t2 = u.cross(&t1);
    (t1, t2)
}

/// 从 `start` 出发沿球面梯度上升, 返回局部极大值方向 (单位向量) 及其幅值.
///
/// 梯度由切平面内的中心差分得到; 步长不能使 ODF 增大时先减半, 成功后加倍.
pub(crate) fn ascend(coeffs: &ShCoeffs, start: &Vector3<f64>) -> (Vector3<f64>, f64) {
    let Some(mut u) = start.try_normalize(0.0) else {
        return (*start, odf_value_along(coeffs, start));
    };
    let mut f = odf_value_along(coeffs, &u);
    let mut rate = 1.0;
    let h = ASCENT_FD_STEP;

    for _ in 0..ASCENT_MAX_ITER {
        let (t1, t2) = tangent_basis(&u);
        let slope = |t: &Vector3<f64>| {
            (odf_value_along(coeffs, &(u + t * h)) - odf_value_along(coeffs, &(u - t * h))) / (2.0 * h)
        };
        let grad = t1 * slope(&t1) + t2 * slope(&t2);
        if grad.norm() < ASCENT_MIN_GRADIENT {
            break;
        }

        let mut next = None;
        for _ in 0..ASCENT_MAX_BACKTRACK {
            let v = (u + grad * rate).normalize();
            let fv = odf_value_along(coeffs, &v);
            if fv > f {
                next = Some((v, fv));
                break;
            }
            rate *= 0.5;
        }
        let Some((v, fv)) = next else {
            break;
        };
        let moved = (v - u).norm();
        u = v;
        f = fv;
        rate *= 2.0;
        if moved < 1e-12 {
            break;
        }
    }
    (u, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sh::sph_to_cart;
    use crate::synthetic::{isotropic_coeffs, BinghamOdf};

    #[test]
    fn test_seed_grid_neighbours() {
        let grid = &*SEED_GRID;
        assert_eq!(grid.directions.len(), SEED_GRID_SIZE);
        assert!(grid.neighbours.iter().all(|nb| !nb.is_empty()));
    }

    #[test]
    fn test_isotropic_has_no_seeds() {
        let mut values = vec![];
        let mut out = vec![];
        grid_seeds(&isotropic_coeffs(), &mut values, &mut out);
        assert!(out.is_empty());
    }

    /// 轴对称单峰 ODF: 种子中至少有一个靠近峰方向.
    #[test]
    fn test_seeds_near_symmetric_peak() {
        let axis = Vector3::new(0.36, 0.48, 0.8).normalize();
        let c = BinghamOdf::new(axis, 4.0, 4.0, 0.0).unwrap().coeffs();
        let mut values = vec![];
        let mut out = vec![];
        grid_seeds(&c, &mut values, &mut out);
        let best = out
            .iter()
            .map(|&(t, p)| sph_to_cart(t, p).dot(&axis).abs())
            .fold(0.0, f64::max);
        assert!(best > 0.35f64.cos());
    }

    #[test]
    fn test_ascend_reaches_peak() {
        let axis = Vector3::new(1.0, 0.5, 0.3).normalize();
        let c = BinghamOdf::new(axis, 2.0, 6.0, 0.3).unwrap().coeffs();
        let start = (axis + Vector3::new(0.2, -0.1, 0.15)).normalize();
        let (u, f) = ascend(&c, &start);
        assert!((u.norm() - 1.0).abs() < 1e-12);
        assert!(u.dot(&axis).abs() > 0.5f64.to_radians().cos());
        assert!(f >= odf_value_along(&c, &start));
        assert!((f - odf_value_along(&c, &u)).abs() < 1e-12);
    }

    #[test]
    fn test_ascend_zero_vector() {
        let (u, _) = ascend(&isotropic_coeffs(), &Vector3::zeros());
        assert_eq!(u, Vector3::zeros());
    }
}
