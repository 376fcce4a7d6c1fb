//! 方向场折线表示: 每个峰对应一条过体素中心的线段.

use nalgebra::Vector3;

use crate::Point3d;

/// 方向场. 点两两成对, 第 `i` 条线段由 `points[2i]`, `points[2i + 1]` 组成.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirectionField {
    points: Vec<Point3d>,
}

impl DirectionField {
    /// 空方向场.
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条线段: `center ± dir / 2 · scale`.
    pub fn push_segment(&mut self, center: &Point3d, dir: &Vector3<f64>, scale: f64) {
        let c = Vector3::from(*center);
        let half = dir * (0.5 * scale);
        let a = c - half;
        let b = c + half;
        self.points.push([a.x, a.y, a.z]);
        self.points.push([b.x, b.y, b.z]);
    }

    /// 线段个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len() / 2
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 全部端点.
    #[inline]
    pub fn points(&self) -> &[Point3d] {
        &self.points
    }

    /// 遍历线段 `[起点, 终点]`.
    pub fn segments(&self) -> impl Iterator<Item = [Point3d; 2]> + '_ {
        self.points.chunks_exact(2).map(|s| [s[0], s[1]])
    }
}
