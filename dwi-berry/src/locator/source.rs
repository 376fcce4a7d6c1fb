//! 点源: 可以被 [`PointLocator`](super::PointLocator) 索引的三维点集合.

use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::{Array2, ArrayViewMut2};

use crate::image::{GeometryAttr, ImageGeometry, MaskImage};
use crate::locator::PointId;
use crate::{Idx3d, Point3d};

/// 点源身份与修改计数. 二者都不变时, 点源内容视为不变.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceStamp {
    /// 点源身份, 进程内唯一.
    pub uid: u64,
    /// 逻辑修改时钟, 每次修改后递增.
    pub mtime: u64,
}

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// 分配一个新的点源身份.
#[inline]
pub(crate) fn next_uid() -> u64 {
    NEXT_UID.fetch_add(1, Ordering::Relaxed)
}

/// 点源需要提供的能力.
pub trait PointSource {
    /// 点的个数.
    fn len(&self) -> usize;

    /// 是否为空?
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 第 `i` 个点的坐标.
    fn coordinate_at(&self, i: usize) -> Point3d;

    /// 第 `i` 个点的 ID. 默认为插入序号.
    #[inline]
    fn id_at(&self, i: usize) -> PointId {
        i as PointId
    }

    /// 身份与修改计数. 返回 `None` 表示无法判断是否修改过, 每次都需要重建.
    #[inline]
    fn stamp(&self) -> Option<SourceStamp> {
        None
    }
}

impl PointSource for [Point3d] {
    #[inline]
    fn len(&self) -> usize {
        <[Point3d]>::len(self)
    }

    #[inline]
    fn coordinate_at(&self, i: usize) -> Point3d {
        self[i]
    }
}

impl PointSource for Vec<Point3d> {
    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }

    #[inline]
    fn coordinate_at(&self, i: usize) -> Point3d {
        self[i]
    }
}

/// 带显式 ID 的点集. 自带身份和逻辑修改时钟.
#[derive(Debug)]
pub struct PointSet {
    uid: u64,
    mtime: u64,
    points: Vec<Point3d>,
    ids: Vec<PointId>,
}

impl Default for PointSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PointSet {
    /// 克隆得到的是一个新的点源, 拥有新的身份.
    fn clone(&self) -> Self {
        Self {
            uid: next_uid(),
            mtime: 0,
            points: self.points.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl PointSet {
    /// 空点集.
    pub fn new() -> Self {
        Self {
            uid: next_uid(),
            mtime: 0,
            points: vec![],
            ids: vec![],
        }
    }

    /// 由坐标构建, ID 为插入序号.
    pub fn from_points(points: Vec<Point3d>) -> Self {
        let ids = (0..points.len() as PointId).collect();
        Self {
            uid: next_uid(),
            mtime: 0,
            points,
            ids,
        }
    }

    /// 追加一个点.
    pub fn insert(&mut self, id: PointId, p: Point3d) {
        self.points.push(p);
        self.ids.push(id);
        self.touch();
    }

    /// 修改第 `i` 个点的坐标. `i` 越界时返回 `false`.
    pub fn set_point(&mut self, i: usize, p: Point3d) -> bool {
        match self.points.get_mut(i) {
            Some(dst) => {
                *dst = p;
                self.touch();
                true
            }
            None => false,
        }
    }

    /// 清空.
    pub fn clear(&mut self) {
        self.points.clear();
        self.ids.clear();
        self.touch();
    }

    /// 修改计数加一.
    #[inline]
    pub fn touch(&mut self) {
        self.mtime += 1;
    }
}

impl PointSource for PointSet {
    #[inline]
    fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    fn coordinate_at(&self, i: usize) -> Point3d {
        self.points[i]
    }

    #[inline]
    fn id_at(&self, i: usize) -> PointId {
        self.ids[i]
    }

    #[inline]
    fn stamp(&self) -> Option<SourceStamp> {
        Some(SourceStamp {
            uid: self.uid,
            mtime: self.mtime,
        })
    }
}

/// 稠密 `N × 3` 坐标矩阵 (如网格顶点). ID 为行号.
#[derive(Debug)]
pub struct MeshPoints {
    uid: u64,
    mtime: u64,
    data: Array2<f64>,
}

impl MeshPoints {
    /// 由 `N × 3` 矩阵构建. 列数不为 3 时返回 `None`.
    pub fn new(data: Array2<f64>) -> Option<Self> {
        if data.ncols() != 3 {
            return None;
        }
        Some(Self {
            uid: next_uid(),
            mtime: 0,
            data,
        })
    }

    /// 可写视图. 调用即视为修改.
    pub fn points_mut(&mut self) -> ArrayViewMut2<'_, f64> {
        self.mtime += 1;
        self.data.view_mut()
    }
}

impl PointSource for MeshPoints {
    #[inline]
    fn len(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    fn coordinate_at(&self, i: usize) -> Point3d {
        [self.data[[i, 0]], self.data[[i, 1]], self.data[[i, 2]]]
    }

    #[inline]
    fn stamp(&self) -> Option<SourceStamp> {
        Some(SourceStamp {
            uid: self.uid,
            mtime: self.mtime,
        })
    }
}

/// 图像体素中心点集, 可用掩膜筛选. ID 为线性体素编号. 构建后不可修改.
#[derive(Clone, Debug)]
pub struct GridPoints {
    uid: u64,
    geometry: ImageGeometry,
    voxels: Vec<Idx3d>,
}

impl GridPoints {
    /// 全部体素.
    pub fn new(geometry: ImageGeometry) -> Self {
        let (z, h, w) = geometry.shape();
        let voxels = itertools::iproduct!(0..z, 0..h, 0..w).collect();
        Self {
            uid: next_uid(),
            geometry,
            voxels,
        }
    }

    /// 掩膜内的体素. 形状不一致时返回 `None`.
    pub fn masked(geometry: ImageGeometry, mask: &MaskImage) -> Option<Self> {
        if mask.shape() != geometry.shape() {
            return None;
        }
        let (z, h, w) = geometry.shape();
        let voxels = itertools::iproduct!(0..z, 0..h, 0..w)
            .filter(|&idx| mask.is_inside(idx))
            .collect();
        Some(Self {
            uid: next_uid(),
            geometry,
            voxels,
        })
    }
}

impl PointSource for GridPoints {
    #[inline]
    fn len(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    fn coordinate_at(&self, i: usize) -> Point3d {
        self.geometry.voxel_to_world(self.voxels[i])
    }

    #[inline]
    fn id_at(&self, i: usize) -> PointId {
        self.geometry.linear_index(self.voxels[i]) as PointId
    }

    #[inline]
    fn stamp(&self) -> Option<SourceStamp> {
        Some(SourceStamp {
            uid: self.uid,
            mtime: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_set_stamp() {
        let mut s = PointSet::new();
        let s0 = s.stamp().unwrap();
        s.insert(10, [0.0; 3]);
        let s1 = s.stamp().unwrap();
        assert_eq!(s0.uid, s1.uid);
        assert!(s1.mtime > s0.mtime);
        assert_eq!(s.id_at(0), 10);

        let c = s.clone();
        assert_ne!(c.stamp().unwrap().uid, s1.uid);
        assert!(!s.set_point(3, [1.0; 3]));
    }

    #[test]
    fn test_mesh_points() {
        assert!(MeshPoints::new(Array2::zeros((4, 2))).is_none());
        let mut m = MeshPoints::new(Array2::from_shape_fn((4, 3), |(i, j)| (i * 3 + j) as f64)).unwrap();
        assert_eq!(m.len(), 4);
        assert_eq!(m.coordinate_at(2), [6.0, 7.0, 8.0]);
        let before = m.stamp().unwrap();
        m.points_mut()[[0, 0]] = -1.0;
        assert_ne!(m.stamp().unwrap(), before);
    }

    #[test]
    fn test_grid_points_masked() {
        let g = ImageGeometry::with_shape((1, 2, 3));
        let mut mask = MaskImage::full(g.clone());
        mask.set((0, 1, 2), 0);
        let p = GridPoints::masked(g.clone(), &mask).unwrap();
        assert_eq!(p.len(), 5);
        assert_eq!(p.id_at(4), 4);
        assert_eq!(p.coordinate_at(4), [1.0, 1.0, 0.0]);
        assert_eq!(GridPoints::new(g).len(), 6);
    }

    #[test]
    fn test_slice_has_no_stamp() {
        let v: Vec<Point3d> = vec![[0.0; 3], [1.0; 3]];
        assert!(v.stamp().is_none());
        assert_eq!(v.as_slice().id_at(1), 1);
    }
}
