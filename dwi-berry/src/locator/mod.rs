//! 三维最近邻点定位.
//!
//! [`PointLocator`] 对点源建立 k-d 树索引, 回答最近点 / 最小距离查询.
//! 点源身份和修改计数都不变时, 重复设置点源不会重建索引.
//!
//! 索引未建立时查询返回哨兵值 (`-1` / `-1.0`), 并只记录一次警告.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::consts::locator::{INVALID_DISTANCE, INVALID_POINT_ID};
use crate::Point3d;

pub mod kdtree;
pub mod source;

pub use kdtree::{KdTree, Neighbour};
pub use source::{GridPoints, MeshPoints, PointSet, PointSource, SourceStamp};

use kdtree::squared_distance;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;
    }
}

/// 点 ID. `-1` 表示无效.
pub type PointId = i64;

/// 从点源复制坐标与 ID 并建树.
fn build_tree<S: PointSource + ?Sized>(source: &S) -> Option<KdTree> {
    let n = source.len();
    let points = (0..n).map(|i| source.coordinate_at(i)).collect();
    let ids = (0..n).map(|i| source.id_at(i)).collect();
    KdTree::build(points, ids)
}

/// 最近邻点定位器.
///
/// 状态: 空 → 已建立 → (重建 | 不变). 重建时旧索引整体丢弃, 不做增量修改.
#[derive(Debug)]
pub struct PointLocator {
    tree: Option<KdTree>,
    stamp: Option<SourceStamp>,
    /// 近邻个数. 公开接口只使用最近的一个.
    k: usize,
    /// 近似因子. 0 为精确查询.
    eps: f64,
    build_count: usize,
    warned: AtomicBool,
}

impl Default for PointLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PointLocator {
    /// 空定位器, 精确查询.
    pub fn new() -> Self {
        Self {
            tree: None,
            stamp: None,
            k: 1,
            eps: 0.0,
            build_count: 0,
            warned: AtomicBool::new(false),
        }
    }

    /// 设置近似因子 `eps >= 0`. 返回的点距离不超过真实最近距离的 `1 + eps` 倍.
    pub fn with_epsilon(mut self, eps: f64) -> Self {
        self.eps = eps.max(0.0);
        self
    }

    /// 索引是否已建立?
    #[inline]
    pub fn is_built(&self) -> bool {
        self.tree.is_some()
    }

    /// 索引中点的个数. 未建立时为 0.
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.as_ref().map_or(0, KdTree::len)
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 累计建树次数.
    #[inline]
    pub fn build_count(&self) -> usize {
        self.build_count
    }

    /// 点源是否与当前索引一致 (同一身份且未被修改)?
    fn is_current(&self, stamp: Option<SourceStamp>) -> bool {
        self.tree.is_some() && stamp.is_some() && stamp == self.stamp
    }

    /// 设置点源并 (必要时) 重建索引. 返回是否发生了重建.
    ///
    /// 点源为空时记录警告, 保持原状态不变.
    pub fn set_points<S: PointSource + ?Sized>(&mut self, source: &S) -> bool {
        let stamp = source.stamp();
        if self.is_current(stamp) {
            log::debug!("point source unchanged ({stamp:?}), keeping index");
            return false;
        }
        match build_tree(source) {
            Some(tree) => {
                self.install(tree, stamp);
                true
            }
            None => {
                log::warn!("empty point source, locator left unchanged");
                false
            }
        }
    }

    fn install(&mut self, tree: KdTree, stamp: Option<SourceStamp>) {
        log::debug!("locator rebuilt with {} points ({stamp:?})", tree.len());
        self.tree = Some(tree);
        self.stamp = stamp;
        self.build_count += 1;
        self.warned.store(false, Ordering::Relaxed);
    }

    /// 一次遍历得到最近点. 未建立索引时记录一次警告并返回 `None`.
    fn search(&self, p: &Point3d) -> Option<Neighbour> {
        match &self.tree {
            Some(tree) => tree.k_nearest(p, self.k, self.eps).into_iter().next(),
            None => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    log::warn!("query on a locator without points");
                }
                None
            }
        }
    }

    /// 最近点 ID. 未建立索引时返回 `-1`.
    pub fn find_closest_point(&self, p: &Point3d) -> PointId {
        self.search(p).map_or(INVALID_POINT_ID, |n| n.id)
    }

    /// 同 [`Self::find_closest_point`], 坐标分量分别给出.
    #[inline]
    pub fn find_closest_point_xyz(&self, x: f64, y: f64, z: f64) -> PointId {
        self.find_closest_point(&[x, y, z])
    }

    /// 到最近点的欧氏距离. 未建立索引时返回 `-1.0`.
    pub fn minimal_distance(&self, p: &Point3d) -> f64 {
        self.search(p).map_or(INVALID_DISTANCE, |n| n.distance())
    }

    /// 同 [`Self::minimal_distance`], 坐标分量分别给出.
    #[inline]
    pub fn minimal_distance_xyz(&self, x: f64, y: f64, z: f64) -> f64 {
        self.minimal_distance(&[x, y, z])
    }

    /// 最近点 ID 与欧氏距离. 未建立索引时返回 `None`.
    pub fn find_closest_point_and_distance(&self, p: &Point3d) -> Option<(PointId, f64)> {
        self.search(p).map(|n| (n.id, n.distance()))
    }

    /// 同 [`Self::find_closest_point_and_distance`], 坐标分量分别给出.
    #[inline]
    pub fn find_closest_point_and_distance_xyz(
        &self,
        x: f64,
        y: f64,
        z: f64,
    ) -> Option<(PointId, f64)> {
        self.find_closest_point_and_distance(&[x, y, z])
    }

    /// 批量查询最近点 ID.
    pub fn find_closest_points(&self, queries: &[Point3d]) -> Vec<PointId> {
        queries.iter().map(|p| self.find_closest_point(p)).collect()
    }
}

/// 线程间共享的并行版本.
#[cfg(feature = "rayon")]
impl PointLocator {
    /// 并行批量查询最近点 ID.
    pub fn par_find_closest_points(&self, queries: &[Point3d]) -> Vec<PointId> {
        queries
            .par_iter()
            .map(|p| self.find_closest_point(p))
            .collect()
    }

    /// 并行批量查询最近点 ID 与距离.
    pub fn par_find_closest_points_and_distances(
        &self,
        queries: &[Point3d],
    ) -> Vec<Option<(PointId, f64)>> {
        queries
            .par_iter()
            .map(|p| self.find_closest_point_and_distance(p))
            .collect()
    }
}

/// 暴力搜索最近点. 点源为空时返回 `None`. 主要用于验证和对比.
pub fn brute_force_closest<S: PointSource + ?Sized>(source: &S, p: &Point3d) -> Option<(PointId, f64)> {
    (0..source.len())
        .map(|i| (source.id_at(i), squared_distance(&source.coordinate_at(i), p)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, d)| (id, d.sqrt()))
}

/// 读写锁包装的定位器. 查询可并发, 重建时新索引在锁外建好后再整体替换,
/// 因此读者永远看到完整的索引.
#[derive(Debug, Default)]
pub struct SharedPointLocator {
    inner: RwLock<PointLocator>,
}

impl SharedPointLocator {
    /// 包装一个定位器.
    pub fn new(locator: PointLocator) -> Self {
        Self {
            inner: RwLock::new(locator),
        }
    }

    /// 设置点源. 语义同 [`PointLocator::set_points`].
    pub fn set_points<S: PointSource + ?Sized>(&self, source: &S) -> bool {
        let stamp = source.stamp();
        if self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_current(stamp)
        {
            return false;
        }
        let Some(tree) = build_tree(source) else {
            log::warn!("empty point source, locator left unchanged");
            return false;
        };
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if guard.is_current(stamp) {
            // 其它线程已经用同一版本完成了重建.
            return false;
        }
        guard.install(tree, stamp);
        true
    }

    /// 在读锁下执行查询.
    pub fn with<R>(&self, f: impl FnOnce(&PointLocator) -> R) -> R {
        f(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// 最近点 ID.
    pub fn find_closest_point(&self, p: &Point3d) -> PointId {
        self.with(|l| l.find_closest_point(p))
    }

    /// 最近点 ID 与欧氏距离.
    pub fn find_closest_point_and_distance(&self, p: &Point3d) -> Option<(PointId, f64)> {
        self.with(|l| l.find_closest_point_and_distance(p))
    }

    /// 累计建树次数.
    pub fn build_count(&self) -> usize {
        self.with(PointLocator::build_count)
    }

    /// 取回内部定位器.
    pub fn into_inner(self) -> PointLocator {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
