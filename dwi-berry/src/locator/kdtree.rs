//! 三维 k-d 树.
//!
//! 节点以扁平数组存放. 内部节点沿当前点集跨度最大的坐标轴, 以中位数划分;
//! 叶子节点最多容纳 `LEAF_SIZE` 个点. 建树后点按叶子顺序重排, 叶子只记录区间.

use binary_heap_plus::BinaryHeap;

use crate::consts::locator::LEAF_SIZE;
use crate::locator::PointId;
use crate::Point3d;

/// 一次查询得到的邻居: 点 ID 与平方欧氏距离.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Neighbour {
    /// 点 ID.
    pub id: PointId,
    /// 平方欧氏距离.
    pub dist_sq: f64,
}

impl Neighbour {
    /// 欧氏距离.
    #[inline]
    pub fn distance(&self) -> f64 {
        self.dist_sq.sqrt()
    }
}

#[derive(Copy, Clone, Debug)]
enum Node {
    /// 内部节点: 划分轴, 划分值, 左右孩子下标.
    Split {
        axis: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    /// 叶子节点: `[start, end)` 为重排后点数组中的区间.
    Leaf { start: usize, end: usize },
}

#[inline]
pub(crate) fn squared_distance(a: &Point3d, b: &Point3d) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// 三维 k-d 树. 建成后只读.
#[derive(Clone, Debug)]
pub struct KdTree {
    nodes: Vec<Node>,
    points: Vec<Point3d>,
    ids: Vec<PointId>,
}

impl KdTree {
    /// 建树. `points` 与 `ids` 一一对应, 长度必须相等.
    ///
    /// 点集为空时返回 `None`.
    pub fn build(points: Vec<Point3d>, ids: Vec<PointId>) -> Option<Self> {
        if points.is_empty() || points.len() != ids.len() {
            return None;
        }
        let n = points.len();
        let mut order: Vec<usize> = (0..n).collect();
        let mut nodes = Vec::with_capacity(2 * n / LEAF_SIZE + 1);
        build_recursive(&points, &mut order, 0, &mut nodes);

        let (points, ids) = order.iter().map(|&i| (points[i], ids[i])).unzip();
        Some(Self { nodes, points, ids })
    }

    /// 点的个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 是否为空? 建树成功的 k-d 树不会为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 最近邻查询.
    ///
    /// `eps` 为近似因子: 返回的点与查询点的距离不超过真实最近距离的 `1 + eps` 倍.
    /// `eps = 0` 时为精确查询.
    pub fn nearest(&self, query: &Point3d, eps: f64) -> Option<Neighbour> {
        self.k_nearest(query, 1, eps).into_iter().next()
    }

    /// k 近邻查询, 结果按距离升序排列.
    pub fn k_nearest(&self, query: &Point3d, k: usize, eps: f64) -> Vec<Neighbour> {
        if k == 0 || self.nodes.is_empty() {
            return vec![];
        }
        let scale = (1.0 + eps.max(0.0)).powi(2);

        // 大顶堆, 堆顶为当前第 k 近的邻居.
        let mut heap: BinaryHeap<Neighbour, _> =
            BinaryHeap::new_by(|a: &Neighbour, b: &Neighbour| a.dist_sq.total_cmp(&b.dist_sq));
        heap.reserve(k + 1);

        // (节点下标, 查询点到该节点区域的平方距离下界)
        let mut stack: Vec<(usize, f64)> = Vec::with_capacity(64);
        stack.push((0, 0.0));

        while let Some((node, bound)) = stack.pop() {
            if heap.len() == k {
                if let Some(worst) = heap.peek() {
                    if bound * scale >= worst.dist_sq {
                        continue;
                    }
                }
            }
            match self.nodes[node] {
                Node::Leaf { start, end } => {
                    for i in start..end {
                        let dist_sq = squared_distance(query, &self.points[i]);
                        if heap.len() < k {
                            heap.push(Neighbour {
                                id: self.ids[i],
                                dist_sq,
                            });
                        } else if let Some(mut worst) = heap.peek_mut() {
                            if dist_sq < worst.dist_sq {
                                *worst = Neighbour {
                                    id: self.ids[i],
                                    dist_sq,
                                };
                            }
                        }
                    }
                }
                Node::Split {
                    axis,
                    value,
                    left,
                    right,
                } => {
                    let diff = query[axis] - value;
                    let (near, far) = if diff <= 0.0 { (left, right) } else { (right, left) };
                    // 先压远端, 保证近端先出栈.
                    stack.push((far, bound.max(diff * diff)));
                    stack.push((near, bound));
                }
            }
        }
        heap.into_sorted_vec()
    }
}

fn build_recursive(points: &[Point3d], order: &mut [usize], offset: usize, nodes: &mut Vec<Node>) -> usize {
    let count = order.len();
    let node = nodes.len();
    if count <= LEAF_SIZE {
        nodes.push(Node::Leaf {
            start: offset,
            end: offset + count,
        });
        return node;
    }

    let axis = widest_axis(points, order);
    let mid = count / 2;
    order.select_nth_unstable_by(mid, |&a, &b| points[a][axis].total_cmp(&points[b][axis]));
    let value = points[order[mid]][axis];

    // 占位, 孩子建好后回填.
    nodes.push(Node::Leaf { start: 0, end: 0 });
    let (lo, hi) = order.split_at_mut(mid);
    let left = build_recursive(points, lo, offset, nodes);
    let right = build_recursive(points, hi, offset + mid, nodes);
    nodes[node] = Node::Split {
        axis,
        value,
        left,
        right,
    };
    node
}

/// 点集跨度最大的坐标轴.
fn widest_axis(points: &[Point3d], order: &[usize]) -> usize {
    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for &i in order {
        for d in 0..3 {
            lo[d] = lo[d].min(points[i][d]);
            hi[d] = hi[d].max(points[i][d]);
        }
    }
    (0..3)
        .max_by(|&a, &b| (hi[a] - lo[a]).total_cmp(&(hi[b] - lo[b])))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<Point3d> {
        let mut v = vec![];
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    v.push([i as f64, j as f64 * 0.5, k as f64 * 2.0]);
                }
            }
        }
        v
    }

    fn brute(points: &[Point3d], q: &Point3d) -> f64 {
        points
            .iter()
            .map(|p| squared_distance(p, q))
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_build_empty() {
        assert!(KdTree::build(vec![], vec![]).is_none());
        assert!(KdTree::build(vec![[0.0; 3]], vec![]).is_none());
    }

    #[test]
    fn test_single_point() {
        let t = KdTree::build(vec![[1.0, 2.0, 3.0]], vec![7]).unwrap();
        let n = t.nearest(&[1.0, 2.0, 4.0], 0.0).unwrap();
        assert_eq!(n.id, 7);
        assert!((n.distance() - 1.0).abs() < 1e-12);
    }

    /// 每个节点的划分满足: 左子树坐标不大于划分值, 右子树坐标不小于划分值.
    #[test]
    fn test_split_invariant() {
        let pts = grid(6);
        let ids = (0..pts.len() as PointId).collect();
        let t = KdTree::build(pts, ids).unwrap();

        fn range(t: &KdTree, node: usize) -> (usize, usize) {
            match t.nodes[node] {
                Node::Leaf { start, end } => (start, end),
                Node::Split { left, right, .. } => (range(t, left).0, range(t, right).1),
            }
        }
        for node in &t.nodes {
            if let Node::Split {
                axis,
                value,
                left,
                right,
            } = *node
            {
                let (ls, le) = range(&t, left);
                let (rs, re) = range(&t, right);
                assert!(t.points[ls..le].iter().all(|p| p[axis] <= value));
                assert!(t.points[rs..re].iter().all(|p| p[axis] >= value));
            }
        }
    }

    #[test]
    fn test_exact_matches_brute_force() {
        let pts = grid(7);
        let ids = (0..pts.len() as PointId).collect();
        let t = KdTree::build(pts.clone(), ids).unwrap();
        for q in [[0.3, 0.1, 5.9], [-3.0, 10.0, 0.0], [3.49, 1.26, 7.01], [6.0, 3.0, 12.0]] {
            let n = t.nearest(&q, 0.0).unwrap();
            assert!((n.dist_sq - brute(&pts, &q)).abs() < 1e-12);
            assert!((squared_distance(&pts[n.id as usize], &q) - n.dist_sq).abs() < 1e-12);
        }
    }

    #[test]
    fn test_k_nearest_sorted() {
        let pts = grid(5);
        let ids = (0..pts.len() as PointId).collect();
        let t = KdTree::build(pts.clone(), ids).unwrap();
        let q = [2.2, 1.1, 4.3];
        let res = t.k_nearest(&q, 8, 0.0);
        assert_eq!(res.len(), 8);
        assert!(res.windows(2).all(|w| w[0].dist_sq <= w[1].dist_sq));

        let mut all: Vec<f64> = pts.iter().map(|p| squared_distance(p, &q)).collect();
        all.sort_by(f64::total_cmp);
        for (r, e) in res.iter().zip(all.iter()) {
            assert!((r.dist_sq - e).abs() < 1e-12);
        }
    }

    /// 近似查询的距离不超过真实最近距离的 `1 + eps` 倍.
    #[test]
    fn test_approximate_bound() {
        let pts = grid(8);
        let ids = (0..pts.len() as PointId).collect();
        let t = KdTree::build(pts.clone(), ids).unwrap();
        let eps = 0.5;
        for q in [[0.7, 0.2, 3.3], [4.4, 2.6, 9.1], [7.9, -1.0, 15.5]] {
            let n = t.nearest(&q, eps).unwrap();
            assert!(n.distance() <= (1.0 + eps) * brute(&pts, &q).sqrt() + 1e-12);
        }
    }
}
