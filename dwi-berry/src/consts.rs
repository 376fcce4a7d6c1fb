//! 通用常量.

/// 球谐函数相关常量.
pub mod sh {
    /// 球谐函数最高阶数. 仅支持偶数阶 (对称 ODF).
    pub const SH_ORDER: usize = 4;

    /// 4 阶实对称球谐函数的系数个数: `(L + 1)(L + 2) / 2`.
    pub const N_COEFFS: usize = (SH_ORDER + 1) * (SH_ORDER + 2) / 2;
}

/// ODF 极大值提取的默认参数与内部阈值.
pub mod odf {
    /// `phi` 在 `[0, 2π)` 上扫描的基础步长 (弧度).
    pub const PHI_STEP: f64 = 0.005;

    /// 候选点 `|∂ODF / ∂θ|` 的接受阈值. 小于该值时视为驻点.
    pub const DTHETA_THRESHOLD: f64 = 0.03;

    /// 自适应步长的下限, 以 `PHI_STEP` 为单位. 保证扫描一定会终止.
    pub const MIN_STEP_RATIO: f64 = 1e-3;

    /// 聚类时候选方向与簇种子之间的平方欧氏距离阈值.
    pub const CLUSTER_DISTANCE: f64 = 0.4;

    /// `MaxVecNorm` 归一化时, 最大向量模长低于该值则不做缩放.
    pub const MIN_MAX_NORM: f64 = 1e-4;

    /// 种子网格 (斐波那契点阵) 的方向个数.
    pub const SEED_GRID_SIZE: usize = 200;

    /// 种子网格上判断局部极大值时的邻域半径 (弧度).
    pub const SEED_NEIGHBOUR_ANGLE: f64 = 0.35;

    /// 局部上升的最大迭代次数.
    pub const ASCENT_MAX_ITER: usize = 100;

    /// 每次迭代中步长减半的最多次数.
    pub const ASCENT_MAX_BACKTRACK: usize = 40;

    /// 数值梯度的差分步长.
    pub const ASCENT_FD_STEP: f64 = 1e-5;

    /// 切向梯度模长低于该值时停止上升.
    pub const ASCENT_MIN_GRADIENT: f64 = 1e-10;

    /// 默认峰值阈值 (相对该体素最大幅值).
    pub const DEFAULT_PEAK_THRESHOLD: f64 = 0.2;

    /// 默认每体素最多保留的峰个数.
    pub const DEFAULT_MAX_NUM_PEAKS: usize = 10;
}

/// 最近邻点定位相关常量.
pub mod locator {
    /// 点 ID 无效值. 在索引尚未建立时作为查询结果返回.
    pub const INVALID_POINT_ID: i64 = -1;

    /// 距离无效值. 在索引尚未建立时作为查询结果返回.
    pub const INVALID_DISTANCE: f64 = -1.0;

    /// k-d 树叶子节点最多容纳的点数.
    pub const LEAF_SIZE: usize = 16;
}

/// 单位长度判零阈值. 模长低于该值的向量视为零向量.
pub const EPS: f64 = 1e-6;
