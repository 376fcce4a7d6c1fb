#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供扩散加权 MRI 的 ODF 极大值方向提取, 以及三维点云的最近邻点定位.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 球谐函数固定为 4 阶实对称基 (15 个系数), 不支持更高阶.
//! 2. 该 crate 不负责图像文件读写. 调用方需自行把数据整理成 `ndarray` 格式,
//!   按 `(z, h, w)` 顺序存放.
//! 3. 非法输入在边界处检查. 定位器以哨兵值 + 日志警告的方式处理,
//!   极大值提取器则返回 `Err`.
//!
//! # 开发计划
//!
//! ### k-d 树最近邻点定位 ✅
//!
//! 按点源身份和修改计数惰性重建. 提供读写锁包装以便多线程共享.
//!
//! 实现位于 `dwi-berry/src/locator`.
//!
//! ### 4 阶实对称球谐函数 ✅
//!
//! 基函数, 连带勒让德函数, 球面函数投影.
//!
//! 实现位于 `dwi-berry/src/sh`.
//!
//! ### ODF 极大值提取 ✅
//!
//! 1. `φ` 一维扫描 + 卡尔达诺三次方程求根 ✅
//! 2. Hessian 判别极大值 ✅
//! 3. 自适应步长 ✅
//! 4. 对极聚类, 幅值阈值, 截断, 归一化 ✅
//! 5. 峰个数图像, 方向图像, 方向场折线 ✅
//!
//! 实现位于 `dwi-berry/src/odf`.
//!
//! ### 解析 Q-ball 重建 ✅
//!
//! 没有系数图像时, 从 DWI 数据重建 (立体角形式).
//!
//! 实现位于 `dwi-berry/src/qball`.
//!
//! ### 更高阶球谐函数 ⌛️
//!
//! 候选点搜索的解析式目前只对 4 阶成立.
//!
//! ### 消融实验 ✅
//!
//! k-d 树 vs 暴力搜索, 自适应步长 vs 固定步长. 见 `ablations/search`.

/// 三维索引 `(z, h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 三维物理坐标 `[x, y, z]`.
pub type Point3d = [f64; 3];

pub mod consts;

/// 图像基础数据结构.
pub mod image;

pub use image::{DwiImage, GeometryAttr, ImageGeometry, MaskImage, ShCoeffImage};

pub mod locator;

pub mod odf;

pub mod qball;

pub mod sh;

pub mod synthetic;

pub mod prelude;
