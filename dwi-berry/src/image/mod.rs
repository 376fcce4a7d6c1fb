//! 三维医学图像基础数据结构.
//!
//! 数据一律按 `(z, h, w)` 顺序存放. 连续索引 (ITK 风格) 为 `(x, y, z) = (w, h, z)`,
//! 物理坐标为 `origin + direction · diag(spacing) · index`, 其中 `spacing`, `origin`
//! 均按 `[x, y, z]` 排列.

use std::ops::Index;

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Array4, ArrayView1, Axis};

use crate::consts::sh::N_COEFFS;
use crate::sh::ShCoeffs;
use crate::{Idx3d, Point3d};

/// 图像几何信息: 形状, 体素间距, 原点和方向矩阵.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageGeometry {
    shape: Idx3d,
    spacing: [f64; 3],
    origin: [f64; 3],
    direction: [[f64; 3]; 3],
}

impl ImageGeometry {
    /// 构建图像几何信息. `direction` 按行给出.
    ///
    /// 间距必须全部为正的有限值, 否则返回 `None`.
    pub fn new(
        shape: Idx3d,
        spacing: [f64; 3],
        origin: [f64; 3],
        direction: [[f64; 3]; 3],
    ) -> Option<Self> {
        let spacing_ok = spacing.iter().all(|s| s.is_finite() && *s > 0.0);
        let finite = origin.iter().chain(direction.iter().flatten()).all(|v| v.is_finite());
        if spacing_ok && finite {
            Some(Self {
                shape,
                spacing,
                origin,
                direction,
            })
        } else {
            None
        }
    }

    /// 单位间距, 零原点, 单位方向矩阵.
    pub fn with_shape(shape: Idx3d) -> Self {
        Self {
            shape,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// 方向矩阵.
    #[inline]
    pub fn direction(&self) -> Matrix3<f64> {
        let d = &self.direction;
        Matrix3::new(
            d[0][0], d[0][1], d[0][2], d[1][0], d[1][1], d[1][2], d[2][0], d[2][1], d[2][2],
        )
    }
}

/// 图像几何信息的共用属性和部分通用操作.
pub trait GeometryAttr {
    /// 获取几何信息.
    fn geometry(&self) -> &ImageGeometry;

    /// 获取数据形状大小 `(z, h, w)`.
    #[inline]
    fn shape(&self) -> Idx3d {
        self.geometry().shape
    }

    /// 获取体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 体素间距, 按 `[x, y, z]` 排列, 以毫米为单位.
    #[inline]
    fn spacing(&self) -> [f64; 3] {
        self.geometry().spacing
    }

    /// 最小体素间距.
    #[inline]
    fn min_spacing(&self) -> f64 {
        self.spacing().into_iter().fold(f64::INFINITY, f64::min)
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [x, y, z] = self.spacing();
        x == y && x == z
    }

    /// 原点, 按 `[x, y, z]` 排列.
    #[inline]
    fn origin(&self) -> [f64; 3] {
        self.geometry().origin
    }

    /// 线性体素编号 (按 `(z, h, w)` 行优先).
    #[inline]
    fn linear_index(&self, (z, h, w): Idx3d) -> usize {
        let (_, sh, sw) = self.shape();
        (z * sh + h) * sw + w
    }

    /// 体素中心的物理坐标.
    fn voxel_to_world(&self, (z, h, w): Idx3d) -> Point3d {
        let g = self.geometry();
        let [sx, sy, sz] = g.spacing;
        let v = Vector3::new(w as f64 * sx, h as f64 * sy, z as f64 * sz);
        let p = g.direction() * v + Vector3::from(g.origin);
        [p.x, p.y, p.z]
    }
}

impl GeometryAttr for ImageGeometry {
    #[inline]
    fn geometry(&self) -> &ImageGeometry {
        self
    }
}

/// 球谐系数图像, 数据形状 `(z, h, w, 15)`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShCoeffImage {
    geometry: ImageGeometry,
    data: Array4<f32>,
}

impl ShCoeffImage {
    /// 由几何信息和数据构建. 数据形状必须是 `(z, h, w, 15)`.
    pub fn new(geometry: ImageGeometry, data: Array4<f32>) -> Option<Self> {
        let (z, h, w) = geometry.shape;
        if data.dim() == (z, h, w, N_COEFFS) {
            Some(Self { geometry, data })
        } else {
            None
        }
    }

    /// 全零图像.
    pub fn zeros(geometry: ImageGeometry) -> Self {
        let (z, h, w) = geometry.shape;
        Self {
            data: Array4::zeros((z, h, w, N_COEFFS)),
            geometry,
        }
    }

    /// 逐体素生成系数.
    pub fn from_fn<F>(geometry: ImageGeometry, mut f: F) -> Self
    where
        F: FnMut(Idx3d) -> ShCoeffs,
    {
        let (_, h, w) = geometry.shape;
        let mut out = Self::zeros(geometry);
        out.data
            .lanes_mut(Axis(3))
            .into_iter()
            .enumerate()
            .for_each(|(i, mut lane)| {
                let idx = (i / (h * w), (i / w) % h, i % w);
                for (dst, src) in lane.iter_mut().zip(f(idx)) {
                    *dst = src as f32;
                }
            });
        out
    }

    /// 某个体素上的系数视图.
    #[inline]
    pub fn lane(&self, (z, h, w): Idx3d) -> ArrayView1<'_, f32> {
        self.data.slice(ndarray::s![z, h, w, ..])
    }

    /// 某个体素上的系数, 转为 `f64`.
    pub fn coeffs_at(&self, idx: Idx3d) -> ShCoeffs {
        let mut out = [0.0; N_COEFFS];
        for (o, v) in out.iter_mut().zip(self.lane(idx)) {
            *o = *v as f64;
        }
        out
    }

    /// 写入某个体素上的系数.
    pub fn set_coeffs(&mut self, (z, h, w): Idx3d, coeffs: &ShCoeffs) {
        let mut lane = self.data.slice_mut(ndarray::s![z, h, w, ..]);
        for (dst, src) in lane.iter_mut().zip(coeffs) {
            *dst = *src as f32;
        }
    }

    /// 原始数据.
    #[inline]
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    #[inline]
    pub(crate) fn data_mut(&mut self) -> &mut Array4<f32> {
        &mut self.data
    }
}

impl GeometryAttr for ShCoeffImage {
    #[inline]
    fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }
}

/// 二值掩膜. 体素值大于 0 时参与计算.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaskImage {
    geometry: ImageGeometry,
    data: Array3<u8>,
}

impl MaskImage {
    /// 由几何信息和数据构建. 数据形状必须与几何信息一致.
    pub fn new(geometry: ImageGeometry, data: Array3<u8>) -> Option<Self> {
        if data.dim() == geometry.shape {
            Some(Self { geometry, data })
        } else {
            None
        }
    }

    /// 全部体素都参与计算的掩膜.
    pub fn full(geometry: ImageGeometry) -> Self {
        Self {
            data: Array3::from_elem(geometry.shape, 1),
            geometry,
        }
    }

    /// 体素是否参与计算?
    #[inline]
    pub fn is_inside(&self, idx: Idx3d) -> bool {
        self.data[idx] > 0
    }

    /// 设置某个体素的掩膜值.
    #[inline]
    pub fn set(&mut self, idx: Idx3d, value: u8) {
        self.data[idx] = value;
    }

    /// 原始数据.
    #[inline]
    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }
}

impl GeometryAttr for MaskImage {
    #[inline]
    fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }
}

impl Index<Idx3d> for MaskImage {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

/// 扩散加权图像, 数据形状 `(z, h, w, n)`, 第四维对应梯度表中的各个方向.
///
/// 梯度向量模长为 0 的通道视为基线 (b0) 图像.
#[derive(Clone, Debug)]
pub struct DwiImage {
    geometry: ImageGeometry,
    data: Array4<f32>,
    gradients: Vec<Vector3<f64>>,
    b_value: f64,
}

impl DwiImage {
    /// 构建 DWI 图像. 数据第四维长度必须等于梯度个数, 且 `b_value > 0`.
    pub fn new(
        geometry: ImageGeometry,
        data: Array4<f32>,
        gradients: Vec<Vector3<f64>>,
        b_value: f64,
    ) -> Option<Self> {
        let (z, h, w) = geometry.shape;
        if data.dim() == (z, h, w, gradients.len()) && b_value > 0.0 {
            Some(Self {
                geometry,
                data,
                gradients,
                b_value,
            })
        } else {
            None
        }
    }

    /// 梯度表.
    #[inline]
    pub fn gradients(&self) -> &[Vector3<f64>] {
        &self.gradients
    }

    /// b 值.
    #[inline]
    pub fn b_value(&self) -> f64 {
        self.b_value
    }

    /// 原始数据.
    #[inline]
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }
}

impl GeometryAttr for DwiImage {
    #[inline]
    fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }
}
