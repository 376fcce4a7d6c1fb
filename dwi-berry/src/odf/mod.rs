//! ODF 极大值方向提取.
//!
//! 输入为逐体素的 4 阶球谐系数 (可由 DWI 数据经 Q-ball 重建得到), 输出为每个体素上
//! 按幅值降序排列的若干峰方向, 以及峰个数图像和用于显示的方向场折线.
//!
//! 单个体素的处理流程:
//!
//! 1. `φ` 在 `[0, 2π)` 上扫描, 每一步解三次方程得到 `∂φ ODF = 0` 的 `θ`,
//!    再用 `∂θ ODF` 与 Hessian 挑出极大值候选点; 粗网格上的局部极大值也作为候选点;
//! 2. 候选方向按对极距离聚类, 每簇取向量和方向, 再沿球面梯度上升到局部极大值;
//! 3. 计算极大值方向上的 ODF 幅值, 低于 `阈值 × 最大幅值` 的丢弃, 最多保留 `MaxNumPeaks` 个;
//! 4. 按 [`NormalizationMethod`] 缩放.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::Vector3;
use ndarray::{Array3, Array4};

use crate::consts::odf::{DEFAULT_MAX_NUM_PEAKS, DEFAULT_PEAK_THRESHOLD};
use crate::image::{DwiImage, GeometryAttr, ImageGeometry, MaskImage, ShCoeffImage};
use crate::qball::ShReconstructor;
use crate::sh::ShCoeffs;
use crate::Idx3d;

mod candidate;
mod cluster;
pub mod cubic;
mod error;
mod field;
mod refine;

pub use cluster::{normalize_peaks, Peak};
pub use error::{ExtractError, ExtractResult};
pub use field::DirectionField;

use candidate::find_candidates;
use cluster::{cluster_candidates, select_peaks, Cluster};
use refine::grid_seeds;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::prelude::*;
    }
}

/// 峰向量的归一化方式.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NormalizationMethod {
    /// 不归一化, 向量长度为 ODF 幅值.
    NoNorm,
    /// 每个向量各自单位化.
    SingleVecNorm,
    /// 除以该体素上最大的向量长度.
    #[default]
    MaxVecNorm,
}

/// 提取参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractParams {
    peak_threshold: f64,
    max_num_peaks: usize,
    normalization: NormalizationMethod,
    adaptive_step_width: bool,
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self {
            peak_threshold: DEFAULT_PEAK_THRESHOLD,
            max_num_peaks: DEFAULT_MAX_NUM_PEAKS,
            normalization: NormalizationMethod::default(),
            adaptive_step_width: true,
        }
    }
}

impl ExtractParams {
    /// 构建提取参数. `peak_threshold ∈ (0, 1]`, `1 <= max_num_peaks <= 255`.
    pub fn new(peak_threshold: f64, max_num_peaks: usize) -> ExtractResult<Self> {
        let p = Self {
            peak_threshold,
            max_num_peaks,
            ..Self::default()
        };
        p.validate()?;
        Ok(p)
    }

    /// 设置归一化方式.
    pub fn with_normalization(mut self, method: NormalizationMethod) -> Self {
        self.normalization = method;
        self
    }

    /// 是否在固定步长扫描之后追加一轮自适应步长扫描.
    ///
    /// 两种方式得到的峰方向都会细化到局部极大值, 自适应扫描只是提供更密的候选点.
    pub fn with_adaptive_step_width(mut self, on: bool) -> Self {
        self.adaptive_step_width = on;
        self
    }

    /// 峰值阈值 (相对最大幅值).
    #[inline]
    pub fn peak_threshold(&self) -> f64 {
        self.peak_threshold
    }

    /// 每体素最多保留的峰个数.
    #[inline]
    pub fn max_num_peaks(&self) -> usize {
        self.max_num_peaks
    }

    /// 归一化方式.
    #[inline]
    pub fn normalization(&self) -> NormalizationMethod {
        self.normalization
    }

    /// 是否使用自适应步长?
    #[inline]
    pub fn adaptive_step_width(&self) -> bool {
        self.adaptive_step_width
    }

    fn validate(&self) -> ExtractResult<()> {
        if !(self.peak_threshold > 0.0 && self.peak_threshold <= 1.0) {
            return Err(ExtractError::InvalidParameter("peak threshold must be in (0, 1]"));
        }
        if self.max_num_peaks == 0 || self.max_num_peaks > u8::MAX as usize {
            return Err(ExtractError::InvalidParameter("max number of peaks must be in [1, 255]"));
        }
        Ok(())
    }
}

/// 单体素计算的临时缓冲区. 每个工作线程一份, 反复使用.
#[derive(Clone, Debug, Default)]
pub struct PeakWorkspace {
    candidates: Vec<(f64, f64)>,
    grid_values: Vec<f64>,
    clusters: Vec<Cluster>,
    peaks: Vec<Peak>,
}

impl PeakWorkspace {
    /// 空缓冲区.
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次计算得到的候选点 `(θ, φ)`, 含网格种子.
    #[inline]
    pub fn candidates(&self) -> &[(f64, f64)] {
        &self.candidates
    }

    /// 最近一次计算保留的峰 (归一化之前), 按幅值降序.
    #[inline]
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }
}

/// 提取单个体素的峰方向 (体素局部坐标系, 未乘方向矩阵).
///
/// 结果按幅值降序, 个数不超过 `params.max_num_peaks()`.
pub fn extract_voxel(
    coeffs: &ShCoeffs,
    params: &ExtractParams,
    ws: &mut PeakWorkspace,
) -> Vec<Vector3<f64>> {
    ws.candidates.clear();
    find_candidates(coeffs, params.adaptive_step_width, &mut ws.candidates);
    grid_seeds(coeffs, &mut ws.grid_values, &mut ws.candidates);
    cluster_candidates(&ws.candidates, &mut ws.clusters);
    select_peaks(
        coeffs,
        &ws.clusters,
        params.peak_threshold,
        params.max_num_peaks,
        &mut ws.peaks,
    );
    normalize_peaks(&ws.peaks, params.normalization)
}

/// 协作式取消标记. 克隆得到的标记共享同一状态.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 新的未取消标记.
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// 是否已请求取消?
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// 提取结果.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaximaOutput {
    geometry: ImageGeometry,
    num_directions: Array3<u8>,
    directions: Vec<Array4<f32>>,
    field: DirectionField,
    processed_voxels: usize,
}

impl MaximaOutput {
    /// 每个体素上的峰个数.
    #[inline]
    pub fn num_directions(&self) -> &Array3<u8> {
        &self.num_directions
    }

    /// 方向图像个数, 等于 `MaxNumPeaks`.
    #[inline]
    pub fn num_direction_images(&self) -> usize {
        self.directions.len()
    }

    /// 第 `k` 个方向图像, 形状 `(z, h, w, 3)`. 没有第 `k` 个峰的体素为零向量.
    #[inline]
    pub fn direction_image(&self, k: usize) -> Option<&Array4<f32>> {
        self.directions.get(k)
    }

    /// 体素 `idx` 上第 `k` 个峰的方向 (已乘方向矩阵).
    pub fn direction_at(&self, k: usize, (z, h, w): Idx3d) -> Option<Vector3<f64>> {
        if !self.check(&(z, h, w)) || k >= self.num_directions[(z, h, w)] as usize {
            return None;
        }
        let img = self.directions.get(k)?;
        Some(Vector3::new(
            img[[z, h, w, 0]] as f64,
            img[[z, h, w, 1]] as f64,
            img[[z, h, w, 2]] as f64,
        ))
    }

    /// 方向场折线.
    #[inline]
    pub fn field(&self) -> &DirectionField {
        &self.field
    }

    /// 实际计算过的体素个数 (掩膜外的体素不计).
    #[inline]
    pub fn processed_voxels(&self) -> usize {
        self.processed_voxels
    }
}

impl GeometryAttr for MaximaOutput {
    #[inline]
    fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }
}

/// 单体素任务所需的只读上下文, 可在线程间共享.
struct VoxelTask<'b> {
    params: &'b ExtractParams,
    mask: Option<&'b MaskImage>,
    cancel: Option<&'b CancelToken>,
    image: &'b ShCoeffImage,
}

impl VoxelTask<'_> {
    /// 处理单个体素. 掩膜外返回 `Ok(None)`.
    fn run(&self, ws: &mut PeakWorkspace, idx: Idx3d) -> ExtractResult<Option<Vec<Vector3<f64>>>> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ExtractError::Cancelled);
        }
        if self.mask.is_some_and(|m| !m.is_inside(idx)) {
            return Ok(None);
        }
        let coeffs = self.image.coeffs_at(idx);
        Ok(Some(extract_voxel(&coeffs, self.params, ws)))
    }
}

/// ODF 极大值提取器.
///
/// 优先使用给定的球谐系数图像; 未给出时, 用给定的重建器从 DWI 数据重建.
#[derive(Clone, Default)]
pub struct OdfMaximaExtractor<'a> {
    params: ExtractParams,
    coefficients: Option<&'a ShCoeffImage>,
    mask: Option<&'a MaskImage>,
    dwi: Option<(&'a DwiImage, &'a dyn ShReconstructor)>,
    cancel: Option<CancelToken>,
}

impl<'a> OdfMaximaExtractor<'a> {
    /// 使用给定参数构建.
    pub fn new(params: ExtractParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// 设置球谐系数图像.
    pub fn with_coefficients(mut self, image: &'a ShCoeffImage) -> Self {
        self.coefficients = Some(image);
        self
    }

    /// 设置掩膜. 掩膜值为 0 的体素不做计算, 峰个数为 0.
    pub fn with_mask(mut self, mask: &'a MaskImage) -> Self {
        self.mask = Some(mask);
        self
    }

    /// 设置 DWI 数据及重建器, 在没有系数图像时使用.
    pub fn with_dwi(mut self, dwi: &'a DwiImage, reconstructor: &'a dyn ShReconstructor) -> Self {
        self.dwi = Some((dwi, reconstructor));
        self
    }

    /// 设置取消标记. 每处理一个体素前检查一次.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 提取参数.
    #[inline]
    pub fn params(&self) -> &ExtractParams {
        &self.params
    }

    fn coefficient_image(&self) -> ExtractResult<Cow<'a, ShCoeffImage>> {
        match (self.coefficients, self.dwi) {
            (Some(img), _) => Ok(Cow::Borrowed(img)),
            (None, Some((dwi, reconstructor))) => {
                log::info!("no SH coefficient image given, reconstructing from DWI");
                Ok(Cow::Owned(reconstructor.reconstruct(dwi)?))
            }
            (None, None) => Err(ExtractError::MissingCoefficients),
        }
    }

    /// 执行提取. 任何错误都不会产生部分输出.
    pub fn run(&self) -> ExtractResult<MaximaOutput> {
        self.params.validate()?;
        let image = self.coefficient_image()?;
        if let Some(mask) = self.mask {
            if mask.shape() != image.shape() {
                return Err(ExtractError::ShapeMismatch(image.shape(), mask.shape()));
            }
        }

        let (z, h, w) = image.shape();
        log::info!(
            "extracting ODF maxima on {z}x{h}x{w} voxels: threshold {}, at most {} peaks, {:?}",
            self.params.peak_threshold,
            self.params.max_num_peaks,
            self.params.normalization
        );

        let voxels: Vec<Idx3d> = itertools::iproduct!(0..z, 0..h, 0..w).collect();
        let image: &ShCoeffImage = &image;
        let task = VoxelTask {
            params: &self.params,
            mask: self.mask,
            cancel: self.cancel.as_ref(),
            image,
        };

        #[cfg(feature = "rayon")]
        let peaks: Vec<Option<Vec<Vector3<f64>>>> = voxels
            .par_iter()
            .map_init(PeakWorkspace::new, |ws, &idx| task.run(ws, idx))
            .collect::<ExtractResult<_>>()?;

        #[cfg(not(feature = "rayon"))]
        let peaks: Vec<Option<Vec<Vector3<f64>>>> = {
            let mut ws = PeakWorkspace::new();
            voxels
                .iter()
                .map(|&idx| task.run(&mut ws, idx))
                .collect::<ExtractResult<_>>()?
        };

        let output = self.assemble(image, &voxels, peaks);
        log::info!(
            "ODF maxima extraction done: {} voxels processed, {} segments",
            output.processed_voxels,
            output.field.len()
        );
        Ok(output)
    }

    /// 把逐体素结果写入输出图像. 方向乘以图像方向矩阵后写出.
    fn assemble(
        &self,
        image: &ShCoeffImage,
        voxels: &[Idx3d],
        peaks: Vec<Option<Vec<Vector3<f64>>>>,
    ) -> MaximaOutput {
        let geometry = image.geometry().clone();
        let (z, h, w) = geometry.shape();
        let rotation = geometry.direction();
        let scale = geometry.min_spacing();

        let mut num_directions = Array3::zeros((z, h, w));
        let mut directions = vec![Array4::zeros((z, h, w, 3)); self.params.max_num_peaks];
        let mut field = DirectionField::new();
        let mut processed_voxels = 0;

        for (&idx, dirs) in voxels.iter().zip(peaks) {
            let Some(dirs) = dirs else {
                continue;
            };
            processed_voxels += 1;
            num_directions[idx] = dirs.len() as u8;
            let center = geometry.voxel_to_world(idx);
            for (img, d) in directions.iter_mut().zip(dirs) {
                let d = rotation * d;
                let (vz, vh, vw) = idx;
                for c in 0..3 {
                    img[[vz, vh, vw, c]] = d[c] as f32;
                }
                field.push_segment(&center, &d, scale);
            }
        }

        MaximaOutput {
            geometry,
            num_directions,
            directions,
            field,
            processed_voxels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{isotropic_coeffs, BinghamOdf};

    #[test]
    fn test_params_validation() {
        assert!(ExtractParams::new(0.0, 3).is_err());
        assert!(ExtractParams::new(1.5, 3).is_err());
        assert!(ExtractParams::new(f64::NAN, 3).is_err());
        assert!(ExtractParams::new(0.5, 0).is_err());
        assert!(ExtractParams::new(0.5, 256).is_err());
        let p = ExtractParams::new(1.0, 255).unwrap();
        assert_eq!(p.normalization(), NormalizationMethod::MaxVecNorm);
        assert!(p.adaptive_step_width());
    }

    #[test]
    fn test_isotropic_voxel() {
        let mut ws = PeakWorkspace::new();
        let v = extract_voxel(&isotropic_coeffs(), &ExtractParams::default(), &mut ws);
        assert!(v.is_empty());
        assert!(ws.candidates().is_empty());
    }

    #[test]
    fn test_single_bingham_voxel() {
        let b = BinghamOdf::new(Vector3::new(0.36, 0.48, 0.8), 2.0, 6.0, 0.3).unwrap();
        let mut ws = PeakWorkspace::new();
        let params = ExtractParams::default().with_normalization(NormalizationMethod::SingleVecNorm);
        let v = extract_voxel(&b.coeffs(), &params, &mut ws);
        assert_eq!(v.len(), 1);
        assert!(v[0].dot(&b.axis()).abs() > 1f64.to_radians().cos());
        assert!((v[0].norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_coefficients() {
        let e = OdfMaximaExtractor::new(ExtractParams::default()).run().unwrap_err();
        assert_eq!(e, ExtractError::MissingCoefficients);
    }

    #[test]
    fn test_cancelled() {
        let img = ShCoeffImage::zeros(ImageGeometry::with_shape((1, 1, 2)));
        let token = CancelToken::new();
        token.cancel();
        let e = OdfMaximaExtractor::new(ExtractParams::default())
            .with_coefficients(&img)
            .with_cancel_token(token)
            .run()
            .unwrap_err();
        assert_eq!(e, ExtractError::Cancelled);
    }
}
