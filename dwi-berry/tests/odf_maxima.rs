mod common;

use common::synthetic::{random_fibres, tensor_dwi, uniform_sh_image};
use common::{angle_deg, init_logger};
use dwi_berry::prelude::*;
use dwi_berry::sh::odf_value_along;
use dwi_berry::synthetic::{isotropic_coeffs, mixture_coeffs, BinghamOdf};
use nalgebra::{Matrix3, Vector3};
use ndarray::{s, Array3};

fn bingham(axis: [f64; 3], k1: f64, k2: f64, rot: f64) -> BinghamOdf {
    BinghamOdf::new(Vector3::from(axis), k1, k2, rot).unwrap()
}

/// 两个 Bingham 分量之和: 两个峰, 幅值分别约为 0.245 与 0.235.
fn crossing() -> (BinghamOdf, BinghamOdf, ShCoeffs) {
    let a = bingham([0.36, 0.48, 0.8], 2.0, 6.0, 0.3);
    let b = bingham([0.8, -0.6, 0.0], 3.0, 9.0, 1.0);
    let c = mixture_coeffs(&[a, b]);
    (a, b, c)
}

/// 单峰 ODF: 恰好一个峰, 与真实方向 (或其反方向) 的夹角很小.
#[test]
fn test_single_peak_directions() {
    init_logger();
    let params = ExtractParams::default();
    let mut ws = PeakWorkspace::new();
    for (axis, k1, k2) in [
        ([0.36, 0.48, 0.8], 2.0, 6.0),
        ([1.0, 0.5, 0.3], 2.0, 6.0),
        ([0.2, -0.7, 0.4], 2.0, 5.0),
    ] {
        let b = bingham(axis, k1, k2, 0.3);
        let peaks = extract_voxel(&b.coeffs(), &params, &mut ws);
        assert_eq!(peaks.len(), 1, "axis = {axis:?}");
        assert!(angle_deg(&peaks[0], &b.axis()) < 1.0, "axis = {axis:?}");
        // MaxVecNorm: 最大的向量长度为 1.
        assert!((peaks[0].norm() - 1.0).abs() < 1e-9);
    }
}

/// 轴对称 (两个集中度相等) 的单峰 ODF, 两种扫描方式都只得到一个峰.
#[test]
fn test_axially_symmetric_fibres() {
    let mut ws = PeakWorkspace::new();
    for axis in [
        [0.36, 0.48, 0.8],
        [1.0, 0.0, 0.0],
        [1.0, 0.5, 0.3],
        [0.2, -0.7, 0.4],
        [0.0, 0.0, 1.0],
    ] {
        for k in [2.0, 4.0, 8.0] {
            let b = bingham(axis, k, k, 0.0);
            for adaptive in [true, false] {
                let params = ExtractParams::default().with_adaptive_step_width(adaptive);
                let peaks = extract_voxel(&b.coeffs(), &params, &mut ws);
                assert_eq!(peaks.len(), 1, "axis = {axis:?}, k = {k}, adaptive = {adaptive}");
                assert!(angle_deg(&peaks[0], &b.axis()) < 1.0, "axis = {axis:?}, k = {k}");
            }
        }
    }
}

/// 随机朝向的单纤维, 两种扫描方式都能找回峰方向.
#[test]
fn test_random_single_fibres() {
    let fibres = random_fibres(40, 2.0, 6.0, 7);
    let mut ws = PeakWorkspace::new();
    for adaptive in [true, false] {
        let params = ExtractParams::default().with_adaptive_step_width(adaptive);
        for (i, b) in fibres.iter().enumerate() {
            let peaks = extract_voxel(&b.coeffs(), &params, &mut ws);
            assert_eq!(peaks.len(), 1, "fibre #{i}, adaptive = {adaptive}");
            assert!(angle_deg(&peaks[0], &b.axis()) < 2.0, "fibre #{i}, adaptive = {adaptive}");
        }
    }
}

#[test]
fn test_crossing_fibres() {
    let (a, b, c) = crossing();
    let mut ws = PeakWorkspace::new();
    for adaptive in [true, false] {
        let params = ExtractParams::default().with_adaptive_step_width(adaptive);
        let peaks = extract_voxel(&c, &params, &mut ws);
        assert_eq!(peaks.len(), 2);
        assert!(angle_deg(&peaks[0], &a.axis()) < 3.0);
        assert!(angle_deg(&peaks[1], &b.axis()) < 3.0);
        assert!(peaks[0].norm() >= peaks[1].norm());
    }
}

/// 峰个数上限与阈值.
#[test]
fn test_count_bound_and_threshold() {
    let (a, _, c) = crossing();
    let mut ws = PeakWorkspace::new();

    let one = ExtractParams::new(0.2, 1).unwrap();
    let peaks = extract_voxel(&c, &one, &mut ws);
    assert_eq!(peaks.len(), 1);
    assert!(angle_deg(&peaks[0], &a.axis()) < 3.0);

    let strict = ExtractParams::new(0.99, 10).unwrap();
    assert_eq!(extract_voxel(&c, &strict, &mut ws).len(), 1);

    // 幅值直接在返回的方向上求值.
    for thr in [0.05, 0.2, 0.5, 0.9] {
        let params = ExtractParams::new(thr, 10)
            .unwrap()
            .with_normalization(NormalizationMethod::SingleVecNorm);
        let dirs = extract_voxel(&c, &params, &mut ws);
        assert!(!dirs.is_empty() && dirs.len() <= 10);
        let amps: Vec<f64> = dirs.iter().map(|d| odf_value_along(&c, d)).collect();
        let max = amps[0];
        assert!(amps.iter().all(|&a| a >= thr * max - 1e-6), "thr = {thr}");
        assert!(amps.windows(2).all(|w| w[0] >= w[1] - 1e-9), "thr = {thr}");
    }
}

#[test]
fn test_normalization_methods() {
    let (_, _, c) = crossing();
    let mut ws = PeakWorkspace::new();

    let raw = extract_voxel(
        &c,
        &ExtractParams::default().with_normalization(NormalizationMethod::NoNorm),
        &mut ws,
    );
    for (v, p) in raw.iter().zip(ws.peaks()) {
        assert!((v.norm() - p.amplitude).abs() < 1e-12);
    }

    let single = extract_voxel(
        &c,
        &ExtractParams::default().with_normalization(NormalizationMethod::SingleVecNorm),
        &mut ws,
    );
    assert!(single.iter().all(|v| (v.norm() - 1.0).abs() < 1e-9));

    let max = extract_voxel(&c, &ExtractParams::default(), &mut ws);
    assert!((max[0].norm() - 1.0).abs() < 1e-9);
    assert!(max[1].norm() < 1.0);
}

/// 各向同性 ODF 没有峰.
#[test]
fn test_isotropic_volume() {
    let img = uniform_sh_image(ImageGeometry::with_shape((2, 2, 2)), &isotropic_coeffs());
    let out = OdfMaximaExtractor::new(ExtractParams::default())
        .with_coefficients(&img)
        .run()
        .unwrap();
    assert!(out.num_directions().iter().all(|&n| n == 0));
    assert!(out.field().is_empty());
    assert_eq!(out.processed_voxels(), 8);
    assert_eq!(out.num_direction_images(), 10);
    assert!(out
        .direction_image(0)
        .unwrap()
        .iter()
        .all(|&v| v == 0.0));
}

/// 掩膜外的体素峰个数为 0, 且根本不参与计算.
#[test]
fn test_masked_voxels() {
    let geometry = ImageGeometry::with_shape((1, 2, 3));
    let b = bingham([1.0, 0.5, 0.3], 2.0, 6.0, 0.3);
    let img = uniform_sh_image(geometry.clone(), &b.coeffs());
    let mut mask = MaskImage::new(geometry, Array3::zeros((1, 2, 3))).unwrap();
    mask.set((0, 0, 1), 1);
    mask.set((0, 1, 2), 255);

    let out = OdfMaximaExtractor::new(ExtractParams::default())
        .with_coefficients(&img)
        .with_mask(&mask)
        .run()
        .unwrap();
    assert_eq!(out.processed_voxels(), 2);
    assert_eq!(out.num_directions()[(0, 0, 0)], 0);
    assert_eq!(out.num_directions()[(0, 0, 1)], 1);
    assert_eq!(out.num_directions()[(0, 1, 2)], 1);
    assert!(out.direction_at(0, (0, 0, 0)).is_none());
    assert_eq!(out.field().len(), 2);
}

#[test]
fn test_mask_shape_mismatch() {
    let img = uniform_sh_image(ImageGeometry::with_shape((1, 2, 3)), &isotropic_coeffs());
    let mask = MaskImage::full(ImageGeometry::with_shape((1, 3, 2)));
    let err = OdfMaximaExtractor::new(ExtractParams::default())
        .with_coefficients(&img)
        .with_mask(&mask)
        .run()
        .unwrap_err();
    assert_eq!(err, ExtractError::ShapeMismatch((1, 2, 3), (1, 3, 2)));
}

/// 输出方向乘以图像方向矩阵; 折线段以体素中心为中点, 长度为最小间距.
#[test]
fn test_direction_matrix_and_field() {
    let rot = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
    let geometry = ImageGeometry::new((1, 1, 2), [2.0, 0.5, 1.0], [1.0, 2.0, 3.0], rot).unwrap();
    let b = bingham([0.36, 0.48, 0.8], 2.0, 6.0, 0.3);
    let img = uniform_sh_image(geometry.clone(), &b.coeffs());

    let params = ExtractParams::default().with_normalization(NormalizationMethod::SingleVecNorm);
    let out = OdfMaximaExtractor::new(params)
        .with_coefficients(&img)
        .run()
        .unwrap();

    let r = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let expect = r * b.axis();
    let d = out.direction_at(0, (0, 0, 1)).unwrap();
    assert!(angle_deg(&d, &expect) < 1.0);

    assert_eq!(out.field().len(), 2);
    let [p, q] = out.field().segments().nth(1).unwrap();
    let center = geometry.voxel_to_world((0, 0, 1));
    for i in 0..3 {
        assert!(((p[i] + q[i]) / 2.0 - center[i]).abs() < 1e-9);
    }
    let len = ((q[0] - p[0]).powi(2) + (q[1] - p[1]).powi(2) + (q[2] - p[2]).powi(2)).sqrt();
    assert!((len - 0.5).abs() < 1e-6);
}

#[test]
fn test_invalid_params_rejected() {
    assert_eq!(
        ExtractParams::new(0.0, 3).unwrap_err(),
        ExtractError::InvalidParameter("peak threshold must be in (0, 1]")
    );
}

/// 没有系数图像时从 DWI 数据重建.
#[test]
fn test_reconstruct_from_dwi() {
    init_logger();
    let axis = Vector3::new(0.36, 0.48, 0.8);
    let dwi = tensor_dwi(ImageGeometry::with_shape((1, 1, 2)), &axis, 60);
    let qball = AnalyticalQball::new();
    let out = OdfMaximaExtractor::new(ExtractParams::default())
        .with_dwi(&dwi, &qball)
        .run()
        .unwrap();
    assert_eq!(out.num_directions()[(0, 0, 0)], 1);
    let d = out.direction_at(0, (0, 0, 1)).unwrap();
    assert!(angle_deg(&d, &axis) < 1.0);
}

/// 基线信号低于阈值的体素不重建, 也就没有峰.
#[test]
fn test_reconstruct_b0_threshold() {
    let axis = Vector3::new(0.36, 0.48, 0.8);
    let dwi = tensor_dwi(ImageGeometry::with_shape((1, 1, 2)), &axis, 60);
    let mut data = dwi.data().clone();
    // 整条信号同比缩小, 信号比不变, 基线降到 10.
    data.slice_mut(s![0, 0, 0, ..]).mapv_inplace(|v| v * 0.01);
    let dwi = DwiImage::new(dwi.geometry().clone(), data, dwi.gradients().to_vec(), dwi.b_value())
        .unwrap();

    let run = |qball: &AnalyticalQball| {
        OdfMaximaExtractor::new(ExtractParams::default())
            .with_dwi(&dwi, qball)
            .run()
            .unwrap()
    };

    let out = run(&AnalyticalQball::new());
    assert_eq!(out.num_directions()[(0, 0, 0)], 1);
    assert_eq!(out.num_directions()[(0, 0, 1)], 1);

    let qball = AnalyticalQball::new().with_b0_threshold(100.0);
    assert_eq!(qball.b0_threshold(), 100.0);
    let out = run(&qball);
    assert_eq!(out.num_directions()[(0, 0, 0)], 0);
    assert!(out.direction_at(0, (0, 0, 0)).is_none());
    assert_eq!(out.num_directions()[(0, 0, 1)], 1);
    let d = out.direction_at(0, (0, 0, 1)).unwrap();
    assert!(angle_deg(&d, &axis) < 1.0);
}

/// 重建失败时整体失败.
#[test]
fn test_reconstruction_failure_propagates() {
    let axis = Vector3::new(0.0, 0.0, 1.0);
    let dwi = tensor_dwi(ImageGeometry::with_shape((1, 1, 1)), &axis, 10);
    let qball = AnalyticalQball::new();
    let err = OdfMaximaExtractor::new(ExtractParams::default())
        .with_dwi(&dwi, &qball)
        .run()
        .unwrap_err();
    assert!(matches!(err, ExtractError::Reconstruct(_)));
}
