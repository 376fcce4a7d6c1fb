//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Point3d};

pub use crate::image::{DwiImage, GeometryAttr, ImageGeometry, MaskImage, ShCoeffImage};

pub use crate::locator::{
    brute_force_closest, GridPoints, MeshPoints, PointId, PointLocator, PointSet, PointSource,
    SharedPointLocator,
};

pub use crate::odf::{
    extract_voxel, CancelToken, ExtractError, ExtractParams, MaximaOutput, NormalizationMethod,
    OdfMaximaExtractor, PeakWorkspace,
};

pub use crate::qball::{AnalyticalQball, ShReconstructor};

pub use crate::sh::ShCoeffs;
