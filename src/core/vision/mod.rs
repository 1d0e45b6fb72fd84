//! 视觉部分：帧解码、人脸区域选取、区域检测、特征提取
//!
//! 启用 `opencv` feature 时人脸 / 眼睛 / 笑容检测使用 OpenCV 训练好的 Haar 级联。

#[cfg(feature = "opencv")]
pub mod cascade;
pub mod detector;
pub mod edges;
pub mod error;
pub mod features;
pub mod frame;

pub use detector::{
    select_detectors, DetectParams, DetectorBackend, DetectorSet, HaarDetector, MockRegionDetector,
    RegionDetector, TargetKind,
};
pub use error::{DetectorError, FrameError};
pub use features::{FeatureExtractor, FeatureSet};
pub use frame::{decode_frame, largest_face, FaceRegion, Frame, Rect};
