//! OpenCV 训练好的 Haar 级联检测器（需要 `opencv` feature）

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::GrayImage;
use log::{debug, info, warn};
use opencv::core::{Mat, Scalar, Size, Vector, CV_8UC1};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

use super::detector::{DetectParams, DetectorSet, RegionDetector};
use super::error::DetectorError;
use super::frame::Rect;

pub const FACE_CASCADE: &str = "haarcascade_frontalface_default.xml";
pub const EYE_CASCADE: &str = "haarcascade_eye.xml";
pub const SMILE_CASCADE: &str = "haarcascade_smile.xml";

/// 常见的 OpenCV 级联文件安装目录
pub const CASCADE_SEARCH_DIRS: &[&str] = &[
    "/usr/share/opencv4/haarcascades",
    "/usr/local/share/opencv4/haarcascades",
    "/usr/share/opencv/haarcascades",
    "/opt/homebrew/share/opencv4/haarcascades",
];

/// detect_multi_scale 需要 &mut，用互斥锁包一层
pub struct CascadeDetector {
    classifier: Mutex<CascadeClassifier>,
}

impl CascadeDetector {
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        let display = path.display().to_string();
        if !path.is_file() {
            return Err(DetectorError::CascadeMissing(display));
        }

        let classifier = CascadeClassifier::new(&display)
            .map_err(|e| DetectorError::CascadeLoad(format!("{}: {}", display, e)))?;
        if classifier.empty().unwrap_or(true) {
            return Err(DetectorError::CascadeLoad(format!("{}: 模型为空", display)));
        }

        debug!("Loaded cascade {}", display);
        Ok(Self {
            classifier: Mutex::new(classifier),
        })
    }

    fn run(&self, image: &GrayImage, params: &DetectParams) -> opencv::Result<Vec<Rect>> {
        let mut mat = Mat::new_rows_cols_with_default(
            image.height() as i32,
            image.width() as i32,
            CV_8UC1,
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(image.as_raw());

        let mut found: Vector<opencv::core::Rect> = Vector::new();
        let min = params.min_size as i32;
        self.classifier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .detect_multi_scale(
                &mat,
                &mut found,
                params.scale_factor as f64,
                params.min_neighbors as i32,
                0,
                Size::new(min, min),
                Size::new(0, 0),
            )?;

        Ok(found
            .iter()
            .map(|r| Rect::new(r.x.max(0) as u32, r.y.max(0) as u32, r.width.max(0) as u32, r.height.max(0) as u32))
            .collect())
    }
}

impl RegionDetector for CascadeDetector {
    fn detect(&self, image: &GrayImage, params: &DetectParams) -> Vec<Rect> {
        if image.width() == 0 || image.height() == 0 {
            return vec![];
        }
        // 检测失败按零检测处理
        self.run(image, params).unwrap_or_else(|e| {
            warn!("⚠️ Cascade detection failed: {}", e);
            vec![]
        })
    }
}

/// 从目录加载人脸 / 眼睛 / 笑容三个级联
pub fn load_cascades(dir: &Path) -> Result<DetectorSet, DetectorError> {
    let set = DetectorSet::new(
        Arc::new(CascadeDetector::load(&dir.join(FACE_CASCADE))?),
        Arc::new(CascadeDetector::load(&dir.join(EYE_CASCADE))?),
        Arc::new(CascadeDetector::load(&dir.join(SMILE_CASCADE))?),
    );
    info!("🧠 Haar cascades loaded from {}", dir.display());
    Ok(set)
}

/// 第一个包含人脸级联文件的已知目录
pub fn find_cascade_dir() -> Option<PathBuf> {
    CASCADE_SEARCH_DIRS
        .iter()
        .map(PathBuf::from)
        .find(|dir| dir.join(FACE_CASCADE).is_file())
}
