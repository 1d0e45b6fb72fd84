use super::error::DetectorError;
use super::frame::Rect;
use image::GrayImage;
use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// 多尺度检测参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub scale_factor: f32,
    pub min_neighbors: u32,
    pub min_size: u32,
}

impl DetectParams {
    pub const FACE: DetectParams = DetectParams {
        scale_factor: 1.1,
        min_neighbors: 4,
        min_size: 60,
    };
    pub const EYE: DetectParams = DetectParams {
        scale_factor: 1.2,
        min_neighbors: 3,
        min_size: 20,
    };
    pub const SMILE: DetectParams = DetectParams {
        scale_factor: 1.5,
        min_neighbors: 5,
        min_size: 25,
    };
}

/// 区域检测能力（人脸 / 眼睛 / 笑容），实现方可以是经典级联也可以是学习型检测器
pub trait RegionDetector: Send + Sync {
    fn detect(&self, image: &GrayImage, params: &DetectParams) -> Vec<Rect>;
}

#[derive(Clone)]
pub struct DetectorSet {
    pub face: Arc<dyn RegionDetector>,
    pub eye: Arc<dyn RegionDetector>,
    pub smile: Arc<dyn RegionDetector>,
}

impl DetectorSet {
    pub fn new(
        face: Arc<dyn RegionDetector>,
        eye: Arc<dyn RegionDetector>,
        smile: Arc<dyn RegionDetector>,
    ) -> Self {
        Self { face, eye, smile }
    }

    /// 内置的轻量特征检测器
    pub fn heuristic() -> Self {
        Self {
            face: Arc::new(HaarDetector::new(TargetKind::Face)),
            eye: Arc::new(HaarDetector::new(TargetKind::Eye)),
            smile: Arc::new(HaarDetector::new(TargetKind::Smile)),
        }
    }
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::heuristic()
    }
}

/// 实际使用的检测后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// OpenCV 训练好的 Haar 级联
    Cascade,
    /// 内置的轻量特征检测器
    Heuristic,
    /// 宿主注入
    Custom,
}

impl DetectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorBackend::Cascade => "cascade",
            DetectorBackend::Heuristic => "heuristic",
            DetectorBackend::Custom => "custom",
        }
    }
}

/// 有 `opencv` feature 时优先加载训练好的级联（指定目录或已知安装目录），否则退回内置检测器
pub fn select_detectors(cascade_dir: Option<&Path>) -> (DetectorSet, DetectorBackend) {
    match load_trained(cascade_dir) {
        Ok(set) => (set, DetectorBackend::Cascade),
        Err(DetectorError::Unsupported) if cascade_dir.is_none() => {
            debug!("Using heuristic detectors");
            (DetectorSet::heuristic(), DetectorBackend::Heuristic)
        }
        Err(e) => {
            warn!("⚠️ {}, falling back to heuristic detectors", e);
            (DetectorSet::heuristic(), DetectorBackend::Heuristic)
        }
    }
}

#[cfg(feature = "opencv")]
fn load_trained(cascade_dir: Option<&Path>) -> Result<DetectorSet, DetectorError> {
    let dir = match cascade_dir {
        Some(dir) => dir.to_path_buf(),
        None => super::cascade::find_cascade_dir()
            .ok_or_else(|| DetectorError::CascadeMissing("未找到已安装的 haarcascades 目录".into()))?,
    };
    super::cascade::load_cascades(&dir)
}

#[cfg(not(feature = "opencv"))]
fn load_trained(_cascade_dir: Option<&Path>) -> Result<DetectorSet, DetectorError> {
    Err(DetectorError::Unsupported)
}

pub struct MockRegionDetector {
    pattern: Option<Box<dyn Fn(&GrayImage) -> Vec<Rect> + Send + Sync>>,
}

impl MockRegionDetector {
    pub fn new() -> Self {
        Self { pattern: None }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&GrayImage) -> Vec<Rect> + Send + Sync + 'static,
    {
        Self {
            pattern: Some(Box::new(pattern)),
        }
    }

    pub fn with_fixed_regions(regions: Vec<Rect>) -> Self {
        Self::with_pattern(move |_| regions.clone())
    }
}

impl Default for MockRegionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionDetector for MockRegionDetector {
    fn detect(&self, image: &GrayImage, _params: &DetectParams) -> Vec<Rect> {
        self.pattern.as_ref().map(|p| p(image)).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Face,
    Eye,
    Smile,
}

/// 窗口内的归一化子区域 (x, y, w, h)
type Zone = (f32, f32, f32, f32);

/// 亮区均值 - 暗区均值 >= min_contrast * 窗口标准差
struct ContrastFeature {
    bright: Zone,
    dark: Zone,
    min_contrast: f32,
}

const fn feature(bright: Zone, dark: Zone, min_contrast: f32) -> ContrastFeature {
    ContrastFeature {
        bright,
        dark,
        min_contrast,
    }
}

const FACE_FEATURES: [ContrastFeature; 4] = [
    // 脸颊比眼带亮
    feature((0.15, 0.50, 0.70, 0.20), (0.15, 0.25, 0.70, 0.15), 0.3),
    // 额头比眼带亮
    feature((0.20, 0.05, 0.60, 0.15), (0.15, 0.25, 0.70, 0.15), 0.3),
    // 鼻梁比左右眼亮
    feature((0.42, 0.25, 0.16, 0.15), (0.18, 0.25, 0.20, 0.15), 0.2),
    feature((0.42, 0.25, 0.16, 0.15), (0.62, 0.25, 0.20, 0.15), 0.2),
];

const EYE_FEATURES: [ContrastFeature; 3] = [
    feature((0.10, 0.00, 0.80, 0.25), (0.30, 0.35, 0.40, 0.30), 0.5),
    feature((0.00, 0.30, 0.25, 0.40), (0.30, 0.35, 0.40, 0.30), 0.4),
    feature((0.75, 0.30, 0.25, 0.40), (0.30, 0.35, 0.40, 0.30), 0.4),
];

const SMILE_FEATURES: [ContrastFeature; 2] = [
    // 嘴唇缝比上下皮肤暗
    feature((0.10, 0.00, 0.80, 0.30), (0.15, 0.40, 0.70, 0.20), 0.5),
    feature((0.10, 0.70, 0.80, 0.30), (0.15, 0.40, 0.70, 0.20), 0.5),
];

/// 平坦区域直接拒绝
const MIN_WINDOW_STD: f32 = 6.0;

/// 基于积分图的矩形对比特征检测器，多尺度滑窗 + 邻近合并
pub struct HaarDetector {
    kind: TargetKind,
    group_eps: f32,
}

impl HaarDetector {
    pub fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            group_eps: 0.2,
        }
    }

    fn features(&self) -> &'static [ContrastFeature] {
        match self.kind {
            TargetKind::Face => &FACE_FEATURES,
            TargetKind::Eye => &EYE_FEATURES,
            TargetKind::Smile => &SMILE_FEATURES,
        }
    }

    /// 窗口宽高比（宽 / 高）
    fn aspect(&self) -> f32 {
        match self.kind {
            TargetKind::Smile => 2.0,
            TargetKind::Face | TargetKind::Eye => 1.0,
        }
    }

    fn window_sizes(&self, width: u32, height: u32, params: &DetectParams) -> Vec<(u32, u32)> {
        let scale_factor = params.scale_factor.max(1.01);
        let base_h = params.min_size.max(4) as f32;
        let mut sizes = Vec::new();
        let mut win_h = base_h;

        loop {
            let wh = win_h as u32;
            let ww = (win_h * self.aspect()) as u32;
            if ww > width || wh > height {
                break;
            }
            sizes.push((ww, wh));
            win_h *= scale_factor;
        }

        sizes
    }

    fn scan(&self, integral: &IntegralImage, ww: u32, wh: u32) -> Vec<Rect> {
        let step = (wh / 10).max(2);
        let mut hits = Vec::new();

        let mut y = 0;
        while y + wh <= integral.height {
            let mut x = 0;
            while x + ww <= integral.width {
                let window = Rect::new(x, y, ww, wh);
                if self.accepts(integral, &window) {
                    hits.push(window);
                }
                x += step;
            }
            y += step;
        }

        hits
    }

    fn accepts(&self, integral: &IntegralImage, window: &Rect) -> bool {
        let std = integral.std_dev(window);
        if std < MIN_WINDOW_STD {
            return false;
        }

        self.features().iter().all(|f| {
            let bright = integral.mean(&zone_rect(window, f.bright));
            let dark = integral.mean(&zone_rect(window, f.dark));
            bright - dark >= f.min_contrast * std
        })
    }
}

impl RegionDetector for HaarDetector {
    fn detect(&self, image: &GrayImage, params: &DetectParams) -> Vec<Rect> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return vec![];
        }

        let integral = IntegralImage::new(image);
        let hits: Vec<Rect> = self
            .window_sizes(width, height, params)
            .par_iter()
            .flat_map_iter(|&(ww, wh)| self.scan(&integral, ww, wh))
            .collect();

        group_rectangles(&hits, params.min_neighbors, self.group_eps)
    }
}

fn zone_rect(window: &Rect, (fx, fy, fw, fh): Zone) -> Rect {
    let w = window.width as f32;
    let h = window.height as f32;
    Rect::new(
        window.x + (fx * w) as u32,
        window.y + (fy * h) as u32,
        ((fw * w) as u32).max(1),
        ((fh * h) as u32).max(1),
    )
}

/// 合并相似矩形；成员数少于 min_neighbors 的簇被丢弃，其余取平均
pub fn group_rectangles(rects: &[Rect], min_neighbors: u32, eps: f32) -> Vec<Rect> {
    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // (root, count, sum_x, sum_y, sum_w, sum_h)，按首次出现排序
    let mut clusters: Vec<(usize, u64, u64, u64, u64, u64)> = Vec::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        let entry = match clusters.iter_mut().position(|c| c.0 == root) {
            Some(pos) => &mut clusters[pos],
            None => {
                clusters.push((root, 0, 0, 0, 0, 0));
                let last = clusters.len() - 1;
                &mut clusters[last]
            }
        };
        entry.1 += 1;
        entry.2 += r.x as u64;
        entry.3 += r.y as u64;
        entry.4 += r.width as u64;
        entry.5 += r.height as u64;
    }

    clusters
        .into_iter()
        .filter(|c| c.1 >= min_neighbors as u64)
        .map(|(_, count, sx, sy, sw, sh)| {
            Rect::new(
                (sx / count) as u32,
                (sy / count) as u32,
                (sw / count) as u32,
                (sh / count) as u32,
            )
        })
        .collect()
}

fn similar(a: &Rect, b: &Rect, eps: f32) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f32 * 0.5;
    let close = |p: u32, q: u32| (p as f32 - q as f32).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

/// 积分图 + 平方积分图，O(1) 求矩形均值和方差
struct IntegralImage {
    width: u32,
    height: u32,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let stride = width as usize + 1;
        let mut sum = vec![0u64; stride * (height as usize + 1)];
        let mut sq_sum = vec![0u64; stride * (height as usize + 1)];

        for y in 0..height as usize {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..width as usize {
                let v = image.get_pixel(x as u32, y as u32)[0] as u64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self {
            width,
            height,
            sum,
            sq_sum,
        }
    }

    fn area_sum(table: &[u64], stride: usize, r: &Rect) -> u64 {
        let (x0, y0) = (r.x as usize, r.y as usize);
        let (x1, y1) = (x0 + r.width as usize, y0 + r.height as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    fn clamp(&self, r: &Rect) -> Rect {
        let x = r.x.min(self.width);
        let y = r.y.min(self.height);
        Rect::new(x, y, r.width.min(self.width - x), r.height.min(self.height - y))
    }

    fn mean(&self, r: &Rect) -> f32 {
        let r = self.clamp(r);
        let area = r.area();
        if area == 0 {
            return 0.0;
        }
        Self::area_sum(&self.sum, self.width as usize + 1, &r) as f32 / area as f32
    }

    fn std_dev(&self, r: &Rect) -> f32 {
        let r = self.clamp(r);
        let area = r.area();
        if area == 0 {
            return 0.0;
        }
        let stride = self.width as usize + 1;
        let mean = Self::area_sum(&self.sum, stride, &r) as f64 / area as f64;
        let sq_mean = Self::area_sum(&self.sq_sum, stride, &r) as f64 / area as f64;
        (sq_mean - mean * mean).max(0.0).sqrt() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn eye_image() -> GrayImage {
        GrayImage::from_fn(60, 60, |x, y| {
            let dx = x as i32 - 30;
            let dy = y as i32 - 30;
            if dx * dx + dy * dy <= 36 {
                Luma([40])
            } else {
                Luma([200])
            }
        })
    }

    #[test]
    fn test_flat_image_has_no_detections() {
        let img = GrayImage::from_pixel(120, 120, Luma([128]));
        for kind in [TargetKind::Face, TargetKind::Eye, TargetKind::Smile] {
            let detector = HaarDetector::new(kind);
            assert!(detector.detect(&img, &DetectParams::EYE).is_empty());
        }
    }

    #[test]
    fn test_dark_blob_is_an_eye() {
        let detector = HaarDetector::new(TargetKind::Eye);
        let params = DetectParams {
            min_neighbors: 1,
            ..DetectParams::EYE
        };
        let eyes = detector.detect(&eye_image(), &params);

        assert!(!eyes.is_empty());
        assert!(eyes.iter().any(|r| {
            r.x <= 30 && r.y <= 30 && r.x + r.width >= 30 && r.y + r.height >= 30
        }));
    }

    #[test]
    fn test_window_too_large_for_image() {
        let detector = HaarDetector::new(TargetKind::Face);
        let img = GrayImage::from_pixel(40, 40, Luma([0]));
        assert!(detector.detect(&img, &DetectParams::FACE).is_empty());
    }

    #[test]
    fn test_smile_windows_are_wide() {
        let detector = HaarDetector::new(TargetKind::Smile);
        let sizes = detector.window_sizes(100, 40, &DetectParams::SMILE);
        assert_eq!(sizes, vec![(50, 25), (75, 37)]);
    }

    #[test]
    fn test_group_rectangles() {
        let rects = [
            Rect::new(10, 10, 40, 40),
            Rect::new(12, 11, 40, 40),
            Rect::new(11, 12, 42, 42),
            Rect::new(200, 200, 40, 40),
        ];
        let grouped = group_rectangles(&rects, 2, 0.2);
        assert_eq!(grouped, vec![Rect::new(11, 11, 40, 40)]);

        let all = group_rectangles(&rects, 1, 0.2);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_integral_mean_and_std() {
        let img = GrayImage::from_fn(4, 4, |x, _| if x < 2 { Luma([0]) } else { Luma([100]) });
        let integral = IntegralImage::new(&img);
        assert!((integral.mean(&Rect::new(0, 0, 4, 4)) - 50.0).abs() < 1e-3);
        assert!((integral.std_dev(&Rect::new(0, 0, 4, 4)) - 50.0).abs() < 1e-3);
        assert_eq!(integral.mean(&Rect::new(2, 0, 2, 4)), 100.0);
    }

    #[test]
    fn test_unloadable_cascade_dir_falls_back() {
        let (set, backend) = select_detectors(Some(Path::new("/nonexistent/haarcascades")));
        assert_eq!(backend, DetectorBackend::Heuristic);
        let flat = GrayImage::from_pixel(80, 80, Luma([90]));
        assert!(set.face.detect(&flat, &DetectParams::FACE).is_empty());
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_default_selection_without_opencv() {
        let (_, backend) = select_detectors(None);
        assert_eq!(backend, DetectorBackend::Heuristic);
    }

    #[test]
    fn test_mock_detector() {
        let img = GrayImage::new(10, 10);
        let fixed = MockRegionDetector::with_fixed_regions(vec![Rect::new(1, 2, 3, 4)]);
        assert_eq!(fixed.detect(&img, &DetectParams::FACE), vec![Rect::new(1, 2, 3, 4)]);
        assert!(MockRegionDetector::new().detect(&img, &DetectParams::FACE).is_empty());
    }
}
