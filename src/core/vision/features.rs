use super::detector::{DetectParams, DetectorSet};
use super::edges::edge_density;
use super::frame::FaceRegion;
use image::{GrayImage, RgbImage};
use serde::Serialize;

/// 单帧人脸特征，纯值类型
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureSet {
    /// 上区亮度（眉）
    pub upper: f32,
    /// 中区亮度（眼）
    pub middle: f32,
    /// 下区亮度（嘴）
    pub lower: f32,
    /// 三区均值的标准差
    pub brightness_variance: f32,
    pub avg_saturation: f32,
    pub avg_value: f32,
    /// 边缘像素占比
    pub edge_density: f32,
    pub eye_count: usize,
    pub smile_count: usize,
}

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// 特征提取器，无内部状态
pub struct FeatureExtractor {
    detectors: DetectorSet,
    eye_params: DetectParams,
    smile_params: DetectParams,
}

impl FeatureExtractor {
    pub fn new(detectors: DetectorSet) -> Self {
        Self {
            detectors,
            eye_params: DetectParams::EYE,
            smile_params: DetectParams::SMILE,
        }
    }

    pub fn extract(&self, face: &FaceRegion) -> FeatureSet {
        let gray = &face.gray;
        let (w, h) = gray.dimensions();

        let band = h / 3;
        let upper = band_mean(gray, 0, band);
        let middle = band_mean(gray, band, band * 2);
        let lower = band_mean(gray, band * 2, h);

        let (avg_saturation, avg_value) = saturation_value_means(&face.color);

        let half = h / 2;
        let upper_half = image::imageops::crop_imm(gray, 0, 0, w, half).to_image();
        let lower_half = image::imageops::crop_imm(gray, 0, half, w, h - half).to_image();
        let eye_count = self.detectors.eye.detect(&upper_half, &self.eye_params).len();
        let smile_count = self.detectors.smile.detect(&lower_half, &self.smile_params).len();

        FeatureSet {
            upper,
            middle,
            lower,
            brightness_variance: std_dev(&[upper, middle, lower]),
            avg_saturation,
            avg_value,
            edge_density: edge_density(gray, CANNY_LOW, CANNY_HIGH),
            eye_count,
            smile_count,
        }
    }
}

/// 行区间 [start, end) 的平均亮度
fn band_mean(gray: &GrayImage, start: u32, end: u32) -> f32 {
    let w = gray.width() as usize;
    let end = end.min(gray.height());
    if start >= end || w == 0 {
        return 0.0;
    }

    let rows = &gray.as_raw()[start as usize * w..end as usize * w];
    let sum: u64 = rows.iter().map(|&v| v as u64).sum();
    sum as f32 / rows.len() as f32
}

/// 8 位 HSV 的 S、V 均值（S = 255 * (max - min) / max，V = max）
fn saturation_value_means(color: &RgbImage) -> (f32, f32) {
    let pixels = color.as_raw().chunks_exact(3);
    let count = pixels.len();
    if count == 0 {
        return (0.0, 0.0);
    }

    let (s_sum, v_sum) = pixels.fold((0f64, 0f64), |(s_acc, v_acc), px| {
        let max = px[0].max(px[1]).max(px[2]) as f64;
        let min = px[0].min(px[1]).min(px[2]) as f64;
        let s = if max > 0.0 { 255.0 * (max - min) / max } else { 0.0 };
        (s_acc + s.round(), v_acc + max)
    });

    ((s_sum / count as f64) as f32, (v_sum / count as f64) as f32)
}

fn std_dev(values: &[f32]) -> f32 {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt()
}
