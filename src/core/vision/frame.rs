use super::error::FrameError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GrayImage, RgbImage};

/// 轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// 解码后的摄像头帧：彩色 + 灰度两个视图
#[derive(Debug, Clone)]
pub struct Frame {
    pub rgb: RgbImage,
    pub gray: GrayImage,
}

impl Frame {
    pub fn from_rgb(rgb: RgbImage) -> Self {
        let gray = to_grayscale(&rgb);
        Self { rgb, gray }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// 按矩形裁出人脸区域，越界部分会被裁掉；空区域返回 None
    pub fn face_region(&self, rect: Rect) -> Option<FaceRegion> {
        let x = rect.x.min(self.width());
        let y = rect.y.min(self.height());
        let width = rect.width.min(self.width() - x);
        let height = rect.height.min(self.height() - y);

        if width == 0 || height == 0 {
            return None;
        }

        Some(FaceRegion {
            gray: image::imageops::crop_imm(&self.gray, x, y, width, height).to_image(),
            color: image::imageops::crop_imm(&self.rgb, x, y, width, height).to_image(),
        })
    }
}

/// 人脸子图（灰度 + 彩色，尺寸一致）
#[derive(Debug, Clone)]
pub struct FaceRegion {
    pub gray: GrayImage,
    pub color: RgbImage,
}

impl FaceRegion {
    pub fn from_color(color: RgbImage) -> Self {
        let gray = to_grayscale(&color);
        Self { gray, color }
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// 解码传输层传来的 base64 图像，允许带 data URL 前缀
pub fn decode_frame(payload: &str) -> Result<Frame, FrameError> {
    let encoded = match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    };

    let bytes = STANDARD.decode(encoded.trim())?;
    if bytes.is_empty() {
        return Err(FrameError::Empty);
    }

    let img = image::load_from_memory(&bytes)?;
    Ok(Frame::from_rgb(img.to_rgb8()))
}

/// 面积最大的人脸；面积相同取先检测到的
pub fn largest_face(faces: &[Rect]) -> Option<Rect> {
    faces.iter().copied().fold(None, |best, face| match best {
        Some(b) if b.area() >= face.area() => Some(b),
        _ => Some(face),
    })
}

fn to_grayscale(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let data: Vec<u8> = rgb
        .as_raw()
        .chunks_exact(3)
        .map(|px| ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000) as u8)
        .collect();
    GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    pub(crate) fn encode_png_data_url(img: &RgbImage) -> String {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut buffer, ImageOutputFormat::Png)
            .expect("PNG 编码失败");
        format!("data:image/png;base64,{}", STANDARD.encode(buffer.into_inner()))
    }

    #[test]
    fn test_decode_data_url() {
        let img = RgbImage::from_pixel(32, 24, Rgb([200, 100, 50]));
        let frame = decode_frame(&encode_png_data_url(&img)).expect("应该能解码");
        assert_eq!(frame.width(), 32);
        assert_eq!(frame.height(), 24);
        // 200*0.299 + 100*0.587 + 50*0.114
        assert_eq!(frame.gray.get_pixel(0, 0)[0], 124);
    }

    #[test]
    fn test_decode_without_prefix() {
        let img = RgbImage::from_pixel(8, 8, Rgb([10, 10, 10]));
        let url = encode_png_data_url(&img);
        let raw = url.split_once(',').map(|(_, d)| d).unwrap();
        assert!(decode_frame(raw).is_ok());
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode_frame(""), Err(FrameError::Empty)));
        assert!(matches!(decode_frame("data:image/jpeg;base64,"), Err(FrameError::Empty)));
        assert!(matches!(decode_frame("!!!not base64!!!"), Err(FrameError::Base64(_))));
        let garbage = STANDARD.encode(b"definitely not an image");
        assert!(matches!(decode_frame(&garbage), Err(FrameError::Image(_))));
    }

    #[test]
    fn test_largest_face_tie_keeps_first() {
        let faces = [
            Rect::new(0, 0, 60, 60),
            Rect::new(10, 10, 80, 80),
            Rect::new(50, 50, 80, 80),
        ];
        assert_eq!(largest_face(&faces), Some(Rect::new(10, 10, 80, 80)));
        assert_eq!(largest_face(&[]), None);
    }

    #[test]
    fn test_face_region_is_clamped() {
        let frame = Frame::from_rgb(RgbImage::from_pixel(100, 80, Rgb([1, 2, 3])));
        let region = frame.face_region(Rect::new(70, 50, 60, 60)).unwrap();
        assert_eq!((region.width(), region.height()), (30, 30));
        assert!(frame.face_region(Rect::new(100, 0, 10, 10)).is_none());
    }
}
