use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Empty frame buffer")]
    Empty,
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("级联文件不存在: {0}")]
    CascadeMissing(String),
    #[error("级联模型加载失败: {0}")]
    CascadeLoad(String),
    #[error("未启用 opencv feature，无法加载训练好的级联")]
    Unsupported,
}
