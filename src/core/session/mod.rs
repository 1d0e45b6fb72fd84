//! 会话层：每个连接一份稳定器和当前情绪，查询生成器全局共享

mod clock;
mod config;
mod manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DetectorConfig, EngineConfig, SearchConfig};
pub use manager::{EmotionUpdate, SessionManager, SessionStats};
