//! 情绪引擎：摄像头帧 -> 情绪 -> 歌曲推荐

use std::collections::HashSet;
use std::sync::Arc;

use flutter_rust_bridge::frb;
use log::info;
use serde::{Deserialize, Serialize};

use crate::core::music::{SearchError, YouTubeSearch};
use crate::core::session::{ConfigError, EmotionUpdate, EngineConfig, SessionManager, SessionStats};

/// 情绪引擎错误类型，FRB 友好的设计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodApiError {
    pub error_type: String,
    pub message: String,
}

impl MoodApiError {
    fn session_not_found(id: &str) -> Self {
        Self {
            error_type: "SessionNotFound".to_string(),
            message: format!("会话不存在: {}", id),
        }
    }
}

impl From<ConfigError> for MoodApiError {
    fn from(e: ConfigError) -> Self {
        Self {
            error_type: "ConfigError".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<SearchError> for MoodApiError {
    fn from(e: SearchError) -> Self {
        Self {
            error_type: "SearchError".to_string(),
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for MoodApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for MoodApiError {}

/// 情绪引擎，按会话 id 隔离状态
///
/// ```dart
/// final engine = MoodEngine.create();
/// engine.connect(sessionId: id);
/// final update = await engine.processFrame(sessionId: id, image: dataUrl, playedSongs: played);
/// engine.disconnect(sessionId: id);
/// ```
#[frb(opaque)]
pub struct MoodEngine {
    manager: SessionManager,
}

impl MoodEngine {
    /// 使用默认配置创建
    #[frb(sync)]
    pub fn create() -> Result<Self, MoodApiError> {
        Self::build(EngineConfig::default())
    }

    /// 使用 JSON5 配置创建，未给出的字段取默认值
    #[frb(sync)]
    pub fn create_with_config(config: String) -> Result<Self, MoodApiError> {
        Self::build(EngineConfig::from_json5(&config)?)
    }

    fn build(config: EngineConfig) -> Result<Self, MoodApiError> {
        let provider = Arc::new(YouTubeSearch::new()?);
        info!("🎬 MoodEngine: created");
        Ok(Self {
            manager: SessionManager::new(config, provider),
        })
    }

    #[frb(sync)]
    pub fn connect(&self, session_id: String) {
        self.manager.connect(&session_id)
    }

    #[frb(sync)]
    pub fn disconnect(&self, session_id: String) -> bool {
        self.manager.disconnect(&session_id)
    }

    /// 处理一帧（base64，可带 data URL 前缀）；情绪变化时附带新歌曲
    #[frb]
    pub fn process_frame(
        &self,
        session_id: String,
        image: String,
        played_songs: Vec<String>,
    ) -> EmotionUpdate {
        let played: HashSet<String> = played_songs.into_iter().collect();
        self.manager.process_frame(&session_id, &image, &played)
    }

    /// 手动选择情绪；标签无效时返回 None
    #[frb]
    pub fn manual_emotion(&self, session_id: String, emotion: String) -> Option<EmotionUpdate> {
        self.manager.manual_emotion(&session_id, &emotion)
    }

    /// 为当前情绪换一批歌
    #[frb]
    pub fn refresh_songs(
        &self,
        session_id: String,
        emotion: String,
        played_songs: Vec<String>,
    ) -> Option<EmotionUpdate> {
        let played: HashSet<String> = played_songs.into_iter().collect();
        self.manager.refresh_songs(&session_id, &emotion, &played)
    }

    /// 获取会话统计
    #[frb(sync)]
    pub fn session_stats(&self, session_id: String) -> Result<SessionStats, MoodApiError> {
        self.manager
            .stats(&session_id)
            .ok_or_else(|| MoodApiError::session_not_found(&session_id))
    }

    #[frb(sync, getter)]
    pub fn active_sessions(&self) -> usize {
        self.manager.session_count()
    }

    /// 实际使用的检测后端：cascade / heuristic / custom
    #[frb(sync, getter)]
    pub fn detector_backend(&self) -> String {
        self.manager.detector_backend().as_str().to_string()
    }
}

impl Drop for MoodEngine {
    fn drop(&mut self) {
        info!("🗑️ MoodEngine: released");
    }
}
