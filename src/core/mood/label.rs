use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 情绪标签（封闭枚举，没有 unknown）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodLabel {
    Happy,
    Neutral,
    Sad,
}

impl MoodLabel {
    /// 轮换兜底使用的固定顺序
    pub const ALL: [MoodLabel; 3] = [MoodLabel::Happy, MoodLabel::Neutral, MoodLabel::Sad];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodLabel::Happy => "happy",
            MoodLabel::Neutral => "neutral",
            MoodLabel::Sad => "sad",
        }
    }
}

impl Default for MoodLabel {
    fn default() -> Self {
        MoodLabel::Neutral
    }
}

impl fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mood label: {0:?}")]
pub struct UnknownMood(pub String);

impl FromStr for MoodLabel {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "happy" => Ok(MoodLabel::Happy),
            "neutral" => Ok(MoodLabel::Neutral),
            "sad" => Ok(MoodLabel::Sad),
            other => Err(UnknownMood(other.to_string())),
        }
    }
}
