use crate::core::mood::StabilizerConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置解析失败: {0}")]
    Parse(String),
    #[error("配置值无效: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub timeout_secs: u64,
    /// 少于该数量时换一条查询重试一次
    pub min_results: usize,
    pub max_results: usize,
    pub oversample: usize,
    /// 已用查询集合的容量
    pub used_query_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            min_results: 5,
            max_results: 10,
            oversample: 15,
            used_query_capacity: 5000,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// haarcascade_*.xml 所在目录；为空时在常见安装目录中查找（需要 `opencv` feature）
    pub cascade_dir: Option<String>,
}

/// 引擎配置，所有字段都有默认值，宿主可以只传需要改的部分
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stabilizer: StabilizerConfig,
    pub search: SearchConfig,
    pub detector: DetectorConfig,
}

impl EngineConfig {
    pub fn from_json5(text: &str) -> Result<Self, ConfigError> {
        let config: Self = json5::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.stabilizer;
        if s.window == 0 || s.history_capacity == 0 {
            return Err(ConfigError::Invalid("投票窗口和历史容量必须大于 0".into()));
        }
        if s.window > s.history_capacity {
            return Err(ConfigError::Invalid(format!(
                "投票窗口 {} 超过历史容量 {}",
                s.window, s.history_capacity
            )));
        }
        if s.supermajority_pct == 0 || s.supermajority_pct > 100 {
            return Err(ConfigError::Invalid(format!(
                "超多数百分比 {} 不在 (0, 100] 内",
                s.supermajority_pct
            )));
        }

        let q = &self.search;
        if q.max_results == 0 || q.timeout_secs == 0 {
            return Err(ConfigError::Invalid("结果数和超时必须大于 0".into()));
        }
        if q.used_query_capacity == 0 {
            return Err(ConfigError::Invalid("已用查询容量必须大于 0".into()));
        }
        Ok(())
    }
}
