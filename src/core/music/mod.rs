use std::time::Duration;
use thiserror::Error;

mod parser;
pub mod query;
pub mod selector;
pub mod youtube;

pub use query::{QueryGenerator, RecentSet};
pub use selector::{clean_title, SongCandidate, SongSelector};
pub use youtube::YouTubeSearch;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("从结果页中提取初始数据失败")]
    InitialDataMissing,
    #[error("JSON 数据解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

/// 搜索结果中的一条原始记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMatch {
    pub id: String,
    pub title: String,
}

impl RawMatch {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// 搜索能力：给定查询词返回零个或多个候选，网络失败或超时返回错误
pub trait SearchProvider: Send + Sync {
    fn search(&self, query: &str, timeout: Duration) -> Result<Vec<RawMatch>, SearchError>;
}
