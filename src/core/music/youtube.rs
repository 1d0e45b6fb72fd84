use std::time::Duration;

use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT_LANGUAGE;

use super::{parser, RawMatch, SearchError, SearchProvider};

const RESULTS_URL: &str = "https://www.youtube.com/results";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9,hi;q=0.8";

/// 结果页排序方式 -> `sp` 参数
const SORT_FILTERS: &[(&str, &str)] = &[
    ("relevance", "EgIQAQ=="),
    ("rating", "CAASAhAB"),
    ("viewCount", "CAMSAhAB"),
    ("date", "CAISAhAB"),
];

/// 抓取 YouTube 搜索结果页并解析出视频条目
pub struct YouTubeSearch {
    client: Client,
}

impl YouTubeSearch {
    pub fn new() -> Result<Self, SearchError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    fn fetch_html(&self, query: &str, timeout: Duration) -> Result<String, SearchError> {
        let mut rng = rand::thread_rng();
        let (sort, filter) = SORT_FILTERS
            .choose(&mut rng)
            .copied()
            .unwrap_or(SORT_FILTERS[0]);
        let user_agent = format!(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/{}.36",
            rng.gen_range(500..600)
        );
        debug!("Searching {:?} sorted by {}", query, sort);

        let resp = self
            .client
            .get(RESULTS_URL)
            .query(&[("search_query", query), ("sp", filter)])
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .timeout(timeout)
            .send()?
            .error_for_status()?;
        Ok(resp.text()?)
    }
}

impl SearchProvider for YouTubeSearch {
    fn search(&self, query: &str, timeout: Duration) -> Result<Vec<RawMatch>, SearchError> {
        let html = self.fetch_html(query, timeout)?;
        let matches = parser::parse_matches(&html);
        if matches.is_empty() {
            warn!("⚠️ No videos found in results page for {:?}", query);
        }
        Ok(matches)
    }
}
