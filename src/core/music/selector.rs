use super::RawMatch;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const TITLE_LIMIT: usize = 60;
const ELLIPSIS: &str = "...";
const NON_MUSIC_MARKERS: &[&str] = &["news", "interview", "making", "behind"];

/// 转义序列和 HTML 实体 -> 字面字符，按顺序替换
const TITLE_REPLACEMENTS: &[(&str, &str)] = &[
    ("\\u0026", "&"),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("\\", ""),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongCandidate {
    #[serde(rename = "videoId")]
    pub id: String,
    pub title: String,
    pub thumbnail: String,
}

pub struct SongSelector {
    max_results: usize,
    oversample: usize,
}

impl SongSelector {
    pub fn new(max_results: usize, oversample: usize) -> Self {
        Self {
            max_results,
            oversample: oversample.max(max_results),
        }
    }

    /// 过滤已播放和非音乐内容，超采样后洗牌截断
    pub fn select<R: Rng + ?Sized>(
        &self,
        matches: &[RawMatch],
        played: &HashSet<String>,
        rng: &mut R,
    ) -> Vec<SongCandidate> {
        let mut seen: HashSet<&str> = played.iter().map(String::as_str).collect();
        let mut songs = Vec::with_capacity(self.oversample);

        for m in matches {
            if seen.contains(m.id.as_str()) {
                continue;
            }

            let title = clean_title(&m.title);
            let lowered = title.to_lowercase();
            if NON_MUSIC_MARKERS.iter().any(|marker| lowered.contains(marker)) {
                continue;
            }

            seen.insert(m.id.as_str());
            songs.push(SongCandidate {
                thumbnail: thumbnail_url(&m.id),
                id: m.id.clone(),
                title,
            });

            if songs.len() >= self.oversample {
                break;
            }
        }

        songs.shuffle(rng);
        songs.truncate(self.max_results);
        songs
    }
}

impl Default for SongSelector {
    fn default() -> Self {
        Self::new(10, 15)
    }
}

pub fn clean_title(raw: &str) -> String {
    let mut title = raw.to_string();
    for (from, to) in TITLE_REPLACEMENTS {
        title = title.replace(from, to);
    }

    if title.chars().count() > TITLE_LIMIT {
        let keep = TITLE_LIMIT - ELLIPSIS.len();
        title = title.chars().take(keep).collect::<String>() + ELLIPSIS;
    }

    title.trim().to_string()
}

pub fn thumbnail_url(id: &str) -> String {
    format!("https://img.youtube.com/vi/{id}/mqdefault.jpg")
}
