use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use super::{RawMatch, SearchError};

const INITIAL_DATA_PREFIX: &str = "var ytInitialData = ";
const PAIRED_FALLBACK_MIN: usize = 10;

static PAIRED: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#""videoId":"([^"]+)".*?"title":\{"runs":\[\{"text":"([^"]+)""#).ok()
});
static VIDEO_IDS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#""videoId":"([^"]+)""#).ok());
static TITLES: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#""title":\{"runs":\[\{"text":"([^"]+)""#).ok());

/// 解析搜索结果页：优先走内嵌 JSON，失败或为空时退回正则扫描
pub fn parse_matches(html: &str) -> Vec<RawMatch> {
    match extract_initial_data(html) {
        Ok(data) => {
            let mut found = Vec::new();
            collect_video_renderers(&data, &mut found);
            if !found.is_empty() {
                return found;
            }
            debug!("ytInitialData has no video entries, scanning raw html");
        }
        Err(e) => debug!("Falling back to regex scan: {}", e),
    }
    scan_matches(html)
}

pub fn extract_initial_data(html: &str) -> Result<Value, SearchError> {
    let document = Html::parse_document(html);
    let script_selector =
        Selector::parse("script").map_err(|_| SearchError::InitialDataMissing)?;

    for element in document.select(&script_selector) {
        let script_content = element.inner_html();
        if let Some(stripped) = script_content.trim_start().strip_prefix(INITIAL_DATA_PREFIX) {
            let cleaned = stripped.trim_end().trim_end_matches(';');
            let value: Value = serde_json::from_str(cleaned)?;
            return Ok(value);
        }
    }

    Err(SearchError::InitialDataMissing)
}

fn collect_video_renderers(value: &Value, out: &mut Vec<RawMatch>) {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get("videoRenderer").and_then(video_from_renderer) {
                out.push(found);
            }
            for (key, child) in map {
                if key != "videoRenderer" {
                    collect_video_renderers(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_video_renderers(item, out);
            }
        }
        _ => {}
    }
}

fn video_from_renderer(renderer: &Value) -> Option<RawMatch> {
    let id = renderer.get("videoId")?.as_str()?;
    let title = renderer
        .get("title")?
        .get("runs")?
        .get(0)?
        .get("text")?
        .as_str()?;
    Some(RawMatch::new(id, title))
}

/// 原始 HTML 上的正则扫描；成对匹配不足时把 id 和标题分别抓取后按序配对
fn scan_matches(html: &str) -> Vec<RawMatch> {
    let (Some(paired), Some(ids), Some(titles)) =
        (PAIRED.as_ref(), VIDEO_IDS.as_ref(), TITLES.as_ref())
    else {
        return Vec::new();
    };

    let matches: Vec<RawMatch> = paired
        .captures_iter(html)
        .map(|c| RawMatch::new(&c[1], &c[2]))
        .collect();
    if matches.len() >= PAIRED_FALLBACK_MIN {
        return matches;
    }

    ids.captures_iter(html)
        .zip(titles.captures_iter(html))
        .map(|(id, title)| RawMatch::new(&id[1], &title[1]))
        .collect()
}
