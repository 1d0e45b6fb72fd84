//! 会话编排：帧 -> 特征 -> 分类 -> 稳定 ->（情绪变化时）查询 -> 搜索 -> 筛选

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::Serialize;

use super::clock::{Clock, SystemClock};
use super::config::EngineConfig;
use crate::core::mood::{ClassifyContext, MoodClassifier, MoodLabel, MoodStabilizer};
use crate::core::music::{QueryGenerator, SearchProvider, SongCandidate, SongSelector};
use crate::core::vision::{
    decode_frame, largest_face, select_detectors, DetectParams, DetectorBackend, DetectorSet,
    FeatureExtractor, RegionDetector,
};

/// 会话统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub faces_detected: u64,
    pub mood_changes: u64,
    pub searches: u64,
}

/// 每帧 / 每次手动操作的输出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionUpdate {
    pub emotion: Option<MoodLabel>,
    pub face_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub songs: Option<Vec<SongCandidate>>,
}

impl EmotionUpdate {
    fn no_face() -> Self {
        Self {
            emotion: None,
            face_detected: false,
            songs: None,
        }
    }

    fn with_songs(mood: MoodLabel, songs: Vec<SongCandidate>) -> Self {
        Self {
            emotion: Some(mood),
            face_detected: true,
            songs: Some(songs),
        }
    }
}

struct SessionState {
    stabilizer: MoodStabilizer,
    last_mood: Option<MoodLabel>,
    frame_counter: u64,
    stats: SessionStats,
}

pub struct SessionManager {
    config: EngineConfig,
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionState>>>>,
    face_detector: Arc<dyn RegionDetector>,
    detector_backend: DetectorBackend,
    extractor: FeatureExtractor,
    classifier: MoodClassifier,
    generator: Mutex<QueryGenerator>,
    selector: SongSelector,
    provider: Arc<dyn SearchProvider>,
    clock: Arc<dyn Clock>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SessionManager {
    pub fn new(config: EngineConfig, provider: Arc<dyn SearchProvider>) -> Self {
        let cascade_dir = config.detector.cascade_dir.as_deref().map(Path::new);
        let (detectors, detector_backend) = select_detectors(cascade_dir);
        info!("🔎 Detector backend: {}", detector_backend.as_str());
        Self {
            face_detector: detectors.face.clone(),
            detector_backend,
            extractor: FeatureExtractor::new(detectors),
            classifier: MoodClassifier::new(),
            generator: Mutex::new(QueryGenerator::new(config.search.used_query_capacity)),
            selector: SongSelector::new(config.search.max_results, config.search.oversample),
            sessions: Mutex::new(HashMap::new()),
            provider,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_detectors(mut self, detectors: DetectorSet) -> Self {
        self.face_detector = detectors.face.clone();
        self.detector_backend = DetectorBackend::Custom;
        self.extractor = FeatureExtractor::new(detectors);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_generator(mut self, generator: QueryGenerator) -> Self {
        self.generator = Mutex::new(generator);
        self
    }

    pub fn connect(&self, id: &str) {
        let mut sessions = lock(&self.sessions);
        if !sessions.contains_key(id) {
            sessions.insert(id.to_string(), Arc::new(Mutex::new(self.new_state())));
            info!("🔌 Session connected: {} ({} active)", id, sessions.len());
        }
    }

    pub fn disconnect(&self, id: &str) -> bool {
        let mut sessions = lock(&self.sessions);
        let removed = sessions.remove(id).is_some();
        if removed {
            info!("👋 Session disconnected: {} ({} active)", id, sessions.len());
        }
        removed
    }

    pub fn detector_backend(&self) -> DetectorBackend {
        self.detector_backend
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn stats(&self, id: &str) -> Option<SessionStats> {
        let session = lock(&self.sessions).get(id).cloned()?;
        let state = lock(&session);
        Some(state.stats.clone())
    }

    /// 处理一帧；未连接的会话、解码失败或没有人脸时返回无人脸结果，不会报错
    pub fn process_frame(&self, id: &str, payload: &str, played: &HashSet<String>) -> EmotionUpdate {
        let Some(session) = self.session(id) else {
            return EmotionUpdate::no_face();
        };
        let mut state = lock(&session);
        state.stats.frames_processed += 1;

        let frame = match decode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Frame decode failed for {}: {}", id, e);
                return EmotionUpdate::no_face();
            }
        };

        let faces = self.face_detector.detect(&frame.gray, &DetectParams::FACE);
        let Some(region) = largest_face(&faces).and_then(|rect| frame.face_region(rect)) else {
            return EmotionUpdate::no_face();
        };
        state.stats.faces_detected += 1;

        let features = self.extractor.extract(&region);
        let ctx = ClassifyContext {
            frame_counter: state.frame_counter,
            wall_clock_secs: self.clock.unix_secs(),
        };
        let classification = self.classifier.classify(&features, ctx);
        state.frame_counter += 1;
        debug!(
            "Frame {} of {}: {} via {:?}",
            state.frame_counter, id, classification.label, classification.rule
        );

        let mood = state.stabilizer.observe(classification.label, self.clock.now());
        let mut update = EmotionUpdate {
            emotion: Some(mood),
            face_detected: true,
            songs: None,
        };

        if state.last_mood != Some(mood) {
            state.last_mood = Some(mood);
            state.stats.mood_changes += 1;
            let songs = self.find_songs(&mut state.stats, mood, played);
            info!("🎵 {}: mood {}, {} new songs", id, mood, songs.len());
            update.songs = Some(songs);
        }

        update
    }

    /// 手动指定情绪；无效标签或未连接的会话返回 None 且不改动任何状态
    pub fn manual_emotion(&self, id: &str, text: &str) -> Option<EmotionUpdate> {
        let mood = parse_mood(text)?;
        let session = self.session(id)?;
        let mut state = lock(&session);

        state.stabilizer.set_override(mood, self.clock.now());
        if state.last_mood != Some(mood) {
            state.last_mood = Some(mood);
            state.stats.mood_changes += 1;
        }
        info!("✋ {}: manual mood {}", id, mood);

        let songs = self.find_songs(&mut state.stats, mood, &HashSet::new());
        Some(EmotionUpdate::with_songs(mood, songs))
    }

    /// 换一批歌，不影响稳定器
    pub fn refresh_songs(&self, id: &str, text: &str, played: &HashSet<String>) -> Option<EmotionUpdate> {
        let mood = parse_mood(text)?;
        let session = self.session(id)?;
        let mut state = lock(&session);

        let songs = self.find_songs(&mut state.stats, mood, played);
        Some(EmotionUpdate::with_songs(mood, songs))
    }

    fn new_state(&self) -> SessionState {
        SessionState {
            stabilizer: MoodStabilizer::with_config(self.config.stabilizer.clone(), self.clock.now()),
            last_mood: None,
            frame_counter: 0,
            stats: SessionStats::default(),
        }
    }

    /// 取会话状态，只有 connect 会创建；只在查找时持有表锁
    fn session(&self, id: &str) -> Option<Arc<Mutex<SessionState>>> {
        let session = lock(&self.sessions).get(id).cloned();
        if session.is_none() {
            debug!("Dropping event for unknown session {}", id);
        }
        session
    }

    /// 搜索一次，结果不足时换查询词再试一次
    fn find_songs(
        &self,
        stats: &mut SessionStats,
        mood: MoodLabel,
        played: &HashSet<String>,
    ) -> Vec<SongCandidate> {
        let search = &self.config.search;
        let mut songs = self.search_once(stats, mood, played);
        if songs.len() >= search.min_results {
            return songs;
        }

        warn!("🔁 Only {} songs for {}, retrying with a new query", songs.len(), mood);
        let mut exclude = played.clone();
        exclude.extend(songs.iter().map(|s| s.id.clone()));
        songs.extend(self.search_once(stats, mood, &exclude));
        songs.truncate(search.max_results);
        songs
    }

    fn search_once(
        &self,
        stats: &mut SessionStats,
        mood: MoodLabel,
        played: &HashSet<String>,
    ) -> Vec<SongCandidate> {
        let query = lock(&self.generator).generate(mood);
        stats.searches += 1;
        info!("🔍 Searching for {}: {:?}", mood, query);

        match self.provider.search(&query, self.config.search.timeout()) {
            Ok(matches) => self.selector.select(&matches, played, &mut rand::thread_rng()),
            Err(e) => {
                warn!("❌ Search failed for {:?}: {}", query, e);
                Vec::new()
            }
        }
    }
}

fn parse_mood(text: &str) -> Option<MoodLabel> {
    match text.parse::<MoodLabel>() {
        Ok(mood) => Some(mood),
        Err(e) => {
            warn!("⚠️ Ignoring {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::music::{RawMatch, SearchError};
    use crate::core::session::ManualClock;
    use crate::core::vision::frame::tests::encode_png_data_url;
    use crate::core::vision::{MockRegionDetector, Rect};
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// 按顺序返回预设结果，并记录收到的查询
    #[derive(Default)]
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Option<Vec<RawMatch>>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn push_ok(&self, ids: &[&str]) {
            let matches = ids.iter().map(|id| RawMatch::new(*id, format!("Song {id}"))).collect();
            lock(&self.responses).push_back(Some(matches));
        }

        fn push_err(&self) {
            lock(&self.responses).push_back(None);
        }

        fn calls(&self) -> usize {
            lock(&self.queries).len()
        }
    }

    impl SearchProvider for ScriptedProvider {
        fn search(&self, query: &str, _timeout: Duration) -> Result<Vec<RawMatch>, SearchError> {
            lock(&self.queries).push(query.to_string());
            match lock(&self.responses).pop_front() {
                Some(Some(matches)) => Ok(matches),
                Some(None) => Err(SearchError::InitialDataMissing),
                None => Ok(Vec::new()),
            }
        }
    }

    struct Harness {
        manager: SessionManager,
        provider: Arc<ScriptedProvider>,
        clock: Arc<ManualClock>,
    }

    fn ids(n: usize, prefix: &str) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    fn harness(face: bool) -> Harness {
        harness_with(face, 1, EngineConfig::default())
    }

    /// 预先连接会话 "s"
    fn harness_with(face: bool, smiles: usize, config: EngineConfig) -> Harness {
        let provider = Arc::new(ScriptedProvider::default());
        // 1_700_000_000 % 30 == 20，时间兜底落在 sad 段
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let faces = if face { vec![Rect::new(0, 0, 90, 90)] } else { Vec::new() };
        let detectors = DetectorSet::new(
            Arc::new(MockRegionDetector::with_fixed_regions(faces)),
            Arc::new(MockRegionDetector::new()),
            Arc::new(MockRegionDetector::with_fixed_regions(vec![Rect::new(0, 0, 50, 25); smiles])),
        );
        let manager = SessionManager::new(config, provider.clone())
            .with_detectors(detectors)
            .with_clock(clock.clone())
            .with_generator(QueryGenerator::with_rng(StdRng::seed_from_u64(11), 100));
        manager.connect("s");
        Harness {
            manager,
            provider,
            clock,
        }
    }

    /// 下区明显更亮，配合一个笑容框，每帧都判为开心
    fn smiling_frame() -> String {
        let img = RgbImage::from_fn(90, 90, |_, y| if y < 60 { Rgb([100, 100, 100]) } else { Rgb([160, 160, 160]) });
        encode_png_data_url(&img)
    }

    fn flat_frame() -> String {
        encode_png_data_url(&RgbImage::from_pixel(90, 90, Rgb([120, 120, 120])))
    }

    fn songs_of(update: &EmotionUpdate) -> &[SongCandidate] {
        update.songs.as_deref().unwrap_or_default()
    }

    #[test]
    fn test_bad_payload_is_no_face() {
        let h = harness(true);
        let update = h.manager.process_frame("s", "data:image/png;base64,!!!", &HashSet::new());
        assert_eq!(update, EmotionUpdate::no_face());

        let update = h.manager.process_frame("s", "", &HashSet::new());
        assert!(!update.face_detected);

        let stats = h.manager.stats("s").unwrap();
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(stats.faces_detected, 0);
        assert_eq!(h.provider.calls(), 0);
    }

    #[test]
    fn test_frame_without_face() {
        let h = harness(false);
        let update = h.manager.process_frame("s", &smiling_frame(), &HashSet::new());
        assert_eq!(update.emotion, None);
        assert!(!update.face_detected);
        assert!(update.songs.is_none());
    }

    #[test]
    fn test_first_face_reports_neutral_with_songs() {
        let h = harness(true);
        h.provider.push_ok(&["a", "b", "c", "d", "e", "f"]);

        let first = h.manager.process_frame("s", &smiling_frame(), &HashSet::new());
        assert_eq!(first.emotion, Some(MoodLabel::Neutral));
        assert!(first.face_detected);
        assert_eq!(songs_of(&first).len(), 6);

        let second = h.manager.process_frame("s", &smiling_frame(), &HashSet::new());
        assert_eq!(second.emotion, Some(MoodLabel::Neutral));
        assert!(second.songs.is_none());
        assert_eq!(h.provider.calls(), 1);
    }

    #[test]
    fn test_stable_change_triggers_search() {
        let h = harness(true);
        let played: HashSet<String> = ["h0".to_string()].into_iter().collect();
        h.provider.push_ok(&ids(8, "n").iter().map(String::as_str).collect::<Vec<_>>());
        h.provider.push_ok(&ids(8, "h").iter().map(String::as_str).collect::<Vec<_>>());

        for _ in 0..5 {
            let update = h.manager.process_frame("s", &smiling_frame(), &played);
            assert_eq!(update.emotion, Some(MoodLabel::Neutral));
        }

        h.clock.advance(Duration::from_secs(3));
        let update = h.manager.process_frame("s", &smiling_frame(), &played);
        assert_eq!(update.emotion, Some(MoodLabel::Happy));
        let songs = songs_of(&update);
        assert_eq!(songs.len(), 7);
        assert!(songs.iter().all(|s| s.id != "h0"));

        let stats = h.manager.stats("s").unwrap();
        assert_eq!(stats.faces_detected, 6);
        assert_eq!(stats.mood_changes, 2);
        assert_eq!(stats.searches, 2);
    }

    #[test]
    fn test_retry_when_too_few_results() {
        let h = harness(true);
        h.provider.push_ok(&["a", "b"]);
        h.provider.push_ok(&["a", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"]);

        let update = h.manager.refresh_songs("s", "happy", &HashSet::new()).unwrap();
        let songs = songs_of(&update);
        let unique: HashSet<_> = songs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(songs.len(), 10);
        assert_eq!(unique.len(), 10);
        assert_eq!(h.provider.calls(), 2);

        let queries = lock(&h.provider.queries);
        assert_ne!(queries[0], queries[1]);
    }

    #[test]
    fn test_retry_after_provider_failure() {
        let h = harness(true);
        h.provider.push_err();
        h.provider.push_ok(&["a", "b", "c"]);

        let update = h.manager.refresh_songs("s", "sad", &HashSet::new()).unwrap();
        assert_eq!(songs_of(&update).len(), 3);
        assert_eq!(h.provider.calls(), 2);
    }

    #[test]
    fn test_gives_up_after_one_retry() {
        let h = harness(true);
        h.provider.push_err();
        h.provider.push_err();

        let update = h.manager.refresh_songs("s", "neutral", &HashSet::new()).unwrap();
        assert_eq!(update.emotion, Some(MoodLabel::Neutral));
        assert!(songs_of(&update).is_empty());
        assert_eq!(h.provider.calls(), 2);
    }

    #[test]
    fn test_manual_emotion_overrides_and_searches() {
        let h = harness(true);
        h.provider.push_ok(&["a", "b", "c", "d", "e"]);

        let update = h.manager.manual_emotion("s", "sad").unwrap();
        assert_eq!(update.emotion, Some(MoodLabel::Sad));
        assert!(update.face_detected);
        assert_eq!(songs_of(&update).len(), 5);

        // 覆盖期内帧仍报告 sad，且不会重复搜索
        h.clock.advance(Duration::from_secs(2));
        let frame = h.manager.process_frame("s", &smiling_frame(), &HashSet::new());
        assert_eq!(frame.emotion, Some(MoodLabel::Sad));
        assert!(frame.songs.is_none());
        assert_eq!(h.provider.calls(), 1);
    }

    #[test]
    fn test_invalid_manual_emotion_is_ignored() {
        let h = harness(true);
        assert!(h.manager.manual_emotion("s", "angry").is_none());
        assert!(h.manager.refresh_songs("s", "HAPPY!", &HashSet::new()).is_none());
        assert_eq!(h.manager.stats("s").unwrap(), SessionStats::default());
        assert_eq!(h.provider.calls(), 0);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let h = harness(true);
        h.manager.connect("a");
        h.manager.connect("b");
        h.manager.manual_emotion("a", "sad");

        let update = h.manager.process_frame("b", &smiling_frame(), &HashSet::new());
        assert_eq!(update.emotion, Some(MoodLabel::Neutral));
        assert_eq!(h.manager.stats("a").unwrap().frames_processed, 0);
        assert_eq!(h.manager.stats("b").unwrap().frames_processed, 1);
    }

    #[test]
    fn test_connect_and_disconnect() {
        let h = harness(true);
        h.manager.connect("a");
        h.manager.connect("a");
        assert_eq!(h.manager.session_count(), 2);

        assert!(h.manager.disconnect("a"));
        assert!(!h.manager.disconnect("a"));
        assert_eq!(h.manager.session_count(), 1);
        assert!(h.manager.stats("a").is_none());
    }

    #[test]
    fn test_events_after_disconnect_do_not_revive_session() {
        let h = harness(true);
        h.provider.push_ok(&["a", "b", "c", "d", "e"]);
        assert!(h.manager.disconnect("s"));

        let update = h.manager.process_frame("s", &smiling_frame(), &HashSet::new());
        assert_eq!(update, EmotionUpdate::no_face());
        assert!(h.manager.process_frame("s", "", &HashSet::new()) == EmotionUpdate::no_face());
        assert!(h.manager.manual_emotion("s", "happy").is_none());
        assert!(h.manager.refresh_songs("s", "sad", &HashSet::new()).is_none());

        for i in 0..100 {
            h.manager.process_frame(&format!("ghost{i}"), &smiling_frame(), &HashSet::new());
        }
        assert_eq!(h.manager.session_count(), 0);
        assert!(h.manager.stats("s").is_none());
        assert_eq!(h.provider.calls(), 0);
    }

    #[test]
    fn test_rotation_starts_from_first_label() {
        // 单票即切换、无停留，直接观察每帧的瞬时标签
        let mut config = EngineConfig::default();
        config.stabilizer.window = 1;
        config.stabilizer.supermajority_pct = 100;
        config.stabilizer.dwell_ms = 0;
        let h = harness_with(true, 0, config);

        let moods: Vec<_> = (0..4)
            .map(|_| h.manager.process_frame("s", &flat_frame(), &HashSet::new()).emotion)
            .collect();
        assert_eq!(
            moods,
            vec![
                Some(MoodLabel::Happy),
                Some(MoodLabel::Neutral),
                Some(MoodLabel::Sad),
                Some(MoodLabel::Happy),
            ]
        );
    }

    #[test]
    fn test_detector_backend_selection() {
        let h = harness(true);
        assert_eq!(h.manager.detector_backend(), DetectorBackend::Custom);

        let mut config = EngineConfig::default();
        config.detector.cascade_dir = Some("/nonexistent/haarcascades".into());
        let manager = SessionManager::new(config, Arc::new(ScriptedProvider::default()));
        assert_eq!(manager.detector_backend(), DetectorBackend::Heuristic);
    }

    #[test]
    fn test_update_serialization() {
        let update = EmotionUpdate::with_songs(
            MoodLabel::Happy,
            vec![SongCandidate {
                id: "abc".into(),
                title: "Song".into(),
                thumbnail: "https://img.youtube.com/vi/abc/mqdefault.jpg".into(),
            }],
        );
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["emotion"], "happy");
        assert_eq!(json["face_detected"], true);
        assert_eq!(json["songs"][0]["videoId"], "abc");

        let json = serde_json::to_value(EmotionUpdate::no_face()).unwrap();
        assert!(json["emotion"].is_null());
        assert!(json.get("songs").is_none());
    }
}
