//! 规则级联情绪分类器
//!
//! 按顺序匹配，第一条命中的规则生效：
//! 1-3. 开心（笑容 / 饱和度 / 平滑度）
//! 4-6. 难过（暗部 / 纹理 / 区域衰减）
//! 7.   平静（亮度均匀）
//! 8.   按墙钟时间分段的兜底
//! 9.   按帧计数轮换，保证一定有结果

use super::label::MoodLabel;
use crate::core::vision::FeatureSet;

/// 命中的规则，用于日志和测试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    HappyStrong,
    HappyBySaturation,
    HappyByFlatness,
    SadByDarkness,
    SadByTexture,
    SadByZoneDecay,
    NeutralByEvenness,
    TimeWindow,
    Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: MoodLabel,
    pub rule: Rule,
}

/// 单帧分类的外部输入
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext {
    /// 单调递增的帧计数
    pub frame_counter: u64,
    /// 墙钟时间（Unix 秒）
    pub wall_clock_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ClassifierThresholds {
    pub happy_lift: f32,
    pub happy_min_saturation: f32,
    pub happy_min_lower: f32,
    pub happy_max_edges: f32,
    pub sad_lower_drop: f32,
    pub sad_max_value: f32,
    pub sad_min_edges: f32,
    pub sad_middle_drop: f32,
    pub neutral_max_variance: f32,
    pub window_neutral_max_variance: f32,
    pub window_sad_min_edges: f32,
    pub window_period_secs: u64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            happy_lift: 10.0,
            happy_min_saturation: 100.0,
            happy_min_lower: 100.0,
            happy_max_edges: 0.05,
            sad_lower_drop: 5.0,
            sad_max_value: 100.0,
            sad_min_edges: 0.08,
            sad_middle_drop: 10.0,
            neutral_max_variance: 15.0,
            window_neutral_max_variance: 20.0,
            window_sad_min_edges: 0.06,
            window_period_secs: 30,
        }
    }
}

pub struct MoodClassifier {
    thresholds: ClassifierThresholds,
}

impl MoodClassifier {
    pub fn new() -> Self {
        Self::with_thresholds(ClassifierThresholds::default())
    }

    pub fn with_thresholds(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn classify(&self, f: &FeatureSet, ctx: ClassifyContext) -> Classification {
        let (label, rule) = self
            .cascade(f)
            .or_else(|| self.time_window(f, ctx.wall_clock_secs))
            .unwrap_or_else(|| {
                let idx = (ctx.frame_counter % MoodLabel::ALL.len() as u64) as usize;
                (MoodLabel::ALL[idx], Rule::Rotation)
            });

        Classification { label, rule }
    }

    fn cascade(&self, f: &FeatureSet) -> Option<(MoodLabel, Rule)> {
        let t = &self.thresholds;
        let smiling = f.smile_count > 0;

        if smiling || f.lower > f.middle + t.happy_lift {
            if smiling && f.lower > f.middle {
                return Some((MoodLabel::Happy, Rule::HappyStrong));
            }
            if f.avg_saturation > t.happy_min_saturation && f.lower > t.happy_min_lower {
                return Some((MoodLabel::Happy, Rule::HappyBySaturation));
            }
            if f.edge_density < t.happy_max_edges && f.lower > f.upper {
                return Some((MoodLabel::Happy, Rule::HappyByFlatness));
            }
        }

        if !smiling && f.lower < f.upper - t.sad_lower_drop && f.avg_value < t.sad_max_value {
            return Some((MoodLabel::Sad, Rule::SadByDarkness));
        }
        if f.edge_density > t.sad_min_edges && f.eye_count < 2 && !smiling {
            return Some((MoodLabel::Sad, Rule::SadByTexture));
        }
        if f.middle < f.upper - t.sad_middle_drop && f.lower < f.middle {
            return Some((MoodLabel::Sad, Rule::SadByZoneDecay));
        }

        if f.brightness_variance < t.neutral_max_variance && f.eye_count >= 2 && !smiling {
            return Some((MoodLabel::Neutral, Rule::NeutralByEvenness));
        }

        None
    }

    /// 以墙钟秒数为伪随机源，30 秒一个周期分三段，保证三种情绪都可达
    fn time_window(&self, f: &FeatureSet, wall_clock_secs: u64) -> Option<(MoodLabel, Rule)> {
        let t = &self.thresholds;
        let phase = wall_clock_secs % t.window_period_secs;
        let third = t.window_period_secs / 3;

        let hit = if phase < third {
            (f.lower > f.middle || f.smile_count > 0).then_some(MoodLabel::Happy)
        } else if phase < third * 2 {
            (f.brightness_variance < t.window_neutral_max_variance).then_some(MoodLabel::Neutral)
        } else {
            (f.lower < f.middle || f.edge_density > t.window_sad_min_edges).then_some(MoodLabel::Sad)
        };

        hit.map(|label| (label, Rule::TimeWindow))
    }
}

impl Default for MoodClassifier {
    fn default() -> Self {
        Self::new()
    }
}
