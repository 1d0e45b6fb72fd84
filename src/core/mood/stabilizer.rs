use super::label::MoodLabel;
use log::info;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// 历史环形缓冲容量
    pub history_capacity: usize,
    /// 投票窗口（最近 N 帧）
    pub window: usize,
    /// 超多数百分比
    pub supermajority_pct: usize,
    /// 两次切换之间的最短停留时间
    pub dwell_ms: u64,
    /// 手动覆盖的有效期
    pub override_ms: u64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 30,
            window: 10,
            supermajority_pct: 60,
            dwell_ms: 3000,
            override_ms: 5000,
        }
    }
}

impl StabilizerConfig {
    /// 切换所需的最少票数，按完整窗口计算
    pub fn required_votes(&self) -> usize {
        (self.window * self.supermajority_pct + 99) / 100
    }

    fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    fn override_window(&self) -> Duration {
        Duration::from_millis(self.override_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualOverride {
    pub label: MoodLabel,
    pub set_at: Instant,
}

/// 情绪稳定器：滞回状态机，只有在超多数和停留时间同时满足时才切换
pub struct MoodStabilizer {
    config: StabilizerConfig,
    history: VecDeque<MoodLabel>,
    stable: MoodLabel,
    last_change: Instant,
    manual: Option<ManualOverride>,
}

impl MoodStabilizer {
    pub fn new(now: Instant) -> Self {
        Self::with_config(StabilizerConfig::default(), now)
    }

    pub fn with_config(config: StabilizerConfig, now: Instant) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_capacity),
            config,
            stable: MoodLabel::Neutral,
            last_change: now,
            manual: None,
        }
    }

    /// 记录一次瞬时标签，返回本帧应上报的情绪（覆盖优先）
    pub fn observe(&mut self, instant: MoodLabel, now: Instant) -> MoodLabel {
        self.history.push_back(instant);
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }

        if let Some((candidate, votes)) = self.dominant() {
            let dwelled = now.saturating_duration_since(self.last_change) >= self.config.dwell();
            if votes >= self.config.required_votes() && dwelled && candidate != self.stable {
                info!("🎭 Stable mood: {} -> {} ({} votes)", self.stable, candidate, votes);
                self.stable = candidate;
                self.last_change = now;
            }
        }

        self.resolve(now)
    }

    /// 手动覆盖：立即生效，绕过滞回
    pub fn set_override(&mut self, label: MoodLabel, now: Instant) {
        self.manual = Some(ManualOverride { label, set_at: now });
        self.stable = label;
    }

    /// 覆盖未过期时覆盖值优先，过期后保留但不生效
    pub fn resolve(&self, now: Instant) -> MoodLabel {
        match self.manual {
            Some(m) if now.saturating_duration_since(m.set_at) < self.config.override_window() => {
                m.label
            }
            _ => self.stable,
        }
    }

    /// 最近窗口内出现最多的标签；并列时取先出现的
    fn dominant(&self) -> Option<(MoodLabel, usize)> {
        let skip = self.history.len().saturating_sub(self.config.window);
        let mut counts: Vec<(MoodLabel, usize)> = Vec::with_capacity(MoodLabel::ALL.len());

        for &label in self.history.iter().skip(skip) {
            match counts.iter_mut().find(|(l, _)| *l == label) {
                Some((_, n)) => *n += 1,
                None => counts.push((label, 1)),
            }
        }

        counts
            .into_iter()
            .fold(None, |best: Option<(MoodLabel, usize)>, (label, n)| match best {
                Some((_, best_n)) if best_n >= n => best,
                _ => Some((label, n)),
            })
    }

    pub fn stable(&self) -> MoodLabel {
        self.stable
    }

    pub fn manual_override(&self) -> Option<ManualOverride> {
        self.manual
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self, now: Instant) {
        self.history.clear();
        self.stable = MoodLabel::Neutral;
        self.last_change = now;
        self.manual = None;
    }
}
