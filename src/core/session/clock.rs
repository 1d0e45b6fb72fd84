use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// 时间来源：单调时钟用于滞回和覆盖计时，墙钟秒用于分类器的时间兜底
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn unix_secs(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// 手动推进的时钟，两种时间同步前进
pub struct ManualClock {
    /// (单调时间, 墙钟毫秒)
    state: Mutex<(Instant, u64)>,
}

impl ManualClock {
    pub fn new(unix_secs: u64) -> Self {
        Self {
            state: Mutex::new((Instant::now(), unix_secs * 1000)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.0 += by;
        state.1 += by.as_millis() as u64;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn unix_secs(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).1 / 1000
    }
}
