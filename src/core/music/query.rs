//! 情绪 -> 搜索查询词，带去重集合

use crate::core::mood::MoodLabel;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};

const YEARS: &[&str] = &["2024", "2023", "2022", "2021", "2020", "latest", "new"];
const QUALITY: &[&str] = &[
    "best", "top", "superhit", "blockbuster", "hit", "popular", "trending", "viral",
];
const SUFFIXES: &[&str] = &["hd", "official", "full song", "video song", "lyrical", "audio"];
const COLLECTIONS: &[&str] = &["mix", "jukebox", "playlist", "collection"];
const MOVIES: &[&str] = &[
    "animal",
    "jawan",
    "pathaan",
    "rocky aur rani",
    "tu jhoothi main makkaar",
    "brahmastra",
    "bhediya",
    "bhool bhulaiyaa",
    "kabir singh",
    "kesari",
];

const SUFFIX_CHANCE: f64 = 0.3;
const MAX_COLLISION_ATTEMPTS: usize = 10;

/// 每种情绪的词池和模板概率
struct MoodPool {
    keywords: &'static [&'static str],
    artists: &'static [&'static str],
    artist_chance: f64,
    work_chance: f64,
}

const HAPPY: MoodPool = MoodPool {
    keywords: &[
        "party", "dance", "celebration", "wedding", "dhol", "club", "energetic", "upbeat",
        "festive", "garba", "bhangra", "item", "peppy", "fun", "disco",
    ],
    artists: &["neha kakkar", "badshah", "yo yo honey singh", "mika singh"],
    artist_chance: 0.3,
    work_chance: 0.5,
};

const NEUTRAL: MoodPool = MoodPool {
    keywords: &[
        "romantic", "love", "melody", "soulful", "beautiful", "soft", "sweet",
        "heart touching", "couple", "rain", "monsoon", "sufi", "ghazal", "unplugged",
    ],
    artists: &["arijit singh", "shreya ghoshal", "armaan malik", "darshan raval"],
    artist_chance: 0.4,
    work_chance: 0.6,
};

// 难过时更倾向于点名歌手
const SAD: MoodPool = MoodPool {
    keywords: &[
        "sad", "emotional", "breakup", "separation", "pain", "crying", "heartbreak", "bewafa",
        "judaai", "tears", "alone", "missing", "yaad", "tanhai",
    ],
    artists: &["arijit singh", "atif aslam", "b praak", "jubin nautiyal"],
    artist_chance: 0.5,
    work_chance: 0.0,
};

fn pool(mood: MoodLabel) -> &'static MoodPool {
    match mood {
        MoodLabel::Happy => &HAPPY,
        MoodLabel::Neutral => &NEUTRAL,
        MoodLabel::Sad => &SAD,
    }
}

/// 有容量上限的插入有序集合，超出时淘汰最早插入的
#[derive(Debug, Clone)]
pub struct RecentSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl RecentSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.members.contains(value)
    }

    pub fn insert(&mut self, value: String) -> bool {
        if !self.members.insert(value.clone()) {
            return false;
        }
        self.order.push_back(value);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct QueryGenerator<R: Rng = StdRng> {
    rng: R,
    used: RecentSet,
}

impl QueryGenerator<StdRng> {
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(StdRng::from_entropy(), capacity)
    }
}

impl<R: Rng> QueryGenerator<R> {
    pub fn with_rng(rng: R, capacity: usize) -> Self {
        Self {
            rng,
            used: RecentSet::with_capacity(capacity),
        }
    }

    /// 生成一条查询，返回前先记入已用集合
    pub fn generate(&mut self, mood: MoodLabel) -> String {
        let p = pool(mood);
        let year = pick(&mut self.rng, YEARS);
        let quality = pick(&mut self.rng, QUALITY);
        let keyword = pick(&mut self.rng, p.keywords);

        let mut query = if self.rng.gen::<f64>() < p.artist_chance {
            let artist = pick(&mut self.rng, p.artists);
            match mood {
                MoodLabel::Neutral => format!("{artist} {keyword} bollywood {year}"),
                _ => format!("{artist} {keyword} bollywood songs {year}"),
            }
        } else if self.rng.gen::<f64>() < p.work_chance {
            let movie = pick(&mut self.rng, MOVIES);
            match mood {
                MoodLabel::Happy => format!("{movie} {keyword} songs bollywood"),
                _ => format!("{movie} {keyword} songs"),
            }
        } else {
            match mood {
                MoodLabel::Sad => format!("bollywood {keyword} songs {year} hindi {quality}"),
                _ => format!("bollywood {keyword} songs {year} {quality}"),
            }
        };

        if self.rng.gen::<f64>() < SUFFIX_CHANCE {
            query.push(' ');
            query.push_str(pick(&mut self.rng, SUFFIXES));
        }

        let mut attempts = 0;
        while self.used.contains(&query) && attempts < MAX_COLLISION_ATTEMPTS {
            query.push(' ');
            query.push_str(pick(&mut self.rng, COLLECTIONS));
            attempts += 1;
        }
        if attempts > 0 {
            debug!("Query collided {} time(s), settled on {:?}", attempts, query);
        }

        self.used.insert(query.clone());
        query
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    pub fn was_used(&self, query: &str) -> bool {
        self.used.contains(query)
    }
}

fn pick<R: Rng>(rng: &mut R, items: &[&'static str]) -> &'static str {
    items.choose(rng).copied().unwrap_or_default()
}
