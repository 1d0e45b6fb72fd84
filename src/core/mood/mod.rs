pub mod classifier;
pub mod label;
pub mod stabilizer;

pub use classifier::{Classification, ClassifyContext, MoodClassifier, Rule};
pub use label::{MoodLabel, UnknownMood};
pub use stabilizer::{ManualOverride, MoodStabilizer, StabilizerConfig};
