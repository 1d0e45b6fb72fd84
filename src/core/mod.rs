pub mod mood;
pub mod music;
pub mod session;
pub mod vision;
