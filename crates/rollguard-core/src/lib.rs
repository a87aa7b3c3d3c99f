pub mod config;
pub mod duration;
pub mod image;
pub mod types;

pub use config::RollguardConfig;
pub use duration::parse_duration;
pub use image::ImageRef;
pub use types::*;
