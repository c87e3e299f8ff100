pub mod advisory;
pub mod config;
pub mod encode;
pub mod errors;
pub mod frame;
pub mod stats;
pub mod types;

pub use advisory::{estimate_memory_usage, recommended_fps};
pub use config::{
    ErrorCallback, FrameCallback, ManagerConfig, OverflowPolicy, StreamConfig, MAX_TARGET_FPS,
};
pub use encode::FrameEncoder;
pub use errors::{CaptureError, ConfigError};
pub use frame::Frame;
pub use stats::StreamStats;
pub use types::*;
